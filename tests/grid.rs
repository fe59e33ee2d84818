use kmergrid::{CanonicalKmer, Hll, PipelineError, run_grid};

#[test]
fn test_run_grid_rank_order() {
    let squares = run_grid(4, |grid| grid.rank() * grid.rank());
    assert_eq!(squares, vec![0, 1, 4, 9]);
}

#[test]
fn test_coords_most_square() {
    let coords = run_grid(6, |grid| grid.coords());
    assert_eq!(coords, vec![(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (1, 2)]);

    let coords = run_grid(4, |grid| grid.coords());
    assert_eq!(coords, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);

    let coords = run_grid(1, |grid| grid.coords());
    assert_eq!(coords, vec![(0, 0)]);
}

#[test]
fn test_exscan_sum() {
    let values = [5u64, 7, 1, 2];
    let prefixes = run_grid(4, |grid| grid.exscan_sum(values[grid.rank()]));
    assert_eq!(prefixes, vec![0, 5, 12, 13]);
}

#[test]
fn test_all_to_all_counts_transposes() {
    let received = run_grid(3, |grid| {
        let send: Vec<u64> = (0..3).map(|dst| (grid.rank() * 10 + dst) as u64).collect();
        grid.all_to_all_counts(&send)
    });
    for (rank, recv) in received.into_iter().enumerate() {
        let expect: Vec<u64> = (0..3).map(|src| (src * 10 + rank) as u64).collect();
        assert_eq!(recv, expect);
    }
}

#[test]
fn test_all_to_allv_with_empty_pairs() {
    // Rank r sends r bytes of value r, all addressed to rank 0; every
    // other pair is empty.
    let received = run_grid(3, |grid| {
        let rank = grid.rank();
        let sendbuf = vec![rank as u8; rank];
        let mut sendcnt = vec![0u64; 3];
        sendcnt[0] = rank as u64;
        let sdispls = vec![0u64; 3];
        grid.all_to_allv(&sendbuf, &sendcnt, &sdispls)
    });
    assert_eq!(received[0], vec![1u8, 2, 2]);
    assert!(received[1].is_empty());
    assert!(received[2].is_empty());
}

#[test]
fn test_all_reduce_max() {
    let merged = run_grid(4, |grid| {
        let mut registers = vec![0u8; 8];
        registers[grid.rank()] = grid.rank() as u8 + 1;
        registers[7] = 3;
        grid.all_reduce_max_bytes(&registers)
    });
    for regs in merged {
        assert_eq!(regs, vec![1, 2, 3, 4, 0, 0, 0, 3]);
    }
}

#[test]
fn test_gather_lines_to_root() {
    let gathered = run_grid(3, |grid| grid.gather_lines(format!("rank {}", grid.rank())));
    assert_eq!(
        gathered[0].as_deref(),
        Some(&["rank 0".to_string(), "rank 1".to_string(), "rank 2".to_string()][..])
    );
    assert!(gathered[1].is_none());
    assert!(gathered[2].is_none());
}

#[test]
fn test_broadcast_status_propagates_root_error() {
    let statuses = run_grid(3, |grid| {
        let local = if grid.is_root() {
            Err(PipelineError::IndexUnavailable("gone".into()))
        } else {
            Ok(())
        };
        grid.broadcast_status(local.as_ref().map(|_| ()).map_err(|e| e))
    });
    for status in statuses {
        assert!(matches!(status, Err(PipelineError::IndexUnavailable(_))));
    }
}

#[test]
fn test_all_agree_propagates_any_error() {
    let statuses = run_grid(4, |grid| {
        let local = if grid.rank() == 2 {
            Err(PipelineError::InvariantViolation("bad slice".into()))
        } else {
            Ok(())
        };
        grid.all_agree(local.as_ref().map(|_| ()).map_err(|e| e))
    });
    for status in statuses {
        assert!(matches!(status, Err(PipelineError::InvariantViolation(_))));
    }
}

#[test]
fn test_parallel_merge_agrees_on_every_rank() {
    let estimates = run_grid(3, |grid| {
        let mut hll = Hll::new(Hll::DEFAULT_PRECISION);
        // Disjoint per-rank k-mer populations.
        for i in 0..500u64 {
            let code = (grid.rank() as u64) << 32 | i;
            hll.add(&CanonicalKmer::read_from(&code.to_le_bytes()));
        }
        hll.parallel_merge(&grid);
        hll.estimate()
    });
    assert_eq!(estimates[0], estimates[1]);
    assert_eq!(estimates[1], estimates[2]);
    let error = (estimates[0] - 1500.0).abs() / 1500.0;
    assert!(error < 0.15, "merged estimate {} for 1500 distinct", estimates[0]);
}

#[test]
fn test_scatter_gather_roundtrip() {
    let received = run_grid(3, |grid| {
        let parts = grid
            .is_root()
            .then(|| (0..3).map(|dst| vec![dst as u8; dst + 1]).collect());
        let mine = grid.scatter_bytes(parts);
        grid.gather_bytes(mine)
    });
    assert_eq!(
        received[0],
        Some(vec![vec![0u8], vec![1u8, 1], vec![2u8, 2, 2]])
    );
    assert!(received[1].is_none());
}
