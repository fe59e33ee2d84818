//! Process grid and collective operations.
//!
//! The pipeline is SPMD: `P` ranks execute the same program over their own
//! data slice and synchronize only through blocking collectives. Ranks run
//! as scoped threads sharing a rendezvous board; a collective is a deposit
//! phase, a barrier, a take phase, and a second barrier, so the board is
//! empty and reusable the moment the call returns on every rank.
//!
//! Every rank must issue the same sequence of collective calls or the grid
//! deadlocks. Errors never skip a collective: a failing stage first runs
//! [`ProcessGrid::broadcast_status`] or [`ProcessGrid::all_agree`] so all
//! ranks abort together.

use crate::error::PipelineError;
use byteorder::{ByteOrder, LittleEndian as LE};
use parking_lot::Mutex;
use std::sync::{Arc, Barrier};

/// Rank of the root process for rooted collectives (scatter, gather,
/// broadcast).
pub const ROOT: usize = 0;

/// Shared rendezvous state: one payload cell per `(src, dst)` pair.
struct Board {
    nprocs: usize,
    barrier: Barrier,
    cells: Mutex<Vec<Option<Vec<u8>>>>,
}

impl Board {
    fn new(nprocs: usize) -> Self {
        Board {
            nprocs,
            barrier: Barrier::new(nprocs),
            cells: Mutex::new((0..nprocs * nprocs).map(|_| None).collect()),
        }
    }
}

/// Handle to the communicator: rank, size, and 2-D coordinates.
///
/// Cheap to clone; all clones of one grid share the same board. The
/// coordinate pair is diagnostic only, derived from the most-square
/// factorization of the process count.
#[derive(Clone)]
pub struct ProcessGrid {
    rank: usize,
    nprocs: usize,
    row: usize,
    col: usize,
    board: Arc<Board>,
}

impl ProcessGrid {
    fn new(rank: usize, board: Arc<Board>) -> Self {
        let nprocs = board.nprocs;
        let (_, cols) = grid_dims(nprocs);
        ProcessGrid {
            rank,
            nprocs,
            row: rank / cols,
            col: rank % cols,
            board,
        }
    }

    /// This rank, in `[0, size)`.
    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Number of ranks in the grid.
    #[inline]
    pub fn size(&self) -> usize {
        self.nprocs
    }

    /// `(row, col)` coordinates of this rank.
    #[inline]
    pub fn coords(&self) -> (usize, usize) {
        (self.row, self.col)
    }

    /// Whether this rank is the root of rooted collectives.
    #[inline]
    pub fn is_root(&self) -> bool {
        self.rank == ROOT
    }

    /// Generalized all-to-all of optional byte payloads.
    ///
    /// `outgoing[dst]` is delivered to rank `dst`; the return value holds
    /// one entry per source rank. Every other collective is derived from
    /// this primitive.
    pub fn exchange(&self, outgoing: Vec<Option<Vec<u8>>>) -> Vec<Option<Vec<u8>>> {
        debug_assert_eq!(outgoing.len(), self.nprocs);
        {
            let mut cells = self.board.cells.lock();
            for (dst, payload) in outgoing.into_iter().enumerate() {
                cells[self.rank * self.nprocs + dst] = payload;
            }
        }
        self.board.barrier.wait();
        let inbound = {
            let mut cells = self.board.cells.lock();
            (0..self.nprocs)
                .map(|src| cells[src * self.nprocs + self.rank].take())
                .collect()
        };
        self.board.barrier.wait();
        inbound
    }

    /// Rooted scatter: the root supplies one payload per destination rank;
    /// every rank receives its part.
    pub fn scatter_bytes(&self, from_root: Option<Vec<Vec<u8>>>) -> Vec<u8> {
        let outgoing = match from_root {
            Some(parts) if self.is_root() => {
                debug_assert_eq!(parts.len(), self.nprocs);
                parts.into_iter().map(Some).collect()
            }
            _ => vec![None; self.nprocs],
        };
        let mut inbound = self.exchange(outgoing);
        inbound[ROOT].take().unwrap_or_default()
    }

    /// Rooted gather: every rank sends one payload; the root receives all
    /// of them in rank order, other ranks receive `None`.
    pub fn gather_bytes(&self, payload: Vec<u8>) -> Option<Vec<Vec<u8>>> {
        let mut outgoing: Vec<Option<Vec<u8>>> = vec![None; self.nprocs];
        outgoing[ROOT] = Some(payload);
        let inbound = self.exchange(outgoing);
        if self.is_root() {
            Some(
                inbound
                    .into_iter()
                    .map(|p| p.unwrap_or_default())
                    .collect(),
            )
        } else {
            None
        }
    }

    /// Rooted broadcast of one byte payload.
    pub fn broadcast_bytes(&self, from_root: Option<Vec<u8>>) -> Vec<u8> {
        let outgoing = match from_root {
            Some(data) if self.is_root() => (0..self.nprocs).map(|_| Some(data.clone())).collect(),
            _ => vec![None; self.nprocs],
        };
        let mut inbound = self.exchange(outgoing);
        inbound[ROOT].take().unwrap_or_default()
    }

    /// Scalar all-to-all: `send[dst]` lands in the return value's `[src]`
    /// slot on rank `dst`.
    pub fn all_to_all_counts(&self, send: &[u64]) -> Vec<u64> {
        debug_assert_eq!(send.len(), self.nprocs);
        let outgoing = send
            .iter()
            .map(|&v| {
                let mut cell = vec![0u8; 8];
                LE::write_u64(&mut cell, v);
                Some(cell)
            })
            .collect();
        self.exchange(outgoing)
            .into_iter()
            .map(|cell| cell.map_or(0, |c| LE::read_u64(&c)))
            .collect()
    }

    /// Vector all-to-all over one contiguous byte buffer.
    ///
    /// `sendbuf[sdispls[i] .. sdispls[i] + sendcnt[i]]` goes to rank `i`;
    /// the returned buffer concatenates inbound payloads in source-rank
    /// order, matching displacements derived from the receive counts.
    pub fn all_to_allv(&self, sendbuf: &[u8], sendcnt: &[u64], sdispls: &[u64]) -> Vec<u8> {
        let outgoing = (0..self.nprocs)
            .map(|dst| {
                let start = sdispls[dst] as usize;
                let end = start + sendcnt[dst] as usize;
                Some(sendbuf[start..end].to_vec())
            })
            .collect();
        let inbound = self.exchange(outgoing);
        let mut recvbuf = Vec::with_capacity(inbound.iter().map(|p| p.as_ref().map_or(0, Vec::len)).sum());
        for part in inbound {
            if let Some(part) = part {
                recvbuf.extend_from_slice(&part);
            }
        }
        recvbuf
    }

    /// All-reduce by element-wise `u8` maximum. Register arrays must have
    /// the same length on every rank.
    pub fn all_reduce_max_bytes(&self, local: &[u8]) -> Vec<u8> {
        let outgoing = (0..self.nprocs).map(|_| Some(local.to_vec())).collect();
        let inbound = self.exchange(outgoing);
        let mut merged = vec![0u8; local.len()];
        for part in inbound.into_iter().flatten() {
            debug_assert_eq!(part.len(), merged.len());
            for (m, v) in merged.iter_mut().zip(part) {
                *m = (*m).max(v);
            }
        }
        merged
    }

    /// Exclusive prefix sum across ranks: rank `r` receives the sum of the
    /// values contributed by ranks `0..r` (0 on rank 0).
    pub fn exscan_sum(&self, value: u64) -> u64 {
        let mut cell = vec![0u8; 8];
        LE::write_u64(&mut cell, value);
        let outgoing = (0..self.nprocs).map(|_| Some(cell.clone())).collect();
        let inbound = self.exchange(outgoing);
        inbound[..self.rank]
            .iter()
            .map(|c| c.as_ref().map_or(0, |c| LE::read_u64(c)))
            .sum()
    }

    /// Gather one diagnostic line per rank to the root.
    pub fn gather_lines(&self, line: String) -> Option<Vec<String>> {
        self.gather_bytes(line.into_bytes()).map(|parts| {
            parts
                .into_iter()
                .map(|p| String::from_utf8_lossy(&p).into_owned())
                .collect()
        })
    }

    /// Broadcast the root's status before any dependent collective.
    ///
    /// Non-root ranks pass whatever local status they have; only the
    /// root's contribution decides the outcome, and every rank returns it.
    pub fn broadcast_status(&self, local: Result<(), &PipelineError>) -> Result<(), PipelineError> {
        let payload = self.is_root().then(|| encode_status(local));
        decode_status(&self.broadcast_bytes(payload))
    }

    /// Agree on a symmetric status: if any rank reports an error, every
    /// rank returns the lowest-ranked one.
    pub fn all_agree(&self, local: Result<(), &PipelineError>) -> Result<(), PipelineError> {
        let payload = encode_status(local);
        let outgoing = (0..self.nprocs).map(|_| Some(payload.clone())).collect();
        for status in self.exchange(outgoing).into_iter().flatten() {
            decode_status(&status)?;
        }
        Ok(())
    }
}

fn encode_status(status: Result<(), &PipelineError>) -> Vec<u8> {
    match status {
        Ok(()) => vec![0],
        Err(e) => e.wire_encode(),
    }
}

fn decode_status(payload: &[u8]) -> Result<(), PipelineError> {
    if payload.is_empty() || payload[0] == 0 {
        Ok(())
    } else {
        Err(PipelineError::wire_decode(payload))
    }
}

/// Most-square factorization of the rank count: rows is the largest
/// divisor not exceeding the square root.
fn grid_dims(nprocs: usize) -> (usize, usize) {
    let mut rows = (nprocs as f64).sqrt() as usize;
    while rows > 1 && nprocs % rows != 0 {
        rows -= 1;
    }
    let rows = rows.max(1);
    (rows, nprocs / rows)
}

/// Launch an SPMD grid of `nprocs` ranks and run the same closure on each.
///
/// Blocks until every rank returns, then yields the per-rank results in
/// rank order. This is the crate's stand-in for process launch: the CLI
/// binary and multi-rank tests both go through it.
pub fn run_grid<T, F>(nprocs: usize, f: F) -> Vec<T>
where
    F: Fn(ProcessGrid) -> T + Send + Sync,
    T: Send,
{
    assert!(nprocs >= 1, "grid needs at least one rank");
    let board = Arc::new(Board::new(nprocs));
    let mut results: Vec<Option<T>> = (0..nprocs).map(|_| None).collect();
    std::thread::scope(|scope| {
        for (rank, slot) in results.iter_mut().enumerate() {
            let grid = ProcessGrid::new(rank, Arc::clone(&board));
            let f = &f;
            scope.spawn(move || {
                *slot = Some(f(grid));
            });
        }
    });
    results
        .into_iter()
        .map(|slot| slot.expect("rank thread completed"))
        .collect()
}
