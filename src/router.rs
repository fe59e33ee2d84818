//! K-mer router: hash-partitions local seed k-mers across the grid and
//! builds each rank's owned-key map.
//!
//! Two enumeration passes drive the exchange. The first feeds the
//! cardinality sketch so the maps can be pre-sized; the second fills one
//! outbound bucket per destination rank. Buckets are packed into a single
//! contiguous send buffer (fixed-width payloads, no per-k-mer
//! allocations) and exchanged with one all-to-all-v.

use crate::error::PipelineError;
use crate::grid::ProcessGrid;
use crate::hll::Hll;
use crate::kmer::{CanonicalKmer, KmerHandler, for_each_kmer, KMER_WIRE_BYTES};
use crate::pipeline::RouteConfig;
use log::info;
use rustc_hash::FxHashMap;

/// Largest payload one pair may exchange, matching the element-count
/// limit of the classic transports this design targets.
const PAIR_BYTE_LIMIT: u64 = i32::MAX as u64;

/// Value slot reserved for the downstream occupancy-collection stage:
/// `(read id, position)` seed occurrences and their count.
#[derive(Clone, Debug, Default)]
pub struct KmerEntry {
    pub seeds: Vec<(u32, u32)>,
    pub count: u32,
}

/// Per-rank owned-key map: every canonical k-mer this rank owns, with an
/// initially empty value slot.
pub type KmerMap = FxHashMap<CanonicalKmer, KmerEntry>;

/// Handler feeding every seed k-mer into the cardinality sketch.
pub struct SketchHandler<'a> {
    hll: &'a mut Hll,
}

impl<'a> SketchHandler<'a> {
    pub fn new(hll: &'a mut Hll) -> Self {
        SketchHandler { hll }
    }
}

impl KmerHandler for SketchHandler<'_> {
    #[inline]
    fn accept(&mut self, km: CanonicalKmer) {
        self.hll.add(&km);
    }
}

/// Handler appending every seed k-mer to its owner's outgoing bucket.
pub struct PartitionHandler<'a> {
    buckets: &'a mut [Vec<CanonicalKmer>],
}

impl<'a> PartitionHandler<'a> {
    pub fn new(buckets: &'a mut [Vec<CanonicalKmer>]) -> Self {
        PartitionHandler { buckets }
    }
}

impl KmerHandler for PartitionHandler<'_> {
    #[inline]
    fn accept(&mut self, km: CanonicalKmer) {
        let owner = km.owner(self.buckets.len());
        self.buckets[owner].push(km);
    }
}

/// Route all local seed k-mers to their owning ranks and return this
/// rank's owned-key map.
///
/// Afterwards every canonical k-mer present anywhere in the global read
/// set appears in exactly one rank's map: its owner's.
pub fn build_owned_key_map(
    reads: &[String],
    cfg: &RouteConfig,
    grid: &ProcessGrid,
) -> Result<KmerMap, PipelineError> {
    let nprocs = grid.size();
    let k = cfg.k();

    // First pass: global cardinality estimate.
    let mut hll = Hll::new(cfg.hll_precision());
    for_each_kmer(reads, k, &mut SketchHandler::new(&mut hll));
    hll.parallel_merge(grid);
    let estimate = hll.estimate().ceil() as u64;
    if grid.is_root() {
        info!("estimated {estimate} distinct canonical {k}-mers");
    }

    // Second pass: one outbound bucket per destination rank.
    let mut buckets: Vec<Vec<CanonicalKmer>> = vec![Vec::new(); nprocs];
    for_each_kmer(reads, k, &mut PartitionHandler::new(&mut buckets));

    let sendcnt: Vec<u64> = buckets
        .iter()
        .map(|b| (b.len() * KMER_WIRE_BYTES) as u64)
        .collect();

    let size_check = match sendcnt.iter().position(|&c| c > PAIR_BYTE_LIMIT) {
        Some(dst) => Err(PipelineError::OversizedMessage(format!(
            "rank {} would send {} bytes to rank {dst}",
            grid.rank(),
            sendcnt[dst]
        ))),
        None => Ok(()),
    };
    grid.all_agree(size_check.as_ref().map(|_| ()).map_err(|e| e))?;

    let recvcnt = grid.all_to_all_counts(&sendcnt);

    let sdispls = exclusive_prefix_sum(&sendcnt);
    let rdispls = exclusive_prefix_sum(&recvcnt);
    let totsend: u64 = sendcnt.iter().sum();
    let totrecv: u64 = recvcnt.iter().sum();

    // Pack each bucket at its displacement, releasing it as soon as its
    // payloads are in the buffer.
    let mut sendbuf = vec![0u8; totsend as usize];
    for (dst, bucket) in buckets.iter_mut().enumerate() {
        debug_assert_eq!(bucket.len() * KMER_WIRE_BYTES, sendcnt[dst] as usize);
        let mut at = sdispls[dst] as usize;
        for km in bucket.iter() {
            km.write_into(&mut sendbuf[at..at + KMER_WIRE_BYTES]);
            at += KMER_WIRE_BYTES;
        }
        bucket.clear();
        bucket.shrink_to_fit();
    }

    let recvbuf = grid.all_to_allv(&sendbuf, &sendcnt, &sdispls);
    drop(sendbuf);
    debug_assert_eq!(recvbuf.len() as u64, totrecv);

    // Deduplicate the received seeds into the owned-key map; the same
    // k-mer may arrive many times, from many ranks.
    let mut map = KmerMap::default();
    map.reserve((estimate / nprocs as u64) as usize);
    for src in 0..nprocs {
        let start = rdispls[src] as usize;
        let end = start + recvcnt[src] as usize;
        for payload in recvbuf[start..end].chunks_exact(KMER_WIRE_BYTES) {
            map.entry(CanonicalKmer::read_from(payload)).or_default();
        }
    }
    Ok(map)
}

/// Exclusive prefix sum: `out[0] = 0`, `out[i] = out[i-1] + counts[i-1]`.
fn exclusive_prefix_sum(counts: &[u64]) -> Vec<u64> {
    let mut displs = Vec::with_capacity(counts.len());
    let mut acc = 0u64;
    for &c in counts {
        displs.push(acc);
        acc += c;
    }
    displs
}
