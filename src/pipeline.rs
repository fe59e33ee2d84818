//! End-to-end entry: run configuration and the staged collective
//! pipeline.
//!
//! Stages are linear (index, materialize, sketch, route) and every
//! transition is a collective, so either all ranks advance or all abort.

use crate::error::PipelineError;
use crate::grid::ProcessGrid;
use crate::hll::Hll;
use crate::index::FastaIndex;
use crate::router::{KmerMap, build_owned_key_map};
use std::path::Path;
use std::time::Instant;

/// Immutable per-run settings, fixed before the pipeline starts and
/// threaded through constructors.
#[derive(Clone, Debug)]
pub struct RouteConfig {
    k: usize,
    hll_precision: u8,
}

impl RouteConfig {
    /// Settings for a k-mer length, with the default sketch precision.
    pub fn new(k: usize) -> Self {
        RouteConfig {
            k,
            hll_precision: Hll::DEFAULT_PRECISION,
        }
    }

    /// Override the sketch precision (register count = 2^precision).
    pub fn with_hll_precision(mut self, precision: u8) -> Self {
        self.hll_precision = precision;
        self
    }

    /// K-mer length.
    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Sketch precision.
    #[inline]
    pub fn hll_precision(&self) -> u8 {
        self.hll_precision
    }
}

/// Run the full data plane on this rank: scatter the FASTA index,
/// materialize the local reads, sketch, and route.
///
/// Returns the rank's owned-key map, the contract handed to the
/// downstream value-collection stage. Deterministic for a given
/// `(fasta, k, grid size)`.
pub fn route_kmers(
    fasta_path: &Path,
    cfg: &RouteConfig,
    grid: &ProcessGrid,
) -> Result<KmerMap, PipelineError> {
    assert!(cfg.k() > 0 && cfg.k() <= 32, "k must be 1..=32");

    let started = Instant::now();
    let index = FastaIndex::build(fasta_path, grid.clone())?;

    let local = index.materialize();
    grid.all_agree(local.as_ref().map(|_| ()).map_err(|e| e))?;
    let local = local?;

    index.log_summary(started.elapsed().as_secs_f64());

    build_owned_key_map(&local.reads, cfg, grid)
}
