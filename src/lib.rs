//! Distributed front-end of a parallel genome-assembly pipeline.
//!
//! Ingests an indexed FASTA file across a grid of cooperating ranks and
//! builds a hash-partitioned, per-rank set of candidate canonical k-mers,
//! ready for downstream reliable-k-mer filtering and overlap-graph
//! construction. Two stages make up the data plane:
//!
//! 1. **Ingestion**: the `.fai` byte-offset index is parsed on rank 0
//!    and scattered in contiguous blocks; each rank then materializes
//!    exactly its assigned reads with one range read, stripping line
//!    wrapping.
//! 2. **Routing**: each rank enumerates canonical k-mers from its local
//!    reads, estimates global cardinality with a mergeable sketch,
//!    hash-partitions the k-mers to their owning ranks, and exchanges
//!    them with a single all-to-all, deduplicating into an owned-key map.
//!
//! Ranks run as SPMD threads synchronizing through blocking collectives;
//! see [`grid`] for the execution substrate and [`pipeline::route_kmers`]
//! for the end-to-end entry.

pub mod error;
pub mod grid;
pub mod hll;
pub mod index;
pub mod kmer;
pub mod pipeline;
pub mod router;

pub use crate::error::PipelineError;
pub use crate::grid::{ProcessGrid, run_grid};
pub use crate::hll::Hll;
pub use crate::index::{FaidxRecord, FastaIndex, LocalReads, partition_counts};
pub use crate::kmer::{CanonicalKmer, KMER_WIRE_BYTES, KmerHandler, for_each_kmer};
pub use crate::pipeline::{RouteConfig, route_kmers};
pub use crate::router::{KmerEntry, KmerMap, build_owned_key_map};
