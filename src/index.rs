//! FASTA index: rank-0 `.fai` parse, record scatter, and the collective
//! range read that materializes each rank's reads.
//!
//! The `.fai` sidecar (`<fasta>.fai`) is parsed on rank 0 only. Records
//! are split into `P` contiguous blocks (the first `P-1` hold `N / P`
//! records, the last the remainder) and scattered as raw bytes of a
//! contiguous 3-field record type; this block order is the canonical
//! global read numbering used downstream.

use crate::error::PipelineError;
use crate::grid::ProcessGrid;
use bytemuck::{Pod, Zeroable};
use byteorder::{ByteOrder, LittleEndian as LE};
use log::{debug, info};
use memmap2::Mmap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// One `.fai` record: nucleotide count, byte offset of the first sequence
/// byte past the header, and the wrap width. The read name is parsed but
/// never propagated.
#[repr(C)]
#[derive(Copy, Clone, Default, Pod, Zeroable, PartialEq, Eq, Debug)]
pub struct FaidxRecord {
    /// Nucleotide count of the read.
    pub len: u64,
    /// Starting byte offset of the read's sequence block.
    pub pos: u64,
    /// Nucleotides per wrapped line.
    pub bases: u64,
}

/// A rank's materialized reads plus its first global read id.
pub struct LocalReads {
    /// Line-unwrapped sequences, in local record order.
    pub reads: Vec<String>,
    /// Global ordinal of `reads[0]`: the exclusive prefix sum of record
    /// counts over lower ranks.
    pub first_global_id: u64,
}

/// Per-rank slice of the scattered FASTA index.
pub struct FastaIndex {
    fasta_path: PathBuf,
    records: Vec<FaidxRecord>,
    grid: ProcessGrid,
}

impl FastaIndex {
    /// Parse the `.fai` on rank 0 and scatter record blocks to all ranks.
    ///
    /// A parse failure on rank 0 is broadcast before any scatter, so every
    /// rank observes [`PipelineError::IndexUnavailable`] and aborts
    /// together.
    pub fn build(fasta_path: &Path, grid: ProcessGrid) -> Result<Self, PipelineError> {
        let nprocs = grid.size();

        let parsed: Result<Vec<FaidxRecord>, PipelineError> = if grid.is_root() {
            parse_fai(&faidx_path(fasta_path))
        } else {
            Ok(Vec::new())
        };
        grid.broadcast_status(parsed.as_ref().map(|_| ()).map_err(|e| e))?;
        let root_records = parsed?;

        // Tell each rank how many records it will receive.
        let counts = grid.is_root().then(|| {
            partition_counts(root_records.len(), nprocs)
                .iter()
                .map(|&c| {
                    let mut cell = vec![0u8; 8];
                    LE::write_u64(&mut cell, c as u64);
                    cell
                })
                .collect()
        });
        let recvcount = LE::read_u64(&grid.scatter_bytes(counts)) as usize;

        // Scatter the matching record slices as raw bytes.
        let parts = grid.is_root().then(|| {
            let mut displ = 0usize;
            partition_counts(root_records.len(), nprocs)
                .iter()
                .map(|&c| {
                    let slice = &root_records[displ..displ + c];
                    displ += c;
                    bytemuck::cast_slice(slice).to_vec()
                })
                .collect()
        });
        let records: Vec<FaidxRecord> = bytemuck::pod_collect_to_vec(&grid.scatter_bytes(parts));
        debug_assert_eq!(records.len(), recvcount);

        Ok(FastaIndex {
            fasta_path: fasta_path.to_path_buf(),
            records,
            grid,
        })
    }

    /// This rank's record slice, in file order.
    pub fn records(&self) -> &[FaidxRecord] {
        &self.records
    }

    /// The grid this index was scattered over.
    pub fn grid(&self) -> &ProcessGrid {
        &self.grid
    }

    /// Materialize this rank's reads with one contiguous range read.
    ///
    /// The local byte range is `[first.pos, last.pos + last.len +
    /// last.len / last.bases)`, the additive term covering the embedded
    /// line terminators, clamped to the file size. Line wrapping is
    /// removed while copying: runs of `min(bases, remaining)` nucleotides,
    /// skipping exactly one byte between runs.
    pub fn materialize(&self) -> Result<LocalReads, PipelineError> {
        let grid = &self.grid;

        let slice_check = self.check_slice();
        grid.all_agree(slice_check.as_ref().map(|_| ()).map_err(|e| e))?;

        if self.records.is_empty() {
            // Empty dataset on a single rank: nothing to read.
            return Ok(LocalReads {
                reads: Vec::new(),
                first_global_id: 0,
            });
        }

        let first = &self.records[0];
        let last = &self.records[self.records.len() - 1];
        let startpos = first.pos;
        let mut endpos = last.pos + last.len + last.len / last.bases;

        let mapped = self.open_mapped();
        grid.all_agree(mapped.as_ref().map(|_| ()).map_err(|e| e))?;
        let map = mapped?;

        endpos = endpos.min(map.len() as u64);

        let range_check = if endpos <= startpos {
            Err(PipelineError::InvariantViolation(format!(
                "rank {}: empty byte range [{}, {})",
                grid.rank(),
                startpos,
                endpos
            )))
        } else {
            Ok(())
        };
        grid.all_agree(range_check.as_ref().map(|_| ()).map_err(|e| e))?;

        let chunk = &map[startpos as usize..endpos as usize];

        // Canonical global numbering of the first local read.
        let first_global_id = grid.exscan_sum(self.records.len() as u64);

        let mut reads = Vec::with_capacity(self.records.len());
        for rec in &self.records {
            let mut buf = Vec::with_capacity(rec.len as usize);
            let mut at = (rec.pos - startpos) as usize;
            let mut remain = rec.len as usize;
            while remain > 0 {
                let cnt = (rec.bases as usize).min(remain);
                let run = chunk.get(at..at + cnt).ok_or_else(|| {
                    PipelineError::InvariantViolation(format!(
                        "record at byte {} overruns the mapped range",
                        rec.pos
                    ))
                })?;
                buf.extend_from_slice(run);
                at += cnt + 1;
                remain -= cnt;
            }
            let read = String::from_utf8(buf).map_err(|_| {
                PipelineError::InvariantViolation(format!(
                    "record at byte {} holds non-UTF-8 sequence data",
                    rec.pos
                ))
            })?;
            debug_assert_eq!(read.len() as u64, rec.len);
            reads.push(read);
        }

        debug!(
            "rank {}: materialized {} reads, first global id {}",
            grid.rank(),
            reads.len(),
            first_global_id
        );

        Ok(LocalReads {
            reads,
            first_global_id,
        })
    }

    /// Gather one summary line per rank to rank 0 and log them: read
    /// count, average length, and parse throughput.
    pub fn log_summary(&self, parse_secs: f64) {
        let numreads = self.records.len() as u64;
        let totbases: u64 = self.records.iter().map(|r| r.len).sum();
        let avglen = totbases as f64 / numreads.max(1) as f64;
        let mbps = totbases as f64 / parse_secs.max(1e-9) / 1e6;
        let (row, col) = self.grid.coords();
        let line = format!(
            "P({}, {}) stores {} reads with an average length of {:.1} nucleotides ({:.1} Mbp/s)",
            row, col, numreads, avglen, mbps
        );
        if let Some(lines) = self.grid.gather_lines(line) {
            for l in &lines {
                info!("{l}");
            }
        }
    }

    fn check_slice(&self) -> Result<(), PipelineError> {
        if self.records.is_empty() {
            if self.grid.size() > 1 {
                return Err(PipelineError::InvariantViolation(format!(
                    "rank {} received an empty record slice",
                    self.grid.rank()
                )));
            }
            return Ok(());
        }
        for rec in &self.records {
            if rec.len == 0 {
                return Err(PipelineError::InvariantViolation(format!(
                    "zero-length read at byte {}",
                    rec.pos
                )));
            }
            if rec.bases == 0 {
                return Err(PipelineError::InvariantViolation(format!(
                    "zero wrap width at byte {}",
                    rec.pos
                )));
            }
        }
        Ok(())
    }

    fn open_mapped(&self) -> Result<Mmap, PipelineError> {
        let file = File::open(&self.fasta_path).map_err(|e| {
            PipelineError::FastaIo(format!("{}: {e}", self.fasta_path.display()))
        })?;
        // Read-only map shared by disjoint per-rank ranges.
        unsafe { Mmap::map(&file) }
            .map_err(|e| PipelineError::FastaIo(format!("{}: {e}", self.fasta_path.display())))
    }
}

/// Sidecar path: `<fasta>.fai`.
fn faidx_path(fasta_path: &Path) -> PathBuf {
    let mut p = fasta_path.as_os_str().to_os_string();
    p.push(".fai");
    PathBuf::from(p)
}

/// Contiguous block partition of `num_records` over `nprocs` ranks: the
/// first `nprocs - 1` blocks hold `num_records / nprocs` records each,
/// the last block the remainder.
pub fn partition_counts(num_records: usize, nprocs: usize) -> Vec<usize> {
    let per_rank = num_records / nprocs;
    let mut counts = vec![per_rank; nprocs];
    counts[nprocs - 1] = num_records - (nprocs - 1) * per_rank;
    counts
}

fn parse_fai(path: &Path) -> Result<Vec<FaidxRecord>, PipelineError> {
    let file = File::open(path)
        .map_err(|e| PipelineError::IndexUnavailable(format!("{}: {e}", path.display())))?;
    let mut records = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line
            .map_err(|e| PipelineError::IndexUnavailable(format!("{}: {e}", path.display())))?;
        if line.is_empty() {
            continue;
        }
        records.push(parse_fai_line(&line).ok_or_else(|| {
            PipelineError::IndexUnavailable(format!(
                "{}:{}: malformed faidx line",
                path.display(),
                lineno + 1
            ))
        })?);
    }
    Ok(records)
}

/// One line: `name len pos bases`, whitespace-separated; fields past the
/// fourth are ignored. The name is read and discarded.
fn parse_fai_line(line: &str) -> Option<FaidxRecord> {
    let mut fields = line.split_whitespace();
    let _name = fields.next()?;
    let len = fields.next()?.parse().ok()?;
    let pos = fields.next()?.parse().ok()?;
    let bases = fields.next()?.parse().ok()?;
    Some(FaidxRecord { len, pos, bases })
}
