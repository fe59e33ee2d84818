//! Fixture helpers shared by the integration tests.

#![allow(dead_code)]

use kmergrid::CanonicalKmer;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Write a FASTA wrapped at `width` plus its `.fai` sidecar.
///
/// Returns the FASTA path; the sidecar lands next to it.
pub fn write_fasta(dir: &Path, name: &str, seqs: &[&str], width: usize) -> PathBuf {
    let fasta_path = dir.join(name);
    let mut fasta = String::new();
    let mut fai = String::new();
    for (i, seq) in seqs.iter().enumerate() {
        let header = format!(">read{i}\n");
        fasta.push_str(&header);
        let pos = fasta.len();
        for chunk in seq.as_bytes().chunks(width) {
            fasta.push_str(std::str::from_utf8(chunk).unwrap());
            fasta.push('\n');
        }
        writeln!(fai, "read{i}\t{}\t{pos}\t{width}\t{}", seq.len(), width + 1).unwrap();
    }
    fs::write(&fasta_path, fasta).unwrap();
    fs::write(sidecar(&fasta_path), fai).unwrap();
    fasta_path
}

/// Path of the `.fai` sidecar for a FASTA path.
pub fn sidecar(fasta_path: &Path) -> PathBuf {
    let mut p = fasta_path.as_os_str().to_os_string();
    p.push(".fai");
    PathBuf::from(p)
}

/// Deterministic nucleotide sequence: a small LCG mapped onto ACGT.
pub fn synth_seq(seed: u64, len: usize) -> String {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    let mut seq = String::with_capacity(len);
    for _ in 0..len {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        seq.push(match (state >> 33) & 0b11 {
            0 => 'A',
            1 => 'C',
            2 => 'G',
            _ => 'T',
        });
    }
    seq
}

/// Reference enumeration: the distinct canonical k-mer set of a read
/// collection, computed window by window.
pub fn naive_canonical_set(seqs: &[&str], k: usize) -> HashSet<CanonicalKmer> {
    let mut set = HashSet::new();
    for seq in seqs {
        let bytes = seq.as_bytes();
        if bytes.len() < k {
            continue;
        }
        for window in bytes.windows(k) {
            set.insert(CanonicalKmer::from_window(window).unwrap());
        }
    }
    set
}
