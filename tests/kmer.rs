use kmergrid::kmer::{encode_kmer, revcomp};
use kmergrid::{CanonicalKmer, KMER_WIRE_BYTES, KmerHandler, for_each_kmer};

struct Collect(Vec<CanonicalKmer>);

impl KmerHandler for Collect {
    fn accept(&mut self, km: CanonicalKmer) {
        self.0.push(km);
    }
}

#[test]
fn test_encode_revcomp_canonical() {
    let code = encode_kmer(b"AC").unwrap();
    assert_eq!(code, 0b0001);

    let rc = revcomp(code, 2);
    assert_eq!(rc, 0b1011); // GT

    let can = CanonicalKmer::from_window(b"AC").unwrap();
    assert_eq!(can.code(), 0b0001); // AC < GT
}

#[test]
fn test_strand_pair_collapses() {
    // AAAA and TTTT are one canonical k-mer.
    let a = CanonicalKmer::from_window(b"AAAA").unwrap();
    let t = CanonicalKmer::from_window(b"TTTT").unwrap();
    assert_eq!(a, t);
    assert_eq!(a.code(), 0);

    let fwd = CanonicalKmer::from_window(b"ACGTT").unwrap();
    let rc = CanonicalKmer::from_window(b"AACGT").unwrap();
    assert_eq!(fwd, rc);
}

#[test]
fn test_wire_roundtrip() {
    let km = CanonicalKmer::from_window(b"GATTACA").unwrap();
    let mut buf = [0u8; KMER_WIRE_BYTES];
    km.write_into(&mut buf);
    assert_eq!(CanonicalKmer::read_from(&buf), km);
}

#[test]
fn test_window_enumeration() {
    let reads = vec!["ACGTACGT".to_string()];
    let mut collect = Collect(Vec::new());
    for_each_kmer(&reads, 3, &mut collect);

    // 6 seed k-mers, first window is ACG.
    assert_eq!(collect.0.len(), 6);
    assert_eq!(collect.0[0], CanonicalKmer::from_window(b"ACG").unwrap());

    // ACG/CGT and GTA/TAC are strand pairs: two distinct canonical forms.
    let distinct: std::collections::HashSet<_> = collect.0.iter().copied().collect();
    assert_eq!(distinct.len(), 2);
}

#[test]
fn test_short_reads_skipped() {
    let reads = vec!["ACG".to_string(), "ACGT".to_string(), "AC".to_string()];
    let mut collect = Collect(Vec::new());
    for_each_kmer(&reads, 4, &mut collect);

    // Only the length-4 read contributes, exactly one window.
    assert_eq!(collect.0.len(), 1);
    assert_eq!(collect.0[0], CanonicalKmer::from_window(b"ACGT").unwrap());
}

#[test]
fn test_owner_total_and_deterministic() {
    for nprocs in [1usize, 2, 3, 5, 8] {
        for seed in 0u64..256 {
            let km = CanonicalKmer::read_from(&seed.wrapping_mul(0x9E3779B97F4A7C15).to_le_bytes());
            let owner = km.owner(nprocs);
            assert!(owner < nprocs);
            assert_eq!(owner, km.owner(nprocs));
        }
    }
}

#[test]
fn test_k32_window() {
    let seq = "ACGT".repeat(8);
    let reads = vec![seq.clone()];
    let mut collect = Collect(Vec::new());
    for_each_kmer(&reads, 32, &mut collect);
    assert_eq!(collect.0.len(), 1);
    assert_eq!(
        collect.0[0],
        CanonicalKmer::from_window(seq.as_bytes()).unwrap()
    );
}
