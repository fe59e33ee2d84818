//! Mergeable HyperLogLog cardinality sketch.
//!
//! Used to size the owned-key maps before routing: each rank sketches its
//! local seed k-mers, registers merge across the grid by element-wise
//! maximum, and every rank ends up with the same global estimate.
//! Downstream correctness does not depend on the estimate's accuracy.

use crate::grid::ProcessGrid;
use crate::kmer::CanonicalKmer;

/// Count-distinct sketch over canonical k-mers.
#[derive(Clone)]
pub struct Hll {
    precision: u8,
    registers: Vec<u8>,
}

impl Hll {
    /// Recommended precision: 2^12 = 4096 registers.
    pub const DEFAULT_PRECISION: u8 = 12;

    /// Create a sketch with `2^precision` registers (clamped to 4..=16).
    pub fn new(precision: u8) -> Self {
        let precision = precision.clamp(4, 16);
        Hll {
            precision,
            registers: vec![0u8; 1usize << precision],
        }
    }

    /// O(1) insert of one canonical k-mer.
    #[inline]
    pub fn add(&mut self, km: &CanonicalKmer) {
        let h = km.hash64();
        let idx = (h >> (64 - self.precision)) as usize;
        // Rank of the first set bit in the remaining hash tail, 1-based
        // and capped so an all-zero tail stays representable.
        let tail = h << self.precision;
        let rho = (tail.leading_zeros() as u8 + 1).min(64 - self.precision + 1);
        if rho > self.registers[idx] {
            self.registers[idx] = rho;
        }
    }

    /// Fold another sketch of the same precision into this one.
    pub fn merge(&mut self, other: &Hll) {
        debug_assert_eq!(self.precision, other.precision);
        for (r, o) in self.registers.iter_mut().zip(&other.registers) {
            *r = (*r).max(*o);
        }
    }

    /// Combine registers across all ranks of the grid by element-wise
    /// maximum. Afterwards every rank holds the same merged state.
    pub fn parallel_merge(&mut self, grid: &ProcessGrid) {
        self.registers = grid.all_reduce_max_bytes(&self.registers);
    }

    /// Cardinality estimate with the standard small-range (linear
    /// counting) and large-range corrections.
    pub fn estimate(&self) -> f64 {
        let m = self.registers.len() as f64;
        let alpha = match self.registers.len() {
            16 => 0.673,
            32 => 0.697,
            64 => 0.709,
            _ => 0.7213 / (1.0 + 1.079 / m),
        };
        let sum: f64 = self
            .registers
            .iter()
            .map(|&r| 2f64.powi(-(r as i32)))
            .sum();
        let raw = alpha * m * m / sum;

        if raw <= 2.5 * m {
            let zeros = self.registers.iter().filter(|&&r| r == 0).count();
            if zeros > 0 {
                return m * (m / zeros as f64).ln();
            }
            raw
        } else if raw > TWO_POW_32 / 30.0 {
            -TWO_POW_32 * (1.0 - raw / TWO_POW_32).ln()
        } else {
            raw
        }
    }
}

const TWO_POW_32: f64 = 4_294_967_296.0;
