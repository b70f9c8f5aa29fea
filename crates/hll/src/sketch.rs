//! Dense HyperLogLog implementation.
//!
//! Fixed precision 14: 2^14 = 16,384 single-byte registers (16 KiB per
//! sketch), relative standard error 1.04 / √16384 ≈ 0.81%. Observed error at
//! one million distinct items stays within ±2%, which is the bound the tests
//! enforce.
//!
//! Hashing uses the standard library's `DefaultHasher` (SipHash-1-3 with a
//! fixed zero key), which is deterministic across processes and platforms,
//! so sketches built on different instances merge consistently.
//!
//! The byte encoding is a 1-byte precision header followed by the dense
//! register array. Serializing, storing, and deserializing a sketch yields a
//! bit-identical register set and therefore the exact same estimate.

use std::hash::{Hash, Hasher};

use engine_core::{Error, Result};

/// Register index bits. 2^14 registers.
pub const PRECISION: u8 = 14;

const NUM_REGISTERS: usize = 1 << PRECISION;

/// A mergeable HyperLogLog sketch over hashable items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sketch {
    registers: Vec<u8>,
}

impl Default for Sketch {
    fn default() -> Self {
        Self::new()
    }
}

impl Sketch {
    /// An empty sketch (estimate 0).
    pub fn new() -> Self {
        Self {
            registers: vec![0u8; NUM_REGISTERS],
        }
    }

    /// Observe one item. Inserting the same item any number of times leaves
    /// the sketch unchanged after the first.
    pub fn insert<T: Hash + ?Sized>(&mut self, item: &T) {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        item.hash(&mut hasher);
        let hash = hasher.finish();

        // Top PRECISION bits pick the register; the rank is the position of
        // the first set bit in the remainder.
        let index = (hash >> (64 - PRECISION)) as usize;
        let remainder = hash << PRECISION;
        let rank = (remainder.leading_zeros() as u8).min(64 - PRECISION) + 1;

        if rank > self.registers[index] {
            self.registers[index] = rank;
        }
    }

    /// Merge another sketch into this one. The result estimates the
    /// cardinality of the union.
    pub fn merge(&mut self, other: &Sketch) {
        for (mine, theirs) in self.registers.iter_mut().zip(&other.registers) {
            if *theirs > *mine {
                *mine = *theirs;
            }
        }
    }

    /// Approximate count of distinct inserted items.
    pub fn estimate(&self) -> f64 {
        let m = NUM_REGISTERS as f64;
        let alpha = 0.7213 / (1.0 + 1.079 / m);

        let mut sum = 0.0;
        let mut zeros = 0u32;
        for &r in &self.registers {
            sum += 1.0 / (1u64 << r) as f64;
            if r == 0 {
                zeros += 1;
            }
        }

        let raw = alpha * m * m / sum;

        // Small-range correction: linear counting while registers are
        // still mostly empty.
        if raw <= 2.5 * m && zeros > 0 {
            m * (m / f64::from(zeros)).ln()
        } else {
            raw
        }
    }

    /// True when nothing has been inserted.
    pub fn is_empty(&self) -> bool {
        self.registers.iter().all(|&r| r == 0)
    }

    /// Compact byte form: precision header + dense registers.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + NUM_REGISTERS);
        bytes.push(PRECISION);
        bytes.extend_from_slice(&self.registers);
        bytes
    }

    /// Decode the byte form produced by [`Sketch::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (&precision, registers) = bytes
            .split_first()
            .ok_or_else(|| Error::SketchDecode("empty sketch payload".into()))?;

        if precision != PRECISION {
            return Err(Error::SketchDecode(format!(
                "unsupported precision {precision}, expected {PRECISION}"
            )));
        }
        if registers.len() != NUM_REGISTERS {
            return Err(Error::SketchDecode(format!(
                "expected {NUM_REGISTERS} registers, got {}",
                registers.len()
            )));
        }

        Ok(Self {
            registers: registers.to_vec(),
        })
    }
}
