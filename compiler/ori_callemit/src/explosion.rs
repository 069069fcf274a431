//! Scalar bundles ("explosions").
//!
//! An [`Explosion`] is an ordered sequence of primitive IR values standing
//! for one or more structured values flattened at a given
//! [`ExplosionLevel`]. Producers append with [`Explosion::add`]; consumers
//! claim values front to back. A claimed value is transferred out and cannot
//! be claimed again.

use smallvec::SmallVec;

use crate::invariant_violation;
use crate::ValueId;

/// The granularity at which a callee expects its values.
///
/// `Minimal` is the baseline: it is used for values of unknown provenance,
/// such as a function value just returned from a call. `Maximal` lets
/// resilient types travel as scalars.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExplosionLevel {
    #[default]
    Minimal,
    Maximal,
}

/// A pointer to memory with known alignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Address {
    pub ptr: ValueId,
    pub align: u32,
}

impl Address {
    pub fn new(ptr: ValueId, align: u32) -> Self {
        Self { ptr, align }
    }
}

/// An ordered bundle of scalar IR values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Explosion {
    level: ExplosionLevel,
    values: SmallVec<[ValueId; 8]>,
    /// Index of the next unclaimed value.
    next: usize,
}

impl Explosion {
    /// Create an empty bundle at `level`.
    pub fn new(level: ExplosionLevel) -> Self {
        Self {
            level,
            values: SmallVec::new(),
            next: 0,
        }
    }

    /// Create a bundle holding `values`.
    pub fn from_values(level: ExplosionLevel, values: &[ValueId]) -> Self {
        Self {
            level,
            values: SmallVec::from_slice(values),
            next: 0,
        }
    }

    #[inline]
    pub fn level(&self) -> ExplosionLevel {
        self.level
    }

    pub fn add(&mut self, value: ValueId) {
        self.values.push(value);
    }

    pub fn add_all(&mut self, values: impl IntoIterator<Item = ValueId>) {
        self.values.extend(values);
    }

    /// Total number of values ever added, claimed or not.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of values not yet claimed.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.values.len() - self.next
    }

    /// Claim the next value.
    ///
    /// # Panics
    ///
    /// Panics if the bundle is exhausted.
    #[track_caller]
    pub fn claim_next(&mut self) -> ValueId {
        let Some(&value) = self.values.get(self.next) else {
            invariant_violation(format_args!(
                "claimed past the end of a {}-value explosion",
                self.values.len()
            ));
        };
        self.next += 1;
        value
    }

    /// Claim the next `n` values.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `n` values remain.
    #[track_caller]
    pub fn claim(&mut self, n: usize) -> &[ValueId] {
        if n > self.remaining() {
            invariant_violation(format_args!(
                "claimed {n} values but only {} remain",
                self.remaining()
            ));
        }
        let start = self.next;
        self.next += n;
        &self.values[start..self.next]
    }

    /// Claim every remaining value.
    pub fn claim_all(&mut self) -> &[ValueId] {
        let start = self.next;
        self.next = self.values.len();
        &self.values[start..]
    }
}

#[cfg(test)]
mod tests;
