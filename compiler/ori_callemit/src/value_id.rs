//! Opaque ID newtypes for IR values, blocks, and functions.
//!
//! Callers never see the builder's internal storage: every value, block,
//! and function is a `Copy` handle. Each ID is a `u32` index assigned by the
//! [`CallBuilder`](crate::CallBuilder) implementation that produced it.

use std::fmt;

/// Opaque handle to an IR value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(u32);

/// Opaque handle to a basic block.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u32);

/// Opaque handle to a declared function.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(u32);

macro_rules! id_impls {
    ($ty:ident, $prefix:literal) => {
        impl $ty {
            /// Sentinel for "absent".
            pub const NONE: Self = Self(u32::MAX);

            /// Create an ID from a raw index. Builder implementations only.
            #[inline]
            pub const fn from_raw(raw: u32) -> Self {
                Self(raw)
            }

            /// True if this is the `NONE` sentinel.
            #[inline]
            pub fn is_none(self) -> bool {
                self.0 == u32::MAX
            }

            /// The raw index.
            #[inline]
            pub fn raw(self) -> u32 {
                self.0
            }

            /// The index as `usize`.
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_none() {
                    write!(f, "{}<none>", $prefix)
                } else {
                    write!(f, "{}{}", $prefix, self.0)
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(self, f)
            }
        }
    };
}

id_impls!(ValueId, "%");
id_impls!(BlockId, "bb");
id_impls!(FunctionId, "@");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_sentinels() {
        assert!(ValueId::NONE.is_none());
        assert!(!BlockId::from_raw(0).is_none());
        assert_eq!(FunctionId::from_raw(3).index(), 3);
    }

    #[test]
    fn debug_formatting() {
        assert_eq!(format!("{:?}", ValueId::from_raw(7)), "%7");
        assert_eq!(BlockId::from_raw(2).to_string(), "bb2");
        assert_eq!(FunctionId::NONE.to_string(), "@<none>");
    }
}
