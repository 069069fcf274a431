//! Type index handle.
//!
//! `Idx` is the canonical type reference. All types live in a [`Pool`] and
//! are referenced by their 32-bit index.
//!
//! Primitive types have fixed indices (0-7) so they can be named without a
//! pool and compared in O(1).
//!
//! [`Pool`]: crate::Pool

use std::fmt;

/// A 32-bit index into the type pool.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct Idx(u32);

impl Idx {
    // === Primitive Types (indices 0-7) ===

    /// `int`: 64-bit signed integer.
    pub const INT: Self = Self(0);
    /// `float`: 64-bit IEEE float.
    pub const FLOAT: Self = Self(1);
    /// `bool`: a single bit.
    pub const BOOL: Self = Self(2);
    /// `byte`: 8-bit unsigned integer.
    pub const BYTE: Self = Self(3);
    /// `char`: Unicode scalar value (32-bit).
    pub const CHAR: Self = Self(4);
    /// The unit type `()`. Zero-sized.
    pub const UNIT: Self = Self(5);
    /// The never type. Zero-sized; a call returning it returns nothing.
    pub const NEVER: Self = Self(6);
    /// An opaque raw pointer.
    pub const RAWPTR: Self = Self(7);

    /// Number of pre-interned primitive types.
    pub const PRIMITIVE_COUNT: u32 = 8;

    /// Sentinel value indicating no type.
    pub const NONE: Self = Self(u32::MAX);

    /// Create an index from a raw `u32` value.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into `Vec`s).
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Check if this is a pre-interned primitive type.
    #[inline]
    pub const fn is_primitive(self) -> bool {
        self.0 < Self::PRIMITIVE_COUNT
    }

    /// Check if this is the NONE sentinel.
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == u32::MAX
    }

    /// Human-readable name for primitive types; `None` for pool types.
    #[inline]
    pub const fn name(self) -> Option<&'static str> {
        match self.0 {
            0 => Some("int"),
            1 => Some("float"),
            2 => Some("bool"),
            3 => Some("byte"),
            4 => Some("char"),
            5 => Some("()"),
            6 => Some("never"),
            7 => Some("rawptr"),
            _ => None,
        }
    }
}

impl fmt::Debug for Idx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "Idx({name})"),
            None if self.is_none() => write!(f, "Idx::NONE"),
            None => write!(f, "Idx({})", self.0),
        }
    }
}

impl fmt::Display for Idx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None if self.is_none() => f.write_str("<none>"),
            None => write!(f, "type#{}", self.0),
        }
    }
}

const _: () = assert!(std::mem::size_of::<Idx>() == 4);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_indices_are_fixed() {
        assert_eq!(Idx::INT.raw(), 0);
        assert_eq!(Idx::RAWPTR.raw(), 7);
        assert!(Idx::CHAR.is_primitive());
        assert!(!Idx::from_raw(Idx::PRIMITIVE_COUNT).is_primitive());
    }

    #[test]
    fn display_names() {
        assert_eq!(Idx::UNIT.to_string(), "()");
        assert_eq!(Idx::from_raw(12).to_string(), "type#12");
        assert_eq!(Idx::NONE.to_string(), "<none>");
        assert_eq!(format!("{:?}", Idx::FLOAT), "Idx(float)");
    }
}
