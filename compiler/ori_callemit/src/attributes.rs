//! Call-site attributes.
//!
//! Attributes are collected as fragments while a clause is externalized.
//! Fragment slots are relative to the clause until the clause is written
//! into the native argument list, at which point they are rebased onto
//! their final positions. [`AttributeBuilder::freeze`] produces the
//! immutable [`AttributeSet`] attached to the call instruction.

use std::fmt;

use bitflags::bitflags;
use smallvec::SmallVec;

bitflags! {
    /// Per-parameter attributes.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ParamAttrs: u8 {
        /// Pointer to a caller-owned copy of an aggregate.
        const BYVAL     = 1 << 0;
        /// Hidden pointer receiving the result.
        const SRET      = 1 << 1;
        const NOALIAS   = 1 << 2;
        const NOCAPTURE = 1 << 3;
        const WRITEONLY = 1 << 4;
        const READONLY  = 1 << 5;
    }
}

bitflags! {
    /// Attributes of the call instruction itself.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct CallAttrs: u8 {
        /// The callee never unwinds.
        const NOUNWIND = 1 << 0;
    }
}

const PARAM_ATTR_NAMES: &[(ParamAttrs, &str)] = &[
    (ParamAttrs::SRET, "sret"),
    (ParamAttrs::BYVAL, "byval"),
    (ParamAttrs::NOALIAS, "noalias"),
    (ParamAttrs::NOCAPTURE, "nocapture"),
    (ParamAttrs::WRITEONLY, "writeonly"),
    (ParamAttrs::READONLY, "readonly"),
];

/// Attributes of one native argument slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParamAttr {
    pub slot: usize,
    pub flags: ParamAttrs,
    /// Known alignment of the pointee, 0 if none.
    pub align: u32,
}

impl fmt::Display for ParamAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.slot)?;
        for (flag, name) in PARAM_ATTR_NAMES {
            if self.flags.contains(*flag) {
                write!(f, " {name}")?;
            }
        }
        if self.align != 0 {
            write!(f, " align {}", self.align)?;
        }
        Ok(())
    }
}

/// Accumulates attribute fragments.
#[derive(Clone, Debug, Default)]
pub struct AttributeBuilder {
    params: SmallVec<[ParamAttr; 4]>,
    call: CallAttrs,
}

impl AttributeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_param(&mut self, slot: usize, flags: ParamAttrs, align: u32) {
        self.params.push(ParamAttr { slot, flags, align });
    }

    pub fn add_call(&mut self, flags: CallAttrs) {
        self.call |= flags;
    }

    /// Merge clause-relative fragments, shifting each slot by `base`.
    pub fn extend_rebased(&mut self, fragments: &AttributeBuilder, base: usize) {
        self.params.extend(fragments.params.iter().map(|p| ParamAttr {
            slot: p.slot + base,
            ..*p
        }));
        self.call |= fragments.call;
    }

    /// Fragments recorded so far, in insertion order.
    pub fn fragments(&self) -> &[ParamAttr] {
        &self.params
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty() && self.call.is_empty()
    }

    /// Produce the immutable set: sorted by slot, fragments for the same slot
    /// merged.
    pub fn freeze(mut self) -> AttributeSet {
        self.params.sort_by_key(|p| p.slot);
        let mut merged: Vec<ParamAttr> = Vec::with_capacity(self.params.len());
        for p in self.params {
            match merged.last_mut() {
                Some(last) if last.slot == p.slot => {
                    last.flags |= p.flags;
                    last.align = last.align.max(p.align);
                }
                _ => merged.push(p),
            }
        }
        AttributeSet {
            params: merged.into_boxed_slice(),
            call: self.call,
        }
    }
}

/// Frozen attributes of one call instruction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttributeSet {
    params: Box<[ParamAttr]>,
    call: CallAttrs,
}

impl AttributeSet {
    /// Attributes of `slot`, if any.
    pub fn param(&self, slot: usize) -> Option<&ParamAttr> {
        self.params
            .binary_search_by_key(&slot, |p| p.slot)
            .ok()
            .map(|i| &self.params[i])
    }

    /// All parameter attributes, sorted by slot.
    pub fn params(&self) -> &[ParamAttr] {
        &self.params
    }

    pub fn call(&self) -> CallAttrs {
        self.call
    }

    pub fn is_nounwind(&self) -> bool {
        self.call.contains(CallAttrs::NOUNWIND)
    }
}

impl fmt::Display for AttributeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for p in self.params.iter() {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{p}")?;
        }
        if self.is_nounwind() {
            if !first {
                f.write_str(", ")?;
            }
            f.write_str("nounwind")?;
        }
        Ok(())
    }
}
