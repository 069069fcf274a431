//! Callee descriptors.

use std::fmt;

use ori_layout::{Idx, Substitutions};

use crate::{invariant_violation, ExplosionLevel, FunctionId, ValueId};

/// Calling convention for a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CallConv {
    /// `fastcc`: internal Ori functions and every function value obtained
    /// at runtime.
    Fast,
    /// `ccc`: extern functions and FFI.
    C,
}

impl CallConv {
    /// LLVM calling convention number.
    pub fn llvm_id(self) -> u32 {
        match self {
            Self::Fast => 8,
            Self::C => 0,
        }
    }
}

impl fmt::Display for CallConv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fast => "fastcc",
            Self::C => "ccc",
        })
    }
}

/// The function value being called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalleeFn {
    /// A known, declared function.
    Direct(FunctionId),
    /// A function pointer, with the closure context passed as the trailing
    /// argument when present.
    Indirect {
        fn_ptr: ValueId,
        context: Option<ValueId>,
    },
}

impl CalleeFn {
    /// The closure context, if the call passes one.
    pub fn context(self) -> Option<ValueId> {
        match self {
            Self::Direct(_) => None,
            Self::Indirect { context, .. } => context,
        }
    }
}

/// Everything the call plan needs to know about what it is calling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Callee {
    conv: CallConv,
    func: CalleeFn,
    level: ExplosionLevel,
    subs: Substitutions,
    /// Unsubstituted type of the callee as declared.
    orig_type: Idx,
    /// Argument clauses one native call consumes.
    clauses: u32,
    nounwind: bool,
}

impl Callee {
    /// A known function taking `clauses` argument clauses per native call.
    ///
    /// # Panics
    ///
    /// Panics if `clauses` is zero.
    #[track_caller]
    pub fn direct(func: FunctionId, conv: CallConv, orig_type: Idx, clauses: u32) -> Self {
        if clauses == 0 {
            invariant_violation("a callee must consume at least one clause");
        }
        Self {
            conv,
            func: CalleeFn::Direct(func),
            level: ExplosionLevel::Minimal,
            subs: Substitutions::new(),
            orig_type,
            clauses,
            nounwind: false,
        }
    }

    /// A function value: `Fast`, `Minimal`, one clause, may unwind.
    pub fn indirect(fn_ptr: ValueId, context: Option<ValueId>, orig_type: Idx) -> Self {
        Self {
            conv: CallConv::Fast,
            func: CalleeFn::Indirect { fn_ptr, context },
            level: ExplosionLevel::Minimal,
            subs: Substitutions::new(),
            orig_type,
            clauses: 1,
            nounwind: false,
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: ExplosionLevel) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn with_substitutions(mut self, subs: Substitutions) -> Self {
        self.subs = subs;
        self
    }

    #[must_use]
    pub fn with_nounwind(mut self, nounwind: bool) -> Self {
        self.nounwind = nounwind;
        self
    }

    pub fn conv(&self) -> CallConv {
        self.conv
    }

    pub fn func(&self) -> CalleeFn {
        self.func
    }

    pub fn level(&self) -> ExplosionLevel {
        self.level
    }

    pub fn substitutions(&self) -> &Substitutions {
        &self.subs
    }

    pub fn orig_type(&self) -> Idx {
        self.orig_type
    }

    pub fn clauses(&self) -> u32 {
        self.clauses
    }

    pub fn is_nounwind(&self) -> bool {
        self.nounwind
    }

    /// Replace the function value, keeping the signature.
    ///
    /// Used when the driver swaps in a specialized entry point for the same
    /// function.
    pub fn set_function(&mut self, func: CalleeFn) {
        self.func = func;
    }
}
