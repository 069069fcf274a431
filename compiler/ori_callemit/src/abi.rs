//! Native signature computation.
//!
//! Determines, for a callee, how each argument clause maps onto native
//! argument slots and how the result comes back. The native argument list
//! of one call is laid out as
//!
//! ```text
//! [sret?] [clause N] ... [clause 2] [clause 1] [context?]
//! ```
//!
//! Clauses are written right to left as the call plan receives them, so the
//! first clause supplied sits immediately before the closure context.
//! A clause that binds generic parameters is followed (within its own range)
//! by one type-metadata pointer per parameter.
//!
//! Classification always uses the callee's *unsubstituted* signature: a
//! generic callee is compiled once and receives generic values by address.

use std::fmt;
use std::ops::Range;

use ori_layout::{Idx, ScalarKind, Substitutions};
use smallvec::SmallVec;

use crate::reabstract::{representation, Representation};
use crate::{invariant_violation, CallConv, CallCx, Callee, ExplosionLevel};

// ---------------------------------------------------------------------------
// ABI descriptors
// ---------------------------------------------------------------------------

/// Physical passing mode of one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamPassing {
    /// Zero-sized: no slot.
    Void,
    /// Split into this many scalar slots.
    Direct { scalars: usize },
    /// Spilled to a caller-owned temporary, passed as one pointer slot.
    Indirect { align: u32 },
    /// Already an address at this level: one pointer slot.
    Address,
}

impl ParamPassing {
    /// Native slots this parameter occupies.
    pub fn slot_count(self) -> usize {
        match self {
            Self::Void => 0,
            Self::Direct { scalars } => scalars,
            Self::Indirect { .. } | Self::Address => 1,
        }
    }
}

/// Physical passing mode of a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnPassing {
    Void,
    Direct,
    /// Through a hidden pointer in slot 0.
    Sret,
}

/// Native result of a call instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeReturn {
    Void,
    /// Returned in registers; several scalars come back as one first-class
    /// aggregate.
    Direct(SmallVec<[ScalarKind; 4]>),
    /// Written through the pointer in slot 0.
    Indirect,
}

impl NativeReturn {
    pub fn is_indirect(&self) -> bool {
        matches!(self, Self::Indirect)
    }
}

impl fmt::Display for NativeReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void | Self::Indirect => f.write_str("void"),
            Self::Direct(kinds) if kinds.len() == 1 => write!(f, "{}", kinds[0]),
            Self::Direct(kinds) => {
                f.write_str("{")?;
                for (i, k) in kinds.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}")?;
                }
                f.write_str("}")
            }
        }
    }
}

/// Native signature of one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeSignature {
    /// Kind of every native argument slot.
    pub params: Vec<ScalarKind>,
    pub ret: NativeReturn,
    /// Slot range of each clause, in the order clauses are supplied.
    pub clauses: SmallVec<[Range<usize>; 2]>,
    /// Slot of the closure context, always the last slot.
    pub context_slot: Option<usize>,
    /// Unsubstituted result type of the call.
    pub result_type: Idx,
}

impl NativeSignature {
    #[inline]
    pub fn has_indirect_result(&self) -> bool {
        self.ret.is_indirect()
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Passing mode of a parameter of unsubstituted type `ty`.
pub fn classify_param(cx: &CallCx<'_>, conv: CallConv, ty: Idx, level: ExplosionLevel) -> ParamPassing {
    match representation(cx, ty, &Substitutions::new(), level) {
        Representation::Address => ParamPassing::Address,
        Representation::Scalars(0) => ParamPassing::Void,
        Representation::Scalars(scalars) => {
            let layout = cx.layout(ty);
            if layout.aggregate && cx.rules(conv).spills_arg(layout.size) {
                ParamPassing::Indirect {
                    align: layout.align,
                }
            } else {
                ParamPassing::Direct { scalars }
            }
        }
    }
}

/// Passing mode of a result of unsubstituted type `ty`.
pub fn classify_return(cx: &CallCx<'_>, conv: CallConv, ty: Idx, level: ExplosionLevel) -> ReturnPassing {
    match representation(cx, ty, &Substitutions::new(), level) {
        Representation::Address => ReturnPassing::Sret,
        Representation::Scalars(0) => ReturnPassing::Void,
        Representation::Scalars(_) => {
            let layout = cx.layout(ty);
            if layout.aggregate && cx.rules(conv).returns_indirectly(layout.size) {
                ReturnPassing::Sret
            } else {
                ReturnPassing::Direct
            }
        }
    }
}

/// Native slot kinds of one parameter.
fn param_slots(cx: &CallCx<'_>, conv: CallConv, ty: Idx, level: ExplosionLevel, out: &mut Vec<ScalarKind>) {
    match classify_param(cx, conv, ty, level) {
        ParamPassing::Void => {}
        ParamPassing::Direct { .. } => out.extend(cx.layout(ty).scalar_kinds()),
        ParamPassing::Indirect { .. } | ParamPassing::Address => out.push(ScalarKind::Ptr),
    }
}

/// Compute the native signature of one call to `callee`.
pub fn compute_signature(cx: &CallCx<'_>, callee: &Callee) -> NativeSignature {
    let pool = cx.pool();
    let conv = callee.conv();
    let level = callee.level();

    // Slot kinds per clause, in supply order.
    let mut clause_kinds: SmallVec<[Vec<ScalarKind>; 2]> = SmallVec::new();
    let mut ty = callee.orig_type();
    for _ in 0..callee.clauses() {
        let Some(params) = pool.clause_params(ty) else {
            invariant_violation(format_args!(
                "callee of type `{}` takes fewer than {} clauses",
                pool.display(callee.orig_type()),
                callee.clauses()
            ));
        };
        let mut kinds = Vec::new();
        for &param in params {
            param_slots(cx, conv, param, level, &mut kinds);
        }
        let generics = pool.clause_generics(ty) as usize;
        kinds.extend(std::iter::repeat(ScalarKind::Ptr).take(generics));
        clause_kinds.push(kinds);
        ty = pool.clause_result(ty).unwrap_or(Idx::NONE);
    }
    let result_type = ty;

    let ret = match classify_return(cx, conv, result_type, level) {
        ReturnPassing::Void => NativeReturn::Void,
        ReturnPassing::Direct => NativeReturn::Direct(cx.layout(result_type).scalar_kinds().collect()),
        ReturnPassing::Sret => NativeReturn::Indirect,
    };

    let mut params = Vec::new();
    if ret.is_indirect() {
        params.push(ScalarKind::Ptr);
    }
    let mut clauses: SmallVec<[Range<usize>; 2]> = smallvec::smallvec![0..0; clause_kinds.len()];
    for (i, kinds) in clause_kinds.iter().enumerate().rev() {
        let start = params.len();
        params.extend_from_slice(kinds);
        clauses[i] = start..params.len();
    }
    let context_slot = callee.func().context().map(|_| {
        params.push(ScalarKind::Ptr);
        params.len() - 1
    });

    tracing::trace!(
        callee = %pool.display(callee.orig_type()),
        %conv,
        slots = params.len(),
        ret = %ret,
        "computed native signature"
    );

    NativeSignature {
        params,
        ret,
        clauses,
        context_slot,
        result_type,
    }
}
