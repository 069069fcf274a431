//! Call-site construction.
//!
//! Selects between a plain call and an invoke with an explicit unwind edge.
//! Both forms carry the same arguments, convention and attributes; only
//! the control-flow edges differ.

use crate::abi::NativeReturn;
use crate::{AttributeSet, CallBuilder, CallConv, FunctionId, ValueId};

/// What a call instruction calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTarget {
    Direct(FunctionId),
    /// Through a function pointer.
    Indirect(ValueId),
}

/// A fully lowered call, ready to become one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub conv: CallConv,
    pub target: CallTarget,
    pub args: Vec<ValueId>,
    pub attrs: AttributeSet,
    pub ret: NativeReturn,
}

/// Emit `site` as exactly one call instruction.
///
/// Inside an unwind scope a call to a callee that may unwind becomes an
/// invoke whose normal edge leads to a fresh continuation block; the builder
/// is left positioned there. Everywhere else it is a plain call.
pub fn emit_call_site(bx: &mut impl CallBuilder, site: &CallSite) -> Option<ValueId> {
    match bx.unwind_destination() {
        Some(unwind) if !site.attrs.is_nounwind() => {
            let cont = bx.append_block("call.cont");
            tracing::trace!(args = site.args.len(), %unwind, %cont, "emitting invoke");
            let result = bx.build_invoke(site, cont, unwind);
            bx.position_at_end(cont);
            result
        }
        _ => {
            tracing::trace!(args = site.args.len(), "emitting call");
            bx.build_call(site)
        }
    }
}
