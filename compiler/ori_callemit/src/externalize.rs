//! Externalization: internal explosions to native arguments.
//!
//! The caller hands each clause over as an explosion at the callee's level.
//! Externalization turns it into the native argument values the calling
//! convention requires:
//!
//! - scalars and small aggregates pass through, split in canonical order
//! - aggregates above the convention's threshold are spilled to an aligned
//!   stack temporary whose address is passed `byval`
//! - address-represented values pass their address
//!
//! Attribute fragments are recorded at slot indices relative to `out`'s
//! length when externalization began; the call plan rebases them onto the
//! clause's final position.
//!
//! [`internalize_arguments`] is the inverse, used in a callee's prologue to
//! rebuild its internal explosion from its native parameters.

use ori_layout::Idx;

use crate::abi::{classify_param, ParamPassing};
use crate::reabstract::{initialize_from_explosion, load_as_take};
use crate::{
    invariant_violation, Address, AttributeBuilder, CallBuilder, CallConv, CallCx, Explosion,
    ExplosionLevel, ParamAttrs, ValueId,
};

/// Attributes of a spilled aggregate argument.
const BYVAL_ATTRS: ParamAttrs = ParamAttrs::BYVAL
    .union(ParamAttrs::NOCAPTURE)
    .union(ParamAttrs::READONLY);

/// Externalize one argument of unsubstituted type `ty`.
#[allow(clippy::too_many_arguments)]
pub fn externalize_argument(
    cx: &CallCx<'_>,
    bx: &mut impl CallBuilder,
    conv: CallConv,
    ty: Idx,
    level: ExplosionLevel,
    input: &mut Explosion,
    out: &mut Vec<ValueId>,
    base: usize,
    attrs: &mut AttributeBuilder,
) {
    let passing = classify_param(cx, conv, ty, level);
    match passing {
        ParamPassing::Void => {}
        ParamPassing::Direct { scalars } => out.extend_from_slice(input.claim(scalars)),
        ParamPassing::Indirect { align } => {
            let layout = cx.layout(ty);
            let temp = bx.alloca(layout.size, align, "byval");
            initialize_from_explosion(bx, &layout, input.claim(layout.scalar_count()), temp);
            attrs.add_param(out.len() - base, BYVAL_ATTRS, align);
            out.push(temp.ptr);
        }
        ParamPassing::Address => out.push(input.claim_next()),
    }
    tracing::trace!(ty = %cx.pool().display(ty), ?passing, "externalized argument");
}

/// Externalize every parameter of a clause, in declaration order.
///
/// Fragment slots are relative to `out.len()` on entry.
#[allow(clippy::too_many_arguments)]
pub fn externalize_arguments(
    cx: &CallCx<'_>,
    bx: &mut impl CallBuilder,
    conv: CallConv,
    params: &[Idx],
    level: ExplosionLevel,
    input: &mut Explosion,
    out: &mut Vec<ValueId>,
    attrs: &mut AttributeBuilder,
) {
    let base = out.len();
    for &ty in params {
        externalize_argument(cx, bx, conv, ty, level, input, out, base, attrs);
    }
}

/// Rebuild the internal explosion of `params` from native parameter values.
///
/// Returns the number of native values consumed.
pub fn internalize_arguments(
    cx: &CallCx<'_>,
    bx: &mut impl CallBuilder,
    conv: CallConv,
    params: &[Idx],
    native: &[ValueId],
    out: &mut Explosion,
) -> usize {
    let mut next = 0;
    for &ty in params {
        match classify_param(cx, conv, ty, out.level()) {
            ParamPassing::Void => {}
            ParamPassing::Direct { scalars } => {
                out.add_all(take_native(native, &mut next, scalars).iter().copied());
            }
            ParamPassing::Indirect { align } => {
                let layout = cx.layout(ty);
                let ptr = take_native(native, &mut next, 1)[0];
                load_as_take(bx, &layout, Address::new(ptr, align), out);
            }
            ParamPassing::Address => out.add(take_native(native, &mut next, 1)[0]),
        }
    }
    next
}

fn take_native<'n>(native: &'n [ValueId], next: &mut usize, n: usize) -> &'n [ValueId] {
    let Some(values) = native.get(*next..*next + n) else {
        invariant_violation(format_args!(
            "prologue expects more than the {} native parameters it was given",
            native.len()
        ));
    };
    *next += n;
    values
}
