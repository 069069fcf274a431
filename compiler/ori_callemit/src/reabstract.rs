//! Abstraction levels and re-abstraction.
//!
//! A value is carried either as its scalar explosion or as the address of a
//! memory copy. Which one depends on how much the code handling it knows:
//! a generic parameter, or anything containing one, has no fixed layout and
//! must live in memory; a resilient struct is opaque at the baseline level.
//!
//! When a generic callee is called with concrete arguments, each argument
//! is converted from the representation its concrete type implies to the
//! one the callee's unsubstituted signature expects.
//!
//! # References
//!
//! - Swift `lib/IRGen/GenProto.cpp` (`reemitAsUnsubstituted`)
//! - Swift `lib/IRGen/Explosion.h`

use ori_layout::{Idx, Pool, Substitutions, TypeData, TypeLayout};

use crate::{invariant_violation, Address, CallBuilder, CallCx, Explosion, ExplosionLevel, ValueId};

/// How a value of some type is carried at some explosion level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Representation {
    /// As this many scalars.
    Scalars(usize),
    /// As one pointer to memory.
    Address,
}

/// Representation of `ty` (with `subs` applied) at `level`.
pub fn representation(
    cx: &CallCx<'_>,
    ty: Idx,
    subs: &Substitutions,
    level: ExplosionLevel,
) -> Representation {
    if is_address_only(cx.pool(), ty, subs, level) {
        Representation::Address
    } else {
        Representation::Scalars(cx.layout_substituted(ty, subs).scalar_count())
    }
}

fn is_address_only(pool: &Pool, ty: Idx, subs: &Substitutions, level: ExplosionLevel) -> bool {
    match pool.get(ty) {
        TypeData::Generic(param) => match subs.get(*param) {
            Some(replacement) => is_address_only(pool, replacement, subs, level),
            None => true,
        },
        TypeData::Tuple(elems) => elems
            .iter()
            .any(|&e| is_address_only(pool, e, subs, level)),
        TypeData::Struct(data) => {
            (data.resilient && level == ExplosionLevel::Minimal)
                || data
                    .fields
                    .iter()
                    .any(|&f| is_address_only(pool, f, subs, level))
        }
        // Function values are always a `{fn, context}` pointer pair.
        _ => false,
    }
}

/// The parameter types of a clause's substituted input.
///
/// A one-parameter clause's input is that parameter; a wider clause's input
/// is the tuple of its parameters; an empty clause takes `unit`.
pub fn split_clause_input(pool: &Pool, subst_input: Idx, arity: usize) -> Vec<Idx> {
    match arity {
        0 => {
            if subst_input != Idx::UNIT {
                invariant_violation(format_args!(
                    "empty clause applied to `{}`",
                    pool.display(subst_input)
                ));
            }
            Vec::new()
        }
        1 => vec![subst_input],
        n => match pool.get(subst_input) {
            TypeData::Tuple(elems) if elems.len() == n => elems.clone(),
            _ => invariant_violation(format_args!(
                "{n}-parameter clause applied to `{}`",
                pool.display(subst_input)
            )),
        },
    }
}

/// Convert each argument of `input` from the representation of its
/// substituted type (at `input`'s level) to the representation of its
/// unsubstituted type (at `out`'s level).
///
/// Scalars headed for an address are spilled to a stack temporary laid out
/// as the substituted type; addresses headed for scalars are loaded.
pub fn reemit_as_unsubstituted(
    cx: &CallCx<'_>,
    bx: &mut impl CallBuilder,
    orig_params: &[Idx],
    subst_params: &[Idx],
    input: &mut Explosion,
    out: &mut Explosion,
) {
    if orig_params.len() != subst_params.len() {
        invariant_violation(format_args!(
            "re-abstracting {} arguments against {} parameters",
            subst_params.len(),
            orig_params.len()
        ));
    }
    let none = Substitutions::new();
    for (&orig, &subst) in orig_params.iter().zip(subst_params) {
        let src = representation(cx, subst, &none, input.level());
        let dst = representation(cx, orig, &none, out.level());
        match (src, dst) {
            (Representation::Scalars(n), Representation::Scalars(m)) => {
                if n != m {
                    invariant_violation(format_args!(
                        "`{}` explodes to {n} scalars but `{}` expects {m}",
                        cx.pool().display(subst),
                        cx.pool().display(orig)
                    ));
                }
                out.add_all(input.claim(n).iter().copied());
            }
            (Representation::Scalars(n), Representation::Address) => {
                let layout = cx.layout(subst);
                let temp = bx.alloca(layout.size, layout.align, "reabstract");
                initialize_from_explosion(bx, &layout, input.claim(n), temp);
                out.add(temp.ptr);
            }
            (Representation::Address, Representation::Scalars(_)) => {
                let layout = cx.layout(orig);
                let ptr = input.claim_next();
                load_as_take(bx, &layout, Address::new(ptr, layout.align), out);
            }
            (Representation::Address, Representation::Address) => {
                out.add(input.claim_next());
            }
        }
        tracing::trace!(
            orig = %cx.pool().display(orig),
            subst = %cx.pool().display(subst),
            ?src,
            ?dst,
            "re-abstracted argument"
        );
    }
}

/// Store an exploded value into memory laid out by `layout`.
pub fn initialize_from_explosion(
    bx: &mut impl CallBuilder,
    layout: &TypeLayout,
    values: &[ValueId],
    addr: Address,
) {
    if values.len() != layout.scalar_count() {
        invariant_violation(format_args!(
            "storing {} scalars into a {}-scalar layout",
            values.len(),
            layout.scalar_count()
        ));
    }
    for (field, &value) in layout.scalars.iter().zip(values) {
        bx.store(value, addr, field.offset);
    }
}

/// Load a value laid out by `layout` from memory into `out`, taking
/// ownership of the memory copy.
pub fn load_as_take(
    bx: &mut impl CallBuilder,
    layout: &TypeLayout,
    addr: Address,
    out: &mut Explosion,
) {
    for field in &layout.scalars {
        let value = bx.load(field.kind, addr, field.offset, "");
        out.add(value);
    }
}
