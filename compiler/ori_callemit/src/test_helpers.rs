//! Shared fixtures for unit tests.

use ori_layout::{LayoutStore, Pool, TypeLayout};

use crate::ir::{FunctionBuilder, IrInstr};
use crate::{AbiConfig, CallCx, Explosion, ExplosionLevel, ValueId};

/// Run `f` with a lowering context over `pool`.
pub(crate) fn with_cx<R>(pool: &Pool, config: AbiConfig, f: impl FnOnce(&CallCx<'_>) -> R) -> R {
    let store = LayoutStore::new(pool);
    let cx = CallCx::new(&store, config);
    f(&cx)
}

/// Fresh parameters for every scalar of `layout`, as an explosion.
pub(crate) fn explode_params(bx: &mut FunctionBuilder, layout: &TypeLayout, level: ExplosionLevel) -> Explosion {
    let mut e = Explosion::new(level);
    for kind in layout.scalar_kinds() {
        e.add(bx.param(kind));
    }
    e
}

/// The aggregate and index an `extractvalue` result was taken from.
pub(crate) fn extract_source(bx: &FunctionBuilder, value: ValueId) -> Option<(ValueId, u32)> {
    bx.function()
        .blocks
        .iter()
        .flat_map(|b| &b.instrs)
        .find_map(|i| match i {
            IrInstr::ExtractValue { dst, agg, index } if *dst == value => Some((*agg, *index)),
            _ => None,
        })
}

/// `(size, align, name)` of the alloca defining `ptr`.
pub(crate) fn alloca_of(bx: &FunctionBuilder, ptr: ValueId) -> Option<(u64, u32, String)> {
    bx.function().blocks[0].instrs.iter().find_map(|i| match i {
        IrInstr::Alloca {
            dst,
            size,
            align,
            name,
        } if *dst == ptr => Some((*size, *align, name.to_string())),
        _ => None,
    })
}

/// `(ptr, offset)` of the load defining `value`.
pub(crate) fn load_of(bx: &FunctionBuilder, value: ValueId) -> Option<(ValueId, u64)> {
    bx.function()
        .blocks
        .iter()
        .flat_map(|b| &b.instrs)
        .find_map(|i| match i {
            IrInstr::Load { dst, ptr, offset, .. } if *dst == value => Some((*ptr, *offset)),
            _ => None,
        })
}
