//! Instruction builder interface consumed by call emission.
//!
//! Mirrors the shape of a `rustc_codegen_ssa` builder, reduced to the
//! instructions call lowering actually emits. The builder owns the
//! insertion point and the ambient unwind destination; call emission only
//! queries them.

use ori_layout::{Idx, ScalarKind};

use crate::{Address, BlockId, CallSite, ValueId};

/// Instruction generation for call lowering.
pub trait CallBuilder {
    /// Stack temporary of `size` bytes aligned to `align`, placed in the
    /// function's entry block.
    fn alloca(&mut self, size: u64, align: u32, name: &str) -> Address;

    /// Load a scalar of `kind` from `addr + offset`.
    fn load(&mut self, kind: ScalarKind, addr: Address, offset: u64, name: &str) -> ValueId;

    /// Store `value` to `addr + offset`.
    fn store(&mut self, value: ValueId, addr: Address, offset: u64);

    /// Extract field `index` of a first-class aggregate (a multi-scalar
    /// direct call result).
    fn extract_value(&mut self, agg: ValueId, index: u32, name: &str) -> ValueId;

    /// Runtime type metadata for a concrete type.
    fn type_metadata(&mut self, ty: Idx) -> ValueId;

    // -- Control flow --

    /// Append a new block to the current function.
    fn append_block(&mut self, name: &str) -> BlockId;

    /// Move the insertion point to the end of `block`.
    fn position_at_end(&mut self, block: BlockId);

    /// The landing pad calls must unwind to, if the insertion point is
    /// inside a cleanup or catch scope.
    fn unwind_destination(&self) -> Option<BlockId>;

    // -- Calls --

    /// Plain call. Returns the result value, `None` for void calls.
    fn build_call(&mut self, site: &CallSite) -> Option<ValueId>;

    /// Call with explicit normal and unwind edges. Terminates the current
    /// block; the result is available at the start of `normal`.
    fn build_invoke(&mut self, site: &CallSite, normal: BlockId, unwind: BlockId) -> Option<ValueId>;
}
