//! Type pool, generic substitution, and layout queries for Ori call lowering.
//!
//! This crate provides the collaborators the call emitter consumes but does
//! not own:
//!
//! - **Type pool** ([`Pool`], [`Idx`], [`TypeData`]): interned, deduplicated
//!   types referenced by 32-bit handles. Primitive types have fixed indices.
//! - **Substitution** ([`Substitutions`]): replaces generic parameters with
//!   concrete types, structurally, via [`Pool::substitute`].
//! - **Layout** ([`LayoutQuery`], [`LayoutStore`], [`TypeLayout`]): size,
//!   alignment, and the ordered scalar fields ("explosion schema") of a fully
//!   substituted type.
//!
//! # Design
//!
//! Follows the same arena + index pattern as `ori_types::Pool`: type equality
//! is index equality, constructors intern, and every query is a cheap lookup.
//! The layout store caches results per type and is intentionally `!Sync`:
//! one store belongs to one lowering thread.

mod idx;
pub mod layout;
mod pool;
mod subst;

pub use idx::Idx;
pub use layout::{LayoutError, LayoutQuery, LayoutStore, ScalarField, ScalarKind, TypeLayout};
pub use pool::{Pool, StructData, TypeData};
pub use subst::Substitutions;
