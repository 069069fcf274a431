//! Type layout: size, alignment, and explosion schema.
//!
//! Every fully substituted type has a [`TypeLayout`]: its byte size, its
//! alignment, and the ordered list of primitive scalar fields it explodes
//! into (with their byte offsets). The explosion order is canonical
//! declaration order, depth-first, so caller and callee always agree on it.
//!
//! Layout follows C struct rules: each field starts at the next offset
//! aligned to its own alignment, and the total size is rounded up to the
//! aggregate's alignment.
//!
//! # References
//!
//! - Swift `lib/IRGen/TypeInfo.h` (`ExplosionSchema`)
//! - Rust `rustc_abi::LayoutS`

use std::cell::RefCell;
use std::fmt;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::{Idx, Pool, Substitutions, TypeData};

// ---------------------------------------------------------------------------
// Scalars
// ---------------------------------------------------------------------------

/// A primitive machine scalar.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    I1,
    I8,
    I32,
    I64,
    F64,
    Ptr,
}

impl ScalarKind {
    /// Size in bytes.
    pub const fn size(self) -> u64 {
        match self {
            Self::I1 | Self::I8 => 1,
            Self::I32 => 4,
            Self::I64 | Self::F64 | Self::Ptr => 8,
        }
    }

    /// Natural alignment in bytes.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn align(self) -> u32 {
        self.size() as u32
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::I1 => "i1",
            Self::I8 => "i8",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F64 => "f64",
            Self::Ptr => "ptr",
        })
    }
}

/// One scalar leaf of an exploded value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScalarField {
    pub kind: ScalarKind,
    /// Byte offset from the start of the value.
    pub offset: u64,
}

// ---------------------------------------------------------------------------
// TypeLayout
// ---------------------------------------------------------------------------

/// Physical layout of a fully substituted type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeLayout {
    pub size: u64,
    pub align: u32,
    /// Scalar leaves in canonical (declaration) order.
    pub scalars: SmallVec<[ScalarField; 4]>,
    /// Tuples, structs, and function values (a `{fn, context}` pair).
    pub aggregate: bool,
    /// The layout is opaque to callers at the baseline explosion level.
    pub resilient: bool,
}

impl TypeLayout {
    /// Layout of a single primitive scalar.
    pub fn scalar(kind: ScalarKind) -> Self {
        Self {
            size: kind.size(),
            align: kind.align(),
            scalars: smallvec::smallvec![ScalarField { kind, offset: 0 }],
            aggregate: false,
            resilient: false,
        }
    }

    /// Layout of a zero-sized type.
    pub fn empty() -> Self {
        Self {
            size: 0,
            align: 1,
            scalars: SmallVec::new(),
            aggregate: false,
            resilient: false,
        }
    }

    /// True for zero-sized types.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.scalars.is_empty()
    }

    /// Number of scalars this type explodes into.
    #[inline]
    pub fn scalar_count(&self) -> usize {
        self.scalars.len()
    }

    /// The scalar kinds in explosion order.
    pub fn scalar_kinds(&self) -> impl Iterator<Item = ScalarKind> + '_ {
        self.scalars.iter().map(|s| s.kind)
    }

    /// Lay out `fields` sequentially with C alignment rules.
    fn sequence<'a>(fields: impl IntoIterator<Item = &'a TypeLayout>) -> Self {
        let mut offset = 0u64;
        let mut align = 1u32;
        let mut scalars = SmallVec::new();
        for field in fields {
            offset = align_to(offset, field.align);
            align = align.max(field.align);
            scalars.extend(field.scalars.iter().map(|s| ScalarField {
                kind: s.kind,
                offset: offset + s.offset,
            }));
            offset += field.size;
        }
        Self {
            size: align_to(offset, align),
            align,
            scalars,
            aggregate: true,
            resilient: false,
        }
    }
}

/// Round `offset` up to a multiple of `align`.
#[inline]
pub fn align_to(offset: u64, align: u32) -> u64 {
    let align = u64::from(align.max(1));
    offset.div_ceil(align) * align
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A layout query that cannot be answered.
///
/// Every variant means lowering ran before its input was ready (e.g. a
/// generic parameter reached codegen without a substitution).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    /// A generic parameter without a substitution.
    #[error("layout of `{ty}` depends on unsubstituted generic parameter T{param}")]
    Unresolved { ty: Idx, param: u32 },
    /// An index the pool never produced.
    #[error("unknown type index {0}")]
    Unknown(Idx),
}

// ---------------------------------------------------------------------------
// Layout service
// ---------------------------------------------------------------------------

/// The type-layout service.
///
/// Must be deterministic and total over fully substituted types.
pub trait LayoutQuery {
    /// Compute the layout of `ty`.
    fn layout(&self, ty: Idx) -> Result<TypeLayout, LayoutError>;
}

/// Caching [`LayoutQuery`] over a [`Pool`].
pub struct LayoutStore<'p> {
    pool: &'p Pool,
    cache: RefCell<FxHashMap<Idx, TypeLayout>>,
}

impl<'p> LayoutStore<'p> {
    pub fn new(pool: &'p Pool) -> Self {
        Self {
            pool,
            cache: RefCell::new(FxHashMap::default()),
        }
    }

    /// The pool this store reads from.
    pub fn pool(&self) -> &'p Pool {
        self.pool
    }

    /// Layout of `ty` with `subs` applied, without interning the
    /// substituted type.
    ///
    /// Used when only the unsubstituted form of a type is at hand (e.g. the
    /// result type of a generic callee) but the concrete layout is needed.
    pub fn layout_substituted(
        &self,
        ty: Idx,
        subs: &Substitutions,
    ) -> Result<TypeLayout, LayoutError> {
        if subs.is_empty() || !self.pool.contains_generic(ty) {
            return self.layout(ty);
        }
        match self.pool.get(ty) {
            TypeData::Generic(param) => match subs.get(*param) {
                Some(replacement) => self.layout(replacement),
                None => Err(LayoutError::Unresolved { ty, param: *param }),
            },
            TypeData::Tuple(elems) => self.sequence_substituted(elems, subs),
            TypeData::Struct(data) => {
                let mut layout = self.sequence_substituted(&data.fields, subs)?;
                layout.resilient = data.resilient;
                Ok(layout)
            }
            _ => self.layout(ty),
        }
    }

    fn sequence_substituted(
        &self,
        fields: &[Idx],
        subs: &Substitutions,
    ) -> Result<TypeLayout, LayoutError> {
        let layouts = fields
            .iter()
            .map(|&f| self.layout_substituted(f, subs))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TypeLayout::sequence(&layouts))
    }

    fn compute(&self, ty: Idx) -> Result<TypeLayout, LayoutError> {
        let data = self.pool.try_get(ty).ok_or(LayoutError::Unknown(ty))?;
        let layout = match data {
            TypeData::Int => TypeLayout::scalar(ScalarKind::I64),
            TypeData::Float => TypeLayout::scalar(ScalarKind::F64),
            TypeData::Bool => TypeLayout::scalar(ScalarKind::I1),
            TypeData::Byte => TypeLayout::scalar(ScalarKind::I8),
            TypeData::Char => TypeLayout::scalar(ScalarKind::I32),
            TypeData::RawPtr => TypeLayout::scalar(ScalarKind::Ptr),
            TypeData::Unit | TypeData::Never => TypeLayout::empty(),
            TypeData::Tuple(elems) => self.sequence_of(elems)?,
            TypeData::Struct(data) => {
                let mut layout = self.sequence_of(&data.fields)?;
                layout.resilient = data.resilient;
                layout
            }
            // Function values are `{ fn_ptr, context_ptr }` regardless of
            // their signature, generic or not.
            TypeData::Function { .. } => TypeLayout::sequence(&[
                TypeLayout::scalar(ScalarKind::Ptr),
                TypeLayout::scalar(ScalarKind::Ptr),
            ]),
            TypeData::Generic(param) => {
                return Err(LayoutError::Unresolved { ty, param: *param });
            }
        };
        Ok(layout)
    }

    fn sequence_of(&self, fields: &[Idx]) -> Result<TypeLayout, LayoutError> {
        let layouts = fields
            .iter()
            .map(|&f| self.layout(f))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TypeLayout::sequence(&layouts))
    }
}

impl LayoutQuery for LayoutStore<'_> {
    fn layout(&self, ty: Idx) -> Result<TypeLayout, LayoutError> {
        if let Some(cached) = self.cache.borrow().get(&ty) {
            return Ok(cached.clone());
        }
        let layout = self.compute(ty)?;
        tracing::trace!(
            ty = %self.pool.display(ty),
            size = layout.size,
            align = layout.align,
            scalars = layout.scalar_count(),
            "computed layout"
        );
        self.cache.borrow_mut().insert(ty, layout.clone());
        Ok(layout)
    }
}
