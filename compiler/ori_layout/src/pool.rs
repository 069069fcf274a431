//! Interned type storage.
//!
//! Every distinct [`TypeData`] is stored once; constructors return the
//! existing [`Idx`] when an identical type was interned before.

use std::fmt::Write as _;

use rustc_hash::FxHashMap;

use crate::Idx;

/// Payload of a user-defined struct type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StructData {
    /// Struct name, used only for display.
    pub name: Box<str>,
    /// Field types in declaration order.
    pub fields: Vec<Idx>,
    /// Resilient structs hide their layout from callers at the baseline
    /// explosion level and are passed by address there.
    pub resilient: bool,
}

/// Structural description of a type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeData {
    Int,
    Float,
    Bool,
    Byte,
    Char,
    Unit,
    Never,
    RawPtr,
    /// `(A, B, ...)` with at least one element.
    Tuple(Vec<Idx>),
    /// User-defined struct.
    Struct(StructData),
    /// One argument clause: `(params...) -> ret`.
    ///
    /// `generics` counts the generic parameters this clause binds. A curried
    /// function is a `Function` whose `ret` is another `Function`.
    Function {
        params: Vec<Idx>,
        ret: Idx,
        generics: u32,
    },
    /// Unsubstituted generic parameter by index.
    Generic(u32),
}

/// The type pool.
pub struct Pool {
    types: Vec<TypeData>,
    interned: FxHashMap<TypeData, Idx>,
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

impl Pool {
    /// Create a pool with the primitive types pre-interned at their fixed
    /// indices.
    pub fn new() -> Self {
        let mut pool = Self {
            types: Vec::with_capacity(64),
            interned: FxHashMap::default(),
        };
        for data in [
            TypeData::Int,
            TypeData::Float,
            TypeData::Bool,
            TypeData::Byte,
            TypeData::Char,
            TypeData::Unit,
            TypeData::Never,
            TypeData::RawPtr,
        ] {
            pool.intern(data);
        }
        debug_assert_eq!(pool.types.len(), Idx::PRIMITIVE_COUNT as usize);
        pool
    }

    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn intern(&mut self, data: TypeData) -> Idx {
        if let Some(&idx) = self.interned.get(&data) {
            return idx;
        }
        let idx = Idx::from_raw(self.types.len() as u32);
        self.types.push(data.clone());
        self.interned.insert(data, idx);
        idx
    }

    /// Number of interned types, primitives included.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Always `false`: primitives are pre-interned.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Look up a type. Panics on an index this pool never produced.
    #[inline]
    pub fn get(&self, idx: Idx) -> &TypeData {
        &self.types[idx.index()]
    }

    /// Look up a type, returning `None` for foreign indices.
    #[inline]
    pub fn try_get(&self, idx: Idx) -> Option<&TypeData> {
        self.types.get(idx.index())
    }

    // === Constructors ===

    /// Create a tuple type. Empty tuples are `Idx::UNIT`.
    pub fn tuple(&mut self, elems: &[Idx]) -> Idx {
        if elems.is_empty() {
            return Idx::UNIT;
        }
        self.intern(TypeData::Tuple(elems.to_vec()))
    }

    /// Create a pair type `(a, b)`.
    pub fn pair(&mut self, a: Idx, b: Idx) -> Idx {
        self.tuple(&[a, b])
    }

    /// Create a struct type with a fixed, caller-visible layout.
    pub fn struct_type(&mut self, name: &str, fields: &[Idx]) -> Idx {
        self.intern(TypeData::Struct(StructData {
            name: name.into(),
            fields: fields.to_vec(),
            resilient: false,
        }))
    }

    /// Create a resilient struct type.
    pub fn resilient_struct(&mut self, name: &str, fields: &[Idx]) -> Idx {
        self.intern(TypeData::Struct(StructData {
            name: name.into(),
            fields: fields.to_vec(),
            resilient: true,
        }))
    }

    /// Create a monomorphic single-clause function type.
    pub fn function(&mut self, params: &[Idx], ret: Idx) -> Idx {
        self.generic_function(0, params, ret)
    }

    /// Create a function clause that binds `generics` generic parameters.
    pub fn generic_function(&mut self, generics: u32, params: &[Idx], ret: Idx) -> Idx {
        self.intern(TypeData::Function {
            params: params.to_vec(),
            ret,
            generics,
        })
    }

    /// Create a curried function type from clauses in source order.
    ///
    /// `curried(&[&[a], &[b, c]], r)` is `(a) -> (b, c) -> r`.
    pub fn curried(&mut self, clauses: &[&[Idx]], ret: Idx) -> Idx {
        clauses
            .iter()
            .rev()
            .fold(ret, |acc, params| self.function(params, acc))
    }

    /// Create a generic parameter reference.
    pub fn generic(&mut self, index: u32) -> Idx {
        self.intern(TypeData::Generic(index))
    }

    // === Queries ===

    /// True for function (clause) types.
    pub fn is_function(&self, ty: Idx) -> bool {
        matches!(self.try_get(ty), Some(TypeData::Function { .. }))
    }

    /// Parameters of the outermost clause of a function type.
    pub fn clause_params(&self, fn_ty: Idx) -> Option<&[Idx]> {
        match self.try_get(fn_ty)? {
            TypeData::Function { params, .. } => Some(params),
            _ => None,
        }
    }

    /// Result of the outermost clause of a function type.
    pub fn clause_result(&self, fn_ty: Idx) -> Option<Idx> {
        match self.try_get(fn_ty)? {
            TypeData::Function { ret, .. } => Some(*ret),
            _ => None,
        }
    }

    /// Generic parameters bound by the outermost clause (0 if monomorphic).
    pub fn clause_generics(&self, fn_ty: Idx) -> u32 {
        match self.try_get(fn_ty) {
            Some(TypeData::Function { generics, .. }) => *generics,
            _ => 0,
        }
    }

    /// True for aggregate types (tuples and structs).
    pub fn is_aggregate(&self, ty: Idx) -> bool {
        matches!(
            self.try_get(ty),
            Some(TypeData::Tuple(_) | TypeData::Struct(_))
        )
    }

    /// True if a generic parameter occurs anywhere inside `ty`.
    pub fn contains_generic(&self, ty: Idx) -> bool {
        match self.get(ty) {
            TypeData::Generic(_) => true,
            TypeData::Tuple(elems) => elems.iter().any(|&e| self.contains_generic(e)),
            TypeData::Struct(data) => data.fields.iter().any(|&f| self.contains_generic(f)),
            TypeData::Function { params, ret, .. } => {
                params.iter().any(|&p| self.contains_generic(p)) || self.contains_generic(*ret)
            }
            _ => false,
        }
    }

    /// Render a type for diagnostics and logs.
    pub fn display(&self, ty: Idx) -> String {
        let mut out = String::new();
        self.write_type(&mut out, ty);
        out
    }

    fn write_type(&self, out: &mut String, ty: Idx) {
        let Some(data) = self.try_get(ty) else {
            let _ = write!(out, "{ty}");
            return;
        };
        match data {
            TypeData::Tuple(elems) => {
                out.push('(');
                self.write_list(out, elems);
                out.push(')');
            }
            TypeData::Struct(data) => out.push_str(&data.name),
            TypeData::Function {
                params,
                ret,
                generics,
            } => {
                if *generics > 0 {
                    let _ = write!(out, "<{generics}>");
                }
                out.push('(');
                self.write_list(out, params);
                out.push_str(") -> ");
                self.write_type(out, *ret);
            }
            TypeData::Generic(index) => {
                let _ = write!(out, "T{index}");
            }
            _ => {
                let _ = write!(out, "{ty}");
            }
        }
    }

    fn write_list(&self, out: &mut String, tys: &[Idx]) {
        for (i, &t) in tys.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            self.write_type(out, t);
        }
    }
}
