//! Generic substitution.

use smallvec::SmallVec;

use crate::{Idx, Pool, StructData, TypeData};

/// Replacement types for generic parameters, indexed by parameter index.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Substitutions(SmallVec<[Idx; 4]>);

impl Substitutions {
    /// No substitutions (a monomorphic call).
    pub fn new() -> Self {
        Self::default()
    }

    /// Substitutions from replacement types in parameter order.
    pub fn from_types(types: &[Idx]) -> Self {
        Self(SmallVec::from_slice(types))
    }

    /// The replacement for generic parameter `index`, if any.
    #[inline]
    pub fn get(&self, index: u32) -> Option<Idx> {
        self.0.get(index as usize).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Idx> + '_ {
        self.0.iter().copied()
    }
}

impl Pool {
    /// Apply `subs` to `ty`, replacing every `Generic(i)` that has a
    /// replacement. Parameters without one are left in place.
    pub fn substitute(&mut self, ty: Idx, subs: &Substitutions) -> Idx {
        if subs.is_empty() || !self.contains_generic(ty) {
            return ty;
        }
        match self.get(ty).clone() {
            TypeData::Generic(index) => subs.get(index).unwrap_or(ty),
            TypeData::Tuple(elems) => {
                let elems: Vec<Idx> = elems.iter().map(|&e| self.substitute(e, subs)).collect();
                self.tuple(&elems)
            }
            TypeData::Struct(data) => {
                let fields: Vec<Idx> = data
                    .fields
                    .iter()
                    .map(|&f| self.substitute(f, subs))
                    .collect();
                self.intern(TypeData::Struct(StructData { fields, ..data }))
            }
            TypeData::Function {
                params,
                ret,
                generics,
            } => {
                let params: Vec<Idx> = params.iter().map(|&p| self.substitute(p, subs)).collect();
                let ret = self.substitute(ret, subs);
                self.generic_function(generics, &params, ret)
            }
            _ => ty,
        }
    }
}
