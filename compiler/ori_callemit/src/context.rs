//! Shared, read-only lowering context.

use ori_layout::{Idx, LayoutQuery, LayoutStore, Pool, Substitutions, TypeLayout};

use crate::{invariant_violation, AbiConfig, CallConv, ConvRules};

/// What every call plan in a function shares: the layout service and the
/// target ABI rules.
pub struct CallCx<'a> {
    layouts: &'a LayoutStore<'a>,
    config: AbiConfig,
}

impl<'a> CallCx<'a> {
    pub fn new(layouts: &'a LayoutStore<'a>, config: AbiConfig) -> Self {
        tracing::debug!(abi = %config, "call lowering context");
        Self { layouts, config }
    }

    #[inline]
    pub fn pool(&self) -> &'a Pool {
        self.layouts.pool()
    }

    #[inline]
    pub fn layouts(&self) -> &'a LayoutStore<'a> {
        self.layouts
    }

    #[inline]
    pub fn config(&self) -> &AbiConfig {
        &self.config
    }

    #[inline]
    pub fn rules(&self, conv: CallConv) -> ConvRules {
        self.config.rules(conv)
    }

    /// Layout of a fully substituted type.
    ///
    /// # Panics
    ///
    /// Panics if the layout cannot be computed; lowering only ever asks for
    /// concrete types.
    #[track_caller]
    pub fn layout(&self, ty: Idx) -> TypeLayout {
        match self.layouts.layout(ty) {
            Ok(layout) => layout,
            Err(err) => invariant_violation(err),
        }
    }

    /// Layout of `ty` with `subs` applied.
    #[track_caller]
    pub fn layout_substituted(&self, ty: Idx, subs: &Substitutions) -> TypeLayout {
        match self.layouts.layout_substituted(ty, subs) {
            Ok(layout) => layout,
            Err(err) => invariant_violation(err),
        }
    }
}
