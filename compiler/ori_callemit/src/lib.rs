//! Call emission for the Ori backend.
//!
//! Turns a (possibly curried, possibly generic) function application into
//! ABI-correct call instructions. Three concerns meet here:
//!
//! - **Clause sequencing** ([`CallEmission`]): a call plan accumulates
//!   argument clauses against a callee. When the callee is saturated and
//!   another clause arrives, the in-progress call is emitted and its result
//!   (a function value) becomes the callee of the next call.
//! - **Abstraction & ABI lowering** ([`abi`], [`externalize`],
//!   [`reabstract`]): values move between scalar explosions and addresses,
//!   large aggregates are spilled and passed by pointer, indirect results
//!   take the first native slot.
//! - **Call-site construction** ([`call_site`]): plain call or invoke,
//!   depending on the ambient unwind destination, with a frozen attribute
//!   set.
//!
//! The instruction builder is consumed through the [`CallBuilder`] trait.
//! [`ir::FunctionBuilder`] is a recording implementation used by tests and
//! by drivers that want an inspectable IR.
//!
//! # Debug Environment Variables
//!
//! - `RUST_LOG=ori_callemit=debug`: plan construction, chaining, emission.
//! - `RUST_LOG=ori_callemit=trace`: every clause and externalized argument.
//! - `ORI_TARGET=<triple>`: target used by [`AbiConfig::from_env`].
//!
//! # Example
//!
//! ```ignore
//! let cx = CallCx::new(&layouts, AbiConfig::native());
//! let mut bx = FunctionBuilder::new("caller");
//! let f = bx.declare_function("add");
//! let mut call = CallEmission::new(&cx, Callee::direct(f, CallConv::Fast, add_ty, 1));
//! call.add_arg(&mut bx, Explosion::from_values(ExplosionLevel::Minimal, &[a, b]));
//! let mut out = Explosion::new(ExplosionLevel::Minimal);
//! let _ = call.emit_to_explosion(&mut bx, &mut out);
//! ```

// Codegen counts and indices are u32 at the IR level, usize in Rust.
#![allow(clippy::cast_possible_truncation)]

pub mod abi;
pub mod attributes;
mod builder;
pub mod call_site;
mod callee;
pub mod config;
mod context;
mod emission;
mod explosion;
pub mod externalize;
pub mod ir;
pub mod reabstract;
mod value_id;

#[cfg(test)]
mod test_helpers;

pub use attributes::{AttributeBuilder, AttributeSet, CallAttrs, ParamAttr, ParamAttrs};
pub use builder::CallBuilder;
pub use call_site::{CallSite, CallTarget};
pub use callee::{CallConv, Callee, CalleeFn};
pub use config::{AbiConfig, AbiConfigError, ConvRules};
pub use context::CallCx;
pub use emission::{CallEmission, Discharged};
pub use explosion::{Address, Explosion, ExplosionLevel};
pub use value_id::{BlockId, FunctionId, ValueId};

use std::fmt;
use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Safe to call multiple times. Only installs a subscriber when `RUST_LOG`
/// is set.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}

/// Abort lowering on a broken invariant.
///
/// Every caller reports a defect in the driver or an earlier pass, such as
/// an unresolved generic reaching layout.
#[cold]
#[track_caller]
pub(crate) fn invariant_violation(msg: impl fmt::Display) -> ! {
    tracing::error!(%msg, "call emission invariant violated");
    panic!("call emission invariant violated: {msg}");
}
