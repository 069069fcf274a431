//! The call plan.
//!
//! A [`CallEmission`] lowers one source-level application `f(a)(b)(c)` into
//! as many native calls as it takes. Clauses are fed in one at a time with
//! [`CallEmission::add_arg`] / [`CallEmission::add_substituted_arg`]; the
//! plan is discharged by exactly one of [`CallEmission::emit_to_explosion`],
//! [`CallEmission::emit_to_memory`] or [`CallEmission::invalidate`].
//!
//! # Indirect chaining
//!
//! A callee consumes a fixed number of clauses per native call. When a
//! clause arrives after the callee is saturated, the pending call is emitted
//! first. Its result is a `{fn_ptr, context}` function value, which becomes
//! the callee of the next call (`Fast` convention, `Minimal` level, one
//! clause). Supplying `k` clauses beyond the native arity produces `k + 1`
//! calls, each calling the previous one's result.
//!
//! # Argument order
//!
//! Native slots are reserved up front from the callee's signature and filled
//! right to left: each clause lands immediately before the one supplied
//! before it. Slot 0 holds the indirect result pointer when there is one,
//! the last slot the closure context.
//!
//! # References
//!
//! - Swift `lib/IRGen/CallEmission.h`
//! - Rust `rustc_codegen_ssa/src/mir/block.rs` (`codegen_call_terminator`)

use std::fmt;

use ori_layout::{Idx, Pool, Substitutions, TypeData, TypeLayout};

use crate::abi::{compute_signature, NativeReturn, NativeSignature};
use crate::call_site::{emit_call_site, CallSite, CallTarget};
use crate::externalize::externalize_arguments;
use crate::reabstract::{
    initialize_from_explosion, load_as_take, reemit_as_unsubstituted, representation,
    split_clause_input, Representation,
};
use crate::{
    invariant_violation, Address, AttributeBuilder, CallAttrs, CallBuilder, CallCx, Callee,
    CalleeFn, Explosion, ExplosionLevel, ParamAttrs, ValueId,
};

/// Attributes of the indirect result pointer.
const SRET_ATTRS: ParamAttrs = ParamAttrs::SRET
    .union(ParamAttrs::NOALIAS)
    .union(ParamAttrs::NOCAPTURE)
    .union(ParamAttrs::WRITEONLY);

/// Proof that a call plan was discharged.
#[must_use = "a discharged call plan reports how many calls it emitted"]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Discharged {
    calls: u32,
}

impl Discharged {
    /// Call instructions the plan emitted, chained calls included.
    pub fn calls(self) -> u32 {
        self.calls
    }
}

/// State of the native call currently being assembled.
struct PendingCall {
    callee: Callee,
    sig: NativeSignature,
    /// Native argument slots; `None` until written.
    args: Vec<Option<ValueId>>,
    /// Lowest slot written so far. Clauses are written below it.
    last_arg_written: usize,
    /// Unsubstituted type of what the remaining clauses apply to.
    orig_type: Idx,
    /// Clauses this native call still expects.
    remaining: u32,
    /// Index into `sig.clauses` of the next clause.
    next_clause: usize,
    attrs: AttributeBuilder,
}

impl PendingCall {
    fn new(cx: &CallCx<'_>, callee: Callee) -> Self {
        let sig = compute_signature(cx, &callee);
        let mut args = vec![None; sig.params.len()];
        let mut last_arg_written = args.len();
        if let Some(slot) = sig.context_slot {
            args[slot] = callee.func().context();
            last_arg_written = slot;
        }
        Self {
            orig_type: callee.orig_type(),
            remaining: callee.clauses(),
            callee,
            sig,
            args,
            last_arg_written,
            next_clause: 0,
            attrs: AttributeBuilder::new(),
        }
    }
}

enum CallState {
    Accumulating(PendingCall),
    Discharged,
}

/// Where a finished call delivers its result.
enum ResultDest<'r> {
    Explosion(&'r mut Explosion),
    Memory(Address, &'r TypeLayout),
}

/// A call plan.
///
/// Must be discharged exactly once; dropping an undischarged plan panics.
pub struct CallEmission<'a> {
    cx: &'a CallCx<'a>,
    state: CallState,
    /// Calls emitted so far (chained calls included).
    calls: u32,
    /// Generic parameters bound by clauses supplied so far. Polymorphic
    /// clauses take their metadata from the substitutions starting here.
    generics_bound: u32,
}

impl<'a> CallEmission<'a> {
    /// Start a plan against `callee`.
    pub fn new(cx: &'a CallCx<'a>, callee: Callee) -> Self {
        tracing::debug!(
            callee = %cx.pool().display(callee.orig_type()),
            conv = %callee.conv(),
            clauses = callee.clauses(),
            "call plan"
        );
        Self {
            cx,
            state: CallState::Accumulating(PendingCall::new(cx, callee)),
            calls: 0,
            generics_bound: 0,
        }
    }

    #[track_caller]
    fn pending(&self) -> &PendingCall {
        match &self.state {
            CallState::Accumulating(pending) => pending,
            CallState::Discharged => invariant_violation("call plan used after discharge"),
        }
    }

    #[track_caller]
    fn pending_mut(&mut self) -> &mut PendingCall {
        match &mut self.state {
            CallState::Accumulating(pending) => pending,
            CallState::Discharged => invariant_violation("call plan used after discharge"),
        }
    }

    // -- Accessors --

    pub fn callee(&self) -> &Callee {
        &self.pending().callee
    }

    /// The current callee, for in-place replacement of its function value.
    ///
    /// The native signature is fixed when the callee is adopted; changing
    /// anything but the function value desynchronizes it.
    pub fn callee_mut(&mut self) -> &mut Callee {
        &mut self.pending_mut().callee
    }

    /// Level the next clause must be supplied at.
    ///
    /// A saturated callee will be replaced by a freshly returned function
    /// value, which is always `Minimal`.
    pub fn current_level(&self) -> ExplosionLevel {
        let pending = self.pending();
        if pending.remaining == 0 {
            ExplosionLevel::Minimal
        } else {
            pending.callee.level()
        }
    }

    pub fn substitutions(&self) -> &Substitutions {
        self.pending().callee.substitutions()
    }

    /// Clauses the current callee still expects before it is saturated.
    pub fn remaining_clauses(&self) -> u32 {
        self.pending().remaining
    }

    // -- Clauses --

    /// Append one clause of values at the callee's level, in the callee's
    /// unsubstituted representation, followed by the type metadata of any
    /// generic parameters the clause binds.
    pub fn add_arg(&mut self, bx: &mut impl CallBuilder, mut values: Explosion) {
        if self.pending().remaining == 0 {
            self.force_callee(bx);
        }
        let cx = self.cx;
        let pool = cx.pool();
        let pending = self.pending_mut();

        if values.level() != pending.callee.level() {
            invariant_violation(format_args!(
                "clause supplied at {:?} but the callee expects {:?}",
                values.level(),
                pending.callee.level()
            ));
        }
        let orig = pending.orig_type;
        let Some(params) = pool.clause_params(orig) else {
            invariant_violation(format_args!(
                "clause applied to non-function `{}`",
                pool.display(orig)
            ));
        };
        let generics = pool.clause_generics(orig);

        let mut native = Vec::new();
        let mut fragments = AttributeBuilder::new();
        externalize_arguments(
            cx,
            bx,
            pending.callee.conv(),
            params,
            pending.callee.level(),
            &mut values,
            &mut native,
            &mut fragments,
        );
        // Polymorphic arguments follow the clause's own parameters.
        native.extend_from_slice(values.claim(generics as usize));
        if values.remaining() != 0 {
            invariant_violation(format_args!(
                "clause of `{}` left {} values unclaimed",
                pool.display(orig),
                values.remaining()
            ));
        }

        let range = pending.sig.clauses[pending.next_clause].clone();
        if native.len() != range.len() || range.end != pending.last_arg_written {
            invariant_violation(format_args!(
                "clause supplied {} native values but slots {range:?} are reserved",
                native.len()
            ));
        }
        for (slot, value) in range.clone().zip(native) {
            if pending.args[slot].replace(value).is_some() {
                invariant_violation(format_args!("argument slot {slot} written twice"));
            }
        }
        pending.attrs.extend_rebased(&fragments, range.start);
        pending.last_arg_written = range.start;
        pending.next_clause += 1;
        pending.remaining -= 1;
        pending.orig_type = pool.clause_result(orig).unwrap_or(Idx::NONE);
        self.generics_bound += generics;

        tracing::trace!(
            clause = %pool.display(orig),
            slots = ?range,
            remaining = self.pending().remaining,
            "added clause"
        );
    }

    /// Append one clause whose values are represented as `subst_input` (the
    /// clause's input type after substitution) at `values`' own level.
    ///
    /// Each argument is re-abstracted to the representation the callee's
    /// unsubstituted signature expects, then type metadata is appended for
    /// every generic parameter the clause binds. Without substitutions this
    /// is exactly [`add_arg`](Self::add_arg).
    pub fn add_substituted_arg(
        &mut self,
        bx: &mut impl CallBuilder,
        subst_input: Idx,
        mut values: Explosion,
    ) {
        if self.substitutions().is_empty() {
            self.add_arg(bx, values);
            return;
        }
        if self.pending().remaining == 0 {
            self.force_callee(bx);
        }
        let cx = self.cx;
        let pool = cx.pool();
        let pending = self.pending();
        let orig = pending.orig_type;
        let Some(orig_params) = pool.clause_params(orig) else {
            invariant_violation(format_args!(
                "clause applied to non-function `{}`",
                pool.display(orig)
            ));
        };
        let subst_params = split_clause_input(pool, subst_input, orig_params.len());

        let mut out = Explosion::new(pending.callee.level());
        reemit_as_unsubstituted(cx, bx, orig_params, &subst_params, &mut values, &mut out);
        if values.remaining() != 0 {
            invariant_violation(format_args!(
                "substituted clause `{}` left {} values unclaimed",
                pool.display(subst_input),
                values.remaining()
            ));
        }

        let subs = pending.callee.substitutions();
        for param in self.generics_bound..self.generics_bound + pool.clause_generics(orig) {
            let Some(ty) = subs.get(param) else {
                invariant_violation(format_args!("no substitution for generic parameter T{param}"));
            };
            out.add(bx.type_metadata(ty));
        }
        self.add_arg(bx, out);
    }

    /// Emit the saturated pending call and adopt its result as the callee.
    fn force_callee(&mut self, bx: &mut impl CallBuilder) {
        let cx = self.cx;
        let pool = cx.pool();
        let CallState::Accumulating(pending) = std::mem::replace(&mut self.state, CallState::Discharged)
        else {
            invariant_violation("call plan used after discharge");
        };

        // A generic result is callable when its substitution is a function;
        // the function value then has that concrete type.
        let result_type = pending.orig_type;
        let callee_subs = pending.callee.substitutions();
        let (fn_type, subs) = match pool.try_get(result_type) {
            Some(TypeData::Function { .. }) => (result_type, callee_subs.clone()),
            Some(TypeData::Generic(param)) => match callee_subs.get(*param) {
                Some(ty) if pool.is_function(ty) => (ty, Substitutions::new()),
                _ => not_callable(pool, result_type),
            },
            _ => not_callable(pool, result_type),
        };

        let mut result = Explosion::new(ExplosionLevel::Minimal);
        self.emit_pending(bx, pending, ResultDest::Explosion(&mut result));
        let fn_ptr = result.claim_next();
        let context = result.claim_next();

        let callee = Callee::indirect(fn_ptr, Some(context), fn_type).with_substitutions(subs);
        tracing::debug!(callee = %pool.display(fn_type), "chaining through returned function value");
        self.state = CallState::Accumulating(PendingCall::new(cx, callee));
    }

    // -- Discharge --

    /// Emit the call and append its result to `out`.
    ///
    /// The result is represented as its substituted type requires at `out`'s
    /// level. An indirect result is routed through a stack temporary, which
    /// is loaded unless the result is itself address-represented.
    pub fn emit_to_explosion(mut self, bx: &mut impl CallBuilder, out: &mut Explosion) -> Discharged {
        let pending = self.take_pending();
        self.emit_pending(bx, pending, ResultDest::Explosion(out));
        self.discharged()
    }

    /// Emit the call writing its result to `addr`, laid out as
    /// `result_layout`.
    ///
    /// An indirect result is written by the callee itself through `addr`.
    pub fn emit_to_memory(
        mut self,
        bx: &mut impl CallBuilder,
        addr: Address,
        result_layout: &TypeLayout,
    ) -> Discharged {
        let pending = self.take_pending();
        self.emit_pending(bx, pending, ResultDest::Memory(addr, result_layout));
        self.discharged()
    }

    /// Discharge without emitting anything further.
    ///
    /// Calls already emitted by chaining stay in place.
    pub fn invalidate(mut self) -> Discharged {
        let _ = self.take_pending();
        tracing::debug!(calls = self.calls, "call plan invalidated");
        self.discharged()
    }

    fn take_pending(&mut self) -> PendingCall {
        match std::mem::replace(&mut self.state, CallState::Discharged) {
            CallState::Accumulating(pending) => pending,
            CallState::Discharged => invariant_violation("call plan discharged twice"),
        }
    }

    fn discharged(&self) -> Discharged {
        Discharged { calls: self.calls }
    }

    /// Lower `pending` to one call instruction and deliver its result.
    fn emit_pending(&mut self, bx: &mut impl CallBuilder, mut pending: PendingCall, dest: ResultDest<'_>) {
        let cx = self.cx;
        if pending.remaining != 0 {
            invariant_violation(format_args!(
                "call emitted with {} of {} clauses missing",
                pending.remaining,
                pending.callee.clauses()
            ));
        }
        if let (Some(slot), Some(context)) = (pending.sig.context_slot, pending.callee.func().context()) {
            pending.args[slot] = Some(context);
        }

        let result_type = pending.sig.result_type;
        let subs = pending.callee.substitutions().clone();

        // Reserve the indirect result.
        let mut sret = None;
        if pending.sig.has_indirect_result() {
            let addr = match &dest {
                ResultDest::Memory(addr, _) => *addr,
                ResultDest::Explosion(_) => {
                    let layout = cx.layout_substituted(result_type, &subs);
                    bx.alloca(layout.size, layout.align, "call.result")
                }
            };
            pending.args[0] = Some(addr.ptr);
            pending.attrs.add_param(0, SRET_ATTRS, addr.align);
            sret = Some(addr);
        }
        if pending.callee.is_nounwind() {
            pending.attrs.add_call(CallAttrs::NOUNWIND);
        }

        let args = pending
            .args
            .iter()
            .enumerate()
            .map(|(slot, arg)| match arg {
                Some(value) => *value,
                None => invariant_violation(format_args!("argument slot {slot} never written")),
            })
            .collect();
        let target = match pending.callee.func() {
            CalleeFn::Direct(func) => CallTarget::Direct(func),
            CalleeFn::Indirect { fn_ptr, .. } => CallTarget::Indirect(fn_ptr),
        };
        let site = CallSite {
            conv: pending.callee.conv(),
            target,
            args,
            attrs: pending.attrs.freeze(),
            ret: pending.sig.ret.clone(),
        };
        let result = emit_call_site(bx, &site);
        self.calls += 1;
        tracing::debug!(
            callee = %cx.pool().display(pending.callee.orig_type()),
            args = site.args.len(),
            indirect_result = sret.is_some(),
            "emitted call"
        );

        match (&site.ret, dest) {
            (NativeReturn::Void, _) => {}
            (NativeReturn::Direct(kinds), dest) => {
                let Some(value) = result else {
                    invariant_violation("direct-result call produced no value");
                };
                let scalars: Vec<ValueId> = if kinds.len() == 1 {
                    vec![value]
                } else {
                    (0..kinds.len() as u32)
                        .map(|i| bx.extract_value(value, i, "call.field"))
                        .collect()
                };
                match dest {
                    ResultDest::Explosion(out) => {
                        match representation(cx, result_type, &subs, out.level()) {
                            Representation::Scalars(_) => out.add_all(scalars),
                            // Opaque at `out`'s level: hand over a memory copy.
                            Representation::Address => {
                                let layout = cx.layout_substituted(result_type, &subs);
                                let temp = bx.alloca(layout.size, layout.align, "call.result");
                                initialize_from_explosion(bx, &layout, &scalars, temp);
                                out.add(temp.ptr);
                            }
                        }
                    }
                    ResultDest::Memory(addr, layout) => {
                        if layout.scalar_count() != scalars.len() {
                            invariant_violation(format_args!(
                                "storing a {}-scalar result into a {}-scalar layout",
                                scalars.len(),
                                layout.scalar_count()
                            ));
                        }
                        for (field, value) in layout.scalars.iter().zip(scalars) {
                            bx.store(value, addr, field.offset);
                        }
                    }
                }
            }
            (NativeReturn::Indirect, ResultDest::Memory(..)) => {}
            (NativeReturn::Indirect, ResultDest::Explosion(out)) => {
                let Some(temp) = sret else {
                    invariant_violation("indirect result without a reserved slot");
                };
                match representation(cx, result_type, &subs, out.level()) {
                    Representation::Address => out.add(temp.ptr),
                    Representation::Scalars(_) => {
                        let layout = cx.layout_substituted(result_type, &subs);
                        load_as_take(bx, &layout, temp, out);
                    }
                }
            }
        }
    }
}

#[cold]
#[track_caller]
fn not_callable(pool: &Pool, result: Idx) -> ! {
    invariant_violation(format_args!(
        "too many clauses: result `{}` is not callable",
        pool.display(result)
    ))
}

impl Drop for CallEmission<'_> {
    fn drop(&mut self) {
        if matches!(self.state, CallState::Accumulating(_)) && !std::thread::panicking() {
            invariant_violation("call plan dropped without being emitted or invalidated");
        }
    }
}

impl fmt::Debug for CallEmission<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            CallState::Accumulating(pending) => f
                .debug_struct("CallEmission")
                .field("callee", &pending.callee)
                .field("remaining", &pending.remaining)
                .field("last_arg_written", &pending.last_arg_written)
                .field("calls", &self.calls)
                .finish(),
            CallState::Discharged => f
                .debug_struct("CallEmission")
                .field("discharged", &true)
                .field("calls", &self.calls)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests;
