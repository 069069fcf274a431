#![allow(clippy::unwrap_used)]

use ori_layout::{Pool, ScalarKind};
use pretty_assertions::assert_eq;

use super::*;
use crate::ir::{FunctionBuilder, IrInstr};
use crate::test_helpers::{alloca_of, explode_params, extract_source, load_of, with_cx};
use crate::{AbiConfig, CallConv};

fn ints(bx: &mut FunctionBuilder, n: usize) -> Vec<ValueId> {
    (0..n).map(|_| bx.param(ScalarKind::I64)).collect()
}

fn clause(values: &[ValueId]) -> Explosion {
    Explosion::from_values(ExplosionLevel::Minimal, values)
}

// === Clause accounting ===

#[test]
fn saturating_clause_emits_one_call() {
    let mut pool = Pool::new();
    let add = pool.function(&[Idx::INT, Idx::INT], Idx::INT);
    with_cx(&pool, AbiConfig::default(), |cx| {
        let mut bx = FunctionBuilder::new("caller");
        let f = bx.declare_function("add");
        let args = ints(&mut bx, 2);

        let mut call = CallEmission::new(cx, Callee::direct(f, CallConv::Fast, add, 1));
        assert_eq!(call.remaining_clauses(), 1);
        call.add_arg(&mut bx, clause(&args));
        assert_eq!(call.remaining_clauses(), 0);

        let mut out = Explosion::new(ExplosionLevel::Minimal);
        let done = call.emit_to_explosion(&mut bx, &mut out);
        assert_eq!(done.calls(), 1);

        let calls = bx.call_sites();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].site.target, CallTarget::Direct(f));
        assert_eq!(calls[0].site.args, args);
        assert_eq!(out.claim_all(), &[calls[0].dst.unwrap()]);
    });
}

#[test]
fn native_arity_clauses_share_one_call() {
    let mut pool = Pool::new();
    // (int) -> (int, int) -> int, compiled uncurried
    let f_ty = pool.curried(&[&[Idx::INT], &[Idx::INT, Idx::INT]], Idx::INT);
    with_cx(&pool, AbiConfig::default(), |cx| {
        let mut bx = FunctionBuilder::new("caller");
        let f = bx.declare_function("f");
        let a = ints(&mut bx, 1);
        let bc = ints(&mut bx, 2);

        let mut call = CallEmission::new(cx, Callee::direct(f, CallConv::Fast, f_ty, 2));
        call.add_arg(&mut bx, clause(&a));
        call.add_arg(&mut bx, clause(&bc));
        let mut out = Explosion::new(ExplosionLevel::Minimal);
        assert_eq!(call.emit_to_explosion(&mut bx, &mut out).calls(), 1);

        // The later clause occupies the lower slots.
        let calls = bx.call_sites();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].site.args, vec![bc[0], bc[1], a[0]]);
    });
}

#[test]
fn extra_clauses_chain_through_returned_functions() {
    let mut pool = Pool::new();
    // (int) -> (int) -> (int) -> int, one clause per native call
    let f_ty = pool.curried(&[&[Idx::INT], &[Idx::INT], &[Idx::INT]], Idx::INT);
    with_cx(&pool, AbiConfig::default(), |cx| {
        let mut bx = FunctionBuilder::new("caller");
        let f = bx.declare_function("f");
        let args = ints(&mut bx, 3);

        let mut call = CallEmission::new(cx, Callee::direct(f, CallConv::Fast, f_ty, 1));
        for &arg in &args {
            call.add_arg(&mut bx, clause(&[arg]));
        }
        let mut out = Explosion::new(ExplosionLevel::Minimal);
        assert_eq!(call.emit_to_explosion(&mut bx, &mut out).calls(), 3);

        let calls = bx.call_sites();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].site.target, CallTarget::Direct(f));
        assert_eq!(calls[0].site.args, vec![args[0]]);

        // Each later call targets the previous call's {fn, context} result.
        for i in 1..3 {
            let prev = calls[i - 1].dst.unwrap();
            let CallTarget::Indirect(fn_ptr) = calls[i].site.target else {
                panic!("call {i} is not indirect");
            };
            assert_eq!(extract_source(&bx, fn_ptr), Some((prev, 0)));
            assert_eq!(calls[i].site.conv, CallConv::Fast);
            assert_eq!(calls[i].site.args.len(), 2);
            assert_eq!(calls[i].site.args[0], args[i]);
            assert_eq!(extract_source(&bx, calls[i].site.args[1]), Some((prev, 1)));
        }
        assert_eq!(out.claim_all(), &[calls[2].dst.unwrap()]);
    });
}

#[test]
fn k_extra_clauses_beyond_native_arity_give_k_plus_one_calls() {
    let mut pool = Pool::new();
    let f_ty = pool.curried(&[&[Idx::INT], &[Idx::INT], &[Idx::INT], &[Idx::INT]], Idx::INT);
    with_cx(&pool, AbiConfig::default(), |cx| {
        let mut bx = FunctionBuilder::new("caller");
        let f = bx.declare_function("f");
        let args = ints(&mut bx, 4);

        let mut call = CallEmission::new(cx, Callee::direct(f, CallConv::Fast, f_ty, 2));
        for &arg in &args {
            call.add_arg(&mut bx, clause(&[arg]));
        }
        let mut out = Explosion::new(ExplosionLevel::Minimal);
        assert_eq!(call.emit_to_explosion(&mut bx, &mut out).calls(), 3);
        assert_eq!(bx.call_sites().len(), 3);
    });
}

#[test]
fn chained_callee_is_fast_minimal_single_clause() {
    let mut pool = Pool::new();
    let f_ty = pool.curried(&[&[Idx::INT], &[Idx::INT]], Idx::INT);
    with_cx(&pool, AbiConfig::default(), |cx| {
        let mut bx = FunctionBuilder::new("caller");
        let f = bx.declare_function("f");
        let args = ints(&mut bx, 2);

        let callee = Callee::direct(f, CallConv::C, f_ty, 1).with_level(ExplosionLevel::Maximal);
        let mut call = CallEmission::new(cx, callee);
        assert_eq!(call.current_level(), ExplosionLevel::Maximal);
        call.add_arg(
            &mut bx,
            Explosion::from_values(ExplosionLevel::Maximal, &[args[0]]),
        );
        // The next callee will be a freshly returned function value.
        assert_eq!(call.current_level(), ExplosionLevel::Minimal);
        call.add_arg(&mut bx, clause(&[args[1]]));

        let callee = call.callee();
        assert_eq!(callee.conv(), CallConv::Fast);
        assert_eq!(callee.level(), ExplosionLevel::Minimal);
        assert_eq!(callee.clauses(), 1);
        assert!(!callee.is_nounwind());
        assert!(matches!(callee.func(), CalleeFn::Indirect { context: Some(_), .. }));
        assert_eq!(call.invalidate().calls(), 1);
    });
}

// === Discharge ===

#[test]
#[should_panic(expected = "call plan dropped without being emitted or invalidated")]
fn dropping_an_undischarged_plan_panics() {
    let mut pool = Pool::new();
    let f_ty = pool.function(&[Idx::INT], Idx::INT);
    with_cx(&pool, AbiConfig::default(), |cx| {
        let mut bx = FunctionBuilder::new("caller");
        let f = bx.declare_function("f");
        let a = ints(&mut bx, 1);
        let mut call = CallEmission::new(cx, Callee::direct(f, CallConv::Fast, f_ty, 1));
        call.add_arg(&mut bx, clause(&a));
        drop(call);
    });
}

#[test]
fn invalidate_emits_nothing() {
    let mut pool = Pool::new();
    let f_ty = pool.function(&[Idx::INT], Idx::INT);
    with_cx(&pool, AbiConfig::default(), |cx| {
        let mut bx = FunctionBuilder::new("caller");
        let f = bx.declare_function("f");
        let call = CallEmission::new(cx, Callee::direct(f, CallConv::Fast, f_ty, 1));
        assert_eq!(call.invalidate().calls(), 0);
        assert!(bx.call_sites().is_empty());
    });
}

#[test]
#[should_panic(expected = "call emitted with 1 of 2 clauses missing")]
fn emitting_an_unsaturated_call_is_fatal() {
    let mut pool = Pool::new();
    let f_ty = pool.curried(&[&[Idx::INT], &[Idx::INT]], Idx::INT);
    with_cx(&pool, AbiConfig::default(), |cx| {
        let mut bx = FunctionBuilder::new("caller");
        let f = bx.declare_function("f");
        let a = ints(&mut bx, 1);
        let mut call = CallEmission::new(cx, Callee::direct(f, CallConv::Fast, f_ty, 2));
        call.add_arg(&mut bx, clause(&a));
        let mut out = Explosion::new(ExplosionLevel::Minimal);
        let _ = call.emit_to_explosion(&mut bx, &mut out);
    });
}

// === Clause validation ===

#[test]
#[should_panic(expected = "clause supplied at Minimal but the callee expects Maximal")]
fn clause_at_the_wrong_level_is_fatal() {
    let mut pool = Pool::new();
    let f_ty = pool.function(&[Idx::INT], Idx::INT);
    with_cx(&pool, AbiConfig::default(), |cx| {
        let mut bx = FunctionBuilder::new("caller");
        let f = bx.declare_function("f");
        let a = ints(&mut bx, 1);
        let callee = Callee::direct(f, CallConv::Fast, f_ty, 1).with_level(ExplosionLevel::Maximal);
        let mut call = CallEmission::new(cx, callee);
        call.add_arg(&mut bx, clause(&a));
    });
}

#[test]
#[should_panic(expected = "left 1 values unclaimed")]
fn oversized_clause_is_fatal() {
    let mut pool = Pool::new();
    let f_ty = pool.function(&[Idx::INT, Idx::INT], Idx::INT);
    with_cx(&pool, AbiConfig::default(), |cx| {
        let mut bx = FunctionBuilder::new("caller");
        let f = bx.declare_function("f");
        let args = ints(&mut bx, 3);
        let mut call = CallEmission::new(cx, Callee::direct(f, CallConv::Fast, f_ty, 1));
        call.add_arg(&mut bx, clause(&args));
    });
}

#[test]
#[should_panic(expected = "too many clauses: result `int` is not callable")]
fn chaining_on_a_non_function_is_fatal() {
    let mut pool = Pool::new();
    let f_ty = pool.function(&[Idx::INT], Idx::INT);
    with_cx(&pool, AbiConfig::default(), |cx| {
        let mut bx = FunctionBuilder::new("caller");
        let f = bx.declare_function("f");
        let args = ints(&mut bx, 2);
        let mut call = CallEmission::new(cx, Callee::direct(f, CallConv::Fast, f_ty, 1));
        call.add_arg(&mut bx, clause(&args[..1]));
        call.add_arg(&mut bx, clause(&args[1..]));
    });
}

// === Results ===

#[test]
fn direct_results_never_touch_memory() {
    let mut pool = Pool::new();
    let pair = pool.pair(Idx::INT, Idx::FLOAT);
    let f_ty = pool.function(&[Idx::INT], pair);
    with_cx(&pool, AbiConfig::default(), |cx| {
        let mut bx = FunctionBuilder::new("caller");
        let f = bx.declare_function("f");
        let a = ints(&mut bx, 1);
        let mut call = CallEmission::new(cx, Callee::direct(f, CallConv::C, f_ty, 1));
        call.add_arg(&mut bx, clause(&a));
        let mut out = Explosion::new(ExplosionLevel::Minimal);
        let _ = call.emit_to_explosion(&mut bx, &mut out);

        let dst = bx.call_sites()[0].dst.unwrap();
        let fields = out.claim_all().to_vec();
        assert_eq!(fields.len(), 2);
        assert_eq!(extract_source(&bx, fields[0]), Some((dst, 0)));
        assert_eq!(extract_source(&bx, fields[1]), Some((dst, 1)));
        assert_eq!(bx.count_instrs(|i| matches!(i, IrInstr::Alloca { .. })), 0);
    });
}

#[test]
fn indirect_result_is_routed_through_a_temporary() {
    let mut pool = Pool::new();
    let big = pool.struct_type("Big", &[Idx::INT, Idx::INT, Idx::INT]);
    let f_ty = pool.function(&[Idx::INT], big);
    with_cx(&pool, AbiConfig::default(), |cx| {
        let mut bx = FunctionBuilder::new("caller");
        let f = bx.declare_function("f");
        let a = ints(&mut bx, 1);
        let mut call = CallEmission::new(cx, Callee::direct(f, CallConv::C, f_ty, 1));
        call.add_arg(&mut bx, clause(&a));
        let mut out = Explosion::new(ExplosionLevel::Minimal);
        let _ = call.emit_to_explosion(&mut bx, &mut out);

        let calls = bx.call_sites();
        let site = calls[0].site;
        assert_eq!(calls[0].dst, None);
        let temp = site.args[0];
        assert_eq!(site.args[1], a[0]);
        assert_eq!(alloca_of(&bx, temp), Some((24, 8, "call.result".to_string())));

        let attr = site.attrs.param(0).unwrap();
        assert_eq!(
            attr.flags,
            ParamAttrs::SRET | ParamAttrs::NOALIAS | ParamAttrs::NOCAPTURE | ParamAttrs::WRITEONLY
        );
        assert_eq!(attr.align, 8);

        let loaded: Vec<_> = out.claim_all().iter().map(|&v| load_of(&bx, v)).collect();
        assert_eq!(loaded, vec![Some((temp, 0)), Some((temp, 8)), Some((temp, 16))]);
    });
}

#[test]
fn indirect_result_writes_straight_to_memory() {
    let mut pool = Pool::new();
    let big = pool.struct_type("Big", &[Idx::INT, Idx::INT, Idx::INT]);
    let f_ty = pool.function(&[Idx::INT], big);
    with_cx(&pool, AbiConfig::default(), |cx| {
        let mut bx = FunctionBuilder::new("caller");
        let f = bx.declare_function("f");
        let a = ints(&mut bx, 1);
        let layout = cx.layout(big);
        let dest = bx.alloca(layout.size, layout.align, "dest");

        let mut call = CallEmission::new(cx, Callee::direct(f, CallConv::C, f_ty, 1));
        call.add_arg(&mut bx, clause(&a));
        let _ = call.emit_to_memory(&mut bx, dest, &layout);

        assert_eq!(bx.call_sites()[0].site.args[0], dest.ptr);
        assert_eq!(bx.count_instrs(|i| matches!(i, IrInstr::Alloca { .. })), 1);
        assert_eq!(bx.count_instrs(|i| matches!(i, IrInstr::Load { .. })), 0);
    });
}

#[test]
fn direct_result_is_stored_field_by_field() {
    let mut pool = Pool::new();
    let pair = pool.pair(Idx::BOOL, Idx::INT);
    let f_ty = pool.function(&[], pair);
    with_cx(&pool, AbiConfig::default(), |cx| {
        let mut bx = FunctionBuilder::new("caller");
        let f = bx.declare_function("f");
        let layout = cx.layout(pair);
        let dest = bx.alloca(layout.size, layout.align, "dest");

        let mut call = CallEmission::new(cx, Callee::direct(f, CallConv::Fast, f_ty, 1));
        call.add_arg(&mut bx, clause(&[]));
        let _ = call.emit_to_memory(&mut bx, dest, &layout);

        let dst = bx.call_sites()[0].dst.unwrap();
        let first = bx.stored_at(dest.ptr, 0).unwrap();
        let second = bx.stored_at(dest.ptr, 8).unwrap();
        assert_eq!(extract_source(&bx, first), Some((dst, 0)));
        assert_eq!(extract_source(&bx, second), Some((dst, 1)));
    });
}

// === Attributes ===

#[test]
fn attribute_slots_match_native_positions() {
    let mut pool = Pool::new();
    let big = pool.struct_type("Big", &[Idx::INT, Idx::INT, Idx::INT]);
    let f_ty = pool.function(&[Idx::INT, big], big);
    with_cx(&pool, AbiConfig::default(), |cx| {
        let mut bx = FunctionBuilder::new("caller");
        let f = bx.declare_function("f");
        let a = bx.param(ScalarKind::I64);
        let mut values = clause(&[a]);
        values.add_all(
            explode_params(&mut bx, &cx.layout(big), ExplosionLevel::Minimal)
                .claim_all()
                .iter()
                .copied(),
        );

        let mut call = CallEmission::new(cx, Callee::direct(f, CallConv::C, f_ty, 1));
        call.add_arg(&mut bx, values);
        let mut out = Explosion::new(ExplosionLevel::Minimal);
        let _ = call.emit_to_explosion(&mut bx, &mut out);

        let calls = bx.call_sites();
        let site = calls[0].site;
        // [sret] [int] [byval Big]
        assert_eq!(site.args.len(), 3);
        assert_eq!(site.args[1], a);
        assert_eq!(alloca_of(&bx, site.args[2]).map(|(_, _, name)| name), Some("byval".to_string()));

        let slots: Vec<usize> = site.attrs.params().iter().map(|p| p.slot).collect();
        assert_eq!(slots, vec![0, 2]);
        assert!(site.attrs.param(0).unwrap().flags.contains(ParamAttrs::SRET));
        assert_eq!(
            site.attrs.param(2).unwrap().flags,
            ParamAttrs::BYVAL | ParamAttrs::NOCAPTURE | ParamAttrs::READONLY
        );
        assert!(site.attrs.param(1).is_none());
    });
}

#[test]
fn attributes_of_curried_clauses_are_rebased() {
    let mut pool = Pool::new();
    let big = pool.struct_type("Big", &[Idx::INT, Idx::INT, Idx::INT]);
    // (Big) -> (int) -> unit, both clauses in one native call
    let f_ty = pool.curried(&[&[big], &[Idx::INT]], Idx::UNIT);
    with_cx(&pool, AbiConfig::default(), |cx| {
        let mut bx = FunctionBuilder::new("caller");
        let f = bx.declare_function("f");
        let first = explode_params(&mut bx, &cx.layout(big), ExplosionLevel::Minimal);
        let b = ints(&mut bx, 1);

        let mut call = CallEmission::new(cx, Callee::direct(f, CallConv::C, f_ty, 2));
        call.add_arg(&mut bx, first);
        call.add_arg(&mut bx, clause(&b));
        let mut out = Explosion::new(ExplosionLevel::Minimal);
        let _ = call.emit_to_explosion(&mut bx, &mut out);
        assert!(out.is_empty());

        // [int] [byval Big]: the first clause's byval lands in slot 1.
        let calls = bx.call_sites();
        let site = calls[0].site;
        assert_eq!(site.args[0], b[0]);
        assert_eq!(site.attrs.params().len(), 1);
        assert!(site.attrs.param(1).unwrap().flags.contains(ParamAttrs::BYVAL));
    });
}

// === Unwinding ===

#[test]
fn calls_in_an_unwind_scope_become_invokes() {
    let mut pool = Pool::new();
    let f_ty = pool.curried(&[&[Idx::INT], &[Idx::INT]], Idx::INT);
    with_cx(&pool, AbiConfig::default(), |cx| {
        let mut bx = FunctionBuilder::new("caller");
        let f = bx.declare_function("f");
        let args = ints(&mut bx, 2);
        let pad = bx.append_block("lpad");
        bx.push_unwind_scope(pad);

        let mut call = CallEmission::new(cx, Callee::direct(f, CallConv::Fast, f_ty, 1));
        call.add_arg(&mut bx, clause(&args[..1]));
        call.add_arg(&mut bx, clause(&args[1..]));
        let mut out = Explosion::new(ExplosionLevel::Minimal);
        assert_eq!(call.emit_to_explosion(&mut bx, &mut out).calls(), 2);

        let calls = bx.call_sites();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| c.unwind == Some(pad)));
        // The second call is emitted in the first call's continuation.
        assert_eq!(calls[0].normal, Some(calls[1].block));
        assert_eq!(calls[1].normal, Some(bx.current_block()));
    });
}

#[test]
fn nounwind_callee_is_a_plain_call_in_an_unwind_scope() {
    let mut pool = Pool::new();
    let f_ty = pool.function(&[Idx::INT], Idx::INT);
    with_cx(&pool, AbiConfig::default(), |cx| {
        let mut bx = FunctionBuilder::new("caller");
        let f = bx.declare_function("f");
        let a = ints(&mut bx, 1);
        let pad = bx.append_block("lpad");
        bx.push_unwind_scope(pad);

        let callee = Callee::direct(f, CallConv::Fast, f_ty, 1).with_nounwind(true);
        let mut call = CallEmission::new(cx, callee);
        call.add_arg(&mut bx, clause(&a));
        let mut out = Explosion::new(ExplosionLevel::Minimal);
        let _ = call.emit_to_explosion(&mut bx, &mut out);

        let calls = bx.call_sites();
        assert_eq!(calls[0].unwind, None);
        assert!(calls[0].site.attrs.call().contains(CallAttrs::NOUNWIND));
    });
}

// === Generic callees ===

#[test]
fn substituted_clause_is_reabstracted_with_metadata() {
    let mut pool = Pool::new();
    let t0 = pool.generic(0);
    let point = pool.struct_type("Point", &[Idx::INT, Idx::INT]);
    let id_ty = pool.generic_function(1, &[t0], t0);
    with_cx(&pool, AbiConfig::default(), |cx| {
        let mut bx = FunctionBuilder::new("caller");
        let f = bx.declare_function("id");
        let xy = ints(&mut bx, 2);

        let callee = Callee::direct(f, CallConv::Fast, id_ty, 1)
            .with_substitutions(Substitutions::from_types(&[point]));
        let mut call = CallEmission::new(cx, callee);
        assert_eq!(call.substitutions().len(), 1);
        call.add_substituted_arg(&mut bx, point, clause(&xy));

        let mut out = Explosion::new(ExplosionLevel::Minimal);
        assert_eq!(call.emit_to_explosion(&mut bx, &mut out).calls(), 1);

        let calls = bx.call_sites();
        let site = calls[0].site;
        // [sret] [value address] [metadata]
        assert_eq!(site.args.len(), 3);
        let (size, _, name) = alloca_of(&bx, site.args[1]).unwrap();
        assert_eq!((size, name.as_str()), (16, "reabstract"));
        assert_eq!(
            bx.count_instrs(|i| matches!(
                i,
                IrInstr::TypeMetadata { dst, ty } if *dst == site.args[2] && *ty == point
            )),
            1
        );
        assert_eq!(
            bx.count_instrs(|i| matches!(i, IrInstr::Store { ptr, .. } if *ptr == site.args[1])),
            2
        );

        // The generic result comes back through memory and is loaded as a Point.
        let temp = site.args[0];
        assert_eq!(alloca_of(&bx, temp).map(|(size, _, _)| size), Some(16));
        let loaded: Vec<_> = out.claim_all().iter().map(|&v| load_of(&bx, v)).collect();
        assert_eq!(loaded, vec![Some((temp, 0)), Some((temp, 8))]);
    });
}

#[test]
fn without_substitutions_add_substituted_arg_is_add_arg() {
    let mut pool = Pool::new();
    let f_ty = pool.function(&[Idx::INT, Idx::INT], Idx::INT);
    let tup = pool.pair(Idx::INT, Idx::INT);
    with_cx(&pool, AbiConfig::default(), |cx| {
        let mut bx = FunctionBuilder::new("caller");
        let f = bx.declare_function("f");
        let args = ints(&mut bx, 2);

        let mut call = CallEmission::new(cx, Callee::direct(f, CallConv::Fast, f_ty, 1));
        call.add_substituted_arg(&mut bx, tup, clause(&args));
        let mut out = Explosion::new(ExplosionLevel::Minimal);
        let _ = call.emit_to_explosion(&mut bx, &mut out);

        assert_eq!(bx.call_sites()[0].site.args, args);
        assert_eq!(bx.count_instrs(|_| true), 1);
    });
}

#[test]
fn replacing_the_function_value_retargets_the_call() {
    let mut pool = Pool::new();
    let f_ty = pool.function(&[Idx::INT], Idx::INT);
    with_cx(&pool, AbiConfig::default(), |cx| {
        let mut bx = FunctionBuilder::new("caller");
        let generic_entry = bx.declare_function("f");
        let specialized = bx.declare_function("f.int");
        let a = ints(&mut bx, 1);

        let mut call = CallEmission::new(cx, Callee::direct(generic_entry, CallConv::Fast, f_ty, 1));
        call.callee_mut().set_function(CalleeFn::Direct(specialized));
        call.add_arg(&mut bx, clause(&a));
        let mut out = Explosion::new(ExplosionLevel::Minimal);
        let _ = call.emit_to_explosion(&mut bx, &mut out);

        assert_eq!(bx.call_sites()[0].site.target, CallTarget::Direct(specialized));
    });
}

// === Result representation at the destination level ===

#[test]
fn direct_result_is_spilled_when_opaque_at_the_destination_level() {
    let mut pool = Pool::new();
    let opaque = pool.resilient_struct("Opaque", &[Idx::INT, Idx::INT]);
    let f_ty = pool.function(&[Idx::INT], opaque);
    with_cx(&pool, AbiConfig::default(), |cx| {
        let mut bx = FunctionBuilder::new("caller");
        let f = bx.declare_function("make");
        let a = ints(&mut bx, 1);

        // The callee sees the fields and returns them directly.
        let callee = Callee::direct(f, CallConv::Fast, f_ty, 1).with_level(ExplosionLevel::Maximal);
        let mut call = CallEmission::new(cx, callee);
        call.add_arg(&mut bx, Explosion::from_values(ExplosionLevel::Maximal, &a));
        let mut out = Explosion::new(ExplosionLevel::Minimal);
        let _ = call.emit_to_explosion(&mut bx, &mut out);

        let dst = bx.call_sites()[0].dst.unwrap();
        assert_eq!(out.len(), 1);
        let ptr = out.claim_next();
        assert_eq!(alloca_of(&bx, ptr), Some((16, 8, "call.result".to_string())));
        let first = bx.stored_at(ptr, 0).unwrap();
        let second = bx.stored_at(ptr, 8).unwrap();
        assert_eq!(extract_source(&bx, first), Some((dst, 0)));
        assert_eq!(extract_source(&bx, second), Some((dst, 1)));
    });
}

#[test]
fn direct_result_stays_exploded_when_the_levels_agree() {
    let mut pool = Pool::new();
    let opaque = pool.resilient_struct("Opaque", &[Idx::INT, Idx::INT]);
    let f_ty = pool.function(&[Idx::INT], opaque);
    with_cx(&pool, AbiConfig::default(), |cx| {
        let mut bx = FunctionBuilder::new("caller");
        let f = bx.declare_function("make");
        let a = ints(&mut bx, 1);

        let callee = Callee::direct(f, CallConv::Fast, f_ty, 1).with_level(ExplosionLevel::Maximal);
        let mut call = CallEmission::new(cx, callee);
        call.add_arg(&mut bx, Explosion::from_values(ExplosionLevel::Maximal, &a));
        let mut out = Explosion::new(ExplosionLevel::Maximal);
        let _ = call.emit_to_explosion(&mut bx, &mut out);

        assert_eq!(out.len(), 2);
        assert_eq!(bx.count_instrs(|i| matches!(i, IrInstr::Alloca { .. })), 0);
    });
}

#[test]
fn opaque_indirect_result_is_loaded_for_a_maximal_destination() {
    let mut pool = Pool::new();
    let opaque = pool.resilient_struct("Opaque", &[Idx::INT, Idx::INT]);
    let f_ty = pool.function(&[Idx::INT], opaque);
    with_cx(&pool, AbiConfig::default(), |cx| {
        let mut bx = FunctionBuilder::new("caller");
        let f = bx.declare_function("make");
        let a = ints(&mut bx, 1);

        // At Minimal the callee returns the opaque value through memory.
        let mut call = CallEmission::new(cx, Callee::direct(f, CallConv::Fast, f_ty, 1));
        call.add_arg(&mut bx, clause(&a));
        let mut out = Explosion::new(ExplosionLevel::Maximal);
        let _ = call.emit_to_explosion(&mut bx, &mut out);

        let temp = bx.call_sites()[0].site.args[0];
        let loaded: Vec<_> = out.claim_all().iter().map(|&v| load_of(&bx, v)).collect();
        assert_eq!(loaded, vec![Some((temp, 0)), Some((temp, 8))]);
    });
}

#[test]
fn opaque_indirect_result_is_handed_over_by_address() {
    let mut pool = Pool::new();
    let opaque = pool.resilient_struct("Opaque", &[Idx::INT, Idx::INT]);
    let f_ty = pool.function(&[Idx::INT], opaque);
    with_cx(&pool, AbiConfig::default(), |cx| {
        let mut bx = FunctionBuilder::new("caller");
        let f = bx.declare_function("make");
        let a = ints(&mut bx, 1);

        let mut call = CallEmission::new(cx, Callee::direct(f, CallConv::Fast, f_ty, 1));
        call.add_arg(&mut bx, clause(&a));
        let mut out = Explosion::new(ExplosionLevel::Minimal);
        let _ = call.emit_to_explosion(&mut bx, &mut out);

        let temp = bx.call_sites()[0].site.args[0];
        assert_eq!(out.claim_all(), &[temp]);
        assert_eq!(bx.count_instrs(|i| matches!(i, IrInstr::Load { .. })), 0);
    });
}

#[test]
fn generic_result_is_written_straight_to_memory() {
    let mut pool = Pool::new();
    let t0 = pool.generic(0);
    let point = pool.struct_type("Point", &[Idx::INT, Idx::INT]);
    let id_ty = pool.generic_function(1, &[t0], t0);
    with_cx(&pool, AbiConfig::default(), |cx| {
        let mut bx = FunctionBuilder::new("caller");
        let f = bx.declare_function("id");
        let xy = ints(&mut bx, 2);
        let layout = cx.layout(point);
        let dest = bx.alloca(layout.size, layout.align, "dest");

        let callee = Callee::direct(f, CallConv::Fast, id_ty, 1)
            .with_substitutions(Substitutions::from_types(&[point]));
        let mut call = CallEmission::new(cx, callee);
        call.add_substituted_arg(&mut bx, point, clause(&xy));
        let _ = call.emit_to_memory(&mut bx, dest, &layout);

        let calls = bx.call_sites();
        assert_eq!(calls[0].site.args[0], dest.ptr);
        assert_eq!(
            bx.count_instrs(|i| matches!(i, IrInstr::Alloca { name, .. } if &**name == "call.result")),
            0
        );
        assert_eq!(bx.count_instrs(|i| matches!(i, IrInstr::Load { .. })), 0);
    });
}

// === Chaining through generic results ===

#[test]
fn generic_result_substituted_with_a_function_is_callable() {
    let mut pool = Pool::new();
    let t0 = pool.generic(0);
    let g_ty = pool.function(&[Idx::INT], Idx::INT);
    let id_ty = pool.generic_function(1, &[t0], t0);
    with_cx(&pool, AbiConfig::default(), |cx| {
        let mut bx = FunctionBuilder::new("caller");
        let f = bx.declare_function("id");
        let g_fn = bx.param(ScalarKind::Ptr);
        let g_ctx = bx.param(ScalarKind::Ptr);
        let x = bx.param(ScalarKind::I64);

        // id(g)(x) with T0 = (int) -> int
        let callee = Callee::direct(f, CallConv::Fast, id_ty, 1)
            .with_substitutions(Substitutions::from_types(&[g_ty]));
        let mut call = CallEmission::new(cx, callee);
        call.add_substituted_arg(&mut bx, g_ty, clause(&[g_fn, g_ctx]));
        call.add_substituted_arg(&mut bx, Idx::INT, clause(&[x]));
        assert_eq!(call.callee().orig_type(), g_ty);
        assert!(call.substitutions().is_empty());

        let mut out = Explosion::new(ExplosionLevel::Minimal);
        assert_eq!(call.emit_to_explosion(&mut bx, &mut out).calls(), 2);

        let calls = bx.call_sites();
        assert_eq!(calls.len(), 2);
        // The generic result comes back through memory as a {fn, context} pair.
        let temp = calls[0].site.args[0];
        assert_eq!(alloca_of(&bx, temp), Some((16, 8, "call.result".to_string())));
        let CallTarget::Indirect(fn_ptr) = calls[1].site.target else {
            panic!("chained call is not indirect");
        };
        assert_eq!(load_of(&bx, fn_ptr), Some((temp, 0)));
        assert_eq!(calls[1].site.args.len(), 2);
        assert_eq!(calls[1].site.args[0], x);
        assert_eq!(load_of(&bx, calls[1].site.args[1]), Some((temp, 8)));
        assert_eq!(out.claim_all(), &[calls[1].dst.unwrap()]);
    });
}

#[test]
#[should_panic(expected = "too many clauses: result `T0` is not callable")]
fn generic_result_substituted_with_a_non_function_is_fatal() {
    let mut pool = Pool::new();
    let t0 = pool.generic(0);
    let id_ty = pool.generic_function(1, &[t0], t0);
    with_cx(&pool, AbiConfig::default(), |cx| {
        let mut bx = FunctionBuilder::new("caller");
        let f = bx.declare_function("id");
        let args = ints(&mut bx, 2);

        let callee = Callee::direct(f, CallConv::Fast, id_ty, 1)
            .with_substitutions(Substitutions::from_types(&[Idx::INT]));
        let mut call = CallEmission::new(cx, callee);
        call.add_substituted_arg(&mut bx, Idx::INT, clause(&args[..1]));
        call.add_substituted_arg(&mut bx, Idx::INT, clause(&args[1..]));
    });
}
