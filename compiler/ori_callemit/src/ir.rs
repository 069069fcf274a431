//! Recording IR.
//!
//! [`FunctionBuilder`] implements [`CallBuilder`] by appending instructions
//! to an in-memory [`IrFunction`] that can be inspected or printed. It is
//! the builder the test suites lower into, and a debugging aid for drivers
//! (`RUST_LOG=ori_callemit=trace` plus a `Display` dump of the function).
//!
//! The builder tracks stores so a load from a slot written earlier in the
//! same straight-line region resolves to the stored value
//! ([`FunctionBuilder::known_value`]). Any call clobbers that knowledge.
//! Nothing else is optimized.

use std::fmt;

use ori_layout::{Idx, ScalarKind};
use rustc_hash::FxHashMap;

use crate::abi::NativeReturn;
use crate::call_site::{CallSite, CallTarget};
use crate::{invariant_violation, Address, BlockId, CallBuilder, FunctionId, ValueId};

// ---------------------------------------------------------------------------
// IR data
// ---------------------------------------------------------------------------

/// A non-terminator instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrInstr {
    Const {
        dst: ValueId,
        kind: ScalarKind,
        value: i64,
    },
    Alloca {
        dst: ValueId,
        size: u64,
        align: u32,
        name: Box<str>,
    },
    Load {
        dst: ValueId,
        kind: ScalarKind,
        ptr: ValueId,
        offset: u64,
    },
    Store {
        value: ValueId,
        ptr: ValueId,
        offset: u64,
    },
    ExtractValue {
        dst: ValueId,
        agg: ValueId,
        index: u32,
    },
    TypeMetadata {
        dst: ValueId,
        ty: Idx,
    },
    Call {
        dst: Option<ValueId>,
        site: CallSite,
    },
}

/// A block terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrTerminator {
    Branch(BlockId),
    Return(Option<ValueId>),
    Invoke {
        dst: Option<ValueId>,
        site: CallSite,
        normal: BlockId,
        unwind: BlockId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrBlock {
    pub name: Box<str>,
    pub instrs: Vec<IrInstr>,
    pub terminator: Option<IrTerminator>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrFunction {
    pub name: Box<str>,
    pub params: Vec<(ValueId, ScalarKind)>,
    pub blocks: Vec<IrBlock>,
    /// Names of declared callees, indexed by [`FunctionId`].
    pub declared: Vec<Box<str>>,
}

impl IrFunction {
    pub fn block(&self, id: BlockId) -> &IrBlock {
        &self.blocks[id.index()]
    }
}

/// One emitted call instruction, plain or invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallRecord<'f> {
    pub block: BlockId,
    pub site: &'f CallSite,
    pub dst: Option<ValueId>,
    /// Unwind edge, `None` for plain calls.
    pub unwind: Option<BlockId>,
    /// Normal continuation, `None` for plain calls.
    pub normal: Option<BlockId>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Recording [`CallBuilder`].
pub struct FunctionBuilder {
    func: IrFunction,
    current: BlockId,
    next_value: u32,
    /// Allocas already hoisted into the entry block.
    entry_allocas: usize,
    unwind_scopes: Vec<BlockId>,
    /// Last value stored to each `(base pointer, offset)`.
    memory: FxHashMap<(ValueId, u64), ValueId>,
    /// Loads that resolved to a stored value.
    forwarded: FxHashMap<ValueId, ValueId>,
}

impl FunctionBuilder {
    /// Start a function with an empty `entry` block.
    pub fn new(name: &str) -> Self {
        Self {
            func: IrFunction {
                name: name.into(),
                params: Vec::new(),
                blocks: vec![IrBlock {
                    name: "entry".into(),
                    instrs: Vec::new(),
                    terminator: None,
                }],
                declared: Vec::new(),
            },
            current: BlockId::from_raw(0),
            next_value: 0,
            entry_allocas: 0,
            unwind_scopes: Vec::new(),
            memory: FxHashMap::default(),
            forwarded: FxHashMap::default(),
        }
    }

    fn fresh(&mut self) -> ValueId {
        let id = ValueId::from_raw(self.next_value);
        self.next_value += 1;
        id
    }

    fn push(&mut self, instr: IrInstr) {
        let block = &mut self.func.blocks[self.current.index()];
        if block.terminator.is_some() {
            invariant_violation(format_args!(
                "instruction appended to terminated block `{}`",
                block.name
            ));
        }
        block.instrs.push(instr);
    }

    fn terminate(&mut self, term: IrTerminator) {
        let block = &mut self.func.blocks[self.current.index()];
        if block.terminator.is_some() {
            invariant_violation(format_args!("block `{}` terminated twice", block.name));
        }
        block.terminator = Some(term);
    }

    /// Declare a callee by name.
    pub fn declare_function(&mut self, name: &str) -> FunctionId {
        self.func.declared.push(name.into());
        FunctionId::from_raw((self.func.declared.len() - 1) as u32)
    }

    /// Add a function parameter.
    pub fn param(&mut self, kind: ScalarKind) -> ValueId {
        let id = self.fresh();
        self.func.params.push((id, kind));
        id
    }

    /// An integer (or pointer-sized) constant.
    pub fn const_int(&mut self, kind: ScalarKind, value: i64) -> ValueId {
        let dst = self.fresh();
        self.push(IrInstr::Const { dst, kind, value });
        dst
    }

    pub fn current_block(&self) -> BlockId {
        self.current
    }

    /// Calls emitted from now on unwind to `landing_pad`.
    pub fn push_unwind_scope(&mut self, landing_pad: BlockId) {
        self.unwind_scopes.push(landing_pad);
    }

    pub fn pop_unwind_scope(&mut self) -> Option<BlockId> {
        self.unwind_scopes.pop()
    }

    pub fn br(&mut self, dest: BlockId) {
        self.terminate(IrTerminator::Branch(dest));
    }

    pub fn ret(&mut self, value: Option<ValueId>) {
        self.terminate(IrTerminator::Return(value));
    }

    /// The value a load is known to produce, following stores.
    pub fn known_value(&self, value: ValueId) -> ValueId {
        self.forwarded.get(&value).copied().unwrap_or(value)
    }

    /// The value most recently stored to `ptr + offset`, if still known.
    pub fn stored_at(&self, ptr: ValueId, offset: u64) -> Option<ValueId> {
        self.memory.get(&(ptr, offset)).copied()
    }

    pub fn function(&self) -> &IrFunction {
        &self.func
    }

    pub fn finish(self) -> IrFunction {
        self.func
    }

    /// Every call instruction in block order.
    pub fn call_sites(&self) -> Vec<CallRecord<'_>> {
        let mut calls = Vec::new();
        for (i, block) in self.func.blocks.iter().enumerate() {
            let id = BlockId::from_raw(i as u32);
            for instr in &block.instrs {
                if let IrInstr::Call { dst, site } = instr {
                    calls.push(CallRecord {
                        block: id,
                        site,
                        dst: *dst,
                        unwind: None,
                        normal: None,
                    });
                }
            }
            if let Some(IrTerminator::Invoke {
                dst,
                site,
                normal,
                unwind,
            }) = &block.terminator
            {
                calls.push(CallRecord {
                    block: id,
                    site,
                    dst: *dst,
                    unwind: Some(*unwind),
                    normal: Some(*normal),
                });
            }
        }
        calls
    }

    /// Number of instructions matching `pred` across all blocks.
    pub fn count_instrs(&self, pred: impl Fn(&IrInstr) -> bool) -> usize {
        self.func
            .blocks
            .iter()
            .flat_map(|b| &b.instrs)
            .filter(|i| pred(i))
            .count()
    }

    fn call_result(&mut self, site: &CallSite) -> Option<ValueId> {
        // The callee may write through any pointer it can reach.
        self.memory.clear();
        match site.ret {
            NativeReturn::Direct(_) => Some(self.fresh()),
            _ => None,
        }
    }
}

impl CallBuilder for FunctionBuilder {
    fn alloca(&mut self, size: u64, align: u32, name: &str) -> Address {
        let dst = self.fresh();
        let entry = &mut self.func.blocks[0];
        entry.instrs.insert(
            self.entry_allocas,
            IrInstr::Alloca {
                dst,
                size,
                align,
                name: name.into(),
            },
        );
        self.entry_allocas += 1;
        Address::new(dst, align)
    }

    fn load(&mut self, kind: ScalarKind, addr: Address, offset: u64, _name: &str) -> ValueId {
        let dst = self.fresh();
        self.push(IrInstr::Load {
            dst,
            kind,
            ptr: addr.ptr,
            offset,
        });
        if let Some(stored) = self.stored_at(addr.ptr, offset) {
            self.forwarded.insert(dst, stored);
        }
        dst
    }

    fn store(&mut self, value: ValueId, addr: Address, offset: u64) {
        self.push(IrInstr::Store {
            value,
            ptr: addr.ptr,
            offset,
        });
        let known = self.known_value(value);
        self.memory.insert((addr.ptr, offset), known);
    }

    fn extract_value(&mut self, agg: ValueId, index: u32, _name: &str) -> ValueId {
        let dst = self.fresh();
        self.push(IrInstr::ExtractValue { dst, agg, index });
        dst
    }

    fn type_metadata(&mut self, ty: Idx) -> ValueId {
        let dst = self.fresh();
        self.push(IrInstr::TypeMetadata { dst, ty });
        dst
    }

    fn append_block(&mut self, name: &str) -> BlockId {
        self.func.blocks.push(IrBlock {
            name: name.into(),
            instrs: Vec::new(),
            terminator: None,
        });
        BlockId::from_raw((self.func.blocks.len() - 1) as u32)
    }

    fn position_at_end(&mut self, block: BlockId) {
        self.current = block;
    }

    fn unwind_destination(&self) -> Option<BlockId> {
        self.unwind_scopes.last().copied()
    }

    fn build_call(&mut self, site: &CallSite) -> Option<ValueId> {
        let dst = self.call_result(site);
        self.push(IrInstr::Call {
            dst,
            site: site.clone(),
        });
        dst
    }

    fn build_invoke(&mut self, site: &CallSite, normal: BlockId, unwind: BlockId) -> Option<ValueId> {
        let dst = self.call_result(site);
        self.terminate(IrTerminator::Invoke {
            dst,
            site: site.clone(),
            normal,
            unwind,
        });
        dst
    }
}

// ---------------------------------------------------------------------------
// Printing
// ---------------------------------------------------------------------------

impl IrFunction {
    fn write_site(&self, f: &mut fmt::Formatter<'_>, site: &CallSite) -> fmt::Result {
        write!(f, "{} {} ", site.conv, site.ret)?;
        match site.target {
            CallTarget::Direct(id) => match self.declared.get(id.index()) {
                Some(name) => write!(f, "@{name}")?,
                None => write!(f, "{id}")?,
            },
            CallTarget::Indirect(ptr) => write!(f, "{ptr}")?,
        }
        f.write_str("(")?;
        for (i, arg) in site.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(")")?;
        if !site.attrs.params().is_empty() || site.attrs.is_nounwind() {
            write!(f, " [{}]", site.attrs)?;
        }
        Ok(())
    }
}

impl fmt::Display for IrFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "define @{}(", self.name)?;
        for (i, (id, kind)) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{kind} {id}")?;
        }
        writeln!(f, ") {{")?;
        for (i, block) in self.blocks.iter().enumerate() {
            writeln!(f, "bb{i}: ; {}", block.name)?;
            for instr in &block.instrs {
                f.write_str("  ")?;
                match instr {
                    IrInstr::Const { dst, kind, value } => write!(f, "{dst} = const {kind} {value}")?,
                    IrInstr::Alloca {
                        dst,
                        size,
                        align,
                        name,
                    } => write!(f, "{dst} = alloca {size}, align {align} ; {name}")?,
                    IrInstr::Load {
                        dst,
                        kind,
                        ptr,
                        offset,
                    } => write!(f, "{dst} = load {kind}, {ptr}+{offset}")?,
                    IrInstr::Store { value, ptr, offset } => write!(f, "store {value}, {ptr}+{offset}")?,
                    IrInstr::ExtractValue { dst, agg, index } => {
                        write!(f, "{dst} = extractvalue {agg}, {index}")?;
                    }
                    IrInstr::TypeMetadata { dst, ty } => write!(f, "{dst} = typemeta {ty}")?,
                    IrInstr::Call { dst, site } => {
                        if let Some(dst) = dst {
                            write!(f, "{dst} = ")?;
                        }
                        f.write_str("call ")?;
                        self.write_site(f, site)?;
                    }
                }
                writeln!(f)?;
            }
            match &block.terminator {
                Some(IrTerminator::Branch(dest)) => writeln!(f, "  br {dest}")?,
                Some(IrTerminator::Return(Some(v))) => writeln!(f, "  ret {v}")?,
                Some(IrTerminator::Return(None)) => writeln!(f, "  ret void")?,
                Some(IrTerminator::Invoke {
                    dst,
                    site,
                    normal,
                    unwind,
                }) => {
                    f.write_str("  ")?;
                    if let Some(dst) = dst {
                        write!(f, "{dst} = ")?;
                    }
                    f.write_str("invoke ")?;
                    self.write_site(f, site)?;
                    writeln!(f, " to {normal} unwind {unwind}")?;
                }
                None => {}
            }
        }
        f.write_str("}")
    }
}
