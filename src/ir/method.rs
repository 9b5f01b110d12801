//! Method: the CFG container
//!
//! A method owns the arenas for blocks, instructions and constants, the
//! ordered block list forming one CFG, the registry of catch entry blocks
//! and the slot tracker that keeps names unique. Every structural mutation
//! (edges, handlers, instruction splicing, use-def rewiring) is a method on
//! this type so the bidirectional relations can never be half-updated.

use super::block::{BlockData, BlockKind, BlockUser};
use super::instruction::{BinaryOp, CmpOp, InstData, InstKind, UnaryOp};
use super::types::Type;
use super::value::{
    add_unique, remove_item, ArgData, ArgId, BlockId, ConstData, ConstId, Constant, InstId, Name,
    Value,
};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;

/// Monotonic name/slot allocator, one per method
///
/// Owned by the method rather than shared process-wide so that multiple
/// methods can be built independently and deterministically.
#[derive(Debug, Default)]
pub struct SlotTracker {
    next_slot: u32,
    block_names: HashMap<String, u32>,
}

impl SlotTracker {
    /// Allocate the next value slot number
    pub fn value_slot(&mut self) -> u32 {
        let slot = self.next_slot;
        self.next_slot += 1;
        slot
    }

    /// Allocate a unique block name from a base label. The first request
    /// for a base gets the base itself, later ones get a numeric suffix.
    pub fn block_name(&mut self, base: &str) -> String {
        let count = self.block_names.entry(base.to_string()).or_insert(0);
        *count += 1;
        match *count {
            1 => base.to_string(),
            n => format!("{}.{}", base, n - 1),
        }
    }
}

/// A single-entry CFG of basic blocks, mutated in place by analyses
pub struct Method {
    name: String,
    ret: Type,
    args: Vec<ArgData>,
    blocks: Vec<BlockData>,
    insts: Vec<InstData>,
    consts: Vec<ConstData>,
    const_index: HashMap<Constant, ConstId>,
    /// Ordered block list; insertion order is the serialization order
    order: Vec<BlockId>,
    catch_entries: Vec<BlockId>,
    slots: SlotTracker,
}

impl Method {
    pub fn new(name: impl Into<String>, arg_types: Vec<Type>, ret: Type) -> Self {
        let args = arg_types
            .into_iter()
            .enumerate()
            .map(|(index, ty)| ArgData {
                name: Name::Str(format!("arg${}", index)),
                ty,
                users: Vec::new(),
            })
            .collect();
        Method {
            name: name.into(),
            ret,
            args,
            blocks: Vec::new(),
            insts: Vec::new(),
            consts: Vec::new(),
            const_index: HashMap::new(),
            order: Vec::new(),
            catch_entries: Vec::new(),
            slots: SlotTracker::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn return_type(&self) -> &Type {
        &self.ret
    }

    // ---- value access --------------------------------------------------

    pub fn arg(&self, index: usize) -> Value {
        Value::Arg(ArgId(index as u32))
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Intern a constant, returning a handle shared by all uses
    pub fn constant(&mut self, value: Constant) -> Value {
        if let Some(&id) = self.const_index.get(&value) {
            return Value::Const(id);
        }
        let id = ConstId(self.consts.len() as u32);
        self.const_index.insert(value.clone(), id);
        self.consts.push(ConstData {
            value,
            users: Vec::new(),
        });
        Value::Const(id)
    }

    pub fn const_int(&mut self, value: i32) -> Value {
        self.constant(Constant::Int(value))
    }

    pub fn const_long(&mut self, value: i64) -> Value {
        self.constant(Constant::Long(value))
    }

    pub fn const_bool(&mut self, value: bool) -> Value {
        self.constant(Constant::Bool(value))
    }

    pub fn const_null(&mut self) -> Value {
        self.constant(Constant::Null)
    }

    pub fn const_str(&mut self, value: impl Into<String>) -> Value {
        self.constant(Constant::Str(value.into()))
    }

    pub fn value_type(&self, value: Value) -> Type {
        match value {
            Value::Arg(ArgId(index)) => self.args[index as usize].ty.clone(),
            Value::Const(ConstId(index)) => self.consts[index as usize].value.ty(),
            Value::Inst(inst) => self.inst(inst).ty.clone(),
        }
    }

    /// Instructions currently using the given value as an operand
    pub fn value_users(&self, value: Value) -> &[InstId] {
        match value {
            Value::Arg(ArgId(index)) => &self.args[index as usize].users,
            Value::Const(ConstId(index)) => &self.consts[index as usize].users,
            Value::Inst(inst) => &self.inst(inst).users,
        }
    }

    fn value_users_mut(&mut self, value: Value) -> &mut Vec<InstId> {
        match value {
            Value::Arg(ArgId(index)) => &mut self.args[index as usize].users,
            Value::Const(ConstId(index)) => &mut self.consts[index as usize].users,
            Value::Inst(inst) => &mut self.insts[inst.index()].users,
        }
    }

    // ---- arena access --------------------------------------------------

    pub fn block(&self, id: BlockId) -> &BlockData {
        &self.blocks[id.index()]
    }

    fn block_mut(&mut self, id: BlockId) -> &mut BlockData {
        &mut self.blocks[id.index()]
    }

    pub fn inst(&self, id: InstId) -> &InstData {
        &self.insts[id.index()]
    }

    fn inst_mut(&mut self, id: InstId) -> &mut InstData {
        &mut self.insts[id.index()]
    }

    // ---- block list ----------------------------------------------------

    /// Blocks in method order
    pub fn blocks(&self) -> &[BlockId] {
        &self.order
    }

    /// Position of a block in method order
    pub fn position(&self, bb: BlockId) -> Option<usize> {
        self.order.iter().position(|&entry| entry == bb)
    }

    /// Block following `from` in method order
    pub fn next_block(&self, from: BlockId) -> Option<BlockId> {
        let index = self.position(from)?;
        self.order.get(index + 1).copied()
    }

    pub fn block_by_name(&self, name: &str) -> Option<BlockId> {
        self.order
            .iter()
            .copied()
            .find(|&bb| self.block(bb).name == name)
    }

    /// The unique non-catch block with no predecessors
    pub fn entry(&self) -> Option<BlockId> {
        self.order
            .iter()
            .copied()
            .find(|&bb| !self.block(bb).is_catch() && self.block(bb).preds.is_empty())
    }

    /// Create a detached body block; [`Method::add`] and friends insert it
    /// into the method order.
    pub fn new_block(&mut self, label: &str) -> BlockId {
        let name = self.slots.block_name(label);
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BlockData {
            name,
            kind: BlockKind::Body,
            preds: Vec::new(),
            succs: Vec::new(),
            handlers: Vec::new(),
            insts: Vec::new(),
            users: Vec::new(),
            owned: false,
        });
        id
    }

    /// Create a detached catch block for the given exception type
    pub fn new_catch_block(&mut self, label: &str, exception: Type) -> BlockId {
        let id = self.new_block(label);
        self.block_mut(id).kind = BlockKind::Catch {
            exception,
            throwers: Vec::new(),
        };
        id
    }

    fn check_unowned(&self, bb: BlockId) -> Result<()> {
        if self.block(bb).owned {
            return Err(Error::ownership(format!(
                "block {} already belongs to method {}",
                self.block(bb).name,
                self.name
            )));
        }
        Ok(())
    }

    fn take_ownership(&mut self, bb: BlockId) {
        self.block_mut(bb).owned = true;
        add_unique(&mut self.block_mut(bb).users, BlockUser::Method);
    }

    /// Append a block to the method order
    pub fn add(&mut self, bb: BlockId) -> Result<()> {
        self.check_unowned(bb)?;
        self.order.push(bb);
        self.take_ownership(bb);
        Ok(())
    }

    /// Insert a block immediately before an existing one
    pub fn add_before(&mut self, before: BlockId, bb: BlockId) -> Result<()> {
        self.check_unowned(bb)?;
        let index = self.position(before).ok_or_else(|| {
            Error::ownership(format!(
                "block {} does not belong to method {}",
                self.block(before).name,
                self.name
            ))
        })?;
        self.order.insert(index, bb);
        self.take_ownership(bb);
        Ok(())
    }

    /// Insert a block immediately after an existing one
    pub fn add_after(&mut self, after: BlockId, bb: BlockId) -> Result<()> {
        self.check_unowned(bb)?;
        let index = self.position(after).ok_or_else(|| {
            Error::ownership(format!(
                "block {} does not belong to method {}",
                self.block(after).name,
                self.name
            ))
        })?;
        self.order.insert(index + 1, bb);
        self.take_ownership(bb);
        Ok(())
    }

    /// Detach a block from the method order. No-op if not owned.
    pub fn remove(&mut self, bb: BlockId) {
        if let Some(index) = self.position(bb) {
            self.order.remove(index);
            remove_item(&mut self.catch_entries, &bb);
            self.block_mut(bb).owned = false;
            remove_item(&mut self.block_mut(bb).users, &BlockUser::Method);
        }
    }

    /// Register an owned catch block as a catch entry
    pub fn register_catch_entry(&mut self, bb: BlockId) -> Result<()> {
        if !self.block(bb).owned || !self.block(bb).is_catch() {
            return Err(Error::ownership(format!(
                "block {} is not an owned catch block of method {}",
                self.block(bb).name,
                self.name
            )));
        }
        add_unique(&mut self.catch_entries, bb);
        Ok(())
    }

    pub fn catch_entries(&self) -> &[BlockId] {
        &self.catch_entries
    }

    /// All blocks belonging to exception-handler chains
    ///
    /// Computed by a fixpoint traversal seeded at the registered catch
    /// entries, following successors while every predecessor is itself a
    /// catch block; handler chains are not necessarily contiguous in the
    /// stored block order.
    pub fn catch_blocks(&self) -> Vec<BlockId> {
        let mut catch_map: HashMap<BlockId, bool> = HashMap::new();
        let mut visited = Vec::new();
        let mut result = Vec::new();
        let mut queue: Vec<BlockId> = self.catch_entries.clone();
        let mut head = 0;
        while head < queue.len() {
            let top = queue[head];
            head += 1;
            let is_catch = self
                .block(top)
                .preds
                .iter()
                .all(|pred| *catch_map.entry(*pred).or_insert(false));
            if is_catch && !visited.contains(&top) {
                result.push(top);
                queue.extend(self.block(top).succs.iter().copied());
                catch_map.insert(top, true);
                visited.push(top);
            }
        }
        result
    }

    /// Blocks not belonging to any exception-handler chain
    pub fn body_blocks(&self) -> Vec<BlockId> {
        let catches = self.catch_blocks();
        self.order
            .iter()
            .copied()
            .filter(|bb| !catches.contains(bb))
            .collect()
    }

    /// Entries of a catch block: the predecessors (outside the thrower set)
    /// of its throwers
    pub fn catch_entries_of(&self, catch: BlockId) -> Vec<BlockId> {
        let throwers = self.block(catch).throwers();
        let mut entries = Vec::new();
        for &thrower in throwers {
            for &pred in &self.block(thrower).preds {
                if !throwers.contains(&pred) {
                    add_unique(&mut entries, pred);
                }
            }
        }
        entries
    }

    /// Throwers and entries of a catch block together
    pub fn catch_all_predecessors(&self, catch: BlockId) -> Vec<BlockId> {
        let mut all = self.block(catch).throwers().to_vec();
        for entry in self.catch_entries_of(catch) {
            add_unique(&mut all, entry);
        }
        all
    }

    // ---- edge primitives -----------------------------------------------

    /// Add the normal control edge `from -> to`, maintaining both edge sets
    /// and the block-user relation on both endpoints. Idempotent.
    pub fn link(&mut self, from: BlockId, to: BlockId) {
        add_unique(&mut self.block_mut(from).succs, to);
        add_unique(&mut self.block_mut(to).users, BlockUser::Block(from));
        add_unique(&mut self.block_mut(to).preds, from);
        add_unique(&mut self.block_mut(from).users, BlockUser::Block(to));
    }

    /// Remove the normal control edge `from -> to`. Returns whether the
    /// edge existed.
    pub fn unlink(&mut self, from: BlockId, to: BlockId) -> bool {
        let removed = remove_item(&mut self.block_mut(from).succs, &to);
        remove_item(&mut self.block_mut(to).preds, &from);
        if removed {
            remove_item(&mut self.block_mut(to).users, &BlockUser::Block(from));
            remove_item(&mut self.block_mut(from).users, &BlockUser::Block(to));
        }
        removed
    }

    /// Attach a catch block as exception handler of `bb`, recording `bb` as
    /// a thrower of the handler. Idempotent.
    pub fn attach_handler(&mut self, bb: BlockId, catch: BlockId) -> Result<()> {
        if !self.block(catch).is_catch() {
            return Err(Error::ownership(format!(
                "block {} is not a catch block",
                self.block(catch).name
            )));
        }
        add_unique(&mut self.block_mut(bb).handlers, catch);
        add_unique(&mut self.block_mut(catch).users, BlockUser::Block(bb));
        if let BlockKind::Catch { throwers, .. } = &mut self.block_mut(catch).kind {
            add_unique(throwers, bb);
        }
        add_unique(&mut self.block_mut(bb).users, BlockUser::Block(catch));
        Ok(())
    }

    /// Detach a handler from `bb`. Returns whether it was attached.
    pub fn detach_handler(&mut self, bb: BlockId, catch: BlockId) -> bool {
        let removed = remove_item(&mut self.block_mut(bb).handlers, &catch);
        if removed {
            if let BlockKind::Catch { throwers, .. } = &mut self.block_mut(catch).kind {
                remove_item(throwers, &bb);
            }
            remove_item(&mut self.block_mut(catch).users, &BlockUser::Block(bb));
            remove_item(&mut self.block_mut(bb).users, &BlockUser::Block(catch));
        }
        removed
    }

    // ---- instruction list manipulation ---------------------------------

    /// Append an instruction to a block, re-parenting it
    pub fn append(&mut self, bb: BlockId, inst: InstId) {
        self.block_mut(bb).insts.push(inst);
        self.inst_mut(inst).parent = Some(bb);
    }

    /// Splice instructions immediately before an anchor instruction
    pub fn insert_before(&mut self, bb: BlockId, anchor: InstId, insts: &[InstId]) -> Result<()> {
        let mut index = self
            .block(bb)
            .insts
            .iter()
            .position(|&entry| entry == anchor)
            .ok_or_else(|| {
                Error::internal(format!(
                    "anchor instruction not in block {}",
                    self.block(bb).name
                ))
            })?;
        for &inst in insts {
            self.block_mut(bb).insts.insert(index, inst);
            self.inst_mut(inst).parent = Some(bb);
            index += 1;
        }
        Ok(())
    }

    /// Splice instructions immediately after an anchor instruction
    pub fn insert_after(&mut self, bb: BlockId, anchor: InstId, insts: &[InstId]) -> Result<()> {
        let mut index = self
            .block(bb)
            .insts
            .iter()
            .position(|&entry| entry == anchor)
            .ok_or_else(|| {
                Error::internal(format!(
                    "anchor instruction not in block {}",
                    self.block(bb).name
                ))
            })?
            + 1;
        for &inst in insts {
            self.block_mut(bb).insts.insert(index, inst);
            self.inst_mut(inst).parent = Some(bb);
            index += 1;
        }
        Ok(())
    }

    /// Detach an instruction from its block without touching its operand
    /// registrations
    pub fn remove_inst(&mut self, inst: InstId) {
        if let Some(bb) = self.inst(inst).parent {
            remove_item(&mut self.block_mut(bb).insts, &inst);
            self.inst_mut(inst).parent = None;
        }
    }

    /// Detach an instruction and sever every reference it holds: operand
    /// use registrations, successor block uses and phi predecessor uses.
    /// Remaining users of the instruction's own result are the caller's
    /// responsibility.
    pub fn erase_inst(&mut self, inst: InstId) {
        self.remove_inst(inst);
        let ops = std::mem::take(&mut self.inst_mut(inst).ops);
        for op in &ops {
            // a value referenced from several slots is deregistered once
            remove_item(self.value_users_mut(*op), &inst);
        }
        let succs = std::mem::take(&mut self.inst_mut(inst).succs);
        for succ in succs {
            remove_item(&mut self.block_mut(succ).users, &BlockUser::Inst(inst));
        }
        let phi_preds = match &mut self.inst_mut(inst).kind {
            InstKind::Phi { preds } => std::mem::take(preds),
            _ => Vec::new(),
        };
        for pred in phi_preds {
            remove_item(&mut self.block_mut(pred).users, &BlockUser::Inst(inst));
        }
    }

    /// Terminator of a block, if its last instruction is one
    pub fn terminator(&self, bb: BlockId) -> Option<InstId> {
        let &last = self.block(bb).insts.last()?;
        if self.inst(last).is_terminator() {
            Some(last)
        } else {
            None
        }
    }

    // ---- use-def rewiring ----------------------------------------------

    /// Replace every operand slot of `user` equal to `from` with `to`,
    /// swapping use registrations. No-op if `from` is not an operand.
    pub fn replace_uses_of(&mut self, user: InstId, from: Value, to: Value) {
        let mut swapped = false;
        for index in 0..self.inst(user).ops.len() {
            if self.insts[user.index()].ops[index] == from {
                self.insts[user.index()].ops[index] = to;
                swapped = true;
            }
        }
        if swapped {
            remove_item(self.value_users_mut(from), &user);
            add_unique(self.value_users_mut(to), user);
        }
    }

    /// Broadcast [`Method::replace_uses_of`] to every current user of
    /// `from`. Self-replacement is a programming error.
    pub fn replace_all_uses(&mut self, from: Value, to: Value) {
        debug_assert_ne!(from, to, "replacing a value with itself");
        let users = self.value_users(from).to_vec();
        for user in users {
            self.replace_uses_of(user, from, to);
        }
    }

    /// Replace every block operand of `user` (terminator successor slots
    /// and phi predecessor slots) equal to `from` with `to`. No-op if
    /// absent.
    pub fn inst_replace_block_uses(&mut self, user: InstId, from: BlockId, to: BlockId) {
        let mut swapped = false;
        for index in 0..self.inst(user).succs.len() {
            if self.insts[user.index()].succs[index] == from {
                self.insts[user.index()].succs[index] = to;
                swapped = true;
            }
        }
        if let InstKind::Phi { preds } = &mut self.insts[user.index()].kind {
            for slot in preds.iter_mut() {
                if *slot == from {
                    *slot = to;
                    swapped = true;
                }
            }
        }
        if swapped {
            remove_item(&mut self.block_mut(from).users, &BlockUser::Inst(user));
            add_unique(&mut self.block_mut(to).users, BlockUser::Inst(user));
        }
    }

    /// Resolve which relation of `bb` contains `from` (predecessor,
    /// successor or handler), swap it for `to` there, and forward the
    /// rewrite to the block's terminator so terminator operands and the
    /// successor set cannot drift apart.
    pub fn block_replace_uses(&mut self, bb: BlockId, from: BlockId, to: BlockId) -> Result<()> {
        if self.block(bb).preds.contains(&from) {
            self.unlink(from, bb);
            self.link(to, bb);
        } else if self.block(bb).succs.contains(&from) {
            self.unlink(bb, from);
            self.link(bb, to);
        } else if self.block(bb).handlers.contains(&from) {
            self.detach_handler(bb, from);
            self.attach_handler(bb, to)?;
        }
        if self.block(bb).is_catch() && self.block(bb).throwers().contains(&from) {
            self.detach_handler(from, bb);
            self.attach_handler(to, bb)?;
        }
        if let Some(term) = self.terminator(bb) {
            self.inst_replace_block_uses(term, from, to);
        }
        Ok(())
    }

    /// Rewrite every referrer of block `from` to reference `to` instead
    pub fn replace_all_block_uses(&mut self, from: BlockId, to: BlockId) -> Result<()> {
        debug_assert_ne!(from, to, "replacing a block with itself");
        let users = self.block(from).users.clone();
        for user in users {
            match user {
                BlockUser::Inst(inst) => self.inst_replace_block_uses(inst, from, to),
                BlockUser::Block(bb) => self.block_replace_uses(bb, from, to)?,
                BlockUser::Method => {
                    if let Some(index) = self.position(from) {
                        self.order[index] = to;
                        self.block_mut(from).owned = false;
                        remove_item(&mut self.block_mut(from).users, &BlockUser::Method);
                        self.block_mut(to).owned = true;
                        add_unique(&mut self.block_mut(to).users, BlockUser::Method);
                    }
                }
            }
        }
        Ok(())
    }

    // ---- instruction factory -------------------------------------------

    fn push_inst(
        &mut self,
        name: Name,
        ty: Type,
        kind: InstKind,
        ops: Vec<Value>,
        succs: Vec<BlockId>,
    ) -> InstId {
        let id = InstId(self.insts.len() as u32);
        self.insts.push(InstData {
            name,
            ty,
            kind,
            ops: ops.clone(),
            succs: succs.clone(),
            parent: None,
            users: Vec::new(),
        });
        for op in ops {
            add_unique(self.value_users_mut(op), id);
        }
        for succ in succs {
            add_unique(&mut self.block_mut(succ).users, BlockUser::Inst(id));
        }
        id
    }

    fn slot(&mut self) -> Name {
        Name::Slot(self.slots.value_slot())
    }

    pub fn new_binary(&mut self, op: BinaryOp, lhs: Value, rhs: Value) -> InstId {
        let name = self.slot();
        let ty = self.value_type(lhs);
        self.push_inst(name, ty, InstKind::Binary { op }, vec![lhs, rhs], vec![])
    }

    pub fn new_unary(&mut self, op: UnaryOp, operand: Value) -> InstId {
        let name = self.slot();
        let ty = match op {
            UnaryOp::Length => Type::Int,
            UnaryOp::Neg => self.value_type(operand),
        };
        self.push_inst(name, ty, InstKind::Unary { op }, vec![operand], vec![])
    }

    pub fn new_cmp(&mut self, op: CmpOp, lhs: Value, rhs: Value) -> InstId {
        let name = self.slot();
        self.push_inst(
            name,
            op.result_type(),
            InstKind::Cmp { op },
            vec![lhs, rhs],
            vec![],
        )
    }

    pub fn new_cast(&mut self, ty: Type, operand: Value) -> InstId {
        let name = self.slot();
        self.push_inst(name, ty, InstKind::Cast, vec![operand], vec![])
    }

    pub fn new_new(&mut self, ty: Type) -> InstId {
        let name = self.slot();
        self.push_inst(name, ty, InstKind::New, vec![], vec![])
    }

    pub fn new_array_load(&mut self, array: Value, index: Value) -> InstId {
        let name = self.slot();
        let ty = self.value_type(array).element().unwrap_or(Type::Null);
        self.push_inst(name, ty, InstKind::ArrayLoad, vec![array, index], vec![])
    }

    pub fn new_array_store(&mut self, array: Value, index: Value, value: Value) -> InstId {
        self.push_inst(
            Name::Undefined,
            Type::Void,
            InstKind::ArrayStore,
            vec![array, index, value],
            vec![],
        )
    }

    pub fn new_field_load(&mut self, field: impl Into<String>, ty: Type, owner: Option<Value>) -> InstId {
        let name = self.slot();
        let has_owner = owner.is_some();
        let ops = owner.into_iter().collect();
        self.push_inst(
            name,
            ty,
            InstKind::FieldLoad {
                field: field.into(),
                has_owner,
            },
            ops,
            vec![],
        )
    }

    pub fn new_field_store(
        &mut self,
        field: impl Into<String>,
        owner: Option<Value>,
        value: Value,
    ) -> InstId {
        let has_owner = owner.is_some();
        let mut ops: Vec<Value> = owner.into_iter().collect();
        ops.push(value);
        self.push_inst(
            Name::Undefined,
            Type::Void,
            InstKind::FieldStore {
                field: field.into(),
                has_owner,
            },
            ops,
            vec![],
        )
    }

    pub fn new_call(&mut self, callee: impl Into<String>, ret: Type, args: Vec<Value>) -> InstId {
        let name = if ret.is_void() {
            Name::Undefined
        } else {
            self.slot()
        };
        self.push_inst(
            name,
            ret,
            InstKind::Call {
                callee: callee.into(),
            },
            args,
            vec![],
        )
    }

    /// Exception entry marker; the first instruction of a catch block
    pub fn new_catch(&mut self, ty: Type) -> InstId {
        let name = self.slot();
        self.push_inst(name, ty, InstKind::Catch, vec![], vec![])
    }

    /// Merge instruction with one incoming value per predecessor block
    pub fn new_phi(&mut self, ty: Type, incomings: Vec<(BlockId, Value)>) -> InstId {
        let name = self.slot();
        let (preds, ops): (Vec<BlockId>, Vec<Value>) = incomings.into_iter().unzip();
        let id = self.push_inst(name, ty, InstKind::Phi { preds: preds.clone() }, ops, vec![]);
        for pred in preds {
            add_unique(&mut self.block_mut(pred).users, BlockUser::Inst(id));
        }
        id
    }

    /// Incoming (predecessor, value) pairs of a phi; empty for other kinds
    pub fn phi_incomings(&self, phi: InstId) -> Vec<(BlockId, Value)> {
        let data = self.inst(phi);
        data.phi_predecessors()
            .iter()
            .copied()
            .zip(data.ops.iter().copied())
            .collect()
    }

    pub fn new_jump(&mut self, target: BlockId) -> InstId {
        self.push_inst(Name::Undefined, Type::Void, InstKind::Jump, vec![], vec![target])
    }

    pub fn new_branch(&mut self, cond: Value, if_true: BlockId, if_false: BlockId) -> InstId {
        self.push_inst(
            Name::Undefined,
            Type::Void,
            InstKind::Branch,
            vec![cond],
            vec![if_true, if_false],
        )
    }

    pub fn new_return(&mut self, value: Option<Value>) -> InstId {
        let ty = match value {
            Some(value) => self.value_type(value),
            None => Type::Void,
        };
        self.push_inst(
            Name::Undefined,
            ty,
            InstKind::Return,
            value.into_iter().collect(),
            vec![],
        )
    }

    pub fn new_throw(&mut self, exception: Value) -> InstId {
        self.push_inst(
            Name::Undefined,
            Type::Void,
            InstKind::Throw,
            vec![exception],
            vec![],
        )
    }

    pub fn new_unreachable(&mut self) -> InstId {
        self.push_inst(Name::Undefined, Type::Void, InstKind::Unreachable, vec![], vec![])
    }

    // ---- printing ------------------------------------------------------

    /// Printable form of a value operand
    pub fn display_value(&self, value: Value) -> String {
        match value {
            Value::Arg(ArgId(index)) => self.args[index as usize].name.to_string(),
            Value::Const(ConstId(index)) => self.consts[index as usize].value.to_string(),
            Value::Inst(inst) => self.inst(inst).name.to_string(),
        }
    }

    /// Printable form of one instruction
    pub fn display_inst(&self, id: InstId) -> String {
        let inst = self.inst(id);
        let op = |index: usize| self.display_value(inst.ops[index]);
        let block_name = |bb: BlockId| format!("%{}", self.block(bb).name);
        match &inst.kind {
            InstKind::Binary { op: opcode } => {
                format!("{} = {} {} {}", inst.name, op(0), opcode, op(1))
            }
            InstKind::Unary { op: opcode } => format!("{} = {} {}", inst.name, opcode, op(0)),
            InstKind::Cmp { op: opcode } => {
                format!("{} = {} {} {}", inst.name, op(0), opcode, op(1))
            }
            InstKind::Cast => format!("{} = ({}) {}", inst.name, inst.ty, op(0)),
            InstKind::New => format!("{} = new {}", inst.name, inst.ty),
            InstKind::ArrayLoad => format!("{} = {}[{}]", inst.name, op(0), op(1)),
            InstKind::ArrayStore => format!("{}[{}] = {}", op(0), op(1), op(2)),
            InstKind::FieldLoad { field, has_owner } => {
                if *has_owner {
                    format!("{} = {}.{}", inst.name, op(0), field)
                } else {
                    format!("{} = {}", inst.name, field)
                }
            }
            InstKind::FieldStore { field, has_owner } => {
                if *has_owner {
                    format!("{}.{} = {}", op(0), field, op(1))
                } else {
                    format!("{} = {}", field, op(0))
                }
            }
            InstKind::Call { callee } => {
                let args = (0..inst.ops.len())
                    .map(op)
                    .collect::<Vec<_>>()
                    .join(", ");
                match inst.name {
                    Name::Undefined => format!("call {}({})", callee, args),
                    _ => format!("{} = call {}({})", inst.name, callee, args),
                }
            }
            InstKind::Catch => format!("{} = catch {}", inst.name, inst.ty),
            InstKind::Phi { preds } => {
                let incomings = preds
                    .iter()
                    .enumerate()
                    .map(|(index, &pred)| format!("{} -> {}", block_name(pred), op(index)))
                    .collect::<Vec<_>>()
                    .join("; ");
                format!("{} = phi {{{}}}", inst.name, incomings)
            }
            InstKind::Jump => format!("goto {}", block_name(inst.succs[0])),
            InstKind::Branch => format!(
                "if ({}) goto {} else {}",
                op(0),
                block_name(inst.succs[0]),
                block_name(inst.succs[1])
            ),
            InstKind::Return => match inst.ops.first() {
                Some(_) => format!("return {}", op(0)),
                None => "return".to_string(),
            },
            InstKind::Throw => format!("throw {}", op(0)),
            InstKind::Unreachable => "unreachable".to_string(),
        }
    }

    /// Printable form of one block, predecessors included
    pub fn display_block(&self, bb: BlockId) -> String {
        let block = self.block(bb);
        let mut out = String::new();
        let heading = if block.is_catch() {
            let throwers = block
                .throwers()
                .iter()
                .map(|&t| self.block(t).name.clone())
                .collect::<Vec<_>>()
                .join(", ");
            format!("%{}: \t//catches from {}\n", block.name, throwers)
        } else {
            let preds = block
                .preds
                .iter()
                .map(|&p| self.block(p).name.clone())
                .collect::<Vec<_>>()
                .join(", ");
            format!("%{}: \t//predecessors {}\n", block.name, preds)
        };
        out.push_str(&heading);
        for &inst in &block.insts {
            out.push('\t');
            out.push_str(&self.display_inst(inst));
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        for &bb in &self.order {
            writeln!(f, "{}", self.display_block(bb))?;
        }
        Ok(())
    }
}
