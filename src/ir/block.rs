//! Basic block model
//!
//! A block is an ordered instruction sequence plus the block-level edge
//! relations: predecessors, successors and exception handlers. All three
//! are insertion-ordered sets maintained bidirectionally by the owning
//! method's edge primitives ([`Method::link`](super::Method::link),
//! [`Method::unlink`](super::Method::unlink),
//! [`Method::attach_handler`](super::Method::attach_handler),
//! [`Method::detach_handler`](super::Method::detach_handler)); nothing else
//! mutates them.
//!
//! Blocks are also values with respect to block-level users (terminators,
//! phis, other blocks, the method order list), so edge rewrites can be
//! broadcast through a single replace-uses operation.

use super::types::Type;
use super::value::{BlockId, InstId};

/// A block-level user of a basic block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockUser {
    /// A terminator referencing the block as a successor operand, or a phi
    /// referencing it as an incoming predecessor
    Inst(InstId),
    /// Another block referencing it through an edge or handler relation
    Block(BlockId),
    /// The owning method's ordered block list
    Method,
}

/// Body or catch variant of a block
#[derive(Debug, Clone)]
pub enum BlockKind {
    Body,
    /// Catch blocks track the blocks that may transfer control here
    /// exceptionally (their throwers) instead of ordinary predecessors
    Catch {
        exception: Type,
        throwers: Vec<BlockId>,
    },
}

/// Arena entry for one basic block
#[derive(Debug, Clone)]
pub struct BlockData {
    pub(crate) name: String,
    pub(crate) kind: BlockKind,
    pub(crate) preds: Vec<BlockId>,
    pub(crate) succs: Vec<BlockId>,
    pub(crate) handlers: Vec<BlockId>,
    pub(crate) insts: Vec<InstId>,
    pub(crate) users: Vec<BlockUser>,
    /// Whether the block is currently in the method's ordered block list
    pub(crate) owned: bool,
}

impl BlockData {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn predecessors(&self) -> &[BlockId] {
        &self.preds
    }

    pub fn successors(&self) -> &[BlockId] {
        &self.succs
    }

    /// Catch blocks reachable from this block via an exceptional edge
    pub fn handlers(&self) -> &[BlockId] {
        &self.handlers
    }

    pub fn instructions(&self) -> &[InstId] {
        &self.insts
    }

    pub fn users(&self) -> &[BlockUser] {
        &self.users
    }

    pub fn is_catch(&self) -> bool {
        matches!(self.kind, BlockKind::Catch { .. })
    }

    /// Exception type of a catch block
    pub fn exception(&self) -> Option<&Type> {
        match &self.kind {
            BlockKind::Catch { exception, .. } => Some(exception),
            BlockKind::Body => None,
        }
    }

    /// Throwers of a catch block; empty for body blocks
    pub fn throwers(&self) -> &[BlockId] {
        match &self.kind {
            BlockKind::Catch { throwers, .. } => throwers,
            BlockKind::Body => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }

    /// Whether this block is in its method's ordered block list
    pub fn is_owned(&self) -> bool {
        self.owned
    }
}
