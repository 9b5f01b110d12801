//! Instruction model
//!
//! An instruction is a value with an ordered operand list. Terminators
//! additionally reference successor blocks as block operands; phi
//! instructions carry a predecessor block list parallel to their operands.
//! Construction and mutation go through the owning [`Method`](super::Method)
//! so that use-def registration stays consistent.

use super::types::Type;
use super::value::{BlockId, InstId, Name, Value};
use std::fmt;

/// Binary arithmetic and bitwise opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Ushr,
    And,
    Or,
    Xor,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Ushr => ">>>",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
        };
        write!(f, "{}", symbol)
    }
}

/// Unary opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Length,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Neg => write!(f, "-"),
            UnaryOp::Length => write!(f, "length"),
        }
    }
}

/// Comparison opcodes
///
/// The boolean comparisons produce `bool`; the three-way `Cmp`/`Cmpg`/`Cmpl`
/// forms produce `int`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Cmp,
    Cmpg,
    Cmpl,
}

impl CmpOp {
    pub fn result_type(&self) -> Type {
        match self {
            CmpOp::Cmp | CmpOp::Cmpg | CmpOp::Cmpl => Type::Int,
            _ => Type::Bool,
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Gt => ">",
            CmpOp::Le => "<=",
            CmpOp::Ge => ">=",
            CmpOp::Cmp => "cmp",
            CmpOp::Cmpg => "cmpg",
            CmpOp::Cmpl => "cmpl",
        };
        write!(f, "{}", symbol)
    }
}

/// Kind of instruction, including terminators
///
/// Operand meaning per kind (operands live in [`InstData::operands`]):
/// `Binary`/`Cmp`: `[lhs, rhs]`; `Unary`/`Cast`: `[operand]`;
/// `ArrayLoad`: `[array, index]`; `ArrayStore`: `[array, index, value]`;
/// `FieldLoad`: `[owner?]`; `FieldStore`: `[owner?, value]`;
/// `Call`: argument list; `Phi`: one incoming value per predecessor;
/// `Branch`: `[condition]`; `Return`: `[]` or `[value]`; `Throw`:
/// `[exception]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstKind {
    Binary { op: BinaryOp },
    Unary { op: UnaryOp },
    Cmp { op: CmpOp },
    Cast,
    New,
    ArrayLoad,
    ArrayStore,
    FieldLoad { field: String, has_owner: bool },
    FieldStore { field: String, has_owner: bool },
    Call { callee: String },
    /// Exception entry marker, the first instruction of a catch block
    Catch,
    /// Merge instruction selecting a value by incoming predecessor
    Phi { preds: Vec<BlockId> },
    Jump,
    Branch,
    Return,
    Throw,
    Unreachable,
}

impl InstKind {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Jump
                | InstKind::Branch
                | InstKind::Return
                | InstKind::Throw
                | InstKind::Unreachable
        )
    }
}

/// Arena entry for one instruction
#[derive(Debug, Clone)]
pub struct InstData {
    pub(crate) name: Name,
    pub(crate) ty: Type,
    pub(crate) kind: InstKind,
    pub(crate) ops: Vec<Value>,
    /// Successor block operands; non-empty only for terminators
    pub(crate) succs: Vec<BlockId>,
    pub(crate) parent: Option<BlockId>,
    pub(crate) users: Vec<InstId>,
}

impl InstData {
    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn kind(&self) -> &InstKind {
        &self.kind
    }

    pub fn operands(&self) -> &[Value] {
        &self.ops
    }

    /// Successor block operands of a terminator; empty otherwise
    pub fn successors(&self) -> &[BlockId] {
        &self.succs
    }

    /// Block currently containing this instruction
    pub fn parent(&self) -> Option<BlockId> {
        self.parent
    }

    /// Instructions using this instruction's result
    pub fn users(&self) -> &[InstId] {
        &self.users
    }

    pub fn is_terminator(&self) -> bool {
        self.kind.is_terminator()
    }

    pub fn is_phi(&self) -> bool {
        matches!(self.kind, InstKind::Phi { .. })
    }

    /// Predecessor block list of a phi; empty for any other kind
    pub fn phi_predecessors(&self) -> &[BlockId] {
        match &self.kind {
            InstKind::Phi { preds } => preds,
            _ => &[],
        }
    }
}
