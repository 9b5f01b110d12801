//! Structural IR verification
//!
//! Walks every block and instruction of a method and asserts the graph
//! relations are mutually consistent. A failure here signals a bug in a
//! transform, not a property of the input program, so the first violation
//! is reported as a fatal error with the offending block or instruction
//! identity. No repair is attempted.

use crate::error::{Error, Result};
use crate::ir::{BlockId, Method};
use std::collections::BTreeSet;

/// Consistency checker for a method's CFG
pub struct IrVerifier<'m> {
    method: &'m Method,
}

impl<'m> IrVerifier<'m> {
    pub fn new(method: &'m Method) -> Self {
        IrVerifier { method }
    }

    /// Check the whole method, reporting the first violation
    pub fn verify(&self) -> Result<()> {
        for &bb in self.method.blocks() {
            self.verify_block(bb)?;
        }
        Ok(())
    }

    fn location(&self, bb: BlockId) -> String {
        format!("%{}", self.method.block(bb).name())
    }

    fn verify_block(&self, bb: BlockId) -> Result<()> {
        let block = self.method.block(bb);

        // instruction containment: recorded parent, exactly one occurrence
        for &inst in block.instructions() {
            if self.method.inst(inst).parent() != Some(bb) {
                return Err(Error::verifier(
                    self.location(bb),
                    format!(
                        "instruction {} does not record this block as parent",
                        self.method.inst(inst).name()
                    ),
                ));
            }
            let occurrences = block
                .instructions()
                .iter()
                .filter(|&&entry| entry == inst)
                .count();
            if occurrences != 1 {
                return Err(Error::verifier(
                    self.location(bb),
                    format!(
                        "instruction {} appears {} times in its block",
                        self.method.inst(inst).name(),
                        occurrences
                    ),
                ));
            }
        }

        // edge mutuality, both directions
        for &succ in block.successors() {
            if !self.method.block(succ).predecessors().contains(&bb) {
                return Err(Error::verifier(
                    self.location(bb),
                    format!(
                        "successor %{} does not list this block as predecessor",
                        self.method.block(succ).name()
                    ),
                ));
            }
        }
        for &pred in block.predecessors() {
            if !self.method.block(pred).successors().contains(&bb) {
                return Err(Error::verifier(
                    self.location(bb),
                    format!(
                        "predecessor %{} does not list this block as successor",
                        self.method.block(pred).name()
                    ),
                ));
            }
        }
        for &handler in block.handlers() {
            if !self.method.block(handler).throwers().contains(&bb) {
                return Err(Error::verifier(
                    self.location(bb),
                    format!(
                        "handler %{} does not list this block as thrower",
                        self.method.block(handler).name()
                    ),
                ));
            }
        }
        for &thrower in block.throwers() {
            if !self.method.block(thrower).handlers().contains(&bb) {
                return Err(Error::verifier(
                    self.location(bb),
                    format!(
                        "thrower %{} does not list this block as handler",
                        self.method.block(thrower).name()
                    ),
                ));
            }
        }

        // exactly one terminator, at the end, operands matching the edges
        for (index, &inst) in block.instructions().iter().enumerate() {
            if self.method.inst(inst).is_terminator() && index + 1 != block.len() {
                return Err(Error::verifier(
                    self.location(bb),
                    "terminator is not the last instruction".to_string(),
                ));
            }
        }
        let term = self.method.terminator(bb).ok_or_else(|| {
            Error::verifier(self.location(bb), "block has no terminator".to_string())
        })?;
        let term_targets: BTreeSet<BlockId> =
            self.method.inst(term).successors().iter().copied().collect();
        let edge_targets: BTreeSet<BlockId> = block.successors().iter().copied().collect();
        if term_targets != edge_targets {
            return Err(Error::verifier(
                self.location(bb),
                "terminator block operands do not match the successor set".to_string(),
            ));
        }

        // phi incoming sets match the actual predecessor sets
        for &inst in block.instructions() {
            if !self.method.inst(inst).is_phi() {
                continue;
            }
            let phi_preds: BTreeSet<BlockId> = self
                .method
                .inst(inst)
                .phi_predecessors()
                .iter()
                .copied()
                .collect();
            if block.is_catch() {
                // throwers must all be keyed; entries may or may not carry
                // a value into the handler
                let throwers: BTreeSet<BlockId> = block.throwers().iter().copied().collect();
                let all: BTreeSet<BlockId> = self
                    .method
                    .catch_all_predecessors(bb)
                    .into_iter()
                    .collect();
                if !throwers.is_subset(&phi_preds) || !phi_preds.is_subset(&all) {
                    return Err(Error::verifier(
                        self.location(bb),
                        format!(
                            "phi {} incoming blocks do not cover the handler's throwers",
                            self.method.inst(inst).name()
                        ),
                    ));
                }
            } else {
                let actual: BTreeSet<BlockId> = block.predecessors().iter().copied().collect();
                if phi_preds != actual {
                    return Err(Error::verifier(
                        self.location(bb),
                        format!(
                            "phi {} incoming blocks do not match the predecessor set",
                            self.method.inst(inst).name()
                        ),
                    ));
                }
            }
        }

        Ok(())
    }
}
