//! Loop canonicalization
//!
//! Rewrites every loop of a forest into single-preheader/single-latch form.
//! Outside entry edges are redirected into a synthesized `loop.preheader`
//! block and back edges into a synthesized `loop.latch` block; merge
//! instructions in the header (and in affected catch blocks) are repaired so
//! their incoming sets keep matching the actual predecessor sets, and
//! exception handlers move along with the redirected edges.
//!
//! A loop whose header has no predecessors outside the body is a degenerate
//! description; it is reported and left unsimplified. Structural damage,
//! by contrast, is a bug in this pass and surfaces as a fatal verifier
//! error.

use super::loops::{LoopForest, LoopId};
use super::verifier::IrVerifier;
use super::{Diagnostic, DiagnosticKind, SimplifyReport};
use crate::error::{Error, Result};
use crate::ir::{BlockId, InstId, Method, Value};

/// In-place loop canonicalization pass over one method
pub struct LoopSimplifier<'m> {
    method: &'m mut Method,
    diagnostics: Vec<Diagnostic>,
    preheaders: usize,
    latches: usize,
}

impl<'m> LoopSimplifier<'m> {
    pub fn new(method: &'m mut Method) -> Self {
        LoopSimplifier {
            method,
            diagnostics: Vec::new(),
            preheaders: 0,
            latches: 0,
        }
    }

    /// Canonicalize every loop in the forest, subloops first, then verify
    /// the whole method
    pub fn run(mut self, forest: &mut LoopForest) -> Result<SimplifyReport> {
        for root in forest.roots().to_vec() {
            self.visit(forest, root)?;
        }
        IrVerifier::new(self.method).verify()?;
        Ok(SimplifyReport {
            preheaders: self.preheaders,
            latches: self.latches,
            diagnostics: self.diagnostics,
        })
    }

    fn visit(&mut self, forest: &mut LoopForest, id: LoopId) -> Result<()> {
        for sub in forest.get(id).subloops().to_vec() {
            self.visit(forest, sub)?;
        }
        let header = forest.get(id).header();
        if forest.get(id).entries(self.method).is_empty() {
            let name = self.method.block(header).name().to_string();
            log::error!("cannot simplify loop at %{}: header has no entries", name);
            self.diagnostics.push(Diagnostic {
                kind: DiagnosticKind::DegenerateLoop,
                block: name,
                message: "loop header has no predecessors outside the body".to_string(),
            });
            return Ok(());
        }
        self.build_preheader(forest, id)?;
        self.build_latch(forest, id)
    }

    /// Redirect the edge `target -> from` to `target -> to`, keeping the
    /// terminator's block operands in sync with the edge sets
    fn remap_blocks(&mut self, target: BlockId, from: BlockId, to: BlockId) -> Result<()> {
        self.method.unlink(target, from);
        self.method.link(target, to);
        let term = self.method.terminator(target).ok_or_else(|| {
            Error::internal(format!(
                "block %{} has no terminator to redirect",
                self.method.block(target).name()
            ))
        })?;
        self.method.inst_replace_block_uses(term, from, to);
        Ok(())
    }

    /// Rebuild every phi of `target` so that its incomings from the `from`
    /// blocks collapse into a single incoming from `to`. Incomings carrying
    /// one common value are folded directly; otherwise a new merge
    /// instruction combining them is synthesized inside `to`.
    fn remap_phis(&mut self, target: BlockId, from: &[BlockId], to: BlockId) -> Result<()> {
        let phis: Vec<InstId> = self
            .method
            .block(target)
            .instructions()
            .iter()
            .copied()
            .filter(|&inst| self.method.inst(inst).is_phi())
            .collect();
        for phi in phis {
            let incomings = self.method.phi_incomings(phi);
            let from_incomings: Vec<(BlockId, Value)> = incomings
                .iter()
                .copied()
                .filter(|(pred, _)| from.contains(pred))
                .collect();
            if from_incomings.is_empty() {
                continue;
            }
            let mut from_values: Vec<Value> = Vec::new();
            for &(_, value) in &from_incomings {
                if !from_values.contains(&value) {
                    from_values.push(value);
                }
            }
            let ty = self.method.inst(phi).ty().clone();
            let to_value = match from_values.as_slice() {
                [value] => *value,
                _ => {
                    let merge = self.method.new_phi(ty.clone(), from_incomings);
                    self.method.append(to, merge);
                    Value::Inst(merge)
                }
            };

            let mut target_incomings: Vec<(BlockId, Value)> = incomings
                .into_iter()
                .filter(|(pred, _)| !from.contains(pred))
                .collect();
            target_incomings.push((to, to_value));
            let replacement = self.method.new_phi(ty, target_incomings);
            self.method.insert_before(target, phi, &[replacement])?;
            self.method
                .replace_all_uses(Value::Inst(phi), Value::Inst(replacement));
            self.method.erase_inst(phi);
        }
        Ok(())
    }

    /// Register `new` as an additional thrower of `catch` (the redirected
    /// edge out of `original` can now throw from `new`) and extend every
    /// phi in the handler with an incoming from `new` carrying the value it
    /// already had for `original`.
    fn map_to_catch(&mut self, original: BlockId, new: BlockId, catch: BlockId) -> Result<()> {
        self.method.attach_handler(new, catch)?;

        let phis: Vec<InstId> = self
            .method
            .block(catch)
            .instructions()
            .iter()
            .copied()
            .filter(|&inst| self.method.inst(inst).is_phi())
            .collect();
        for phi in phis {
            let mut incomings = self.method.phi_incomings(phi);
            let value = incomings
                .iter()
                .find(|(pred, _)| *pred == original)
                .map(|&(_, value)| value)
                .ok_or_else(|| {
                    Error::internal(format!(
                        "phi in catch block %{} has no incoming for thrower %{}",
                        self.method.block(catch).name(),
                        self.method.block(original).name()
                    ))
                })?;
            // a second redirected thrower overwrites the incoming for `new`
            match incomings.iter_mut().find(|(pred, _)| *pred == new) {
                Some(entry) => entry.1 = value,
                None => incomings.push((new, value)),
            }
            let ty = self.method.inst(phi).ty().clone();
            let replacement = self.method.new_phi(ty, incomings);
            self.method.insert_before(catch, phi, &[replacement])?;
            self.method
                .replace_all_uses(Value::Inst(phi), Value::Inst(replacement));
            self.method.erase_inst(phi);
        }
        Ok(())
    }

    /// Ensure the loop header has exactly one predecessor outside the body
    fn build_preheader(&mut self, forest: &mut LoopForest, id: LoopId) -> Result<()> {
        let header = forest.get(id).header();
        let outside = forest.get(id).entries(self.method);
        if outside.len() == 1 {
            return Ok(());
        }
        log::debug!(
            "inserting preheader for loop at %{} ({} entries)",
            self.method.block(header).name(),
            outside.len()
        );

        let preheader = self.method.new_block("loop.preheader");
        for &pred in &outside {
            self.remap_blocks(pred, header, preheader)?;
        }
        self.method.link(preheader, header);

        self.remap_phis(header, &outside, preheader)?;
        for catch in self.method.block(header).handlers().to_vec() {
            self.map_to_catch(header, preheader, catch)?;
        }
        let jump = self.method.new_jump(header);
        self.method.append(preheader, jump);
        self.method.add_before(header, preheader)?;
        self.preheaders += 1;
        Ok(())
    }

    /// Ensure the loop has exactly one back-edge source
    fn build_latch(&mut self, forest: &mut LoopForest, id: LoopId) -> Result<()> {
        let header = forest.get(id).header();
        let latches = forest.get(id).latches(self.method);
        if latches.len() <= 1 {
            return Ok(());
        }
        log::debug!(
            "inserting latch for loop at %{} ({} back edges)",
            self.method.block(header).name(),
            latches.len()
        );

        // catch blocks whose entry set covered all back-edge sources, taken
        // before any edge moves
        let catch_with_entry: Vec<BlockId> = self
            .method
            .catch_entries()
            .to_vec()
            .into_iter()
            .filter(|&catch| {
                let entries = self.method.catch_entries_of(catch);
                latches.iter().all(|source| entries.contains(source))
            })
            .collect();

        let latch = self.method.new_block("loop.latch");
        for &source in &latches {
            self.remap_blocks(source, header, latch)?;
            for catch in self.method.block(source).handlers().to_vec() {
                self.map_to_catch(source, latch, catch)?;
            }
        }
        self.method.link(latch, header);

        self.remap_phis(header, &latches, latch)?;
        for catch in catch_with_entry {
            self.remap_phis(catch, &latches, latch)?;
        }

        let jump = self.method.new_jump(header);
        self.method.append(latch, jump);
        let anchor = latches
            .iter()
            .copied()
            .max_by_key(|&source| self.method.position(source))
            .ok_or_else(|| Error::internal("latch insertion without back-edge sources"))?;
        self.method.add_after(anchor, latch)?;
        forest.get_mut(id).add_block(latch);
        self.latches += 1;
        Ok(())
    }
}
