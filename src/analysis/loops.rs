//! Loop nesting forest
//!
//! Consumes raw (header, body) pairs from a natural-loop detector and
//! arranges them into a forest by candidate-ancestor elimination: a loop
//! whose header is contained in exactly one other loop's body attaches
//! there; every attachment strips the new parent from the remaining
//! candidate sets, collapsing ancestor chains one level per round. A loop
//! that never resolves to a single ancestor indicates inconsistent detector
//! output; it is reported and excluded from the forest.

use super::natural_loops::NaturalLoop;
use super::{Diagnostic, DiagnosticKind};
use crate::ir::{BlockId, Method};

/// Id of a loop inside its forest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopId(pub(crate) usize);

impl LoopId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A natural loop: header block plus body block set, with forest links
#[derive(Debug, Clone)]
pub struct Loop {
    header: BlockId,
    body: Vec<BlockId>,
    parent: Option<LoopId>,
    subloops: Vec<LoopId>,
}

impl Loop {
    pub fn header(&self) -> BlockId {
        self.header
    }

    pub fn body(&self) -> &[BlockId] {
        &self.body
    }

    pub fn parent(&self) -> Option<LoopId> {
        self.parent
    }

    pub fn subloops(&self) -> &[LoopId] {
        &self.subloops
    }

    pub fn contains(&self, bb: BlockId) -> bool {
        self.body.contains(&bb)
    }

    /// Add a block to the body (the canonicalizer adds the synthesized
    /// latch)
    pub fn add_block(&mut self, bb: BlockId) {
        if !self.body.contains(&bb) {
            self.body.push(bb);
        }
    }

    /// Body blocks with a successor outside the body
    pub fn exiting_blocks(&self, method: &Method) -> Vec<BlockId> {
        self.body
            .iter()
            .copied()
            .filter(|&bb| {
                method
                    .block(bb)
                    .successors()
                    .iter()
                    .any(|succ| !self.body.contains(succ))
            })
            .collect()
    }

    /// Body blocks with the header as successor (back-edge sources)
    pub fn latches(&self, method: &Method) -> Vec<BlockId> {
        self.body
            .iter()
            .copied()
            .filter(|&bb| method.block(bb).successors().contains(&self.header))
            .collect()
    }

    /// Header predecessors outside the body
    pub fn entries(&self, method: &Method) -> Vec<BlockId> {
        method
            .block(self.header)
            .predecessors()
            .iter()
            .copied()
            .filter(|pred| !self.body.contains(pred))
            .collect()
    }

    /// Whether the loop already has exactly one entry edge
    pub fn has_preheader(&self, method: &Method) -> bool {
        self.entries(method).len() == 1
    }

    /// The single outside predecessor of the header, if canonical
    pub fn preheader(&self, method: &Method) -> Option<BlockId> {
        let entries = self.entries(method);
        match entries.as_slice() {
            [preheader] => Some(*preheader),
            _ => None,
        }
    }

    /// Whether the loop already has exactly one back edge
    pub fn has_latch(&self, method: &Method) -> bool {
        self.latches(method).len() == 1
    }

    /// The single back-edge source, if canonical
    pub fn latch(&self, method: &Method) -> Option<BlockId> {
        let latches = self.latches(method);
        match latches.as_slice() {
            [latch] => Some(*latch),
            _ => None,
        }
    }
}

/// Loop nesting forest of one method
#[derive(Debug, Default)]
pub struct LoopForest {
    loops: Vec<Loop>,
    roots: Vec<LoopId>,
}

impl LoopForest {
    /// Build the forest from raw detector output
    ///
    /// Returns the forest plus diagnostics for descriptions that could not
    /// be placed (duplicate headers, unresolvable ancestor sets); those
    /// loops are excluded and left untouched by later passes.
    pub fn build(method: &Method, raw: Vec<NaturalLoop>) -> (LoopForest, Vec<Diagnostic>) {
        let mut diagnostics = Vec::new();
        let mut loops: Vec<Loop> = Vec::new();
        for natural in raw {
            if loops.iter().any(|entry| entry.header == natural.header) {
                diagnostics.push(Diagnostic {
                    kind: DiagnosticKind::MalformedLoopForest,
                    block: method.block(natural.header).name().to_string(),
                    message: "duplicate loop header in detector output".to_string(),
                });
                continue;
            }
            let mut body: Vec<BlockId> = natural.body.into_iter().collect();
            body.sort_by_key(|&bb| method.position(bb));
            loops.push(Loop {
                header: natural.header,
                body,
                parent: None,
                subloops: Vec::new(),
            });
        }

        // candidate ancestors: every other loop whose body holds our header
        let mut candidates: Vec<Vec<LoopId>> = (0..loops.len())
            .map(|child| {
                (0..loops.len())
                    .filter(|&parent| parent != child && loops[parent].contains(loops[child].header))
                    .map(LoopId)
                    .collect()
            })
            .collect();

        let mut forest = LoopForest {
            loops: Vec::new(),
            roots: Vec::new(),
        };
        let mut settled = vec![false; loops.len()];
        for child in 0..loops.len() {
            if candidates[child].is_empty() {
                forest.roots.push(LoopId(child));
                settled[child] = true;
            }
        }

        let mut remaining: Vec<usize> = (0..loops.len()).filter(|&child| !settled[child]).collect();
        while !remaining.is_empty() {
            let mut attached = Vec::new();
            let mut new_parents = Vec::new();
            for &child in &remaining {
                if let [parent] = candidates[child].as_slice() {
                    let parent = *parent;
                    loops[child].parent = Some(parent);
                    loops[parent.index()].subloops.push(LoopId(child));
                    attached.push(child);
                    new_parents.push(parent);
                }
            }
            if attached.is_empty() {
                for &child in &remaining {
                    diagnostics.push(Diagnostic {
                        kind: DiagnosticKind::MalformedLoopForest,
                        block: method.block(loops[child].header).name().to_string(),
                        message: format!(
                            "cannot resolve a single ancestor among {} candidates",
                            candidates[child].len()
                        ),
                    });
                }
                log::warn!(
                    "loop forest: {} unresolvable loop descriptions excluded",
                    remaining.len()
                );
                // excluded loops keep no forest links
                for &child in &remaining {
                    loops[child].parent = None;
                }
                remaining.clear();
                break;
            }
            remaining.retain(|child| !attached.contains(child));
            for &child in &remaining {
                candidates[child].retain(|candidate| !new_parents.contains(candidate));
            }
        }

        forest.loops = loops;
        (forest, diagnostics)
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// Top-level loops of the forest
    pub fn roots(&self) -> &[LoopId] {
        &self.roots
    }

    pub fn get(&self, id: LoopId) -> &Loop {
        &self.loops[id.index()]
    }

    pub fn get_mut(&mut self, id: LoopId) -> &mut Loop {
        &mut self.loops[id.index()]
    }

    /// Loops reachable from the roots, subloops before their parents
    pub fn postorder(&self) -> Vec<LoopId> {
        let mut order = Vec::new();
        for &root in &self.roots {
            self.postorder_from(root, &mut order);
        }
        order
    }

    fn postorder_from(&self, id: LoopId, order: &mut Vec<LoopId>) {
        for &sub in &self.loops[id.index()].subloops {
            self.postorder_from(sub, order);
        }
        order.push(id);
    }

    /// The innermost forest loop containing a block, if any
    pub fn innermost_containing(&self, bb: BlockId) -> Option<LoopId> {
        let mut best: Option<LoopId> = None;
        for id in self.postorder() {
            let candidate = self.get(id);
            if candidate.contains(bb) {
                let smaller = match best {
                    Some(current) => candidate.body().len() < self.get(current).body().len(),
                    None => true,
                };
                if smaller {
                    best = Some(id);
                }
            }
        }
        best
    }
}
