//! CFG analysis and normalization passes
//!
//! This module contains the loop machinery built on top of the IR: natural
//! loop detection, loop forest construction, loop canonicalization and the
//! structural verifier that guards it.

pub mod loops;
pub mod natural_loops;
pub mod simplify;
pub mod verifier;

use crate::error::Result;
use crate::ir::Method;
use serde::Serialize;

pub use loops::{Loop, LoopForest, LoopId};
pub use natural_loops::{find_natural_loops, NaturalLoop};
pub use simplify::LoopSimplifier;
pub use verifier::IrVerifier;

/// Kind of a non-fatal malformed-input condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiagnosticKind {
    /// The forest builder could not resolve a single ancestor for a loop
    MalformedLoopForest,
    /// A loop header with no predecessors outside the body was reported to
    /// the canonicalizer
    DegenerateLoop,
}

/// A non-fatal diagnostic collected while processing one method
///
/// Diagnostics never abort the batch; the affected loop is skipped and the
/// remaining loops are still processed.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Name of the block the condition is anchored at (usually the header)
    pub block: String,
    pub message: String,
}

/// Summary of one canonicalization run
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimplifyReport {
    /// Number of preheader blocks synthesized
    pub preheaders: usize,
    /// Number of latch blocks synthesized
    pub latches: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl SimplifyReport {
    /// Whether the run changed the method at all
    pub fn changed(&self) -> bool {
        self.preheaders > 0 || self.latches > 0
    }
}

/// Detect loops, build the forest and canonicalize every loop of a method
///
/// This is the whole pipeline: natural-loop detection over the current CFG,
/// forest construction, preheader/latch insertion and a final structural
/// verification. Returns the forest (with `has_preheader`/`has_latch` now
/// true for every resolved loop) and the run report.
pub fn normalize_loops(method: &mut Method) -> Result<(LoopForest, SimplifyReport)> {
    let raw = find_natural_loops(method);
    log::debug!("{}: {} natural loops", method.name(), raw.len());
    let (mut forest, forest_diagnostics) = LoopForest::build(method, raw);
    let mut report = LoopSimplifier::new(method).run(&mut forest)?;
    let mut diagnostics = forest_diagnostics;
    diagnostics.append(&mut report.diagnostics);
    report.diagnostics = diagnostics;
    Ok((forest, report))
}
