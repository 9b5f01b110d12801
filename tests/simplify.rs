use jvm_cfg_rs::analysis::{
    find_natural_loops, normalize_loops, DiagnosticKind, IrVerifier, LoopForest, LoopSimplifier,
    NaturalLoop,
};
use jvm_cfg_rs::{BlockId, InstId, Method, Type, Value};
use std::collections::{BTreeSet, HashSet};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn block_set(blocks: &[BlockId]) -> BTreeSet<BlockId> {
    blocks.iter().copied().collect()
}

/// Every edge must be recorded on both endpoints
fn assert_edges_mutual(method: &Method) {
    for &bb in method.blocks() {
        for &succ in method.block(bb).successors() {
            assert!(
                method.block(succ).predecessors().contains(&bb),
                "edge %{} -> %{} missing on the predecessor side",
                method.block(bb).name(),
                method.block(succ).name()
            );
        }
        for &pred in method.block(bb).predecessors() {
            assert!(
                method.block(pred).successors().contains(&bb),
                "edge %{} -> %{} missing on the successor side",
                method.block(pred).name(),
                method.block(bb).name()
            );
        }
    }
}

fn phis_of(method: &Method, bb: BlockId) -> Vec<InstId> {
    method
        .block(bb)
        .instructions()
        .iter()
        .copied()
        .filter(|&inst| method.inst(inst).is_phi())
        .collect()
}

/// Three predecessors jumping straight at a self-looping header
fn scenario_a_method() -> (Method, [BlockId; 3], BlockId) {
    let mut method = Method::new("scenario_a", vec![], Type::Void);
    let p1 = method.new_block("p1");
    let p2 = method.new_block("p2");
    let p3 = method.new_block("p3");
    let header = method.new_block("header");
    let exit = method.new_block("exit");
    for bb in [p1, p2, p3, header, exit] {
        method.add(bb).unwrap();
    }
    for pred in [p1, p2, p3] {
        let jump = method.new_jump(header);
        method.append(pred, jump);
        method.link(pred, header);
    }
    let cond = method.const_bool(true);
    let branch = method.new_branch(cond, header, exit);
    method.append(header, branch);
    method.link(header, header);
    method.link(header, exit);
    let ret = method.new_return(None);
    method.append(exit, ret);
    (method, [p1, p2, p3], header)
}

#[test]
fn test_scenario_a_preheader_collects_outside_predecessors() {
    init();
    let (mut method, preds, header) = scenario_a_method();

    let (forest, report) = normalize_loops(&mut method).unwrap();

    assert_eq!(report.preheaders, 1);
    assert_eq!(report.latches, 0);
    assert!(report.diagnostics.is_empty());

    let preheader = method.block_by_name("loop.preheader").unwrap();
    assert_eq!(block_set(method.block(preheader).predecessors()), block_set(&preds));
    assert_eq!(method.block(preheader).successors(), &[header]);

    // the header keeps only the preheader as predecessor from outside the loop
    let root = forest.get(forest.roots()[0]);
    assert_eq!(root.entries(&method), vec![preheader]);
    assert!(root.has_preheader(&method));
    assert_eq!(root.preheader(&method), Some(preheader));

    // redirected jumps now target the preheader
    for pred in preds {
        let term = method.terminator(pred).unwrap();
        assert_eq!(method.inst(term).successors(), &[preheader]);
    }

    // the preheader sits immediately before the header in block order
    assert_eq!(
        method.position(preheader).unwrap() + 1,
        method.position(header).unwrap()
    );
    assert_edges_mutual(&method);
}

/// Two back edges carrying distinct phi incomings
fn scenario_b_method() -> (Method, BlockId, BlockId, BlockId, Value, Value, Value) {
    let mut method = Method::new("scenario_b", vec![], Type::Void);
    let entry = method.new_block("entry");
    let header = method.new_block("header");
    let split = method.new_block("split");
    let l1 = method.new_block("l1");
    let l2 = method.new_block("l2");
    let exit = method.new_block("exit");
    for bb in [entry, header, split, l1, l2, exit] {
        method.add(bb).unwrap();
    }
    let v0 = method.const_int(0);
    let v1 = method.const_int(1);
    let v2 = method.const_int(2);
    let cond = method.const_bool(true);

    let jump = method.new_jump(header);
    method.append(entry, jump);
    method.link(entry, header);

    let phi = method.new_phi(Type::Int, vec![(entry, v0), (l1, v1), (l2, v2)]);
    method.append(header, phi);
    let branch = method.new_branch(cond, split, exit);
    method.append(header, branch);
    method.link(header, split);
    method.link(header, exit);

    let branch = method.new_branch(cond, l1, l2);
    method.append(split, branch);
    method.link(split, l1);
    method.link(split, l2);

    for latch in [l1, l2] {
        let back = method.new_jump(header);
        method.append(latch, back);
        method.link(latch, header);
    }
    let ret = method.new_return(None);
    method.append(exit, ret);
    (method, header, l1, l2, v0, v1, v2)
}

#[test]
fn test_scenario_b_latch_merges_back_edge_phis() {
    init();
    let (mut method, header, l1, l2, v0, v1, v2) = scenario_b_method();
    let entry = method.entry().unwrap();

    let (forest, report) = normalize_loops(&mut method).unwrap();

    assert_eq!(report.preheaders, 0);
    assert_eq!(report.latches, 1);

    let latch = method.block_by_name("loop.latch").unwrap();
    assert_eq!(block_set(method.block(latch).predecessors()), block_set(&[l1, l2]));
    assert_eq!(method.block(latch).successors(), &[header]);

    // the header phi now has exactly one incoming keyed on the latch
    let header_phis = phis_of(&method, header);
    assert_eq!(header_phis.len(), 1);
    let incomings = method.phi_incomings(header_phis[0]);
    assert_eq!(incomings.len(), 2);
    assert!(incomings.contains(&(entry, v0)));
    let (_, merged) = *incomings.iter().find(|(pred, _)| *pred == latch).unwrap();

    // and the merged value is a new phi inside the latch combining v1/v2
    let latch_phis = phis_of(&method, latch);
    assert_eq!(latch_phis.len(), 1);
    assert_eq!(merged, Value::Inst(latch_phis[0]));
    let latch_incomings = method.phi_incomings(latch_phis[0]);
    assert!(latch_incomings.contains(&(l1, v1)));
    assert!(latch_incomings.contains(&(l2, v2)));

    // the latch sits immediately after the last back-edge source
    assert_eq!(
        method.position(latch).unwrap(),
        method.position(l2).unwrap() + 1
    );

    // and joined the loop body
    let root = forest.get(forest.roots()[0]);
    assert!(root.contains(latch));
    assert!(root.has_latch(&method));
    assert_eq!(root.latch(&method), Some(latch));
    assert_edges_mutual(&method);
}

#[test]
fn test_back_edge_phis_with_common_value_collapse_without_a_merge() {
    init();
    let (mut method, header, l1, l2, v0, v1, _) = scenario_b_method();
    let entry = method.entry().unwrap();

    // rebuild the header phi so both back edges carry the same value
    let old = phis_of(&method, header)[0];
    let replacement = method.new_phi(Type::Int, vec![(entry, v0), (l1, v1), (l2, v1)]);
    method.insert_before(header, old, &[replacement]).unwrap();
    method.erase_inst(old);

    let (_, report) = normalize_loops(&mut method).unwrap();
    assert_eq!(report.latches, 1);

    let latch = method.block_by_name("loop.latch").unwrap();
    // common value folds straight into the header phi; no merge phi needed
    assert!(phis_of(&method, latch).is_empty());
    let incomings = method.phi_incomings(phis_of(&method, header)[0]);
    assert!(incomings.contains(&(latch, v1)));
}

#[test]
fn test_scenario_c_canonical_loop_is_left_untouched() {
    init();
    let mut method = Method::new("scenario_c", vec![], Type::Void);
    let entry = method.new_block("entry");
    let header = method.new_block("header");
    let latch = method.new_block("latch");
    let exit = method.new_block("exit");
    for bb in [entry, header, latch, exit] {
        method.add(bb).unwrap();
    }
    let v0 = method.const_int(0);
    let v1 = method.const_int(1);
    let cond = method.const_bool(true);

    let jump = method.new_jump(header);
    method.append(entry, jump);
    method.link(entry, header);

    let phi = method.new_phi(Type::Int, vec![(entry, v0), (latch, v1)]);
    method.append(header, phi);
    let branch = method.new_branch(cond, latch, exit);
    method.append(header, branch);
    method.link(header, latch);
    method.link(header, exit);

    let back = method.new_jump(header);
    method.append(latch, back);
    method.link(latch, header);
    let ret = method.new_return(None);
    method.append(exit, ret);

    let blocks_before = method.blocks().to_vec();
    let incomings_before = method.phi_incomings(phi);

    let (_, first) = normalize_loops(&mut method).unwrap();
    let (_, second) = normalize_loops(&mut method).unwrap();

    for report in [first, second] {
        assert_eq!(report.preheaders, 0);
        assert_eq!(report.latches, 0);
        assert!(!report.changed());
    }
    assert_eq!(method.blocks(), blocks_before.as_slice());
    // the phi was neither rebuilt nor reordered
    assert_eq!(phis_of(&method, header), vec![phi]);
    assert_eq!(method.phi_incomings(phi), incomings_before);
}

#[test]
fn test_normalization_is_idempotent_after_a_rewrite() {
    init();
    let (mut method, ..) = scenario_b_method();

    let (_, first) = normalize_loops(&mut method).unwrap();
    assert!(first.changed());
    let blocks_after_first = method.blocks().to_vec();

    let (_, second) = normalize_loops(&mut method).unwrap();
    assert!(!second.changed());
    assert_eq!(method.blocks(), blocks_after_first.as_slice());
}

#[test]
fn test_phi_incomings_match_predecessors_after_rewrite() {
    init();
    let (mut method, ..) = scenario_b_method();
    normalize_loops(&mut method).unwrap();

    for &bb in method.blocks() {
        if method.block(bb).is_catch() {
            continue;
        }
        for phi in phis_of(&method, bb) {
            assert_eq!(
                block_set(method.inst(phi).phi_predecessors()),
                block_set(method.block(bb).predecessors()),
                "phi incomings diverge from predecessors in %{}",
                method.block(bb).name()
            );
        }
    }
}

/// Scenario D: a back-edge source with an attached exception handler
fn scenario_d_method() -> (Method, BlockId, BlockId, BlockId, Value) {
    let mut method = Method::new("scenario_d", vec![], Type::Void);
    let entry = method.new_block("entry");
    let header = method.new_block("header");
    let split = method.new_block("split");
    let l1 = method.new_block("l1");
    let l2 = method.new_block("l2");
    let exit = method.new_block("exit");
    let handler = method.new_catch_block("handler", Type::throwable());
    for bb in [entry, header, split, l1, l2, exit, handler] {
        method.add(bb).unwrap();
    }
    let v1 = method.const_int(1);
    let v9 = method.const_int(9);
    let cond = method.const_bool(true);

    let jump = method.new_jump(header);
    method.append(entry, jump);
    method.link(entry, header);

    let branch = method.new_branch(cond, split, exit);
    method.append(header, branch);
    method.link(header, split);
    method.link(header, exit);

    let branch = method.new_branch(cond, l1, l2);
    method.append(split, branch);
    method.link(split, l1);
    method.link(split, l2);

    // l1 may throw into the handler; its entry set is {split}
    method.attach_handler(l1, handler).unwrap();
    for latch in [l1, l2] {
        let back = method.new_jump(header);
        method.append(latch, back);
        method.link(latch, header);
    }

    let caught = method.new_catch(Type::throwable());
    method.append(handler, caught);
    let phi = method.new_phi(Type::Int, vec![(l1, v1), (split, v9)]);
    method.append(handler, phi);
    let jump = method.new_jump(exit);
    method.append(handler, jump);
    method.link(handler, exit);
    method.register_catch_entry(handler).unwrap();

    let ret = method.new_return(None);
    method.append(exit, ret);
    (method, l1, l2, handler, v1)
}

#[test]
fn test_scenario_d_handler_follows_the_redirected_back_edge() {
    init();
    let (mut method, l1, l2, handler, v1) = scenario_d_method();

    let (_, report) = normalize_loops(&mut method).unwrap();
    assert_eq!(report.latches, 1);

    let latch = method.block_by_name("loop.latch").unwrap();

    // the synthesized latch throws on behalf of the relocated edge
    assert!(method.block(handler).throwers().contains(&latch));
    assert!(method.block(latch).handlers().contains(&handler));
    // the original thrower keeps its handler for the instructions before
    // the redirected edge
    assert!(method.block(l1).handlers().contains(&handler));

    // the handler phi gained an incoming from the latch carrying the value
    // it already had for l1
    let handler_phis = phis_of(&method, handler);
    assert_eq!(handler_phis.len(), 1);
    let incomings = method.phi_incomings(handler_phis[0]);
    assert!(incomings.contains(&(latch, v1)));
    assert!(incomings.contains(&(l1, v1)));

    assert_eq!(block_set(method.block(latch).predecessors()), block_set(&[l1, l2]));
    assert_edges_mutual(&method);
}

#[test]
fn test_degenerate_loop_is_reported_and_skipped() {
    init();
    let mut method = Method::new("degenerate", vec![], Type::Void);
    let header = method.new_block("header");
    let body = method.new_block("body");
    let exit = method.new_block("exit");
    for bb in [header, body, exit] {
        method.add(bb).unwrap();
    }
    let cond = method.const_bool(true);
    let branch = method.new_branch(cond, body, exit);
    method.append(header, branch);
    method.link(header, body);
    method.link(header, exit);
    let back = method.new_jump(header);
    method.append(body, back);
    method.link(body, header);
    let ret = method.new_return(None);
    method.append(exit, ret);

    // the header has no predecessors outside the body at all
    let raw = vec![NaturalLoop {
        header,
        body: HashSet::from([header, body]),
    }];
    let (mut forest, diagnostics) = LoopForest::build(&method, raw);
    assert!(diagnostics.is_empty());

    let blocks_before = method.blocks().to_vec();
    let report = LoopSimplifier::new(&mut method).run(&mut forest).unwrap();

    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].kind, DiagnosticKind::DegenerateLoop);
    assert_eq!(report.diagnostics[0].block, "header");
    assert!(!report.changed());
    assert_eq!(method.blocks(), blocks_before.as_slice());
}

#[test]
fn test_outer_loop_with_two_back_edges_and_canonical_inner_loop() {
    init();
    let mut method = Method::new("nested_two_latches", vec![], Type::Void);
    let entry = method.new_block("entry");
    let outer = method.new_block("outer.header");
    let inner = method.new_block("inner.header");
    let body = method.new_block("inner.body");
    let c1 = method.new_block("outer.latch1");
    let c2 = method.new_block("outer.latch2");
    let exit = method.new_block("exit");
    for bb in [entry, outer, inner, body, c1, c2, exit] {
        method.add(bb).unwrap();
    }
    let cond = method.const_bool(true);

    let jump = method.new_jump(outer);
    method.append(entry, jump);
    method.link(entry, outer);

    let branch = method.new_branch(cond, inner, exit);
    method.append(outer, branch);
    method.link(outer, inner);
    method.link(outer, exit);

    let jump = method.new_jump(body);
    method.append(inner, jump);
    method.link(inner, body);

    let branch = method.new_branch(cond, inner, c1);
    method.append(body, branch);
    method.link(body, inner);
    method.link(body, c1);

    let branch = method.new_branch(cond, outer, c2);
    method.append(c1, branch);
    method.link(c1, outer);
    method.link(c1, c2);

    let back = method.new_jump(outer);
    method.append(c2, back);
    method.link(c2, outer);

    let ret = method.new_return(None);
    method.append(exit, ret);

    let (forest, report) = normalize_loops(&mut method).unwrap();

    // only the outer loop needed a latch; the inner one was canonical
    assert_eq!(report.latches, 1);
    assert_eq!(report.preheaders, 0);

    let latch = method.block_by_name("loop.latch").unwrap();
    assert_eq!(block_set(method.block(latch).predecessors()), block_set(&[c1, c2]));

    let root = forest.get(forest.roots()[0]);
    assert_eq!(root.header(), outer);
    assert!(root.has_latch(&method));
    assert!(root.contains(latch));
    let sub = forest.get(root.subloops()[0]);
    assert_eq!(sub.header(), inner);
    assert!(sub.has_latch(&method));
    assert_eq!(sub.latches(&method), vec![body]);
    assert_edges_mutual(&method);
}

#[test]
fn test_verifier_rejects_terminator_edge_drift() {
    init();
    let mut method = Method::new("broken", vec![], Type::Void);
    let a = method.new_block("a");
    let b = method.new_block("b");
    let c = method.new_block("c");
    for bb in [a, b, c] {
        method.add(bb).unwrap();
    }
    // terminator says c, edge set says b
    let jump = method.new_jump(c);
    method.append(a, jump);
    method.link(a, b);
    for bb in [b, c] {
        let ret = method.new_return(None);
        method.append(bb, ret);
    }

    let result = IrVerifier::new(&method).verify();
    assert!(matches!(result, Err(jvm_cfg_rs::Error::Verifier { .. })));
}

#[test]
fn test_verifier_rejects_phi_predecessor_mismatch() {
    init();
    let mut method = Method::new("broken_phi", vec![], Type::Void);
    let a = method.new_block("a");
    let b = method.new_block("b");
    let stranger = method.new_block("stranger");
    for bb in [a, b, stranger] {
        method.add(bb).unwrap();
    }
    let jump = method.new_jump(b);
    method.append(a, jump);
    method.link(a, b);
    let v0 = method.const_int(0);
    let phi = method.new_phi(Type::Int, vec![(stranger, v0)]);
    method.append(b, phi);
    let ret = method.new_return(None);
    method.append(b, ret);
    let ret = method.new_return(None);
    method.append(stranger, ret);

    let result = IrVerifier::new(&method).verify();
    assert!(matches!(result, Err(jvm_cfg_rs::Error::Verifier { .. })));
}

#[test]
fn test_report_serializes_for_tooling() {
    init();
    let (mut method, ..) = scenario_b_method();
    let (_, report) = normalize_loops(&mut method).unwrap();

    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains("\"latches\":1"));
    assert!(json.contains("\"diagnostics\":[]"));
}

#[test]
fn test_detector_and_forest_survive_loopless_methods() {
    init();
    let mut method = Method::new("straight_line", vec![], Type::Int);
    let entry = method.new_block("entry");
    method.add(entry).unwrap();
    let v0 = method.const_int(7);
    let ret = method.new_return(Some(v0));
    method.append(entry, ret);

    assert!(find_natural_loops(&method).is_empty());
    let (forest, report) = normalize_loops(&mut method).unwrap();
    assert!(forest.is_empty());
    assert!(!report.changed());
}
