//! DOT export for method CFGs
//!
//! Normal control edges are solid, exceptional edges dashed.

use super::method::Method;

/// Generate a DOT representation of a method's CFG
pub fn to_dot(method: &Method) -> String {
    let mut dot = String::new();
    dot.push_str("digraph CFG {\n");
    dot.push_str("  rankdir=TB;\n");
    dot.push_str("  node [shape=box, fontname=\"monospace\"];\n\n");

    for &bb in method.blocks() {
        let block = method.block(bb);
        let mut label = format!("{}:\\l", block.name());
        for &inst in block.instructions() {
            label.push_str("  ");
            label.push_str(&method.display_inst(inst).replace('"', "\\\""));
            label.push_str("\\l");
        }
        dot.push_str(&format!("  \"{}\" [label=\"{}\"];\n", block.name(), label));
    }

    dot.push('\n');

    for &bb in method.blocks() {
        let block = method.block(bb);
        for &succ in block.successors() {
            dot.push_str(&format!(
                "  \"{}\" -> \"{}\";\n",
                block.name(),
                method.block(succ).name()
            ));
        }
        for &handler in block.handlers() {
            dot.push_str(&format!(
                "  \"{}\" -> \"{}\" [style=dashed, color=red];\n",
                block.name(),
                method.block(handler).name()
            ));
        }
    }

    dot.push_str("}\n");
    dot
}
