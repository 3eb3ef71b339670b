//! Text renderings of a call tree.

use std::fmt::Write;

use crate::model::{CallTree, CallTreeNode};

impl CallTree {
    /// Folded-stack text: one `frame;frame;frame count` line per call path
    /// that has samples ending exactly there.
    ///
    /// This is the input format of `flamegraph.pl` and most flame-graph
    /// viewers. `;` inside frame names is replaced with `:`.
    pub fn to_collapsed(&self) -> String {
        let mut out = String::new();
        let mut path = Vec::new();
        for child in self.root().children() {
            collapse(child, &mut path, &mut out);
        }
        out
    }

    /// Indented tree with sample counts, heaviest callee first.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} samples", self.count());
        for child in sorted_children(self.root()) {
            render(child, 1, &mut out);
        }
        out
    }
}

fn collapse(node: &CallTreeNode, path: &mut Vec<String>, out: &mut String) {
    path.push(node.location.to_string().replace(';', ":"));
    let own = node.self_count();
    if own > 0 {
        let _ = writeln!(out, "{} {own}", path.join(";"));
    }
    for child in node.children() {
        collapse(child, path, out);
    }
    path.pop();
}

fn sorted_children(node: &CallTreeNode) -> Vec<&CallTreeNode> {
    let mut children: Vec<_> = node.children().collect();
    children.sort_by(|a, b| b.count.cmp(&a.count));
    children
}

fn render(node: &CallTreeNode, depth: usize, out: &mut String) {
    let _ = writeln!(
        out,
        "{:indent$}{:>6}  {}",
        "",
        node.count,
        node.location,
        indent = depth * 2
    );
    for child in sorted_children(node) {
        render(child, depth + 1, out);
    }
}
