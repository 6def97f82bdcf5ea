//! Human-readable tree dumps for debugging.

use crate::node::NodeId;
use crate::tree::Ast;
use std::fmt::Write;

impl Ast {
    /// Renders the subtree at `id` one node per line, children indented.
    pub fn dump_ast(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.dump_node(id, 0, "", &mut out);
        out
    }

    fn dump_node(&self, id: NodeId, depth: usize, prefix: &str, out: &mut String) {
        let node = &self[id];
        let _ = write!(out, "{:indent$}{prefix}{}", "", node.kind.type_name(), indent = depth * 2);
        if !node.name.is_empty() {
            let _ = write!(out, " <{}>", node.name);
        }
        for (flag, set) in [
            ("input", node.is_input),
            ("output", node.is_output),
            ("reg", node.is_reg),
            ("signed", node.is_signed),
            ("string", node.is_string),
            ("unsized", node.is_unsized),
        ] {
            if set {
                let _ = write!(out, " {flag}");
            }
        }
        if node.port_id > 0 {
            let _ = write!(out, " port={}", node.port_id);
        }
        if node.range_valid {
            let _ = write!(out, " range=[{}:{}]", node.range_left, node.range_right);
        }
        if node.is_const() == 1 {
            let _ = write!(out, " bits={:?}", node.bits);
        }
        if node.is_const() == 2 {
            let _ = write!(out, " real={}", node.realvalue);
        }
        if let Some(target) = node.id2ast {
            let _ = write!(out, " id2ast=#{}", target.as_raw());
        }
        if node.in_lvalue {
            let _ = write!(out, " lvalue");
        }
        if node.in_param {
            let _ = write!(out, " param");
        }
        out.push('\n');
        for (key, &value) in &node.attributes {
            self.dump_node(value, depth + 1, &format!("(* {key} *) "), out);
        }
        for &child in &node.children {
            self.dump_node(child, depth + 1, "", out);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{Builder, NodeKind};

    #[test]
    fn dump_lists_children_indented() {
        let mut ast = crate::Ast::new();
        let mut b = Builder::new(&mut ast);
        let a = b.ident("a");
        let one = b.sized(3, 5);
        let sum = b.binop(NodeKind::Add, a, one);
        let text = ast.dump_ast(sum);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "add");
        assert_eq!(lines[1], "  identifier <a>");
        assert!(lines[2].starts_with("  constant range=[2:0] bits=3'101"));
    }
}
