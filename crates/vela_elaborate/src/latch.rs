//! Detection of variables a combinational process does not always assign.

use vela_ast::{Ast, NodeId, NodeKind};

/// Returns true if `var` keeps its value on some path through `process`,
/// which makes it a latch. Edge-triggered processes never infer latches.
pub fn detect_latch(ast: &Ast, process: NodeId, var: &str) -> bool {
    let node = &ast[process];
    if node.kind == NodeKind::Always {
        let clocked = ast
            .children(process)
            .iter()
            .any(|&c| matches!(ast.kind(c), NodeKind::Posedge | NodeKind::Negedge));
        if clocked {
            return false;
        }
    }
    let body = ast
        .children(process)
        .iter()
        .copied()
        .find(|&c| ast.kind(c) == NodeKind::Block);
    match body {
        Some(body) => !always_assigns(ast, body, var),
        None => true,
    }
}

/// True if every path through `stmt` assigns the whole of `var`.
fn always_assigns(ast: &Ast, stmt: NodeId, var: &str) -> bool {
    match ast.kind(stmt) {
        NodeKind::Block => ast.children(stmt).iter().any(|&c| always_assigns(ast, c, var)),
        NodeKind::Case => {
            let items = &ast.children(stmt)[1..];
            let full = ast.get_bool_attribute(stmt, "full_case")
                || items.iter().any(|&item| {
                    ast.children(item)
                        .first()
                        .is_some_and(|&label| ast.kind(label) == NodeKind::Default)
                });
            full && items.iter().all(|&item| {
                ast.children(item)
                    .last()
                    .is_some_and(|&body| always_assigns(ast, body, var))
            })
        }
        NodeKind::AssignEq | NodeKind::AssignLe => {
            let lhs = &ast[ast.children(stmt)[0]];
            lhs.kind == NodeKind::Identifier && lhs.children.is_empty() && lhs.name == var
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use vela_ast::{Ast, Builder, NodeId};

    use super::detect_latch;

    fn comb(b: &mut Builder<'_>, with_else: bool) -> NodeId {
        let c = b.ident("c");
        let q = b.ident("q");
        let d = b.ident("d");
        let then_stmt = b.blocking(q, d);
        let else_stmt = if with_else {
            let q = b.ident("q");
            let zero = b.int(0);
            Some(b.blocking(q, zero))
        } else {
            None
        };
        let test = b.if_else(c, then_stmt, else_stmt);
        let body = b.block(vec![test]);
        b.always(Vec::new(), body)
    }

    #[test]
    fn incomplete_if_is_a_latch() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let proc = comb(&mut b, false);
        assert!(detect_latch(&ast, proc, "q"));
    }

    #[test]
    fn complete_if_is_not_a_latch() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let proc = comb(&mut b, true);
        assert!(!detect_latch(&ast, proc, "q"));
        assert!(detect_latch(&ast, proc, "r"));
    }

    #[test]
    fn default_before_branch_covers_all_paths() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let q = b.ident("q");
        let zero = b.int(0);
        let default = b.blocking(q, zero);
        let c = b.ident("c");
        let q = b.ident("q");
        let d = b.ident("d");
        let then_stmt = b.blocking(q, d);
        let test = b.if_else(c, then_stmt, None);
        let body = b.block(vec![default, test]);
        let proc = b.always(Vec::new(), body);
        assert!(!detect_latch(&ast, proc, "q"));
    }

    #[test]
    fn clocked_process_is_never_a_latch() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let clk = b.posedge("clk");
        let c = b.ident("c");
        let q = b.ident("q");
        let d = b.ident("d");
        let then_stmt = b.blocking(q, d);
        let test = b.if_else(c, then_stmt, None);
        let body = b.block(vec![test]);
        let proc = b.always(vec![clk], body);
        assert!(!detect_latch(&ast, proc, "q"));
    }
}
