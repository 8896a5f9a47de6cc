use crate::language::{ast::*, span::Span};
use miette::SourceSpan;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

#[derive(Clone, Debug, Error)]
pub enum ResolveError {
    #[error("Cannot read local variable `{name}` in its own initializer")]
    SelfReferentialInitializer { name: String, span: Span },
}

impl ResolveError {
    pub fn span(&self) -> Span {
        match self {
            ResolveError::SelfReferentialInitializer { span, .. } => *span,
        }
    }

    pub fn line(&self) -> usize {
        self.span().line
    }

    pub fn to_source_span(&self) -> SourceSpan {
        self.span().to_source_span()
    }
}

/// Lexical distances for every `Ident`/`Assign` that binds to a local.
/// Ids missing from the table are globals.
#[derive(Clone, Debug, Default)]
pub struct Resolutions {
    distances: HashMap<ExprId, usize>,
    // Ids outside any function body. They run once, with their chunk.
    transient: Vec<ExprId>,
}

impl Resolutions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn distance(&self, id: ExprId) -> Option<usize> {
        self.distances.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.distances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distances.is_empty()
    }

    /// Merges the table of a later chunk parsed with the same `NodeIds`.
    pub fn extend(&mut self, other: Resolutions) {
        self.distances.extend(other.distances);
        self.transient.extend(other.transient);
    }

    /// Drops the entries that only top-level code of finished chunks used.
    /// Entries inside function bodies stay, since a closure may still run.
    pub fn forget_transient(&mut self) {
        for id in self.transient.drain(..) {
            self.distances.remove(&id);
        }
    }

    fn record(&mut self, id: ExprId, distance: usize, transient: bool) {
        self.distances.insert(id, distance);
        if transient {
            self.transient.push(id);
        }
    }
}

/// Resolves a whole program. The top level is not a scope: its names stay global.
pub fn resolve_program(program: &Program) -> Result<Resolutions, ResolveError> {
    let mut resolver = Resolver::default();
    resolver.resolve_statements(&program.statements)?;
    debug!(
        statements = program.statements.len(),
        locals = resolver.resolutions.len(),
        "resolution complete"
    );
    Ok(resolver.resolutions)
}

#[derive(Default)]
struct Resolver {
    // name -> "fully defined"
    scopes: Vec<HashMap<String, bool>>,
    function_depth: usize,
    resolutions: Resolutions,
}

impl Resolver {
    fn resolve_statements(&mut self, statements: &[Stmt]) -> Result<(), ResolveError> {
        for stmt in statements {
            self.resolve_stmt(stmt)?;
        }
        Ok(())
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) -> Result<(), ResolveError> {
        match stmt {
            Stmt::Var(decl) => {
                self.declare(&decl.name.name);
                self.resolve_expr(&decl.init)?;
                self.define(&decl.name.name);
            }
            Stmt::Fun(decl) => {
                self.declare(&decl.name.name);
                self.define(&decl.name.name);
                self.resolve_function(decl)?;
            }
            Stmt::Block(block) => {
                self.scopes.push(HashMap::new());
                let result = self.resolve_statements(&block.statements);
                self.scopes.pop();
                result?;
            }
            Stmt::If(stmt) => {
                self.resolve_expr(&stmt.condition)?;
                self.resolve_stmt(&stmt.then_branch)?;
                if let Some(else_branch) = &stmt.else_branch {
                    self.resolve_stmt(else_branch)?;
                }
            }
            Stmt::While(stmt) => {
                self.resolve_expr(&stmt.condition)?;
                self.resolve_stmt(&stmt.body)?;
            }
            Stmt::Break(_) => {}
            Stmt::Return(stmt) => {
                if let Some(value) = &stmt.value {
                    self.resolve_expr(value)?;
                }
            }
            Stmt::Print(stmt) => self.resolve_expr(&stmt.expr)?,
            Stmt::Expr(stmt) => self.resolve_expr(&stmt.expr)?,
        }
        Ok(())
    }

    /// Parameters and body share one scope, matching the single frame a call creates.
    fn resolve_function(&mut self, decl: &FunDecl) -> Result<(), ResolveError> {
        let mut scope = HashMap::new();
        for param in &decl.params {
            scope.insert(param.name.clone(), true);
        }
        self.scopes.push(scope);
        self.function_depth += 1;
        let result = self.resolve_statements(&decl.body.statements);
        self.function_depth -= 1;
        self.scopes.pop();
        result
    }

    fn resolve_expr(&mut self, expr: &Expr) -> Result<(), ResolveError> {
        match expr {
            Expr::Assign { id, name, value, .. } => {
                self.resolve_expr(value)?;
                self.resolve_local(*id, name)?;
            }
            Expr::Binary { left, right, .. } => {
                self.resolve_expr(left)?;
                self.resolve_expr(right)?;
            }
            Expr::Unary { expr, .. } => self.resolve_expr(expr)?,
            Expr::Call { callee, args, .. } => {
                self.resolve_expr(callee)?;
                for arg in args {
                    self.resolve_expr(arg)?;
                }
            }
            Expr::Ident { id, name } => self.resolve_local(*id, name)?,
            Expr::Literal(_) => {}
        }
        Ok(())
    }

    fn resolve_local(&mut self, id: ExprId, name: &Identifier) -> Result<(), ResolveError> {
        let depth = self.scopes.len();
        for (index, scope) in self.scopes.iter().enumerate().rev() {
            if let Some(defined) = scope.get(&name.name) {
                if !defined {
                    return Err(ResolveError::SelfReferentialInitializer {
                        name: name.name.clone(),
                        span: name.span,
                    });
                }
                self.resolutions
                    .record(id, depth - index - 1, self.function_depth == 0);
                return Ok(());
            }
        }
        Ok(())
    }

    fn declare(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), false);
        }
    }

    fn define(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::parser::parse_program;
    use pretty_assertions::assert_eq;

    fn resolve(source: &str) -> (Program, Result<Resolutions, ResolveError>) {
        let program = parse_program(source).expect("program should parse");
        let result = resolve_program(&program);
        (program, result)
    }

    /// Distances of every identifier read in `print` statements, in source order.
    fn printed_distances(source: &str) -> Vec<Option<usize>> {
        let (program, result) = resolve(source);
        let resolutions = result.expect("program should resolve");
        let mut out = Vec::new();
        collect_prints(&program.statements, &resolutions, &mut out);
        out
    }

    fn collect_prints(stmts: &[Stmt], res: &Resolutions, out: &mut Vec<Option<usize>>) {
        for stmt in stmts {
            match stmt {
                Stmt::Print(PrintStmt {
                    expr: Expr::Ident { id, .. },
                    ..
                }) => out.push(res.distance(*id)),
                Stmt::Block(block) => collect_prints(&block.statements, res, out),
                Stmt::Fun(decl) => collect_prints(&decl.body.statements, res, out),
                Stmt::While(stmt) => collect_prints(std::slice::from_ref(&*stmt.body), res, out),
                _ => {}
            }
        }
    }

    #[test]
    fn top_level_names_stay_global() {
        assert_eq!(printed_distances("var a = 1; print a;"), vec![None]);
    }

    #[test]
    fn nested_blocks_count_hops() {
        let source = "do var a = 1; do do print a; end end end";
        assert_eq!(printed_distances(source), vec![Some(2)]);
    }

    #[test]
    fn shadowing_stops_at_the_first_match() {
        let source = "do var x = 1; do var x = 2; print x; end print x; end";
        assert_eq!(printed_distances(source), vec![Some(0), Some(0)]);
    }

    #[test]
    fn function_body_shares_the_parameter_scope() {
        let source = "do var outer = 1; fun f(p) do var local = p; print p; print local; print outer; end end";
        assert_eq!(
            printed_distances(source),
            vec![Some(0), Some(0), Some(1)]
        );
    }

    #[test]
    fn recursive_function_sees_its_own_name() {
        let (program, result) = resolve("do fun f() do f(); end end");
        let resolutions = result.unwrap();
        let Stmt::Block(block) = &program.statements[0] else {
            panic!("expected block");
        };
        let Stmt::Fun(decl) = &block.statements[0] else {
            panic!("expected function");
        };
        let Stmt::Expr(ExprStmt {
            expr: Expr::Call { callee, .. },
            ..
        }) = &decl.body.statements[0]
        else {
            panic!("expected call");
        };
        let Expr::Ident { id, .. } = callee.as_ref() else {
            panic!("expected identifier callee");
        };
        assert_eq!(resolutions.distance(*id), Some(1));
    }

    #[test]
    fn rejects_self_referential_initializer_in_a_block() {
        let (_, result) = resolve("do var x = x; end");
        let err = result.unwrap_err();
        let ResolveError::SelfReferentialInitializer { name, span } = &err;
        assert_eq!(name, "x");
        assert_eq!(span.line, 1);
    }

    #[test]
    fn initializer_reading_an_outer_name_is_not_self_reference() {
        let source = "do var x = 1; do var y = x; print y; end end";
        assert_eq!(printed_distances(source), vec![Some(0)]);
    }

    #[test]
    fn top_level_self_reference_is_left_to_runtime() {
        let (_, result) = resolve("var x = x;");
        assert!(result.unwrap().is_empty());
    }

    #[test]
    fn assignment_target_is_resolved() {
        let (program, result) = resolve("do var a = 1; do a = 2; end end");
        let resolutions = result.unwrap();
        let Stmt::Block(outer) = &program.statements[0] else {
            panic!("expected block");
        };
        let Stmt::Block(inner) = &outer.statements[1] else {
            panic!("expected inner block");
        };
        let Stmt::Expr(ExprStmt {
            expr: Expr::Assign { id, .. },
            ..
        }) = &inner.statements[0]
        else {
            panic!("expected assignment");
        };
        assert_eq!(resolutions.distance(*id), Some(1));
    }

    #[test]
    fn forgetting_keeps_only_function_body_entries() {
        let (_, result) = resolve("do var a = 1; print a; fun f(p) do print p; print a; end end");
        let mut resolutions = result.unwrap();
        assert_eq!(resolutions.len(), 3);
        resolutions.forget_transient();
        assert_eq!(resolutions.len(), 2);
        resolutions.forget_transient();
        assert_eq!(resolutions.len(), 2);
    }
}
