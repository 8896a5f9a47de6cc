use crate::language::{
    ast::*,
    resolve::Resolutions,
    span::Span,
};
use crate::runtime::{
    environment::{CollectStats, Env, Heap},
    error::{RuntimeError, RuntimeResult},
    operators,
    stack::ensure_sufficient_stack,
    value::{Closure, Function, NativeFunction, Value},
};
use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;
pub const DEFAULT_GC_THRESHOLD: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InterpreterConfig {
    pub max_call_depth: usize,
    /// Live frame count that triggers a cycle collection.
    pub gc_threshold: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            gc_threshold: DEFAULT_GC_THRESHOLD,
        }
    }
}

/// Outcome of executing one statement.
#[derive(Debug)]
enum Flow {
    Normal,
    Break(Span),
    Return(Value, Span),
}

pub struct Interpreter<W: Write> {
    out: W,
    heap: Heap,
    globals: Env,
    env: Env,
    resolutions: Resolutions,
    depth: usize,
    config: InterpreterConfig,
}

impl<W: Write> Interpreter<W> {
    pub fn new(out: W) -> Self {
        Self::with_config(out, InterpreterConfig::default())
    }

    pub fn with_config(out: W, config: InterpreterConfig) -> Self {
        let mut heap = Heap::new(config.gc_threshold);
        let globals = heap.root();
        for native in natives() {
            globals.define(native.name, Value::Function(Function::Native(native)));
        }
        Self {
            out,
            heap,
            env: globals.clone(),
            globals,
            resolutions: Resolutions::new(),
            depth: 0,
            config,
        }
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn output_mut(&mut self) -> &mut W {
        &mut self.out
    }

    pub fn config(&self) -> InterpreterConfig {
        self.config
    }

    /// Current value of a top-level binding.
    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.get_global(name, Span::default()).ok()
    }

    pub fn collect_garbage(&mut self) -> CollectStats {
        self.heap.collect()
    }

    pub fn live_frames(&mut self) -> usize {
        self.heap.live()
    }

    /// Number of resolved local references still kept for later chunks.
    pub fn resolved_locals(&self) -> usize {
        self.resolutions.len()
    }

    /// Runs `program` against the persistent global frame. `resolutions` must
    /// come from resolving this exact tree; entries inside function bodies are
    /// kept for later chunks, the rest are dropped once the chunk finishes.
    pub fn interpret(&mut self, program: &Program, resolutions: Resolutions) -> RuntimeResult<()> {
        self.resolutions.extend(resolutions);
        let result = self.run_top_level(&program.statements);
        if let Err(err) = &result {
            if err.is_internal() {
                warn!(error = %err, "internal consistency failure");
            }
        }
        self.resolutions.forget_transient();
        self.env = self.globals.clone();
        self.depth = 0;
        result
    }

    fn run_top_level(&mut self, statements: &[Stmt]) -> RuntimeResult<()> {
        for stmt in statements {
            match self.execute(stmt)? {
                Flow::Normal => {}
                Flow::Break(span) => {
                    return Err(RuntimeError::internal(
                        "`break` reached the top level outside of any loop",
                        Some(span),
                    ));
                }
                Flow::Return(_, span) => {
                    return Err(RuntimeError::internal(
                        "`return` reached the top level outside of any function",
                        Some(span),
                    ));
                }
            }
        }
        Ok(())
    }

    fn execute(&mut self, stmt: &Stmt) -> RuntimeResult<Flow> {
        ensure_sufficient_stack(|| self.execute_stmt(stmt))
    }

    fn execute_stmt(&mut self, stmt: &Stmt) -> RuntimeResult<Flow> {
        match stmt {
            Stmt::Var(decl) => {
                let value = self.evaluate(&decl.init)?;
                self.env.define(&decl.name.name, value);
            }
            Stmt::Fun(decl) => {
                self.env.define(&decl.name.name, Value::Nil);
                let closure = Closure::new(decl.clone(), self.env.clone());
                self.env
                    .define(&decl.name.name, Value::Function(Function::Closure(closure)));
            }
            Stmt::Block(block) => {
                let frame = self.heap.child(&self.env);
                return self.execute_block(&block.statements, frame);
            }
            Stmt::If(stmt) => {
                if self.evaluate(&stmt.condition)?.is_truthy() {
                    return self.execute(&stmt.then_branch);
                }
                if let Some(else_branch) = &stmt.else_branch {
                    return self.execute(else_branch);
                }
            }
            Stmt::While(stmt) => {
                while self.evaluate(&stmt.condition)?.is_truthy() {
                    match self.execute(&stmt.body)? {
                        Flow::Normal => {}
                        Flow::Break(_) => break,
                        flow @ Flow::Return(..) => return Ok(flow),
                    }
                }
            }
            Stmt::Break(span) => return Ok(Flow::Break(*span)),
            Stmt::Return(stmt) => {
                let value = match &stmt.value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                return Ok(Flow::Return(value, stmt.span));
            }
            Stmt::Print(stmt) => {
                let value = self.evaluate(&stmt.expr)?;
                writeln!(self.out, "{value}")?;
            }
            Stmt::Expr(stmt) => {
                self.evaluate(&stmt.expr)?;
            }
        }
        Ok(Flow::Normal)
    }

    /// Executes `statements` in `frame`, restoring the previous frame on every exit.
    fn execute_block(&mut self, statements: &[Stmt], frame: Env) -> RuntimeResult<Flow> {
        let previous = std::mem::replace(&mut self.env, frame);
        let result = self.execute_statements(statements);
        self.env = previous;
        result
    }

    fn execute_statements(&mut self, statements: &[Stmt]) -> RuntimeResult<Flow> {
        for stmt in statements {
            match self.execute(stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn evaluate(&mut self, expr: &Expr) -> RuntimeResult<Value> {
        ensure_sufficient_stack(|| self.evaluate_expr(expr))
    }

    fn evaluate_expr(&mut self, expr: &Expr) -> RuntimeResult<Value> {
        match expr {
            Expr::Literal(literal) => Ok(match literal {
                Literal::Int(value, _) => Value::Int(*value),
                Literal::Double(value, _) => Value::Double(*value),
                Literal::String(value, _) => Value::string(value),
                Literal::Bool(value, _) => Value::Bool(*value),
                Literal::Nil(_) => Value::Nil,
            }),
            Expr::Ident { id, name } => match self.resolutions.distance(*id) {
                Some(distance) => self.env.get_at(distance, &name.name, name.span),
                None => self.globals.get_global(&name.name, name.span),
            },
            Expr::Assign {
                id, name, value, ..
            } => {
                let value = self.evaluate(value)?;
                match self.resolutions.distance(*id) {
                    Some(distance) => {
                        self.env
                            .assign_at(distance, &name.name, value.clone(), name.span)?
                    }
                    None => self.globals.assign_global(&name.name, value.clone()),
                }
                Ok(value)
            }
            Expr::Unary { op, expr, span } => {
                let operand = self.evaluate(expr)?;
                operators::unary(*op, &operand, *span)
            }
            Expr::Binary {
                op: BinaryOp::And,
                left,
                right,
                ..
            } => {
                let left = self.evaluate(left)?;
                if !left.is_truthy() {
                    return Ok(left);
                }
                self.evaluate(right)
            }
            Expr::Binary {
                op: BinaryOp::Or,
                left,
                right,
                ..
            } => {
                let left = self.evaluate(left)?;
                if left.is_truthy() {
                    return Ok(left);
                }
                self.evaluate(right)
            }
            Expr::Binary {
                op,
                left,
                right,
                span,
            } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                operators::binary(*op, &left, &right, *span)
            }
            Expr::Call { callee, args, span } => {
                let callee = self.evaluate(callee)?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.evaluate(arg)?);
                }
                self.call(callee, values, *span)
            }
        }
    }

    #[tracing::instrument(level = "trace", skip_all, fields(args = args.len(), line = span.line))]
    fn call(&mut self, callee: Value, args: Vec<Value>, span: Span) -> RuntimeResult<Value> {
        let function = match callee {
            Value::Function(function) => function,
            other => {
                return Err(RuntimeError::NotCallable {
                    type_name: other.type_name(),
                    span,
                });
            }
        };
        if args.len() != function.arity() {
            return Err(RuntimeError::ArityMismatch {
                name: function.name().to_string(),
                expected: function.arity(),
                received: args.len(),
                span,
            });
        }
        match function {
            Function::Native(native) => (native.func)(&args),
            Function::Closure(closure) => self.call_closure(&closure, args, span),
        }
    }

    fn call_closure(
        &mut self,
        closure: &Closure,
        args: Vec<Value>,
        span: Span,
    ) -> RuntimeResult<Value> {
        if self.depth >= self.config.max_call_depth {
            return Err(RuntimeError::StackOverflow {
                limit: self.config.max_call_depth,
                span,
            });
        }
        let frame = self.heap.child(&closure.env);
        for (param, arg) in closure.decl.params.iter().zip(args) {
            frame.define(&param.name, arg);
        }

        self.depth += 1;
        let result = self.execute_block(&closure.decl.body.statements, frame);
        self.depth -= 1;

        match result? {
            Flow::Normal => Ok(Value::Nil),
            Flow::Return(value, _) => Ok(value),
            Flow::Break(span) => Err(RuntimeError::internal(
                "`break` crossed a function boundary",
                Some(span),
            )),
        }
    }
}

impl<W: Write> Drop for Interpreter<W> {
    fn drop(&mut self) {
        self.heap.clear();
    }
}

fn natives() -> Vec<NativeFunction> {
    vec![NativeFunction {
        name: "clock",
        arity: 0,
        func: clock,
    }]
}

/// Seconds since the Unix epoch.
fn clock(_args: &[Value]) -> RuntimeResult<Value> {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0);
    Ok(Value::Double(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::{parser::parse_program, resolve::resolve_program};
    use pretty_assertions::assert_eq;

    fn run(source: &str) -> (String, RuntimeResult<()>) {
        run_with(source, InterpreterConfig::default())
    }

    fn run_with(source: &str, config: InterpreterConfig) -> (String, RuntimeResult<()>) {
        let program = parse_program(source).expect("program should parse");
        let resolutions = resolve_program(&program).expect("program should resolve");
        let mut interpreter = Interpreter::with_config(Vec::new(), config);
        let result = interpreter.interpret(&program, resolutions);
        let output = String::from_utf8(interpreter.output().clone()).unwrap();
        (output, result)
    }

    fn output_of(source: &str) -> String {
        let (output, result) = run(source);
        result.expect("program should run");
        output
    }

    #[test]
    fn prints_each_value_on_its_own_line() {
        assert_eq!(
            output_of("print 1; print 2.5; print \"s\"; print true; print nil;"),
            "1\n2.5\ns\ntrue\nnil\n"
        );
    }

    #[test]
    fn logical_operators_return_an_operand() {
        assert_eq!(
            output_of("print nil or \"x\"; print 0 and 7; print false and 1; print 1 or boom;"),
            "x\n7\nfalse\n1\n"
        );
    }

    #[test]
    fn while_loop_consumes_break() {
        let source = "var i = 0; while (true) if (i == 3) break; end print i; i = i + 1; end print \"done\";";
        assert_eq!(output_of(source), "0\n1\n2\ndone\n");
    }

    #[test]
    fn return_unwinds_nested_loops() {
        let source = "fun find() do var i = 0; while (true) while (true) if (i == 2) return i; end i = i + 1; end end end print find();";
        assert_eq!(output_of(source), "2\n");
    }

    #[test]
    fn function_without_return_yields_nil() {
        assert_eq!(output_of("fun f() do end print f();"), "nil\n");
    }

    #[test]
    fn closures_capture_the_defining_frame() {
        let source = "var x = \"global\"; do var x = \"local\"; fun show() do print x; end fun call(f) do var x = \"caller\"; f(); end call(show); end";
        assert_eq!(output_of(source), "local\n");
    }

    #[test]
    fn recursion_through_the_captured_frame() {
        let source = "do fun fib(n) do if (n < 2) return n; end return fib(n - 1) + fib(n - 2); end print fib(10); end";
        assert_eq!(output_of(source), "55\n");
    }

    #[test]
    fn calling_a_non_function_fails() {
        let (_, result) = run("var x = 1; x();");
        assert!(matches!(
            result,
            Err(RuntimeError::NotCallable {
                type_name: "int",
                ..
            })
        ));
    }

    #[test]
    fn deep_recursion_hits_the_call_limit() {
        let config = InterpreterConfig {
            max_call_depth: 16,
            ..InterpreterConfig::default()
        };
        let (_, result) = run_with("fun f() do f(); end f();", config);
        assert!(matches!(
            result,
            Err(RuntimeError::StackOverflow { limit: 16, .. })
        ));
    }

    #[test]
    fn errors_stop_the_run_and_report_a_line() {
        let (output, result) = run("print 1;\nprint -\"a\";\nprint 3;");
        assert_eq!(output, "1\n");
        let err = result.unwrap_err();
        assert_eq!(err.line(), Some(2));
        assert!(!err.is_internal());
    }

    #[test]
    fn clock_is_a_native_function() {
        let (output, result) = run("print clock() > 0; print clock;");
        result.unwrap();
        assert_eq!(output, "true\n<native fun clock>\n");
    }

    #[test]
    fn native_arity_is_checked() {
        let (_, result) = run("clock(1);");
        assert!(matches!(
            result,
            Err(RuntimeError::ArityMismatch {
                expected: 0,
                received: 1,
                ..
            })
        ));
    }

    #[test]
    fn stale_resolution_is_an_internal_error() {
        let program = parse_program("do var a = 1; print a; end").unwrap();
        let mut interpreter = Interpreter::new(Vec::new());
        let mut resolutions = resolve_program(&program).unwrap();
        // Resolve a different tree that reuses the same ids at other distances.
        let other = parse_program("do do var a = 1; do print a; end end end").unwrap();
        resolutions.extend(resolve_program(&other).unwrap());
        let err = interpreter.interpret(&program, resolutions).unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn break_reaching_the_top_level_is_internal() {
        let span = Span::new(0, 5, 1);
        let program = Program {
            statements: vec![Stmt::Break(span)],
        };
        let mut interpreter = Interpreter::new(Vec::new());
        let err = interpreter
            .interpret(&program, Resolutions::new())
            .unwrap_err();
        assert!(err.is_internal());
        assert_eq!(err.line(), Some(1));
    }

    #[test]
    fn return_reaching_the_top_level_is_internal() {
        let span = Span::new(4, 7, 3);
        let program = Program {
            statements: vec![Stmt::Return(ReturnStmt { value: None, span })],
        };
        let mut interpreter = Interpreter::new(Vec::new());
        let err = interpreter
            .interpret(&program, Resolutions::new())
            .unwrap_err();
        assert!(err.is_internal());
        assert_eq!(err.span(), Some(span));
        assert_eq!(err.line(), Some(3));
    }

    #[test]
    fn break_crossing_a_call_is_internal() {
        let span = Span::new(0, 5, 2);
        let name = |text: &str| Identifier {
            name: text.to_string(),
            span,
        };
        let decl = std::rc::Rc::new(FunDecl {
            name: name("f"),
            params: Vec::new(),
            body: Block {
                statements: vec![Stmt::Break(span)],
                span,
            },
            span,
        });
        let call = Expr::Call {
            callee: Box::new(Expr::Ident {
                id: NodeIds::new().fresh(),
                name: name("f"),
            }),
            args: Vec::new(),
            span,
        };
        let program = Program {
            statements: vec![
                Stmt::Fun(decl),
                Stmt::Expr(ExprStmt { expr: call, span }),
            ],
        };
        let mut interpreter = Interpreter::new(Vec::new());
        let err = interpreter
            .interpret(&program, Resolutions::new())
            .unwrap_err();
        assert!(err.is_internal());
        assert_eq!(err.line(), Some(2));
    }

    #[test]
    fn dropping_the_interpreter_releases_cyclic_frames() {
        let program = parse_program("do fun f() do end g = f; end").unwrap();
        let resolutions = resolve_program(&program).unwrap();
        let mut interpreter = Interpreter::new(Vec::new());
        interpreter.interpret(&program, resolutions).unwrap();
        let Some(Value::Function(Function::Closure(closure))) = interpreter.global("g") else {
            panic!("expected closure in g");
        };
        let frame = closure.env.clone();
        drop(closure);
        drop(interpreter);
        assert!(frame.parent().is_none());
        assert!(!frame.contains("f"));
    }
}
