use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use indexmap::IndexMap;

use crate::{
    ast::{BinaryOp, Expr, ExprKind, Literal, Program, Stmt, StmtKind, UnaryOp},
    context::Context,
    diagnostics::{Diagnostic, DiagnosticKind, Position, RuntimeFault},
    host::{HostBridge, HostError},
    parser,
    value::Value,
};

pub const DEFAULT_MAX_STEPS: u64 = 1_000_000;

/// Bounds on a single run. A step is one executed statement or one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub max_steps: Option<u64>,
    pub timeout: Option<Duration>,
}

impl ExecutionLimits {
    pub const fn unlimited() -> Self {
        Self {
            max_steps: None,
            timeout: None,
        }
    }
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_steps: Some(DEFAULT_MAX_STEPS),
            timeout: None,
        }
    }
}

/// One `display(...)` emission, in program order.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayOutput {
    pub value: Value,
    pub output_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// Value of the most recently executed assignment or expression statement,
    /// at any nesting depth.
    pub last_value: Option<Value>,
    pub displays: Vec<DisplayOutput>,
}

pub struct Interpreter {
    bridge: Arc<HostBridge>,
    limits: ExecutionLimits,
    steps: u64,
    started: Option<Instant>,
    last_value: Option<Value>,
    displays: Vec<DisplayOutput>,
}

impl Interpreter {
    pub fn new(bridge: Arc<HostBridge>) -> Self {
        Self {
            bridge,
            limits: ExecutionLimits::default(),
            steps: 0,
            started: None,
            last_value: None,
            displays: Vec::new(),
        }
    }

    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn bridge(&self) -> &HostBridge {
        &self.bridge
    }

    pub fn limits(&self) -> ExecutionLimits {
        self.limits
    }

    pub fn eval_source(&mut self, source: &str, context: &mut Context) -> Result<Evaluation, Diagnostic> {
        let program = parser::parse_source(source)?;
        self.interpret(&program, context)
    }

    /// Runs `program` against `context`, mutating it in place. On error the
    /// bindings made before the fault stay in `context`.
    pub fn interpret(&mut self, program: &Program, context: &mut Context) -> Result<Evaluation, Diagnostic> {
        self.steps = 0;
        self.started = Some(Instant::now());
        self.last_value = None;
        self.displays.clear();

        let outcome = self.execute_block(&program.statements, context);
        let evaluation = Evaluation {
            last_value: self.last_value.take(),
            displays: std::mem::take(&mut self.displays),
        };
        outcome.map(|()| evaluation)
    }

    fn execute_block(&mut self, statements: &[Stmt], context: &mut Context) -> Result<(), Diagnostic> {
        for stmt in statements {
            self.execute_statement(stmt, context)?;
        }
        Ok(())
    }

    fn execute_statement(&mut self, stmt: &Stmt, context: &mut Context) -> Result<(), Diagnostic> {
        self.tick(stmt.position)?;
        match &stmt.kind {
            StmtKind::Assignment { name, value, .. } => {
                let value = self.evaluate(value, context)?;
                context.set(name.clone(), value.clone());
                self.last_value = Some(value);
            }
            StmtKind::Expr(expr) => {
                let value = self.evaluate(expr, context)?;
                self.last_value = Some(value);
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition, context)?.is_truthy() {
                    self.execute_block(then_branch, context)?;
                } else if let Some(branch) = else_branch {
                    self.execute_block(branch, context)?;
                }
            }
            StmtKind::For {
                binding,
                iterable,
                body,
            } => {
                let items = match self.evaluate(iterable, context)? {
                    Value::Array(items) => items,
                    other => {
                        return Err(Diagnostic::runtime(
                            RuntimeFault::IterableType,
                            format!("for..in requires an array, got {}", other.type_name()),
                            stmt.position,
                        ));
                    }
                };
                for item in items {
                    self.tick(stmt.position)?;
                    context.set(binding.clone(), item);
                    self.execute_block(body, context)?;
                }
            }
        }
        Ok(())
    }

    fn tick(&mut self, position: Position) -> Result<(), Diagnostic> {
        self.steps += 1;
        if let Some(max) = self.limits.max_steps {
            if self.steps > max {
                return Err(Diagnostic::runtime(
                    RuntimeFault::BudgetExceeded,
                    format!("Execution exceeded the limit of {max} steps"),
                    position,
                ));
            }
        }
        if let (Some(timeout), Some(started)) = (self.limits.timeout, self.started) {
            if started.elapsed() > timeout {
                return Err(Diagnostic::runtime(
                    RuntimeFault::BudgetExceeded,
                    format!("Execution timed out after {} ms", timeout.as_millis()),
                    position,
                ));
            }
        }
        Ok(())
    }

    fn evaluate(&mut self, expr: &Expr, context: &Context) -> Result<Value, Diagnostic> {
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(literal(lit)),
            ExprKind::Variable(name) => context.get(name).cloned().ok_or_else(|| {
                Diagnostic::runtime(
                    RuntimeFault::UndefinedVariable,
                    format!("Undefined variable: {name}"),
                    expr.position,
                )
            }),
            ExprKind::Binary { op, left, right } => {
                self.binary(*op, left, right, expr.position, context)
            }
            ExprKind::Unary { op, expr: operand } => {
                let value = self.evaluate(operand, context)?;
                unary(*op, value, expr.position)
            }
            ExprKind::ArrayLiteral(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.evaluate(item, context)?);
                }
                Ok(Value::array(values))
            }
            ExprKind::ObjectLiteral(entries) => {
                let mut map = IndexMap::new();
                for (key, value) in entries {
                    let value = self.evaluate(value, context)?;
                    map.insert(key.clone(), value);
                }
                Ok(Value::Object(map))
            }
            ExprKind::Call {
                namespace,
                function,
                args,
            } => {
                let args = self.evaluate_args(args, context)?;
                self.call(namespace.as_deref(), function, &args, expr.position)
            }
            ExprKind::Display(args) => {
                let value = match args.first() {
                    Some(arg) => self.evaluate(arg, context)?,
                    None => Value::Null,
                };
                let output_type = match args.get(1) {
                    Some(arg) => self.evaluate(arg, context)?,
                    None => Value::Null,
                };
                Ok(self.display(value, output_type))
            }
            ExprKind::Pipe { left, right } => {
                let left_value = self.evaluate(left, context)?;
                match &right.kind {
                    ExprKind::Call {
                        namespace,
                        function,
                        args,
                    } => {
                        let mut call_args = Vec::with_capacity(args.len() + 1);
                        call_args.push(left_value);
                        call_args.extend(self.evaluate_args(args, context)?);
                        self.call(namespace.as_deref(), function, &call_args, right.position)
                    }
                    ExprKind::Display(args) => {
                        let output_type = match args.first() {
                            Some(arg) => self.evaluate(arg, context)?,
                            None => Value::Null,
                        };
                        Ok(self.display(left_value, output_type))
                    }
                    _ => Err(Diagnostic::runtime(
                        RuntimeFault::InvalidPipeTarget,
                        "Pipe target must be a function call",
                        right.position,
                    )),
                }
            }
        }
    }

    fn evaluate_args(&mut self, args: &[Expr], context: &Context) -> Result<Vec<Value>, Diagnostic> {
        args.iter().map(|arg| self.evaluate(arg, context)).collect()
    }

    fn display(&mut self, value: Value, output_type: Value) -> Value {
        let output_type = match output_type {
            Value::String(kind) => Some(kind),
            _ => None,
        };
        self.displays.push(DisplayOutput {
            value: value.clone(),
            output_type,
        });
        value
    }

    fn call(
        &self,
        namespace: Option<&str>,
        function: &str,
        args: &[Value],
        position: Position,
    ) -> Result<Value, Diagnostic> {
        let Some(namespace) = namespace else {
            return Err(Diagnostic::runtime(
                RuntimeFault::UnknownFunction,
                format!("Unknown function: {function}"),
                position,
            ));
        };
        let Some(handle) = self.bridge.resolve(namespace) else {
            return Err(Diagnostic::runtime(
                RuntimeFault::UnknownNamespace,
                format!("Unknown namespace: {namespace}"),
                position,
            ));
        };
        if !handle.has_function(function) {
            return Err(Diagnostic::runtime(
                RuntimeFault::UnknownFunction,
                format!("Unknown function: {namespace}.{function}"),
                position,
            ));
        }
        self.bridge
            .dispatch(handle, function, args)
            .map_err(|err| match err {
                HostError::UnknownFunction { .. } => {
                    Diagnostic::runtime(RuntimeFault::UnknownFunction, err.to_string(), position)
                }
                other => Diagnostic::new(DiagnosticKind::Host, other.to_string()).at(position),
            })
    }

    fn binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        position: Position,
        context: &Context,
    ) -> Result<Value, Diagnostic> {
        let left_value = self.evaluate(left, context)?;
        match op {
            BinaryOp::And if !left_value.is_truthy() => return Ok(left_value),
            BinaryOp::Or if left_value.is_truthy() => return Ok(left_value),
            BinaryOp::And | BinaryOp::Or => return self.evaluate(right, context),
            _ => {}
        }
        let right_value = self.evaluate(right, context)?;

        match op {
            BinaryOp::Add => match (&left_value, &right_value) {
                (Value::String(a), Value::String(b)) => Ok(Value::string(format!("{a}{b}"))),
                _ => numeric(op, &left_value, &right_value, position, |a, b| a + b),
            },
            BinaryOp::Sub => numeric(op, &left_value, &right_value, position, |a, b| a - b),
            BinaryOp::Mul => numeric(op, &left_value, &right_value, position, |a, b| a * b),
            BinaryOp::Div => {
                if right_value.as_number() == Some(0.0) {
                    return Err(Diagnostic::runtime(
                        RuntimeFault::DivisionByZero,
                        "Division by zero",
                        position,
                    ));
                }
                numeric(op, &left_value, &right_value, position, |a, b| a / b)
            }
            BinaryOp::Mod => numeric(op, &left_value, &right_value, position, |a, b| a % b),
            BinaryOp::Equal => Ok(Value::Bool(left_value == right_value)),
            BinaryOp::NotEqual => Ok(Value::Bool(left_value != right_value)),
            BinaryOp::Less
            | BinaryOp::LessEqual
            | BinaryOp::Greater
            | BinaryOp::GreaterEqual => comparison(op, &left_value, &right_value, position),
            BinaryOp::And | BinaryOp::Or => Ok(right_value),
        }
    }
}

fn literal(literal: &Literal) -> Value {
    match literal {
        Literal::Number(n) => Value::Number(*n),
        Literal::String { value, .. } => Value::string(value.clone()),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Null => Value::Null,
    }
}

fn unary(op: UnaryOp, value: Value, position: Position) -> Result<Value, Diagnostic> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
        UnaryOp::Negate => match value {
            Value::Number(n) => Ok(Value::Number(-n)),
            other => Err(Diagnostic::runtime(
                RuntimeFault::TypeMismatch,
                format!("cannot negate {}", other.type_name()),
                position,
            )),
        },
    }
}

fn mismatch(op: BinaryOp, left: &Value, right: &Value, position: Position) -> Diagnostic {
    Diagnostic::runtime(
        RuntimeFault::TypeMismatch,
        format!(
            "cannot apply `{}` to {} and {}",
            op.symbol(),
            left.type_name(),
            right.type_name()
        ),
        position,
    )
}

fn numeric<F>(op: BinaryOp, left: &Value, right: &Value, position: Position, func: F) -> Result<Value, Diagnostic>
where
    F: Fn(f64, f64) -> f64,
{
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(func(*a, *b))),
        _ => Err(mismatch(op, left, right, position)),
    }
}

fn comparison(op: BinaryOp, left: &Value, right: &Value, position: Position) -> Result<Value, Diagnostic> {
    let result = match (left, right) {
        (Value::Number(a), Value::Number(b)) => match op {
            BinaryOp::Less => a < b,
            BinaryOp::LessEqual => a <= b,
            BinaryOp::Greater => a > b,
            _ => a >= b,
        },
        (Value::String(a), Value::String(b)) => match op {
            BinaryOp::Less => a < b,
            BinaryOp::LessEqual => a <= b,
            BinaryOp::Greater => a > b,
            _ => a >= b,
        },
        _ => return Err(mismatch(op, left, right, position)),
    };
    Ok(Value::Bool(result))
}
