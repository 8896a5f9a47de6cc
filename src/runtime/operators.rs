use crate::language::{
    ast::{BinaryOp, UnaryOp},
    span::Span,
};
use crate::runtime::{
    error::{RuntimeError, RuntimeResult},
    value::Value,
};
use std::rc::Rc;

enum Operands {
    Ints(i64, i64),
    Doubles(f64, f64),
}

fn numeric_operands(
    op: BinaryOp,
    left: &Value,
    right: &Value,
    span: Span,
) -> RuntimeResult<Operands> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Operands::Ints(*a, *b)),
        (Value::Int(a), Value::Double(b)) => Ok(Operands::Doubles(*a as f64, *b)),
        (Value::Double(a), Value::Int(b)) => Ok(Operands::Doubles(*a, *b as f64)),
        (Value::Double(a), Value::Double(b)) => Ok(Operands::Doubles(*a, *b)),
        _ => Err(RuntimeError::type_mismatch(
            format!(
                "`{}` expects numeric operands, found {} and {}",
                op.symbol(),
                left.type_name(),
                right.type_name()
            ),
            span,
        )),
    }
}

/// Evaluates every binary operator except the short-circuiting `and`/`or`.
pub fn binary(op: BinaryOp, left: &Value, right: &Value, span: Span) -> RuntimeResult<Value> {
    match op {
        BinaryOp::Add => arithmetic(op, left, right, span, i64::wrapping_add, |a, b| a + b),
        BinaryOp::Sub => arithmetic(op, left, right, span, i64::wrapping_sub, |a, b| a - b),
        BinaryOp::Mul => arithmetic(op, left, right, span, i64::wrapping_mul, |a, b| a * b),
        BinaryOp::Div => {
            let (a, b) = match numeric_operands(op, left, right, span)? {
                Operands::Ints(a, b) => (a as f64, b as f64),
                Operands::Doubles(a, b) => (a, b),
            };
            if b == 0.0 {
                return Err(RuntimeError::DivisionByZero { span });
            }
            Ok(Value::Double(a / b))
        }
        BinaryOp::FloorDiv => match numeric_operands(op, left, right, span)? {
            Operands::Ints(_, 0) => Err(RuntimeError::DivisionByZero { span }),
            Operands::Ints(a, b) => Ok(Value::Int(floor_div(a, b))),
            Operands::Doubles(_, b) if b == 0.0 => Err(RuntimeError::DivisionByZero { span }),
            Operands::Doubles(a, b) => Ok(Value::Double((a / b).floor())),
        },
        BinaryOp::Rem => match numeric_operands(op, left, right, span)? {
            Operands::Ints(_, 0) => Err(RuntimeError::DivisionByZero { span }),
            Operands::Ints(a, b) => Ok(Value::Int(floor_mod(a, b))),
            Operands::Doubles(_, b) if b == 0.0 => Err(RuntimeError::DivisionByZero { span }),
            Operands::Doubles(a, b) => Ok(Value::Double(a - b * (a / b).floor())),
        },
        BinaryOp::Concat => concat(left, right, span),
        BinaryOp::Eq => Ok(Value::Bool(left == right)),
        BinaryOp::NotEq => Ok(Value::Bool(left != right)),
        BinaryOp::Lt => compare(op, left, right, span, |a, b| a < b, |a, b| a < b),
        BinaryOp::LtEq => compare(op, left, right, span, |a, b| a <= b, |a, b| a <= b),
        BinaryOp::Gt => compare(op, left, right, span, |a, b| a > b, |a, b| a > b),
        BinaryOp::GtEq => compare(op, left, right, span, |a, b| a >= b, |a, b| a >= b),
        BinaryOp::And | BinaryOp::Or => Err(RuntimeError::internal(
            format!("`{}` must be evaluated lazily", op.symbol()),
            Some(span),
        )),
    }
}

pub fn unary(op: UnaryOp, operand: &Value, span: Span) -> RuntimeResult<Value> {
    match (op, operand) {
        (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
        (UnaryOp::Neg, Value::Int(v)) => Ok(Value::Int(v.wrapping_neg())),
        (UnaryOp::Neg, Value::Double(v)) => Ok(Value::Double(-v)),
        (UnaryOp::Neg, other) => Err(RuntimeError::type_mismatch(
            format!("`-` expects a numeric operand, found {}", other.type_name()),
            span,
        )),
    }
}

fn arithmetic(
    op: BinaryOp,
    left: &Value,
    right: &Value,
    span: Span,
    ints: fn(i64, i64) -> i64,
    doubles: fn(f64, f64) -> f64,
) -> RuntimeResult<Value> {
    Ok(match numeric_operands(op, left, right, span)? {
        Operands::Ints(a, b) => Value::Int(ints(a, b)),
        Operands::Doubles(a, b) => Value::Double(doubles(a, b)),
    })
}

fn compare(
    op: BinaryOp,
    left: &Value,
    right: &Value,
    span: Span,
    ints: fn(i64, i64) -> bool,
    doubles: fn(f64, f64) -> bool,
) -> RuntimeResult<Value> {
    Ok(Value::Bool(match numeric_operands(op, left, right, span)? {
        Operands::Ints(a, b) => ints(a, b),
        Operands::Doubles(a, b) => doubles(a, b),
    }))
}

fn concat(left: &Value, right: &Value, span: Span) -> RuntimeResult<Value> {
    if matches!((left, right), (Value::Nil, Value::Nil)) {
        return Err(RuntimeError::type_mismatch(
            "`++` needs at least one operand that is not nil",
            span,
        ));
    }
    let text = format!("{left}{right}");
    Ok(Value::Str(Rc::from(text)))
}

fn floor_div(a: i64, b: i64) -> i64 {
    let quotient = a.wrapping_div(b);
    if a.wrapping_rem(b) != 0 && ((a < 0) != (b < 0)) {
        quotient - 1
    } else {
        quotient
    }
}

fn floor_mod(a: i64, b: i64) -> i64 {
    let rem = a.wrapping_rem(b);
    if rem != 0 && ((rem < 0) != (b < 0)) {
        rem + b
    } else {
        rem
    }
}
