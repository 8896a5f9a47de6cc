use crate::language::ast::FunDecl;
use crate::runtime::{environment::Env, error::RuntimeResult};
use std::fmt;
use std::rc::Rc;

#[derive(Clone, Debug)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(Rc<str>),
    Function(Function),
}

impl Value {
    pub fn string(text: &str) -> Self {
        Value::Str(Rc::from(text))
    }

    /// Only `nil` and `false` are falsy; `0` and `""` are truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::Str(_) => "string",
            Value::Function(_) => "function",
        }
    }

    pub fn as_closure(&self) -> Option<&Closure> {
        match self {
            Value::Function(Function::Closure(closure)) => Some(closure),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Double(v) if v.is_nan() => write!(f, "nan"),
            Value::Double(v) if v.is_infinite() => {
                write!(f, "{}", if *v > 0.0 { "inf" } else { "-inf" })
            }
            Value::Double(v) if v.fract() == 0.0 => write!(f, "{v:.1}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v}"),
            Value::Function(function) => write!(f, "{function}"),
        }
    }
}

#[derive(Clone, Debug)]
pub enum Function {
    Closure(Closure),
    Native(NativeFunction),
}

impl Function {
    pub fn name(&self) -> &str {
        match self {
            Function::Closure(closure) => &closure.decl.name.name,
            Function::Native(native) => native.name,
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Function::Closure(closure) => closure.decl.params.len(),
            Function::Native(native) => native.arity,
        }
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Function::Closure(a), Function::Closure(b)) => {
                Rc::ptr_eq(&a.decl, &b.decl) && a.env.ptr_eq(&b.env)
            }
            (Function::Native(a), Function::Native(b)) => a.name == b.name,
            _ => false,
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Closure(closure) => write!(f, "<fun {}>", closure.decl.name.name),
            Function::Native(native) => write!(f, "<native fun {}>", native.name),
        }
    }
}

/// A function declaration paired with the frame it was declared in.
#[derive(Clone, Debug)]
pub struct Closure {
    pub decl: Rc<FunDecl>,
    pub env: Env,
}

impl Closure {
    pub fn new(decl: Rc<FunDecl>, env: Env) -> Self {
        Self { decl, env }
    }
}

#[derive(Clone)]
pub struct NativeFunction {
    pub name: &'static str,
    pub arity: usize,
    pub func: fn(&[Value]) -> RuntimeResult<Value>,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn only_nil_and_false_are_falsy() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(Value::Int(0).is_truthy());
        assert!(Value::Double(0.0).is_truthy());
        assert!(Value::string("").is_truthy());
    }

    #[test]
    fn formats_numbers() {
        assert_eq!(Value::Int(-42).to_string(), "-42");
        assert_eq!(Value::Double(0.5).to_string(), "0.5");
        assert_eq!(Value::Double(3.0).to_string(), "3.0");
        assert_eq!(Value::Double(-0.25).to_string(), "-0.25");
    }

    #[test]
    fn non_finite_doubles_have_no_fraction() {
        assert_eq!(Value::Double(f64::INFINITY).to_string(), "inf");
        assert_eq!(Value::Double(f64::NEG_INFINITY).to_string(), "-inf");
        assert_eq!(Value::Double(f64::NAN).to_string(), "nan");
    }

    #[test]
    fn formats_other_values() {
        assert_eq!(Value::Nil.to_string(), "nil");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::string("hi there").to_string(), "hi there");
    }

    #[test]
    fn kinds_never_compare_equal_across_types() {
        assert_ne!(Value::Int(1), Value::Double(1.0));
        assert_ne!(Value::Int(0), Value::Bool(false));
        assert_ne!(Value::Nil, Value::Bool(false));
        assert_eq!(Value::string("a"), Value::string("a"));
    }
}
