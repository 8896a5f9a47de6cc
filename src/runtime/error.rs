use crate::language::span::Span;
use thiserror::Error;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Type mismatch: {message}")]
    TypeMismatch { message: String, span: Span },
    #[error("Value of type {type_name} is not callable")]
    NotCallable { type_name: &'static str, span: Span },
    #[error("Undefined variable `{name}`")]
    UndefinedVariable { name: String, span: Span },
    #[error("Function `{name}` expected {expected} arguments but received {received}")]
    ArityMismatch {
        name: String,
        expected: usize,
        received: usize,
        span: Span,
    },
    #[error("Division by zero")]
    DivisionByZero { span: Span },
    #[error("Stack overflow: call depth exceeded {limit}")]
    StackOverflow { limit: usize, span: Span },
    #[error("Failed to write program output: {0}")]
    Output(#[from] std::io::Error),
    /// A resolver/interpreter disagreement. Never caused by user code.
    #[error("Internal interpreter error: {message}")]
    Internal { message: String, span: Option<Span> },
}

impl RuntimeError {
    pub fn type_mismatch(message: impl Into<String>, span: Span) -> Self {
        RuntimeError::TypeMismatch {
            message: message.into(),
            span,
        }
    }

    pub fn internal(message: impl Into<String>, span: Option<Span>) -> Self {
        RuntimeError::Internal {
            message: message.into(),
            span,
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            RuntimeError::TypeMismatch { span, .. }
            | RuntimeError::NotCallable { span, .. }
            | RuntimeError::UndefinedVariable { span, .. }
            | RuntimeError::ArityMismatch { span, .. }
            | RuntimeError::DivisionByZero { span }
            | RuntimeError::StackOverflow { span, .. } => Some(*span),
            RuntimeError::Internal { span, .. } => *span,
            RuntimeError::Output(_) => None,
        }
    }

    pub fn line(&self) -> Option<usize> {
        self.span().map(|span| span.line)
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, RuntimeError::Internal { .. })
    }
}
