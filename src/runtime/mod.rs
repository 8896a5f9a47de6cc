pub mod environment;
pub mod error;
pub mod interpreter;
pub mod operators;
mod stack;
pub mod value;

pub use interpreter::{Interpreter, InterpreterConfig};
