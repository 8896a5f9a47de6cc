pub mod diagnostics;
pub mod repl;
