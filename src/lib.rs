pub mod config;
pub mod language;
pub mod logging;
pub mod runtime;
pub mod tools;

use language::{
    ast::{NodeIds, Program},
    errors::SyntaxErrors,
    parser::{parse_program, parse_with_ids},
    resolve::{resolve_program, ResolveError, Resolutions},
};
use runtime::{error::RuntimeError, Interpreter, InterpreterConfig};
use std::io::Write;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MidasError {
    #[error(transparent)]
    Syntax(#[from] SyntaxErrors),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl MidasError {
    /// Line of the first error, when one is known.
    pub fn line(&self) -> Option<usize> {
        match self {
            MidasError::Syntax(errors) => errors.first().map(|err| err.line()),
            MidasError::Resolve(err) => Some(err.line()),
            MidasError::Runtime(err) => err.line(),
        }
    }
}

/// Parses and resolves `source` without running it.
pub fn check_source(source: &str) -> Result<(Program, Resolutions), MidasError> {
    let program = parse_program(source)?;
    let resolutions = resolve_program(&program)?;
    Ok((program, resolutions))
}

/// Runs a whole program, writing `print` output to `out`. Nothing executes
/// unless the entire program parses and resolves.
pub fn run_source<W: Write>(
    source: &str,
    out: W,
    config: InterpreterConfig,
) -> Result<(), MidasError> {
    let (program, resolutions) = check_source(source)?;
    let mut interpreter = Interpreter::with_config(out, config);
    interpreter.interpret(&program, resolutions)?;
    Ok(())
}

/// Interpreter state shared by several chunks of source, as in the REPL.
pub struct Session<W: Write> {
    ids: NodeIds,
    interpreter: Interpreter<W>,
}

impl<W: Write> Session<W> {
    pub fn new(out: W, config: InterpreterConfig) -> Self {
        Self {
            ids: NodeIds::new(),
            interpreter: Interpreter::with_config(out, config),
        }
    }

    /// Runs one chunk against the session's globals. A chunk that fails to
    /// parse or resolve leaves the session untouched.
    pub fn run(&mut self, source: &str) -> Result<(), MidasError> {
        let program = parse_with_ids(source, &mut self.ids)?;
        let resolutions = resolve_program(&program)?;
        self.interpreter.interpret(&program, resolutions)?;
        Ok(())
    }

    pub fn interpreter(&self) -> &Interpreter<W> {
        &self.interpreter
    }

    pub fn interpreter_mut(&mut self) -> &mut Interpreter<W> {
        &mut self.interpreter
    }
}

#[cfg(test)]
mod tests;
