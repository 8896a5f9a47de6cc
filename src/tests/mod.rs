
use crate::{run_source, runtime::InterpreterConfig, MidasError};

/// Runs `source` to completion and returns everything it printed, plus the
/// error that stopped it, if any.
pub(crate) fn run(source: &str) -> (String, Result<(), MidasError>) {
    let mut out = Vec::new();
    let result = run_source(source, &mut out, InterpreterConfig::default());
    (String::from_utf8(out).expect("program output is UTF-8"), result)
}

pub(crate) fn output_of(source: &str) -> String {
    let (output, result) = run(source);
    if let Err(err) = result {
        panic!("program failed: {err}\noutput so far:\n{output}");
    }
    output
}
