use crate::{runtime::InterpreterConfig, tools::diagnostics, MidasError, Session};
use std::io::{self, BufRead, Write};

pub const PROMPT: &str = "=> ";

/// Reads chunks from `input` until end of input, running each against one
/// session. Errors are passed to `on_error` and the session carries on.
pub fn run<R, W>(
    input: R,
    out: W,
    config: InterpreterConfig,
    mut on_error: impl FnMut(&str, &MidasError),
) -> io::Result<()>
where
    R: BufRead,
    W: Write,
{
    let mut session = Session::new(out, config);
    let mut lines = input.lines();
    loop {
        {
            let out = session.interpreter_mut().output_mut();
            write!(out, "{PROMPT}")?;
            out.flush()?;
        }
        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Err(err) = session.run(&line) {
            on_error(&line, &err);
        }
    }
    writeln!(session.interpreter_mut().output_mut())?;
    Ok(())
}

/// Interactive loop on the process's stdin and stdout.
pub fn start(config: InterpreterConfig) -> io::Result<()> {
    let stdin = io::stdin();
    run(stdin.lock(), io::stdout(), config, |line, err| {
        diagnostics::emit_error("<repl>", line, err)
    })
}
