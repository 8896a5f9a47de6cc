use midas::{
    check_source,
    config::{Flags, RunOptions},
    logging, run_source,
    tools::{diagnostics, repl},
};
use std::env;
use std::fs;
use std::io;
use std::path::Path;
use std::process::ExitCode;

const USAGE: &str = "Usage: midas [run|check] <file.midas> [--log <filter>] [--max-depth <n>] [--gc-threshold <n>]\n       midas [repl]";

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let (flags, positional) = match Flags::parse(&args) {
        Ok(parsed) => parsed,
        Err(err) => {
            diagnostics::report_config_error(&err);
            eprintln!("{USAGE}");
            return ExitCode::from(2);
        }
    };
    let options = match RunOptions::from_flag_or_env(flags) {
        Ok(options) => options,
        Err(err) => {
            diagnostics::report_config_error(&err);
            return ExitCode::from(2);
        }
    };
    logging::init(options.log.as_deref());

    match positional.as_slice() {
        [] => start_repl(&options),
        [command] if command == "repl" => start_repl(&options),
        [command, filename] if command == "run" => run_file(filename, &options),
        [command, filename] if command == "check" => check_file(filename),
        _ => {
            eprintln!("{USAGE}");
            ExitCode::from(2)
        }
    }
}

fn start_repl(options: &RunOptions) -> ExitCode {
    match repl::start(options.interpreter) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("REPL I/O error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn read_source(filename: &str) -> Option<String> {
    let path = Path::new(filename);
    match fs::read_to_string(path) {
        Ok(source) => Some(source),
        Err(err) => {
            diagnostics::report_io_error(path, &err);
            None
        }
    }
}

fn run_file(filename: &str, options: &RunOptions) -> ExitCode {
    let Some(source) = read_source(filename) else {
        return ExitCode::FAILURE;
    };
    let stdout = io::stdout();
    match run_source(&source, stdout.lock(), options.interpreter) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            diagnostics::emit_error(filename, &source, &err);
            ExitCode::FAILURE
        }
    }
}

fn check_file(filename: &str) -> ExitCode {
    let Some(source) = read_source(filename) else {
        return ExitCode::FAILURE;
    };
    match check_source(&source) {
        Ok(_) => {
            println!("{filename}: ok");
            ExitCode::SUCCESS
        }
        Err(err) => {
            diagnostics::emit_error(filename, &source, &err);
            ExitCode::FAILURE
        }
    }
}
