use crate::{
    config::ConfigError,
    language::{errors::SyntaxError, resolve::ResolveError, span::Span},
    runtime::error::RuntimeError,
    MidasError,
};
use miette::{Diagnostic, NamedSource, Report, SourceSpan};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic, Clone)]
#[error("{message}")]
pub struct SyntaxDiagnostic {
    #[source_code]
    src: NamedSource<String>,
    #[label("{label}")]
    span: SourceSpan,
    #[help]
    help: Option<String>,
    message: String,
    label: String,
}

impl SyntaxDiagnostic {
    pub fn from_error(src: NamedSource<String>, err: &SyntaxError) -> Self {
        Self {
            src,
            span: err.to_source_span(),
            help: err.help.clone(),
            message: format!("[line {}] {}", err.line(), err.message),
            label: "here".into(),
        }
    }
}

#[derive(Debug, Error, Diagnostic, Clone)]
#[error("{message}")]
#[diagnostic(code(midas::resolve))]
pub struct ResolveDiagnostic {
    #[source_code]
    src: NamedSource<String>,
    #[label("declared here but not yet initialized")]
    span: SourceSpan,
    #[help]
    help: Option<String>,
    message: String,
}

impl ResolveDiagnostic {
    pub fn from_error(src: NamedSource<String>, err: &ResolveError) -> Self {
        let help = match err {
            ResolveError::SelfReferentialInitializer { name, .. } => Some(format!(
                "rename the new variable or read `{name}` before this block shadows it"
            )),
        };
        Self {
            src,
            span: err.to_source_span(),
            help,
            message: format!("[line {}] {}", err.line(), err),
        }
    }
}

#[derive(Debug, Error, Diagnostic, Clone)]
#[error("{message}")]
#[diagnostic(code(midas::runtime))]
pub struct RuntimeDiagnostic {
    #[source_code]
    src: NamedSource<String>,
    #[label("{label}")]
    span: Option<SourceSpan>,
    message: String,
    label: String,
}

impl RuntimeDiagnostic {
    pub fn from_error(src: NamedSource<String>, err: &RuntimeError) -> Self {
        let message = match err.line() {
            Some(line) => format!("[line {line}] {err}"),
            None => err.to_string(),
        };
        let label = if err.is_internal() {
            "interpreter bug triggered here"
        } else {
            "while evaluating this"
        };
        Self {
            src,
            span: err.span().map(Span::to_source_span),
            message,
            label: label.into(),
        }
    }
}

/// Renders `error` as one or more reports against `source`.
pub fn render(name: &str, source: &str, error: &MidasError) -> Vec<Report> {
    let src = NamedSource::new(name.to_string(), source.to_string());
    match error {
        MidasError::Syntax(errors) => errors
            .errors
            .iter()
            .map(|err| Report::new(SyntaxDiagnostic::from_error(src.clone(), err)))
            .collect(),
        MidasError::Resolve(err) => vec![Report::new(ResolveDiagnostic::from_error(src, err))],
        MidasError::Runtime(err) => vec![Report::new(RuntimeDiagnostic::from_error(src, err))],
    }
}

pub fn emit_error(name: &str, source: &str, error: &MidasError) {
    for report in render(name, source, error) {
        eprintln!("{report:?}");
    }
}

pub fn report_config_error(error: &ConfigError) {
    eprintln!("Configuration error: {error}");
}

pub fn report_io_error(path: &Path, error: &std::io::Error) {
    eprintln!("Failed to access {}: {}", path.display(), error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{check_source, run_source, runtime::InterpreterConfig};

    #[test]
    fn syntax_errors_render_one_report_each() {
        let err = check_source("print ;\nvar = 2;").unwrap_err();
        let reports = render("bad.midas", "print ;\nvar = 2;", &err);
        assert_eq!(reports.len(), 2);
        assert!(reports[0].to_string().starts_with("[line 1]"));
        assert!(reports[1].to_string().starts_with("[line 2]"));
    }

    #[test]
    fn runtime_report_carries_the_line() {
        let source = "var a = 1;\nprint a // 0;";
        let err = run_source(source, Vec::new(), InterpreterConfig::default()).unwrap_err();
        let reports = render("div.midas", source, &err);
        assert_eq!(reports[0].to_string(), "[line 2] Division by zero");
    }

    #[test]
    fn resolve_report_names_the_variable() {
        let source = "do var x = x; end";
        let err = check_source(source).unwrap_err();
        let reports = render("self.midas", source, &err);
        assert!(reports[0].to_string().contains("`x`"));
    }
}
