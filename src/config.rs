use crate::runtime::interpreter::{InterpreterConfig, DEFAULT_GC_THRESHOLD, DEFAULT_MAX_CALL_DEPTH};
use std::env;
use thiserror::Error;

pub const LOG_ENV: &str = "MIDAS_LOG";
pub const MAX_DEPTH_ENV: &str = "MIDAS_MAX_CALL_DEPTH";
pub const GC_THRESHOLD_ENV: &str = "MIDAS_GC_THRESHOLD";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {setting}: expected a positive integer")]
    InvalidNumber { setting: String, value: String },
    #[error("flag `{0}` expects a value")]
    MissingValue(String),
    #[error("unknown flag `{0}`")]
    UnknownFlag(String),
}

/// Raw flag values as given on the command line.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Flags {
    pub log: Option<String>,
    pub max_depth: Option<String>,
    pub gc_threshold: Option<String>,
}

impl Flags {
    /// Splits `args` into recognised flags and positional arguments.
    /// Accepts both `--flag value` and `--flag=value`.
    pub fn parse(args: &[String]) -> Result<(Flags, Vec<String>), ConfigError> {
        let mut flags = Flags::default();
        let mut positional = Vec::new();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            if !arg.starts_with("--") {
                positional.push(arg.clone());
                continue;
            }
            let (name, inline) = match arg.split_once('=') {
                Some((name, value)) => (name, Some(value.to_string())),
                None => (arg.as_str(), None),
            };
            let slot = match name {
                "--log" => &mut flags.log,
                "--max-depth" => &mut flags.max_depth,
                "--gc-threshold" => &mut flags.gc_threshold,
                _ => return Err(ConfigError::UnknownFlag(name.to_string())),
            };
            let value = match inline {
                Some(value) => value,
                None => iter
                    .next()
                    .cloned()
                    .ok_or_else(|| ConfigError::MissingValue(name.to_string()))?,
            };
            *slot = Some(value);
        }
        Ok((flags, positional))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub log: Option<String>,
    pub interpreter: InterpreterConfig,
}

impl RunOptions {
    pub fn from_flag_or_env(flags: Flags) -> Result<Self, ConfigError> {
        Self::from_sources(flags, |key| env::var(key).ok())
    }

    /// Each setting takes the flag, then the variable from `lookup`, then the default.
    pub fn from_sources(
        flags: Flags,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let pick = |flag: Option<String>, key: &str| {
            flag.or_else(|| lookup(key))
                .filter(|value| !value.trim().is_empty())
        };
        let log = pick(flags.log, LOG_ENV);
        let max_call_depth = parse_count(
            "--max-depth",
            pick(flags.max_depth, MAX_DEPTH_ENV),
            DEFAULT_MAX_CALL_DEPTH,
        )?;
        let gc_threshold = parse_count(
            "--gc-threshold",
            pick(flags.gc_threshold, GC_THRESHOLD_ENV),
            DEFAULT_GC_THRESHOLD,
        )?;
        Ok(Self {
            log,
            interpreter: InterpreterConfig {
                max_call_depth,
                gc_threshold,
            },
        })
    }
}

fn parse_count(setting: &str, raw: Option<String>, default: usize) -> Result<usize, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::InvalidNumber {
            setting: setting.to_string(),
            value: raw,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn splits_flags_from_positionals() {
        let (flags, positional) =
            Flags::parse(&args(&["run", "--max-depth", "50", "a.midas", "--log=debug"])).unwrap();
        assert_eq!(positional, args(&["run", "a.midas"]));
        assert_eq!(flags.max_depth.as_deref(), Some("50"));
        assert_eq!(flags.log.as_deref(), Some("debug"));
    }

    #[test]
    fn rejects_unknown_and_incomplete_flags() {
        assert_eq!(
            Flags::parse(&args(&["--fast"])).unwrap_err(),
            ConfigError::UnknownFlag("--fast".into())
        );
        assert_eq!(
            Flags::parse(&args(&["--gc-threshold"])).unwrap_err(),
            ConfigError::MissingValue("--gc-threshold".into())
        );
    }

    #[test]
    fn flag_beats_env_beats_default() {
        let env: HashMap<&str, &str> =
            HashMap::from([(MAX_DEPTH_ENV, "30"), (GC_THRESHOLD_ENV, "64"), (LOG_ENV, "trace")]);
        let lookup = |key: &str| env.get(key).map(|v| v.to_string());
        let flags = Flags {
            max_depth: Some("10".into()),
            ..Flags::default()
        };
        let options = RunOptions::from_sources(flags, lookup).unwrap();
        assert_eq!(options.interpreter.max_call_depth, 10);
        assert_eq!(options.interpreter.gc_threshold, 64);
        assert_eq!(options.log.as_deref(), Some("trace"));

        let defaults = RunOptions::from_sources(Flags::default(), |_| None).unwrap();
        assert_eq!(defaults.interpreter, InterpreterConfig::default());
        assert_eq!(defaults.log, None);
    }

    #[test]
    fn invalid_numbers_are_errors() {
        let flags = Flags {
            gc_threshold: Some("lots".into()),
            ..Flags::default()
        };
        let err = RunOptions::from_sources(flags, |_| None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { .. }));
        let err = RunOptions::from_sources(Flags::default(), |key| {
            (key == MAX_DEPTH_ENV).then(|| "0".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { .. }));
    }
}
