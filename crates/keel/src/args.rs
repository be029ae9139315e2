//! Tokenizer for `keel run` arguments.
//!
//! Parameters are not known to clap: they come from the parameter catalog
//! of the build being hosted, and generated pipelines pass matrix values and
//! variables under names the catalog may not even declare. Everything after
//! `run` is therefore split here into targets, the reserved flags, and
//! `--name value` pairs keyed by external argument name.

use crate::cli::CliError;
use std::collections::HashMap;

const SKIP_DEPENDENCIES: &str = "skip-dependencies";
const NON_INTERACTIVE: &str = "non-interactive";

/// Tokenized `keel run` arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunArgs {
    /// Requested targets, in order
    pub targets: Vec<String>,
    /// Run only the requested targets
    pub skip_dependencies: bool,
    /// Never prompt
    pub non_interactive: bool,
    /// Parameter values by external argument name
    pub params: HashMap<String, String>,
}

impl RunArgs {
    /// Split raw arguments.
    ///
    /// `--name value` and `--name=value` set a parameter; a `--flag` followed
    /// by another flag or by nothing is `"true"`. Bare words not consumed as
    /// values are targets. Later values of the same parameter win.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty flag name, a single-dash
    /// argument, a non-boolean value for a reserved flag, or when no target
    /// is given.
    pub fn parse(args: &[String]) -> Result<Self, CliError> {
        let mut parsed = Self::default();
        let mut tokens = args.iter().peekable();

        while let Some(token) = tokens.next() {
            let Some(flag) = token.strip_prefix("--") else {
                if token.starts_with('-') && token.len() > 1 {
                    return Err(CliError::config_with_help(
                        format!("Unexpected argument '{token}'"),
                        "Parameters are passed as --name value",
                    ));
                }
                parsed.targets.push(token.clone());
                continue;
            };

            let (name, inline) = match flag.split_once('=') {
                Some((name, value)) => (name, Some(value.to_string())),
                None => (flag, None),
            };
            if name.is_empty() {
                return Err(CliError::config(format!("Unexpected argument '{token}'")));
            }

            match name {
                SKIP_DEPENDENCIES => parsed.skip_dependencies = parse_switch(name, inline)?,
                NON_INTERACTIVE => parsed.non_interactive = parse_switch(name, inline)?,
                _ => {
                    let value = match inline {
                        Some(value) => value,
                        None => match tokens.peek() {
                            Some(next) if !next.starts_with("--") => {
                                tokens.next().cloned().unwrap_or_default()
                            }
                            _ => "true".to_string(),
                        },
                    };
                    parsed.params.insert(name.to_string(), value);
                }
            }
        }

        if parsed.targets.is_empty() {
            return Err(CliError::config_with_help(
                "No target given",
                "Usage: keel run <TARGETS>... [--name value]...",
            ));
        }
        Ok(parsed)
    }
}

fn parse_switch(name: &str, value: Option<String>) -> Result<bool, CliError> {
    match value.as_deref() {
        None | Some("true") => Ok(true),
        Some("false") => Ok(false),
        Some(other) => Err(CliError::config(format!(
            "--{name} takes no value or true/false, got '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<RunArgs, CliError> {
        let args: Vec<String> = args.iter().map(ToString::to_string).collect();
        RunArgs::parse(&args)
    }

    #[test]
    fn test_targets_flags_and_params() {
        let args = parse(&[
            "Test",
            "Pack",
            "--skip-dependencies",
            "--non-interactive",
            "--framework",
            "net8.0",
            "--configuration=Release",
        ])
        .unwrap();

        assert_eq!(args.targets, ["Test", "Pack"]);
        assert!(args.skip_dependencies);
        assert!(args.non_interactive);
        assert_eq!(args.params["framework"], "net8.0");
        assert_eq!(args.params["configuration"], "Release");
    }

    #[test]
    fn test_bare_flag_is_true() {
        let args = parse(&["Publish", "--dry-run", "--api-key", "k"]).unwrap();
        assert_eq!(args.params["dry-run"], "true");
        assert_eq!(args.params["api-key"], "k");

        let trailing = parse(&["Publish", "--dry-run"]).unwrap();
        assert_eq!(trailing.params["dry-run"], "true");
    }

    #[test]
    fn test_values_may_start_with_single_dash() {
        let args = parse(&["Bump", "--offset", "-1"]).unwrap();
        assert_eq!(args.params["offset"], "-1");
    }

    #[test]
    fn test_equals_keeps_rest_of_value() {
        let args = parse(&["Deploy", "--connection=a=b;c=d", "--empty="]).unwrap();
        assert_eq!(args.params["connection"], "a=b;c=d");
        assert_eq!(args.params["empty"], "");
    }

    #[test]
    fn test_later_value_wins() {
        let args = parse(&["Build", "--configuration", "Debug", "--configuration", "Release"])
            .unwrap();
        assert_eq!(args.params["configuration"], "Release");
    }

    #[test]
    fn test_reserved_flag_accepts_explicit_boolean() {
        let args = parse(&["Build", "--skip-dependencies=false"]).unwrap();
        assert!(!args.skip_dependencies);
        assert!(parse(&["Build", "--skip-dependencies=maybe"]).is_err());
    }

    #[test]
    fn test_rejects_malformed_arguments() {
        assert!(parse(&["--configuration", "Release"]).is_err());
        assert!(parse(&["Build", "-x"]).is_err());
        assert!(parse(&["Build", "--"]).is_err());
        assert!(parse(&[]).is_err());
    }
}
