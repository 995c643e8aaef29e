//! Environment variable interpolation for config files.
//!
//! Supports the following syntax:
//! - `$VAR` or `${VAR}` - substitute with the variable, error if missing
//! - `${VAR:-default}` - use default if VAR is unset OR empty
//! - `${VAR-default}` - use default only if VAR is unset (empty is OK)
//! - `$$` - escape sequence for literal `$`

use regex::{Captures, Regex};
use std::sync::LazyLock;

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        (?P<escape>\$\$)
        |
        \$\{
            (?P<braced>[A-Za-z_][A-Za-z0-9_]*)
            (?: (?P<op>:?-) (?P<default>[^}]*) )?
        \}
        |
        \$(?P<bare>[A-Za-z_][A-Za-z0-9_]*)
        ",
    )
    .expect("Invalid regex pattern")
});

/// Interpolate process environment variables into `input`.
///
/// All problems are collected so the user sees every missing variable at once.
pub fn interpolate(input: &str) -> Result<String, Vec<String>> {
    interpolate_with(input, |name| std::env::var(name).ok())
}

/// Interpolate using an arbitrary variable lookup.
pub fn interpolate_with<F>(input: &str, lookup: F) -> Result<String, Vec<String>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut errors = Vec::new();

    let text = ENV_VAR_PATTERN.replace_all(input, |caps: &Captures| {
        if caps.name("escape").is_some() {
            return "$".to_string();
        }

        let whole = &caps[0];
        let Some(name) = caps.name("braced").or_else(|| caps.name("bare")) else {
            return whole.to_string();
        };
        let name = name.as_str();
        let op = caps.name("op").map(|m| m.as_str());
        let default = caps.name("default").map(|m| m.as_str());

        match lookup(name) {
            Some(value) if value.contains(['\n', '\r']) => {
                errors.push(format!(
                    "environment variable '{name}' contains newlines, which is not allowed"
                ));
                whole.to_string()
            }
            Some(value) if value.is_empty() && op == Some(":-") => {
                default.unwrap_or_default().to_string()
            }
            Some(value) => value,
            None => match default {
                Some(default) => default.to_string(),
                None => {
                    errors.push(format!("environment variable '{name}' is not set"));
                    whole.to_string()
                }
            },
        }
    });

    if errors.is_empty() {
        Ok(text.into_owned())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn run(input: &str, vars: &[(&str, &str)]) -> Result<String, Vec<String>> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        interpolate_with(input, |name| vars.get(name).cloned())
    }

    #[test]
    fn test_bare_and_braced() {
        let vars = [("BUCKET", "sales"), ("ENV", "prod")];
        assert_eq!(
            run("s3://$BUCKET/${ENV}/raw", &vars).unwrap(),
            "s3://sales/prod/raw"
        );
    }

    #[test]
    fn test_missing_variables_are_all_reported() {
        let errors = run("a: $FIRST, b: ${SECOND}", &[]).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("FIRST"));
        assert!(errors[1].contains("not set"));
    }

    #[test]
    fn test_defaults() {
        assert_eq!(run("${UNSET:-fallback}", &[]).unwrap(), "fallback");
        assert_eq!(run("${UNSET-fallback}", &[]).unwrap(), "fallback");
        assert_eq!(run("${EMPTY:-fallback}", &[("EMPTY", "")]).unwrap(), "fallback");
        assert_eq!(run("${EMPTY-fallback}", &[("EMPTY", "")]).unwrap(), "");
        assert_eq!(run("${SET:-fallback}", &[("SET", "real")]).unwrap(), "real");
    }

    #[test]
    fn test_escape_sequence() {
        assert_eq!(run("price: $$100", &[]).unwrap(), "price: $100");
    }

    #[test]
    fn test_newlines_rejected() {
        let errors = run("$MULTI", &[("MULTI", "a\nb")]).unwrap_err();
        assert!(errors[0].contains("newlines"));
        let errors = run("$MULTI", &[("MULTI", "a\rb")]).unwrap_err();
        assert!(errors[0].contains("newlines"));
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(run("batch_size: 10", &[]).unwrap(), "batch_size: 10");
    }

    #[test]
    fn test_yaml_document() {
        let yaml = r#"
source:
  path: "s3://${BUCKET}/sales/"
  storage_options:
    aws_region: ${REGION:-us-east-1}
"#;
        let text = run(yaml, &[("BUCKET", "warehouse")]).unwrap();
        assert!(text.contains("s3://warehouse/sales/"));
        assert!(text.contains("aws_region: us-east-1"));
    }
}
