//! Config file loading for CLI defaults.
//!
//! The file is a flat list of `key = value` lines (TOML-compatible subset):
//! strings are double-quoted, numbers and booleans are bare, `#` starts a
//! comment. Command-line flags win over file values.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use bookshelf_core::{OrganizationMode, SourceWeights};

/// File configuration for bookshelf defaults.
#[derive(Debug, Clone, Default)]
pub struct FileConfig {
    pub mode: Option<OrganizationMode>,
    pub pattern: Option<String>,
    pub covers: Option<bool>,
    pub google_books_api_key: Option<String>,
    pub normalize: Option<bool>,
    pub concurrency: Option<u8>,
    /// Overall per-request budget for a metadata source.
    pub remote_timeout_secs: Option<u64>,
    pub resolver_connect_timeout_secs: Option<u64>,
    pub resolver_read_timeout_secs: Option<u64>,
    pub resolver_min_confidence: Option<f64>,
    pub similarity_threshold: Option<f64>,
    pub acceptance_floor: Option<f64>,
    pub weight_manual: Option<f64>,
    pub weight_primary_api: Option<f64>,
    pub weight_secondary_api: Option<f64>,
    pub weight_embedded: Option<f64>,
    pub weight_filename: Option<f64>,
    pub database_path: Option<PathBuf>,
    pub excluded_extensions: Option<Vec<String>>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(concurrency) = self.concurrency
            && !(1..=100).contains(&concurrency)
        {
            bail!("Invalid config value for `concurrency`: {concurrency}. Expected range: 1..=100");
        }
        validate_timeout_secs("remote_timeout_secs", self.remote_timeout_secs)?;
        validate_timeout_secs(
            "resolver_connect_timeout_secs",
            self.resolver_connect_timeout_secs,
        )?;
        validate_timeout_secs("resolver_read_timeout_secs", self.resolver_read_timeout_secs)?;
        validate_unit("resolver_min_confidence", self.resolver_min_confidence)?;
        validate_unit("similarity_threshold", self.similarity_threshold)?;
        validate_unit("acceptance_floor", self.acceptance_floor)?;
        for (field, value) in [
            ("weight_manual", self.weight_manual),
            ("weight_primary_api", self.weight_primary_api),
            ("weight_secondary_api", self.weight_secondary_api),
            ("weight_embedded", self.weight_embedded),
            ("weight_filename", self.weight_filename),
        ] {
            if let Some(value) = value
                && !(value > 0.0 && value <= 10.0)
            {
                bail!("Invalid config value for `{field}`: {value}. Expected range: (0, 10]");
            }
        }
        Ok(())
    }

    /// Default weights overridden by any weights set in the file.
    #[must_use]
    pub fn source_weights(&self) -> SourceWeights {
        let defaults = SourceWeights::default();
        SourceWeights {
            manual: self.weight_manual.unwrap_or(defaults.manual),
            primary_api: self.weight_primary_api.unwrap_or(defaults.primary_api),
            secondary_api: self.weight_secondary_api.unwrap_or(defaults.secondary_api),
            embedded: self.weight_embedded.unwrap_or(defaults.embedded),
            filename: self.weight_filename.unwrap_or(defaults.filename),
        }
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=300).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=300");
    }
    Ok(())
}

fn validate_unit(field: &str, value: Option<f64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(0.0..=1.0).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 0.0..=1.0");
    }
    Ok(())
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/bookshelf/config.toml`
/// 2. `$HOME/.config/bookshelf/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("bookshelf")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("bookshelf")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file.
///
/// An explicit path must exist; the default path is optional.
pub fn load_file_config(explicit: Option<&Path>) -> Result<FileConfig> {
    if let Some(path) = explicit {
        return read_file_config(path);
    }
    match resolve_default_config_path() {
        Some(path) if path.exists() => read_file_config(&path),
        _ => Ok(FileConfig::default()),
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let context = || format!("Invalid `{key}` value on line {}", line_index + 1);

        match key {
            "mode" => {
                let parsed = parse_string_literal(value).with_context(context)?;
                let mode = parsed
                    .parse::<OrganizationMode>()
                    .map_err(anyhow::Error::msg)
                    .with_context(context)?;
                cfg.mode = Some(mode);
            }
            "pattern" => cfg.pattern = Some(parse_string_literal(value).with_context(context)?),
            "covers" => cfg.covers = Some(parse_boolean(value).with_context(context)?),
            "google_books_api_key" => {
                cfg.google_books_api_key =
                    Some(parse_string_literal(value).with_context(context)?);
            }
            "normalize" => cfg.normalize = Some(parse_boolean(value).with_context(context)?),
            "concurrency" => {
                cfg.concurrency = Some(parse_integer_u8(value).with_context(context)?);
            }
            "remote_timeout_secs" => {
                cfg.remote_timeout_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "resolver_connect_timeout_secs" => {
                cfg.resolver_connect_timeout_secs =
                    Some(parse_integer_u64(value).with_context(context)?);
            }
            "resolver_read_timeout_secs" => {
                cfg.resolver_read_timeout_secs =
                    Some(parse_integer_u64(value).with_context(context)?);
            }
            "resolver_min_confidence" => {
                cfg.resolver_min_confidence = Some(parse_float(value).with_context(context)?);
            }
            "similarity_threshold" => {
                cfg.similarity_threshold = Some(parse_float(value).with_context(context)?);
            }
            "acceptance_floor" => {
                cfg.acceptance_floor = Some(parse_float(value).with_context(context)?);
            }
            "weight_manual" => cfg.weight_manual = Some(parse_float(value).with_context(context)?),
            "weight_primary_api" => {
                cfg.weight_primary_api = Some(parse_float(value).with_context(context)?);
            }
            "weight_secondary_api" => {
                cfg.weight_secondary_api = Some(parse_float(value).with_context(context)?);
            }
            "weight_embedded" => {
                cfg.weight_embedded = Some(parse_float(value).with_context(context)?);
            }
            "weight_filename" => {
                cfg.weight_filename = Some(parse_float(value).with_context(context)?);
            }
            "database_path" => {
                let parsed = parse_string_literal(value).with_context(context)?;
                cfg.database_path = Some(PathBuf::from(parsed));
            }
            "excluded_extensions" => {
                let parsed = parse_string_literal(value).with_context(context)?;
                cfg.excluded_extensions = Some(
                    parsed
                        .split([',', ' '])
                        .map(str::trim)
                        .filter(|e| !e.is_empty())
                        .map(ToString::to_string)
                        .collect(),
                );
            }
            unknown => {
                bail!(
                    "Unknown configuration key: '{}' on line {}",
                    unknown,
                    line_index + 1
                );
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

/// Cuts a trailing `# comment`, ignoring `#` inside double quotes.
fn strip_inline_comment(line: &str) -> &str {
    let mut quoted = false;
    line.char_indices()
        .find_map(|(index, ch)| {
            if ch == '"' {
                quoted = !quoted;
            }
            (ch == '#' && !quoted).then_some(index)
        })
        .map_or(line, |index| &line[..index])
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    raw_value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .map(ToString::to_string)
        .context("Expected double-quoted string")
}

/// Bare unsigned integer; signs, fractions and trailing tokens are rejected.
fn parse_unsigned<T>(raw_value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let token = raw_value.trim();
    if token.is_empty() || !token.chars().all(|c| c.is_ascii_digit()) {
        bail!("Expected a non-negative integer, got '{token}'");
    }
    token
        .parse::<T>()
        .with_context(|| format!("'{token}' is out of range"))
}

fn parse_integer_u8(raw_value: &str) -> Result<u8> {
    parse_unsigned(raw_value)
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    parse_unsigned(raw_value)
}

fn parse_float(raw_value: &str) -> Result<f64> {
    let token = raw_value.trim();
    match token.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => bail!("Expected a finite number, got '{token}'"),
    }
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => bail!("Expected 'true' or 'false', got '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_partial_fields() {
        let cfg = parse_config_str(
            r#"
concurrency = 8
mode = "genre-author"
"#,
        )
        .expect("partial config should parse");
        assert_eq!(cfg.concurrency, Some(8));
        assert_eq!(cfg.mode, Some(OrganizationMode::GenreAuthor));
        assert!(cfg.pattern.is_none());
    }

    #[test]
    fn test_parse_config_supports_inline_comments() {
        let cfg = parse_config_str(
            r#"
pattern = "{title} # {author}" # hash inside the string is kept
covers = true # plan covers
"#,
        )
        .expect("config with comments should parse");
        assert_eq!(cfg.pattern.as_deref(), Some("{title} # {author}"));
        assert_eq!(cfg.covers, Some(true));
    }

    #[test]
    fn test_parse_config_rejects_invalid_concurrency() {
        let err = parse_config_str("concurrency = 0").expect_err("invalid concurrency expected");
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn test_parse_config_rejects_numeric_values_with_trailing_tokens() {
        let err = parse_config_str("concurrency = 4 trailing")
            .expect_err("expected trailing token error");
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn test_parse_config_thresholds_and_weights() {
        let cfg = parse_config_str(
            r"
similarity_threshold = 0.7
acceptance_floor = 0.4
weight_filename = 0.5
",
        )
        .expect("thresholds should parse");
        assert_eq!(cfg.similarity_threshold, Some(0.7));
        assert_eq!(cfg.acceptance_floor, Some(0.4));
        let weights = cfg.source_weights();
        assert!((weights.filename - 0.5).abs() < f64::EPSILON);
        assert!((weights.manual - 1.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_config_rejects_out_of_range_threshold() {
        let err = parse_config_str("acceptance_floor = 1.5").expect_err("floor above 1");
        assert!(err.to_string().contains("acceptance_floor"));
        let err = parse_config_str("weight_manual = 0").expect_err("zero weight");
        assert!(err.to_string().contains("weight_manual"));
    }

    #[test]
    fn test_parse_config_rejects_invalid_mode() {
        let err = parse_config_str(r#"mode = "shelf""#).expect_err("invalid mode expected");
        assert!(format!("{err:#}").contains("mode"));
    }

    #[test]
    fn test_parse_config_excluded_extensions_list() {
        let cfg = parse_config_str(r#"excluded_extensions = "zip, iso tmp""#).expect("list");
        assert_eq!(
            cfg.excluded_extensions,
            Some(vec!["zip".to_string(), "iso".to_string(), "tmp".to_string()])
        );
    }

    #[test]
    fn test_parse_config_timeout_fields() {
        let cfg = parse_config_str(
            r"
remote_timeout_secs = 20
resolver_connect_timeout_secs = 5
resolver_read_timeout_secs = 12
",
        )
        .expect("timeout config should parse");
        assert_eq!(cfg.remote_timeout_secs, Some(20));
        assert_eq!(cfg.resolver_connect_timeout_secs, Some(5));
        assert_eq!(cfg.resolver_read_timeout_secs, Some(12));
        assert!(parse_config_str("remote_timeout_secs = 0").is_err());
    }

    #[test]
    fn test_parse_config_rejects_unknown_keys() {
        let err = parse_config_str("unknown_key = 123").expect_err("unknown key error expected");
        assert!(err.to_string().contains("Unknown configuration key"));
        assert!(err.to_string().contains("unknown_key"));
    }

    #[test]
    fn test_load_file_config_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_file_config(Some(&dir.path().join("none.toml"))).expect_err("missing file");
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
