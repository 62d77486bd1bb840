//! Configuration file loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use netbound_http::{
    DEFAULT_MAX_CHUNK_SIZE, DEFAULT_TIMEOUT_MS, ExecutorOptions, RequestDefaults, TransportClass,
};

const TIMEOUT_RANGE_MS: std::ops::RangeInclusive<u64> = 1..=600_000;
const CHUNK_SIZE_RANGE: std::ops::RangeInclusive<u64> = 1024..=1_048_576;

/// `key = value` file configuration for netbound defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Timeout for requests that do not set one.
    pub default_timeout_ms: Option<u64>,
    /// Transport class for requests that do not set one.
    pub default_network: Option<TransportClass>,
    /// Whether a Status event precedes the body.
    pub emit_status: Option<bool>,
    /// Largest body slice per Progress event.
    pub max_chunk_size: Option<u64>,
    /// Default verbosity mode.
    pub verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Validates config values against the ranges the CLI accepts.
    pub fn validate(&self) -> Result<()> {
        if let Some(timeout) = self.default_timeout_ms
            && !TIMEOUT_RANGE_MS.contains(&timeout)
        {
            bail!(
                "Invalid config value for `default_timeout_ms`: {timeout}. Expected range: 1..=600000"
            );
        }
        if let Some(size) = self.max_chunk_size
            && !CHUNK_SIZE_RANGE.contains(&size)
        {
            bail!(
                "Invalid config value for `max_chunk_size`: {size}. Expected range: 1024..=1048576"
            );
        }
        Ok(())
    }

    /// Request defaults, with `timeout_override` and `network_override` from flags winning.
    #[must_use]
    pub fn request_defaults(
        &self,
        timeout_override: Option<u64>,
        network_override: Option<TransportClass>,
    ) -> RequestDefaults {
        let timeout_ms = timeout_override
            .or(self.default_timeout_ms)
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        RequestDefaults {
            timeout: Duration::from_millis(timeout_ms),
            transport: network_override
                .or(self.default_network)
                .unwrap_or_default(),
        }
    }

    /// Executor options; `--no-status` on the command line always wins.
    #[must_use]
    pub fn executor_options(&self, no_status: bool) -> ExecutorOptions {
        ExecutorOptions {
            emit_status: !no_status && self.emit_status.unwrap_or(true),
            max_chunk_size: self
                .max_chunk_size
                .and_then(|size| usize::try_from(size).ok())
                .unwrap_or(DEFAULT_MAX_CHUNK_SIZE),
        }
    }
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl VerbositySetting {
    /// Returns the stable string label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Verbose => "verbose",
            Self::Quiet => "quiet",
            Self::Debug => "debug",
        }
    }

    /// Tracing filter level for this setting.
    #[must_use]
    pub fn level(self) -> &'static str {
        match self {
            Self::Default => "info",
            Self::Verbose => "debug",
            Self::Quiet => "error",
            Self::Debug => "trace",
        }
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed config, or defaults when no file exists.
    pub config: FileConfig,
    /// Whether configuration was read from disk.
    pub loaded_from_file: bool,
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/netbound/config.toml`
/// 2. `$HOME/.config/netbound/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("netbound")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("netbound")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from the default path if a file exists there.
pub fn load_default_file_config() -> Result<LoadedConfig> {
    let path = resolve_default_config_path();
    match path.as_deref() {
        Some(existing) if existing.exists() => {
            let config = load_file_config(existing)?;
            Ok(LoadedConfig {
                path,
                config,
                loaded_from_file: true,
            })
        }
        _ => Ok(LoadedConfig {
            path,
            ..LoadedConfig::default()
        }),
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_number = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_number}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {line_number}");

        match key {
            "default_timeout_ms" => {
                cfg.default_timeout_ms = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "default_network" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.default_network = Some(parsed.parse().with_context(invalid)?);
            }
            "emit_status" => {
                cfg.emit_status = Some(parse_boolean(value).with_context(invalid)?);
            }
            "max_chunk_size" => {
                cfg.max_chunk_size = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "verbosity" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!("Invalid `verbosity` value '{parsed}' on line {line_number}")
                })?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_number}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    raw_value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .map(str::to_string)
        .context("Expected double-quoted string")
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).context("Integer value out of range for u64")
}

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    match value {
        "default" => Ok(VerbositySetting::Default),
        "verbose" => Ok(VerbositySetting::Verbose),
        "quiet" => Ok(VerbositySetting::Quiet),
        "debug" => Ok(VerbositySetting::Debug),
        _ => bail!("Expected one of: default, verbose, quiet, debug"),
    }
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}
