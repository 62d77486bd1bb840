//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;
use netbound_http::TransportClass;

/// Issue one HTTP request over a chosen network interface class.
///
/// Events (status, progress, complete, error) are printed to stdout as one
/// JSON object per line; logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "netbound")]
#[command(author, version, about)]
pub struct Args {
    /// Request URI (absolute http or https)
    #[arg(required_unless_present = "json")]
    pub uri: Option<String>,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: String,

    /// Network to use: default, wifi or cellular
    #[arg(short, long)]
    pub network: Option<TransportClass>,

    /// Request header as `Name: value` (repeatable)
    #[arg(short = 'H', long = "header", value_name = "NAME:VALUE")]
    pub headers: Vec<String>,

    /// Request body sent as-is
    #[arg(short, long)]
    pub data: Option<String>,

    /// File the response body is written to
    #[arg(short, long, required_unless_present = "json")]
    pub output: Option<PathBuf>,

    /// Connect/read and acquisition timeout in milliseconds (1-600000)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=600_000))]
    pub timeout_ms: Option<u64>,

    /// Request id echoed in every event
    #[arg(long, default_value = "cli")]
    pub id: String,

    /// Do not emit the status event before the body
    #[arg(long)]
    pub no_status: bool,

    /// Read a JSON request map from stdin instead of flags
    #[arg(long, conflicts_with_all = ["uri", "headers", "data", "output"])]
    pub json: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Splits each `--header` into a name/value pair.
    ///
    /// # Errors
    ///
    /// Returns the offending argument when it has no `:` or an empty name.
    pub fn parsed_headers(&self) -> Result<Vec<(String, String)>, String> {
        self.headers
            .iter()
            .map(|raw| {
                let (name, value) = raw
                    .split_once(':')
                    .ok_or_else(|| format!("header '{raw}' must be NAME:VALUE"))?;
                let name = name.trim();
                if name.is_empty() {
                    return Err(format!("header '{raw}' has an empty name"));
                }
                Ok((name.to_string(), value.trim().to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_minimal_args_parse() {
        let args = Args::try_parse_from(["netbound", "https://example.com/a", "-o", "a.bin"]).unwrap();
        assert_eq!(args.uri.as_deref(), Some("https://example.com/a"));
        assert_eq!(args.output, Some(PathBuf::from("a.bin")));
        assert_eq!(args.method, "GET");
        assert_eq!(args.id, "cli");
        assert_eq!(args.network, None);
        assert!(!args.no_status);
        assert_eq!(args.verbose, 0);
    }

    #[test]
    fn test_cli_network_is_case_insensitive() {
        let args =
            Args::try_parse_from(["netbound", "https://e.com", "-o", "x", "--network", "WiFi"])
                .unwrap();
        assert_eq!(args.network, Some(TransportClass::Wifi));

        let args = Args::try_parse_from(["netbound", "https://e.com", "-o", "x", "-n", "any"]).unwrap();
        assert_eq!(args.network, Some(TransportClass::Default));
    }

    #[test]
    fn test_cli_unknown_network_rejected() {
        let err = Args::try_parse_from(["netbound", "https://e.com", "-o", "x", "-n", "satellite"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_uri_and_output_required_without_json() {
        let err = Args::try_parse_from(["netbound"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);

        let args = Args::try_parse_from(["netbound", "--json"]).unwrap();
        assert!(args.json);
        assert!(args.uri.is_none());
    }

    #[test]
    fn test_cli_json_conflicts_with_request_flags() {
        let err = Args::try_parse_from(["netbound", "--json", "https://e.com"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_cli_timeout_range() {
        let args = Args::try_parse_from([
            "netbound",
            "https://e.com",
            "-o",
            "x",
            "--timeout-ms",
            "500",
        ])
        .unwrap();
        assert_eq!(args.timeout_ms, Some(500));

        let err = Args::try_parse_from(["netbound", "https://e.com", "-o", "x", "--timeout-ms", "0"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_headers_repeat_and_split() {
        let args = Args::try_parse_from([
            "netbound",
            "https://e.com",
            "-o",
            "x",
            "-H",
            "Accept: text/plain",
            "--header",
            "X-Url:https://a.b/c",
        ])
        .unwrap();
        assert_eq!(
            args.parsed_headers().unwrap(),
            vec![
                ("Accept".to_string(), "text/plain".to_string()),
                ("X-Url".to_string(), "https://a.b/c".to_string()),
            ]
        );
    }

    #[test]
    fn test_cli_malformed_header_reported() {
        let args =
            Args::try_parse_from(["netbound", "https://e.com", "-o", "x", "-H", "no-colon"]).unwrap();
        assert!(args.parsed_headers().unwrap_err().contains("no-colon"));
    }

    #[test]
    fn test_cli_verbose_and_quiet_flags() {
        let args = Args::try_parse_from(["netbound", "--json", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
        let args = Args::try_parse_from(["netbound", "--json", "--quiet"]).unwrap();
        assert!(args.quiet);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["netbound", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
