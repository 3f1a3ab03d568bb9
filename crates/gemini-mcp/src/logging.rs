//! Tracing subscriber setup
//!
//! Everything goes to stderr; stdout belongs to the stdio transport.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "gemini_mcp=info,gemini_mcp_core=info";
const VERBOSE_FILTER: &str = "gemini_mcp=debug,gemini_mcp_core=debug,tower_http=debug";

fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        VERBOSE_FILTER
    } else {
        DEFAULT_FILTER
    }
}

/// Install the global subscriber; `RUST_LOG` wins over `--verbose`
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .with_ansi(false)
        .init();
}
