// =============================================================================
// config.rs — THE KNOBS
// =============================================================================
//
// Process-level settings, read once at startup. Every value can be
// overridden through an environment variable prefixed with DATA_TOOLKIT_,
// and a .env file in the working directory is honoured if present.
//
// None of this is global state. The binary reads a Config, then hands each
// component the slice it needs (a SourceDescriptor for the acquirer, an
// AnalyzerConfig for the analyzer, a strict flag and sparse ratio for the
// cleaner). The library never reads the environment on its own.
// =============================================================================

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Everything tunable from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // LOGGING
    // =========================================================================

    /// Filter directive used when RUST_LOG is not set. Default: info
    pub log_filter: String,

    // =========================================================================
    // ACQUIRER
    // =========================================================================

    /// Timeout for the single HTTP request a fetch makes. Default: 10 seconds.
    /// There are no retries; when this expires the source is unavailable.
    pub http_timeout: Duration,

    /// User-Agent sent with every request. Public wikis ask scripted
    /// clients to identify themselves.
    pub user_agent: String,

    // =========================================================================
    // ANALYZER
    // =========================================================================

    /// |r| above this is a strong correlation. Default: 0.7
    pub strong_correlation: f64,

    /// Outlier fences sit this many IQRs beyond Q1 and Q3. Default: 1.5
    pub iqr_multiplier: f64,

    /// How many categories the text report prints per column. Default: 10
    pub top_categories: usize,

    // =========================================================================
    // CLEANER
    // =========================================================================

    /// Fail the whole run on any unparseable cell. Default: false
    pub strict: bool,

    /// A derived column with more than this share of empty cells is
    /// dropped. Default: 0.8
    pub sparse_column_ratio: f64,

    /// Where cleaned files and reports land. Default: data/processed
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_filter: "info".into(),
            http_timeout: Duration::from_secs(10),
            user_agent: default_user_agent(),
            strong_correlation: 0.7,
            iqr_multiplier: 1.5,
            top_categories: 10,
            strict: false,
            sparse_column_ratio: 0.8,
            output_dir: PathBuf::from("data/processed"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to the
    /// defaults above for anything unset or unparseable.
    pub fn from_env() -> Self {
        // A missing .env file is the normal case.
        let _ = dotenvy::dotenv();
        let defaults = Config::default();

        Config {
            log_filter: env_or_default("DATA_TOOLKIT_LOG", &defaults.log_filter),

            http_timeout: Duration::from_secs(
                env_or_default("DATA_TOOLKIT_HTTP_TIMEOUT_SECS", "10")
                    .parse()
                    .unwrap_or(10),
            ),
            user_agent: env_or_default("DATA_TOOLKIT_USER_AGENT", &defaults.user_agent),

            strong_correlation: env_or_default("DATA_TOOLKIT_STRONG_CORRELATION", "0.7")
                .parse()
                .unwrap_or(defaults.strong_correlation),
            iqr_multiplier: env_or_default("DATA_TOOLKIT_IQR_MULTIPLIER", "1.5")
                .parse()
                .unwrap_or(defaults.iqr_multiplier),
            top_categories: env_or_default("DATA_TOOLKIT_TOP_CATEGORIES", "10")
                .parse()
                .unwrap_or(defaults.top_categories),

            strict: parse_flag(&env_or_default("DATA_TOOLKIT_STRICT", "false")),
            sparse_column_ratio: env_or_default("DATA_TOOLKIT_SPARSE_COLUMN_RATIO", "0.8")
                .parse()
                .unwrap_or(defaults.sparse_column_ratio),
            output_dir: PathBuf::from(env_or_default(
                "DATA_TOOLKIT_OUTPUT_DIR",
                "data/processed",
            )),
        }
    }
}

fn default_user_agent() -> String {
    format!(
        "data-toolkit/{} (tabular data acquisition; batch, one request per run)",
        env!("CARGO_PKG_VERSION")
    )
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Read an environment variable with a default fallback.
fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
