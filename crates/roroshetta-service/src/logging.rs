//! Log filter setup for the runner binary.

use tracing_subscriber::EnvFilter;

/// Directives used when `RUST_LOG` is unset, empty or unparseable.
pub const DEFAULT_FILTER: &str = "roroshetta=info,roroshetta_core=info,roroshetta_service=info";

/// Build the log filter.
///
/// A non-empty, valid `rust_log` is used as is, so `RUST_LOG` can lower or
/// raise the level of the runner's own crates.
pub fn env_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .map(str::trim)
        .filter(|directives| !directives.is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_rust_log() {
        let filter = env_filter(None).to_string();
        assert!(filter.contains("roroshetta_core=info"));
        assert!(filter.contains("roroshetta_service=info"));
    }

    #[test]
    fn test_rust_log_overrides_defaults() {
        let filter = env_filter(Some("roroshetta_core=debug")).to_string();
        assert!(filter.contains("roroshetta_core=debug"));
        assert!(!filter.contains("roroshetta_core=info"));
        assert!(!filter.contains("roroshetta_service"));
    }

    #[test]
    fn test_rust_log_can_quiet_the_runner() {
        let filter = env_filter(Some("warn")).to_string();
        assert!(filter.contains("warn"));
        assert!(!filter.contains("roroshetta"));
    }

    #[test]
    fn test_empty_rust_log_uses_defaults() {
        let filter = env_filter(Some("  ")).to_string();
        assert!(filter.contains("roroshetta_core=info"));
    }
}
