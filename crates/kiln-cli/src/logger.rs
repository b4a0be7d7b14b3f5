//! Logging setup for the kiln CLI.
//!
//! Library crates emit `tracing` events; this module installs the subscriber
//! that prints them.
//!
//! ```rust,no_run
//! use kiln_cli::logger::init_logger;
//!
//! init_logger(false, false, false);
//! tracing::info!("serving");
//! ```

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const VERBOSE_FILTER: &str = "kiln=debug,kiln_build=debug,kiln_graph=debug,kiln_config=debug,kiln_cli=debug";
const QUIET_FILTER: &str = "kiln=error,kiln_build=error,kiln_graph=error,kiln_config=error,kiln_cli=error";
const DEFAULT_FILTER: &str = "kiln=info,kiln_build=info,kiln_graph=info,kiln_config=info,kiln_cli=info";

/// Initialize the tracing subscriber.
///
/// The filter is chosen in this order:
/// 1. `--verbose`: debug for kiln crates
/// 2. `--quiet`: errors only
/// 3. `RUST_LOG`
/// 4. info for kiln crates
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    init_logger_with_filter(filter_for(verbose, quiet), no_color);
}

/// Initialize the subscriber with an explicit filter.
pub fn init_logger_with_filter(filter: EnvFilter, no_color: bool) {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color)
        .compact();

    // A second initialization (tests, embedders) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

fn filter_for(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else if quiet {
        EnvFilter::new(QUIET_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_parse() {
        let _ = EnvFilter::new(VERBOSE_FILTER);
        let _ = EnvFilter::new(QUIET_FILTER);
        let _ = EnvFilter::new(DEFAULT_FILTER);
    }

    #[test]
    fn test_verbose_wins_over_quiet() {
        assert!(filter_for(true, true).to_string().contains("kiln_build=debug"));
        assert!(filter_for(false, true).to_string().contains("kiln_build=error"));
    }
}
