/*!
 * Structured Tracing
 * Log setup for the normal-context side of the fault subsystem
 *
 * Logs go to stderr. Stdout is reserved for handler diagnostic lines, and
 * nothing is ever logged from inside a handler.
 */

use tracing::info;
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::limits::{DEFAULT_LOG_FILTER, TRACE_JSON_ENV};

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - FAULT_TRACE_JSON: Enable JSON output (default: false)
pub fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let registry = tracing_subscriber::registry().with(env_filter);

    if json_requested(std::env::var(TRACE_JSON_ENV).ok().as_deref()) {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_line_number(true)
                    .with_file(true)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .init();
        info!("Structured tracing initialized with JSON output");
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_line_number(true)
                    .compact(),
            )
            .init();
        info!("Structured tracing initialized");
    }
}

fn json_requested(value: Option<&str>) -> bool {
    matches!(value, Some("1") | Some("true"))
}
