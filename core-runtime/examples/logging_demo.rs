//! Logging system demonstration
//!
//! This example shows how to use the logging infrastructure in different modes.
//!
//! Run with:
//! ```bash
//! # Pretty format (default in debug)
//! cargo run --example logging_demo
//!
//! # JSON format
//! cargo run --example logging_demo -- json
//!
//! # Compact format
//! cargo run --example logging_demo -- compact
//!
//! # With custom filter
//! cargo run --example logging_demo -- pretty "core_runtime=trace"
//! ```

use bridge_traits::time::LogLevel;
use core_runtime::logging::{
    init_logging, redact_if_sensitive, redact_url, LogFormat, LoggingConfig,
};
use std::env;
use tracing::{debug, error, info, instrument, span, trace, warn, Level};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let format = if args.len() > 1 {
        match args[1].as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Pretty,
        }
    } else {
        LogFormat::default()
    };

    let filter = args.get(2).cloned();

    // Initialize logging
    let mut config = LoggingConfig::default()
        .with_format(format)
        .with_level(LogLevel::Trace)
        .with_pii_redaction(true)
        .with_spans(true)
        .with_target(true);

    if let Some(f) = filter {
        config = config.with_filter(f);
    }

    init_logging(config).expect("Failed to initialize logging");

    info!("=== Logging System Demo ===");
    info!(format = ?format, "Logging initialized");

    // Demonstrate different log levels
    demo_log_levels();

    // Demonstrate structured logging
    demo_structured_logging();

    // Demonstrate spans for tracing
    demo_spans().await;

    // Demonstrate PII redaction
    demo_pii_redaction();

    // Demonstrate instrumentation
    demo_instrumentation().await;

    info!("=== Demo Complete ===");
}

fn demo_log_levels() {
    let span = span!(Level::INFO, "log_levels");
    let _enter = span.enter();

    trace!("This is a TRACE level log");
    debug!("This is a DEBUG level log");
    info!("This is an INFO level log");
    warn!("This is a WARN level log");
    error!("This is an ERROR level log");
}

fn demo_structured_logging() {
    let span = span!(Level::INFO, "structured_logging");
    let _enter = span.enter();

    info!("Simple message without fields");

    info!(
        user_id = "user-12345",
        authenticated = true,
        return_to = "/dashboard/reports",
        "Session information"
    );

    info!(
        subscriber_count = 3,
        bootstrap_ms = 42,
        "Session store metrics"
    );
}

async fn demo_spans() {
    let span = span!(Level::INFO, "callback_flow", route = "/auth/callback");
    let _enter = span.enter();

    info!("Handling OAuth callback");

    {
        let inner_span = span!(Level::DEBUG, "decode_state");
        let _inner = inner_span.enter();

        debug!(return_to = "/dashboard", "Decoded state token");
        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
    }

    {
        let inner_span = span!(Level::DEBUG, "resolve_session");
        let _inner = inner_span.enter();

        debug!(attempt = 1, "Checking for session");
        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
    }

    info!(destination = "/dashboard", "Callback resolved");
}

fn demo_pii_redaction() {
    let span = span!(Level::INFO, "pii_redaction");
    let _enter = span.enter();

    // These values will be automatically redacted by our helpers
    let token = "secret_access_token_12345";
    let email = "user@example.com";
    let callback = "https://app.example.com/auth/callback?code=abc&state=xyz";

    info!(
        token = %redact_if_sensitive("access_token", token),
        email = %redact_if_sensitive("email", email),
        url = %redact_url(callback),
        "Sensitive data example"
    );

    // Best practice: Don't log sensitive values at all
    info!("Authentication successful for user");
    // Instead of: info!(access_token = token, "Auth successful")
}

#[instrument]
async fn demo_instrumentation() {
    info!("Instrumented function automatically creates spans");

    let routes = vec!["/dashboard", "/dashboard/reports", "/settings"];
    check_routes(&routes).await;
}

#[instrument(fields(count = routes.len()))]
async fn check_routes(routes: &[&str]) {
    debug!("Checking guarded routes");

    for (idx, route) in routes.iter().enumerate() {
        check_route(idx, route).await;
    }

    info!("All routes checked");
}

#[instrument(fields(route_idx = idx))]
async fn check_route(idx: usize, route: &str) {
    trace!(route = %route, "Evaluating route guard");
    tokio::time::sleep(tokio::time::Duration::from_millis(5)).await;
}
