//! Standardized logging configuration for the Janus server.
//!
//! Structured logs via `tracing`, filtered with `RUST_LOG` (default
//! `info`), with a plain human-readable writer or a JSON writer for
//! aggregator ingestion.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Span name emitted around a single tick-merge; filtered out of the
/// default human-readable log so reconnect/order/registry activity does not
/// get drowned out by per-tick noise (every broker-B callback opens one).
pub const TICK_MERGE_SPAN_NAME: &str = "tick_merge";

/// Initializes human-readable logging, honoring `RUST_LOG`.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(TickNoiseFilter)
        .init()
}

/// Initializes JSON logging for aggregator ingestion, honoring `RUST_LOG`.
pub fn init_json_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
        .with(TickNoiseFilter)
        .init()
}

struct TickNoiseFilter;

impl<S> tracing_subscriber::layer::Layer<S> for TickNoiseFilter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn event_enabled(
        &self,
        _event: &tracing::Event<'_>,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) -> bool {
        match ctx.lookup_current() {
            Some(span) => span.name() != TICK_MERGE_SPAN_NAME,
            None => true,
        }
    }
}
