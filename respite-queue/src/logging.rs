use std::str::FromStr;

use tracing::metadata::LevelFilter;
use tracing_subscriber::{Layer, filter::FilterFn, prelude::*, util::SubscriberInitExt};

/// Initialise the global tracing subscriber.
///
/// The level defaults to `DEBUG` in debug builds and `INFO` otherwise, and
/// can be overridden through the `LOG_LEVEL` environment variable.
pub fn init() {
    let default = if cfg!(debug_assertions) {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let level = std::env::var("LOG_LEVEL").map_or(default, |level| {
        LevelFilter::from_str(level.as_str()).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    });

    tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_ansi(true)
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_filter(level)
                .with_filter(FilterFn::new(|metadata| {
                    metadata.target().starts_with("respite")
                })),
        )
        .init();
}
