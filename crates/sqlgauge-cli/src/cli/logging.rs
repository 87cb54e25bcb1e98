use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_ENV: &str = "SQLGAUGE_LOG";

/// Installs the global subscriber. Everything goes to stderr so stdout stays
/// free for command output.
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    // a second init (tests) keeps the first subscriber
    let _ = if json {
        builder
            .json()
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_current_span(false)
            .with_span_list(false)
            .try_init()
    } else {
        builder.compact().try_init()
    };
}
