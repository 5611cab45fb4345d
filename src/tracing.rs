use time::format_description;
use tracing_subscriber::{fmt, EnvFilter, FmtSubscriber};

const TRACE_ENV_VAR: &str = "TRACE";

// Sets up tracing. Goes to stderr, filtered by TRACE env var.
// Levels are: trace, debug, info, warn, error
//
// EnvFilter has a standard syntax, but basically can be boiled down to (for example):
//
// All targets, info level:                 info
// All broker cleaners, debug level:        brokerage_import::broker=debug
// Global at warn, pipeline as debug:       warn,brokerage_import::pipeline=debug
//
// More generally: target[span{field=value}]=level
// https://docs.rs/tracing-subscriber/latest/tracing_subscriber/filter/struct.EnvFilter.html
pub fn setup_tracing() {
    // 5 digits of precision is apparently good enough.
    let time_format =
        format_description::parse("[hour]:[minute]:[second].[subsecond digits:5]")
            .expect("Time format description is invalid");

    let time_offset =
        crate::util::date::local_utc_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = fmt::time::OffsetTime::new(time_offset, time_format);

    // It will use the TRACE env var for filtering, and is off by default
    let subscriber = FmtSubscriber::builder()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_env(TRACE_ENV_VAR))
        .with_timer(timer)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Appends a directive to the TRACE filter. Must be called before setup_tracing.
pub fn enable_trace_env(trace_env: &str) {
    if let Ok(existing_env) = std::env::var(TRACE_ENV_VAR) {
        std::env::set_var(TRACE_ENV_VAR, existing_env + "," + trace_env);
    } else {
        std::env::set_var(TRACE_ENV_VAR, trace_env);
    }
}
