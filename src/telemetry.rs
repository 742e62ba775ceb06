//! Tracing subscriber setup for the binaries.
//!
//! LOG_LEVEL takes EnvFilter directives (default `info,chess_lessons=debug`).
//! LOG_FORMAT=json switches to JSON lines; anything else prints plain text.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info,chess_lessons=debug";

pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr);

    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => builder.json().init(),
        _ => builder.init(),
    }
}
