//! `tracing` initialization. Installed once, at process startup, by the
//! CLI binary (or by an embedding application's own startup code — the
//! library itself never initializes a subscriber implicitly).

use tracing_subscriber::EnvFilter;

/// Installs a `tracing-subscriber` `fmt` layer filtered by `filter`
/// (an `EnvFilter` directive string, e.g. `"info"` or
/// `"gpumond=debug,warn"`). Safe to call at most once per process;
/// a second call is a no-op and the error is discarded.
pub fn init(filter: &str) {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(env_filter).try_init();
}
