use env_logger::{Builder, Env};

pub const LOG_ENV: &str = "CAMTOUCH_LOG";

/// Logs go to stderr so notification output on stdout stays machine readable.
pub fn init() {
    Builder::from_env(Env::default().filter_or(LOG_ENV, "info"))
        .format_timestamp_millis()
        .init();
}
