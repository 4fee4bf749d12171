//! Logging for the binding engine
//!
//! Events go through `tracing`. Registry initialization logs at `debug`,
//! resolution misses at `debug`, object lifetime transitions at `trace`
//! under the `duplex::bridge` target, and panics caught by the exception
//! barrier at `warn`.

pub use tracing::{debug, error, info, trace, warn};

use duplex_sdk::RuntimeTag;

use crate::config::LoggingConfig;

/// Environment variable overriding the configured filter
pub const LOG_ENV: &str = "DUPLEX_LOG";

/// Install a formatting subscriber.
///
/// `DUPLEX_LOG` wins over `config.filter`. Calling this more than once, or
/// after the embedder installed its own subscriber, is harmless.
pub fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(config.filter.as_str()));

    fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .compact()
        .try_init()
        .ok();
}

/// Log a lifetime state transition
#[inline]
pub(crate) fn log_transition(address: usize, class: &str, event: &'static str, native_uses: u32) {
    trace!(
        target: "duplex::bridge",
        address = %format!("{:#x}", address),
        class,
        native_uses,
        "{}",
        event
    );
}

/// Log a guest wrapper attach/detach
#[inline]
pub(crate) fn log_guest_handle(address: usize, rt: RuntimeTag, event: &'static str) {
    trace!(
        target: "duplex::bridge",
        address = %format!("{:#x}", address),
        runtime = rt.id(),
        "{}",
        event
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice() {
        let config = LoggingConfig::default();
        init_logging(&config);
        init_logging(&config);
    }
}
