//! Checkout configuration loaded from environment variables.

use std::time::Duration;

/// Checkout tuning knobs with sensible defaults.
///
/// Reads from environment variables:
/// - `CHECKOUT_LOCK_TIMEOUT_MS`: cart and row lock wait bound (default: `5000`)
/// - `CHECKOUT_NOTIFY_TIMEOUT_MS`: per-notification send bound (default: `10000`)
/// - `CHECKOUT_UNTRANSACTED_DISPATCH`: send notifications immediately when no
///   unit of work is open (default: `false`)
/// - `CHECKOUT_SESSION_TTL_SECS`: idle time after which a guest cart is
///   dropped (default: `1800`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutConfig {
    pub lock_timeout: Duration,
    pub notify_timeout: Duration,
    pub allow_untransacted_dispatch: bool,
    pub session_ttl: Duration,
}

impl CheckoutConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            lock_timeout: millis_var("CHECKOUT_LOCK_TIMEOUT_MS").unwrap_or(defaults.lock_timeout),
            notify_timeout: millis_var("CHECKOUT_NOTIFY_TIMEOUT_MS")
                .unwrap_or(defaults.notify_timeout),
            allow_untransacted_dispatch: std::env::var("CHECKOUT_UNTRANSACTED_DISPATCH")
                .ok()
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.allow_untransacted_dispatch),
            session_ttl: std::env::var("CHECKOUT_SESSION_TTL_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_ttl),
        }
    }
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(5000),
            notify_timeout: Duration::from_millis(10_000),
            allow_untransacted_dispatch: false,
            session_ttl: Duration::from_secs(30 * 60),
        }
    }
}

fn millis_var(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
