//! Bridge options and endpoint configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use rosboard_bridge::{BridgeOptions, ReconnectPolicy};
//!
//! let options = BridgeOptions::new()
//!     .with_default_update_rate(10.0)
//!     .with_disconnect_when_idle(false)
//!     .with_reconnect(ReconnectPolicy::exponential(
//!         Duration::from_millis(500),
//!         Duration::from_secs(8),
//!         None,
//!     ));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::protocol::ENDPOINT_PATH;
use crate::transport::DEFAULT_CONNECT_TIMEOUT;

// ============================================================================
// Constants
// ============================================================================

/// Port ROSboard listens on by default.
pub const DEFAULT_PORT: u16 = 8888;

/// Update rate requested when a subscriber does not ask for one.
pub const DEFAULT_UPDATE_RATE: f64 = 24.0;

/// Delay before the reconnect attempt that follows an unexpected close.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1000);

// ============================================================================
// Endpoint
// ============================================================================

/// Board address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or IP. Empty means unconfigured.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
        }
    }
}

impl Endpoint {
    /// Creates an endpoint, trimming the host.
    #[inline]
    #[must_use]
    pub fn new(host: impl AsRef<str>, port: u16) -> Self {
        Self {
            host: host.as_ref().trim().to_owned(),
            port,
        }
    }

    /// Returns `true` once a host is set.
    #[inline]
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty()
    }

    /// Returns `host:port`, or `None` when unconfigured.
    #[must_use]
    pub fn address(&self) -> Option<String> {
        self.is_configured()
            .then(|| format!("{}:{}", self.host, self.port))
    }

    /// Builds the WebSocket URL of the board.
    ///
    /// Uses `wss` when `secure` is set, `ws` otherwise.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConfigured`] if no host is set
    /// - [`Error::Url`] if the host does not form a valid URL
    pub fn url(&self, secure: bool) -> Result<Url> {
        if !self.is_configured() {
            return Err(Error::NotConfigured);
        }
        let scheme = if secure { "wss" } else { "ws" };
        let url = Url::parse(&format!(
            "{scheme}://{}:{}{ENDPOINT_PATH}",
            self.host, self.port
        ))?;
        Ok(url)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address() {
            Some(address) => f.write_str(&address),
            None => f.write_str("<unconfigured>"),
        }
    }
}

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// What happens after an unexpected close while topics are still wanted.
///
/// Attempts are counted from the last successful open or caller-initiated
/// connect; once they run out, only a caller can reconnect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconnectPolicy {
    /// Never reconnect on its own.
    Never,

    /// Same delay before every attempt.
    Fixed {
        /// Delay before each attempt.
        delay: Duration,
        /// Attempts before giving up.
        max_attempts: u32,
    },

    /// Delay doubles after every failed attempt.
    Exponential {
        /// Delay before the first attempt.
        initial: Duration,
        /// Upper bound on the delay.
        max_delay: Duration,
        /// Attempts before giving up; `None` keeps trying.
        max_attempts: Option<u32>,
    },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::Fixed {
            delay: DEFAULT_RECONNECT_DELAY,
            max_attempts: 1,
        }
    }
}

impl ReconnectPolicy {
    /// Creates a fixed-delay policy.
    #[inline]
    #[must_use]
    pub const fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self::Fixed {
            delay,
            max_attempts,
        }
    }

    /// Creates an exponential backoff policy.
    #[inline]
    #[must_use]
    pub const fn exponential(
        initial: Duration,
        max_delay: Duration,
        max_attempts: Option<u32>,
    ) -> Self {
        Self::Exponential {
            initial,
            max_delay,
            max_attempts,
        }
    }

    /// Returns the delay before attempt number `attempt` (1-based), or `None`
    /// when the policy has given up.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 {
            return None;
        }
        match *self {
            Self::Never => None,
            Self::Fixed {
                delay,
                max_attempts,
            } => (attempt <= max_attempts).then_some(delay),
            Self::Exponential {
                initial,
                max_delay,
                max_attempts,
            } => {
                if max_attempts.is_some_and(|max| attempt > max) {
                    return None;
                }
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                Some(initial.saturating_mul(factor).min(max_delay))
            }
        }
    }

    /// Checks the policy for nonsensical values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for zero attempts or a zero exponential base.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Never => Ok(()),
            Self::Fixed { max_attempts, .. } if max_attempts == 0 => Err(Error::config(
                "Fixed reconnect needs at least one attempt; use ReconnectPolicy::Never instead",
            )),
            Self::Fixed { .. } => Ok(()),
            Self::Exponential { max_attempts, .. } if max_attempts == Some(0) => {
                Err(Error::config(
                    "Exponential reconnect needs at least one attempt; use ReconnectPolicy::Never instead",
                ))
            }
            Self::Exponential { initial, .. } if initial.is_zero() => {
                Err(Error::config("Exponential reconnect needs a non-zero initial delay"))
            }
            Self::Exponential {
                initial, max_delay, ..
            } if max_delay < initial => Err(Error::config(
                "Exponential reconnect max_delay must not be below the initial delay",
            )),
            Self::Exponential { .. } => Ok(()),
        }
    }
}

// ============================================================================
// BridgeOptions
// ============================================================================

/// Behaviour switches of a [`Bridge`](crate::Bridge).
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeOptions {
    /// Use `wss` instead of `ws` (the hosting page is served over https).
    pub secure: bool,

    /// Rate requested for subscriptions that do not specify one.
    pub default_update_rate: f64,

    /// Close the socket as soon as no topic is subscribed.
    pub disconnect_when_idle: bool,

    /// Retry behaviour after unexpected closes.
    pub reconnect: ReconnectPolicy,

    /// Bound on the WebSocket handshake.
    pub connect_timeout: Duration,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl BridgeOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            secure: false,
            default_update_rate: DEFAULT_UPDATE_RATE,
            disconnect_when_idle: true,
            reconnect: ReconnectPolicy::Fixed {
                delay: DEFAULT_RECONNECT_DELAY,
                max_attempts: 1,
            },
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl BridgeOptions {
    /// Selects `wss`.
    #[inline]
    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Sets the default update rate.
    #[inline]
    #[must_use]
    pub fn with_default_update_rate(mut self, rate: f64) -> Self {
        self.default_update_rate = rate;
        self
    }

    /// Sets the idle-disconnect policy.
    #[inline]
    #[must_use]
    pub fn with_disconnect_when_idle(mut self, disconnect: bool) -> Self {
        self.disconnect_when_idle = disconnect;
        self
    }

    /// Sets the reconnect policy.
    #[inline]
    #[must_use]
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl BridgeOptions {
    /// Checks all options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid option.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_rate(self.default_update_rate) {
            return Err(Error::config(format!(
                "Default update rate must be a positive number, got {}",
                self.default_update_rate
            )));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::config("Connect timeout must be non-zero"));
        }
        self.reconnect.validate()
    }
}

/// Returns `true` for finite, strictly positive rates.
#[inline]
#[must_use]
pub(crate) fn is_valid_rate(rate: f64) -> bool {
    rate.is_finite() && rate > 0.0
}

// ============================================================================
// Tests
// ============================================================================
