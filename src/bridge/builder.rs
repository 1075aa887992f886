//! Builder pattern for bridge configuration.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use rosboard_bridge::{Bridge, ReconnectPolicy};
//!
//! # fn example() -> rosboard_bridge::Result<()> {
//! let bridge = Bridge::builder()
//!     .host("rover.local")
//!     .port(8888)
//!     .disconnect_when_idle(false)
//!     .reconnect_policy(ReconnectPolicy::exponential(
//!         Duration::from_millis(500),
//!         Duration::from_secs(10),
//!         None,
//!     ))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::transport::{Connector, WebSocketConnector};

use super::core::Bridge;
use super::options::{BridgeOptions, DEFAULT_PORT, Endpoint, ReconnectPolicy};

// ============================================================================
// BridgeBuilder
// ============================================================================

/// Builder for configuring a [`Bridge`] instance.
///
/// Use [`Bridge::builder()`] to create a new builder. The host may be left
/// unset and supplied later through [`Bridge::configure`].
#[derive(Default, Clone)]
pub struct BridgeBuilder {
    /// Board host.
    host: Option<String>,
    /// Board port.
    port: Option<u16>,
    /// Behaviour switches.
    options: BridgeOptions,
    /// Custom socket factory.
    connector: Option<Arc<dyn Connector>>,
}

impl fmt::Debug for BridgeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeBuilder")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("options", &self.options)
            .field("custom_connector", &self.connector.is_some())
            .finish()
    }
}

// ============================================================================
// BridgeBuilder Implementation
// ============================================================================

impl BridgeBuilder {
    /// Creates a builder with default options and no host.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the board host name or IP.
    #[inline]
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the board port (default 8888).
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Replaces all options at once.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: BridgeOptions) -> Self {
        self.options = options;
        self
    }

    /// Selects `wss` instead of `ws`.
    #[inline]
    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.options.secure = secure;
        self
    }

    /// Sets the rate used when a subscriber does not request one.
    #[inline]
    #[must_use]
    pub fn default_update_rate(mut self, rate: f64) -> Self {
        self.options.default_update_rate = rate;
        self
    }

    /// Sets the idle-disconnect policy.
    #[inline]
    #[must_use]
    pub fn disconnect_when_idle(mut self, disconnect: bool) -> Self {
        self.options.disconnect_when_idle = disconnect;
        self
    }

    /// Sets the reconnect policy.
    #[inline]
    #[must_use]
    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.options.reconnect = policy;
        self
    }

    /// Uses a custom socket factory instead of tokio-tungstenite.
    #[inline]
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Builds the bridge with validation.
    ///
    /// No socket is opened; the first subscribe or connect does that.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if an option is out of range
    /// - [`Error::Config`] if port 0 was given
    pub fn build(self) -> Result<Bridge> {
        self.options.validate()?;
        let endpoint = self.validate_endpoint()?;

        let connector = self.connector.unwrap_or_else(|| {
            Arc::new(WebSocketConnector::new(self.options.connect_timeout)) as Arc<dyn Connector>
        });

        Ok(Bridge::from_parts(endpoint, &self.options, connector))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl BridgeBuilder {
    fn validate_endpoint(&self) -> Result<Endpoint> {
        let port = self.port.unwrap_or(DEFAULT_PORT);
        if port == 0 {
            return Err(Error::config(
                "Port 0 is not a valid board port.\n\
                 Example: Bridge::builder().host(\"10.0.0.5\").port(8888)",
            ));
        }

        let host = self.host.as_deref().unwrap_or_default();
        Ok(Endpoint::new(host, port))
    }
}

// ============================================================================
// Tests
// ============================================================================
