//! Error taxonomy for the telemetry gateway.
//!
//! Construction-time failures (bad config, failed broker connect) are fatal
//! and bubble up through `anyhow`. Per-message failures (unknown broker,
//! publish failure, full queue) are never fatal to the process — they are
//! logged and the message is dropped.

use thiserror::Error;

/// Authenticator validation failures.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Config named an authentication method we don't implement.
    #[error("unsupported authentication method: {0}")]
    Unsupported(String),
    /// A required credential field was empty or whitespace-only.
    #[error("{0}")]
    Invalid(String),
}

/// Broker lifecycle and publish failures.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// `publish`/`subscribe_and_wait` called after `stop()`.
    #[error("broker {name} is not connected")]
    NotConnected {
        /// Registry name of the broker.
        name: String,
    },
    /// Underlying transport failed to connect, publish, or subscribe.
    #[error("broker {name} transport error: {source}")]
    Transport {
        /// Registry name of the broker.
        name: String,
        /// Underlying cause.
        #[source]
        source: anyhow::Error,
    },
    /// `subscribe_and_wait` deadline elapsed with no message.
    #[error("broker {name} timed out waiting for a message on topic {topic}")]
    Timeout {
        /// Registry name of the broker.
        name: String,
        /// Topic that was subscribed to.
        topic: String,
    },
}

/// Failures while constructing the broker registry from configuration.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Config named a broker `type` we don't implement.
    #[error("unsupported broker type: {0}")]
    UnsupportedBroker(String),
    /// Two broker entries in config share a name.
    #[error("duplicate broker name: {0}")]
    DuplicateBroker(String),
    /// `connect()` failed for a broker during registry construction.
    #[error("failed to connect broker {name}: {source}")]
    Connect {
        /// Registry name of the broker that failed to connect.
        name: String,
        /// Underlying cause.
        #[source]
        source: anyhow::Error,
    },
    /// Authenticator construction/validation failed for a broker entry.
    #[error("invalid authenticator for broker {name}: {source}")]
    Auth {
        /// Registry name of the broker whose authenticator is invalid.
        name: String,
        /// Underlying cause.
        #[source]
        source: AuthError,
    },
}

/// Non-blocking submit failures on the ingestion or job queues.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// The receiving queue was at capacity.
    #[error("queue is full")]
    Full,
    /// The receiving component has already been shut down.
    #[error("queue is closed")]
    Closed,
    /// Shutdown has been requested; no further work is accepted.
    #[error("cancelled")]
    Cancelled,
}
