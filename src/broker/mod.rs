//! Broker trait, registry construction, and concrete broker implementations.
//!
//! A [`Broker`] is a trait object rather than a closed enum: new broker
//! kinds are meant to be added without touching the dispatcher or worker
//! pool, only the registry's factory function.

pub mod nats;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::auth::Authenticator;
use crate::config::BrokerConfig;
use crate::error::{BrokerError, RegistryError};
use crate::message::Message;

/// A connection to a downstream messaging system.
///
/// Implementations must be safe to call `publish` on concurrently from
/// multiple worker tasks.
#[async_trait]
pub trait Broker: Send + Sync + std::fmt::Debug {
    /// Registry-unique name, as configured.
    fn name(&self) -> &str;

    /// Stable kind identifier, e.g. `"nats"`.
    fn kind(&self) -> &'static str;

    /// Establish the underlying transport connection. Idempotent on success.
    async fn connect(&self) -> Result<(), BrokerError>;

    /// Publish a message under its topic. Fails if not connected.
    async fn publish(&self, message: &Message) -> Result<(), BrokerError>;

    /// Subscribe to `topic` and wait up to `timeout` for one message.
    /// Used for testing broker connectivity end to end.
    async fn subscribe_and_wait(&self, topic: &str, timeout: Duration) -> Result<Message, BrokerError>;

    /// Close the underlying connection. Idempotent.
    async fn stop(&self) -> Result<(), BrokerError>;
}

/// Read-only, concurrently-shared set of connected brokers keyed by name.
pub type BrokerRegistry = Arc<HashMap<String, Arc<dyn Broker>>>;

/// Build a broker instance for the given config entry, without connecting it.
fn build_broker(entry: &BrokerConfig, authenticator: Authenticator) -> Result<Arc<dyn Broker>, RegistryError> {
    match entry.r#type.as_str() {
        "nats" => Ok(Arc::new(nats::NatsBroker::new(
            entry.name.clone(),
            entry.address.clone(),
            authenticator,
        ))),
        other => Err(RegistryError::UnsupportedBroker(other.to_string())),
    }
}

/// Construct and connect the broker registry from configuration.
///
/// On any failure, every broker already connected by this call is stopped
/// (in reverse insertion order) before the error is returned, so a failed
/// startup never leaks transport connections.
pub async fn build_registry(entries: &[BrokerConfig]) -> Result<BrokerRegistry, RegistryError> {
    let mut registry: HashMap<String, Arc<dyn Broker>> = HashMap::new();
    let mut connected: Vec<Arc<dyn Broker>> = Vec::new();

    for entry in entries {
        let authenticator = match Authenticator::from_config(&entry.auth) {
            Ok(a) => a,
            Err(source) => {
                unwind(&connected).await;
                return Err(RegistryError::Auth { name: entry.name.clone(), source });
            }
        };

        let broker = match build_broker(entry, authenticator) {
            Ok(b) => b,
            Err(err) => {
                unwind(&connected).await;
                return Err(err);
            }
        };

        if registry.contains_key(&entry.name) {
            unwind(&connected).await;
            return Err(RegistryError::DuplicateBroker(entry.name.clone()));
        }

        if let Err(source) = broker.connect().await {
            unwind(&connected).await;
            return Err(RegistryError::Connect {
                name: entry.name.clone(),
                source: anyhow::Error::new(source),
            });
        }

        connected.push(Arc::clone(&broker));
        registry.insert(entry.name.clone(), broker);
    }

    Ok(Arc::new(registry))
}

async fn unwind(connected: &[Arc<dyn Broker>]) {
    for broker in connected.iter().rev() {
        if let Err(err) = broker.stop().await {
            log::warn!("error stopping broker {} during startup unwind: {err}", broker.name());
        }
    }
}
