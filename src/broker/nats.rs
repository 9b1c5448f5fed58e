//! NATS core publish/subscribe broker.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::auth::Authenticator;
use crate::error::BrokerError;
use crate::message::Message;

use super::Broker;

/// A [`Broker`] backed by a core NATS connection.
///
/// `client` is `None` before `connect()` and after `stop()`; every other
/// operation checks it under a read lock and returns `NotConnected` if absent.
#[derive(Debug)]
pub struct NatsBroker {
    name: String,
    address: String,
    authenticator: Authenticator,
    client: RwLock<Option<async_nats::Client>>,
}

impl NatsBroker {
    /// Create a disconnected NATS broker for the given registry entry.
    #[must_use]
    pub fn new(name: String, address: String, authenticator: Authenticator) -> Self {
        Self { name, address, authenticator, client: RwLock::new(None) }
    }

    fn connect_options(&self) -> async_nats::ConnectOptions {
        match &self.authenticator {
            Authenticator::Basic { user, password } => {
                async_nats::ConnectOptions::new().user_and_password(user.clone(), password.clone())
            }
            Authenticator::Token { token } => async_nats::ConnectOptions::new().token(token.clone()),
        }
    }
}

#[async_trait]
impl Broker for NatsBroker {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "nats"
    }

    async fn connect(&self) -> Result<(), BrokerError> {
        if self.client.read().await.is_some() {
            return Ok(());
        }

        let client = self
            .connect_options()
            .connect(&self.address)
            .await
            .map_err(|e| BrokerError::Transport { name: self.name.clone(), source: anyhow::Error::new(e) })?;

        *self.client.write().await = Some(client);
        log::info!("broker {} connected to {}", self.name, self.address);
        Ok(())
    }

    async fn publish(&self, message: &Message) -> Result<(), BrokerError> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or_else(|| BrokerError::NotConnected { name: self.name.clone() })?;

        client
            .publish(message.topic.clone(), message.payload.clone().into())
            .await
            .map_err(|e| BrokerError::Transport { name: self.name.clone(), source: anyhow::Error::new(e) })
    }

    async fn subscribe_and_wait(&self, topic: &str, timeout: Duration) -> Result<Message, BrokerError> {
        use futures_util::StreamExt;

        let mut subscriber = {
            let guard = self.client.read().await;
            let client = guard.as_ref().ok_or_else(|| BrokerError::NotConnected { name: self.name.clone() })?;
            client
                .subscribe(topic.to_string())
                .await
                .map_err(|e| BrokerError::Transport { name: self.name.clone(), source: anyhow::Error::new(e) })?
        };

        match tokio::time::timeout(timeout, subscriber.next()).await {
            Ok(Some(nats_message)) => Ok(Message::new(
                self.name.clone(),
                topic.to_string(),
                nats_message.payload.to_vec(),
                Vec::new(),
            )),
            Ok(None) => Err(BrokerError::Transport {
                name: self.name.clone(),
                source: anyhow::anyhow!("subscription stream closed"),
            }),
            Err(_elapsed) => Err(BrokerError::Timeout { name: self.name.clone(), topic: topic.to_string() }),
        }
    }

    async fn stop(&self) -> Result<(), BrokerError> {
        let mut guard = self.client.write().await;
        if let Some(client) = guard.take() {
            drop(client);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthConfig;

    #[tokio::test]
    async fn publish_before_connect_is_not_connected() {
        let auth = Authenticator::from_config(&AuthConfig {
            method: "token".to_string(),
            user: String::new(),
            password: String::new(),
            token: "t".to_string(),
        })
        .unwrap();
        let broker = NatsBroker::new("b1".to_string(), "nats://127.0.0.1:4222".to_string(), auth);
        let msg = Message::new("d1", "sensors/x", vec![1], vec!["b1".to_string()]);
        let err = broker.publish(&msg).await.unwrap_err();
        assert!(matches!(err, BrokerError::NotConnected { .. }));
    }

    #[tokio::test]
    async fn stop_is_idempotent_without_connect() {
        let auth = Authenticator::from_config(&AuthConfig {
            method: "token".to_string(),
            user: String::new(),
            password: String::new(),
            token: "t".to_string(),
        })
        .unwrap();
        let broker = NatsBroker::new("b1".to_string(), "nats://127.0.0.1:4222".to_string(), auth);
        broker.stop().await.unwrap();
        broker.stop().await.unwrap();
    }
}
