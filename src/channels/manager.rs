//! ChannelManager — owns the registered channels, merges their inbound
//! streams, and routes replies back by channel name.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream;
use tokio::sync::RwLock;

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse};
use crate::error::ChannelError;

#[derive(Default)]
pub struct ChannelManager {
    channels: RwLock<HashMap<String, Arc<dyn Channel>>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel. A later channel with the same name replaces the
    /// earlier one.
    pub async fn add(&self, channel: Arc<dyn Channel>) {
        let name = channel.name().to_string();
        tracing::debug!(channel = %name, "Registering channel");
        self.channels.write().await.insert(name, channel);
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.channels.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Start every channel and merge their streams. Fails if no channel
    /// could be started.
    pub async fn start_all(&self) -> Result<MessageStream, ChannelError> {
        let channels: Vec<_> = self.channels.read().await.values().cloned().collect();
        let mut streams = Vec::with_capacity(channels.len());

        for channel in channels {
            match channel.start().await {
                Ok(s) => {
                    tracing::info!(channel = channel.name(), "Channel started");
                    streams.push(s);
                }
                Err(e) => tracing::error!(channel = channel.name(), "Failed to start channel: {}", e),
            }
        }

        if streams.is_empty() {
            return Err(ChannelError::StartupFailed {
                name: "all".into(),
                reason: "no channel started".into(),
            });
        }

        Ok(Box::pin(stream::select_all(streams)))
    }

    /// Reply on the channel `msg` arrived on.
    pub async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let channel = self
            .channels
            .read()
            .await
            .get(&msg.channel)
            .cloned()
            .ok_or_else(|| ChannelError::UnknownChannel(msg.channel.clone()))?;
        channel.respond(msg, response).await
    }

    /// Run every channel's health check, returning the failures.
    pub async fn health_check_all(&self) -> Vec<(String, ChannelError)> {
        let channels: Vec<_> = self.channels.read().await.values().cloned().collect();
        let mut failures = Vec::new();
        for channel in channels {
            if let Err(e) = channel.health_check().await {
                failures.push((channel.name().to_string(), e));
            }
        }
        failures
    }

    pub async fn shutdown_all(&self) -> Result<(), ChannelError> {
        let channels: Vec<_> = self.channels.read().await.values().cloned().collect();
        for channel in channels {
            if let Err(e) = channel.shutdown().await {
                tracing::warn!(channel = channel.name(), "Channel shutdown failed: {}", e);
            }
        }
        Ok(())
    }
}
