//! Broker-based presence: publishes on the shared heartbeat, listens on the
//! wildcard discovery topic, reconnects with capped exponential backoff.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, info_span, trace, warn, Instrument};

use super::Backoff;
use pl_core::config::DiscoveryConfig;
use pl_core::network::{topics, PresencePayload};
use pl_core::ports::{
    BackgroundService, BrokerClient, BrokerConnectorPort, BrokerError, BrokerMessage,
    BrokerSession, ClockPort, ServiceContext, ServiceError, ServiceWorker,
};
use pl_core::{DeviceRegistry, LocalDevice, TransportKind};

#[derive(Debug, Clone)]
struct PubSubSettings {
    topic_prefix: String,
    backoff_initial: Duration,
    backoff_max: Duration,
    max_clock_skew: Duration,
    default_port: u16,
}

#[derive(Clone)]
pub struct PubSubTransport {
    settings: PubSubSettings,
    local: LocalDevice,
    registry: Arc<DeviceRegistry>,
    clock: Arc<dyn ClockPort>,
    connector: Arc<dyn BrokerConnectorPort>,
}

impl PubSubTransport {
    pub fn new(
        config: &DiscoveryConfig,
        local: LocalDevice,
        registry: Arc<DeviceRegistry>,
        clock: Arc<dyn ClockPort>,
        connector: Arc<dyn BrokerConnectorPort>,
    ) -> Self {
        Self {
            settings: PubSubSettings {
                topic_prefix: config.pubsub.topic_prefix.clone(),
                backoff_initial: config.pubsub.backoff_initial(),
                backoff_max: config.pubsub.backoff_max(),
                max_clock_skew: config.registry.max_clock_skew(),
                default_port: config.device.service_port,
            },
            local,
            registry,
            clock,
            connector,
        }
    }

    fn client_id(&self) -> String {
        format!("peerlink-{}", self.local.id)
    }

    async fn publish(&self, client: &dyn BrokerClient) -> Result<(), BrokerError> {
        let payload = PresencePayload::announce(&self.local, self.clock.now());
        let bytes = payload
            .encode()
            .map_err(|e| BrokerError::Request(e.to_string()))?;
        let topic = topics::device_topic(&self.settings.topic_prefix, &self.local.id);
        client.publish(&topic, bytes).await?;
        trace!(%topic, "presence published");
        Ok(())
    }

    /// Drive one connected session until it fails or `ctx` is cancelled.
    async fn run_session(&self, session: BrokerSession, ctx: &ServiceContext) -> Result<(), BrokerError> {
        let BrokerSession {
            client,
            mut messages,
        } = session;
        client
            .subscribe(&topics::wildcard_topic(&self.settings.topic_prefix))
            .await?;
        let mut cycles = ctx.cycles();
        self.publish(client.as_ref()).await?;

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    if let Err(e) = client.disconnect().await {
                        debug!(error = %e, "broker disconnect failed");
                    }
                    return Ok(());
                }
                signal = cycles.recv() => match signal {
                    Ok(_) | Err(RecvError::Lagged(_)) => self.publish(client.as_ref()).await?,
                    Err(RecvError::Closed) => return Ok(()),
                },
                message = messages.next_message() => self.handle_message(message?).await,
            }
        }
    }

    async fn handle_message(&self, message: BrokerMessage) {
        let payload = match PresencePayload::parse(&message.payload) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(topic = %message.topic, error = %e, "dropping malformed pubsub message");
                return;
            }
        };
        if payload.id == self.local.id {
            return;
        }
        let topic_id = topics::device_id_from_topic(&self.settings.topic_prefix, &message.topic);
        if topic_id.as_ref() != Some(&payload.id) {
            debug!(topic = %message.topic, device_id = %payload.id, "topic does not match payload id");
            return;
        }
        match payload.into_sighting(
            TransportKind::PubSub,
            None,
            self.settings.default_port,
            self.clock.now(),
            self.settings.max_clock_skew,
        ) {
            Ok(sighting) => {
                self.registry.merge(sighting).await;
            }
            Err(e) => debug!(topic = %message.topic, error = %e, "dropping pubsub presence"),
        }
    }

    async fn connect_loop(&self, ctx: ServiceContext) -> Result<(), ServiceError> {
        let mut backoff = Backoff::new(self.settings.backoff_initial, self.settings.backoff_max);
        let client_id = self.client_id();

        loop {
            let connected = tokio::select! {
                _ = ctx.cancelled() => return Ok(()),
                r = self.connector.connect(&client_id) => r,
            };
            match connected {
                Ok(session) => {
                    info!("connected to discovery broker");
                    backoff.reset();
                    match self.run_session(session, &ctx).await {
                        Ok(()) => return Ok(()),
                        Err(e) => warn!(error = %e, "discovery broker connection lost"),
                    }
                }
                Err(e) => warn!(error = %e, "discovery broker connect failed"),
            }

            let delay = backoff.next_delay();
            debug!(delay_secs = delay.as_secs(), "reconnecting to broker after backoff");
            tokio::select! {
                _ = ctx.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[async_trait]
impl BackgroundService for PubSubTransport {
    fn name(&self) -> &'static str {
        "pubsub"
    }

    /// The broker connection is established by the worker; nothing here can
    /// fail, so a broker outage never blocks startup.
    async fn prepare(&self) -> Result<Arc<dyn ServiceWorker>, ServiceError> {
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl ServiceWorker for PubSubTransport {
    async fn run(&self, ctx: ServiceContext) -> Result<(), ServiceError> {
        self.connect_loop(ctx)
            .instrument(info_span!("platform.pubsub"))
            .await
    }
}
