//! MQTT implementation of the broker port on top of `rumqttc`.

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use pl_core::config::PubSubConfig;
use pl_core::ports::{
    BrokerClient, BrokerConnectorPort, BrokerError, BrokerMessage, BrokerMessageStream,
    BrokerSession,
};

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const REQUEST_CHANNEL_CAPACITY: usize = 64;

pub struct MqttBrokerConnector {
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl MqttBrokerConnector {
    pub fn new(config: &PubSubConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            connect_timeout: config.connect_timeout(),
        }
    }
}

#[async_trait]
impl BrokerConnectorPort for MqttBrokerConnector {
    async fn connect(&self, client_id: &str) -> Result<BrokerSession, BrokerError> {
        let mut options = MqttOptions::new(client_id, self.host.clone(), self.port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

        let connack = tokio::time::timeout(self.connect_timeout, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        return if ack.code == ConnectReturnCode::Success {
                            Ok(())
                        } else {
                            Err(BrokerError::Connect(format!("{:?}", ack.code)))
                        };
                    }
                    Ok(_) => continue,
                    Err(e) => return Err(BrokerError::Connect(e.to_string())),
                }
            }
        })
        .await;

        match connack {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(BrokerError::Timeout),
        }
        debug!(host = %self.host, port = self.port, "mqtt session acknowledged");

        Ok(BrokerSession {
            client: Arc::new(MqttClient { client }),
            messages: Box::new(MqttMessages { eventloop }),
        })
    }
}

struct MqttClient {
    client: AsyncClient,
}

#[async_trait]
impl BrokerClient for MqttClient {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| BrokerError::Request(e.to_string()))
    }

    async fn subscribe(&self, topic: &str) -> Result<(), BrokerError> {
        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| BrokerError::Request(e.to_string()))
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        self.client
            .disconnect()
            .await
            .map_err(|e| BrokerError::Request(e.to_string()))
    }
}

struct MqttMessages {
    eventloop: EventLoop,
}

#[async_trait]
impl BrokerMessageStream for MqttMessages {
    async fn next_message(&mut self) -> Result<BrokerMessage, BrokerError> {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    return Ok(BrokerMessage {
                        topic: publish.topic,
                        payload: publish.payload.to_vec(),
                    });
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    return Err(BrokerError::Disconnected("broker sent disconnect".into()));
                }
                Ok(_) => continue,
                Err(e) => return Err(BrokerError::Disconnected(e.to_string())),
            }
        }
    }
}
