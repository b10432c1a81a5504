use rumqttc::{AsyncClient, Event, Incoming, LastWill, MqttOptions, QoS};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::controller::PlayerStatus;
use crate::error::TransportError;
use crate::transport::{tokenize, Channel, CommandFailure, TransportEvent, TransportHandle};

const DEFAULT_PORT: u16 = 1883;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize)]
struct StatusMessage<'a> {
    kiosk_id: &'a str,
    online: bool,
    #[serde(flatten)]
    status: Option<&'a PlayerStatus>,
    timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
struct ErrorMessage<'a> {
    kiosk_id: &'a str,
    #[serde(flatten)]
    failure: &'a CommandFailure,
    timestamp: String,
}

/// Topic names for one kiosk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub media: String,
    pub system: String,
    pub admin: String,
    pub status: String,
    pub error: String,
}

impl Topics {
    pub fn new(kiosk_id: &str) -> Self {
        let base = format!("kiosk/{}", kiosk_id);
        Self {
            media: format!("{}/media", base),
            system: format!("{}/system", base),
            admin: format!("{}/admin", base),
            status: format!("{}/status", base),
            error: format!("{}/error", base),
        }
    }

    /// Maps an incoming publish to a transport event. Unknown topics and
    /// payloads yield `None`.
    pub fn route(&self, topic: &str, payload: &[u8]) -> Option<TransportEvent> {
        let text = std::str::from_utf8(payload).ok()?;

        if topic == self.media || topic == self.system {
            let channel = if topic == self.media {
                Channel::Media
            } else {
                Channel::System
            };
            return Some(TransportEvent::command(channel, "mqtt", tokenize(text)));
        }

        if topic == self.admin {
            return match text.trim().to_lowercase().as_str() {
                "connected" => Some(TransportEvent::AdminConnected {
                    session: "mqtt".to_string(),
                }),
                "disconnected" => Some(TransportEvent::AdminDisconnected),
                other => {
                    warn!(payload = other, "unknown admin message");
                    None
                }
            };
        }

        None
    }
}

#[derive(Clone)]
pub struct MqttClient {
    client: AsyncClient,
    kiosk_id: String,
    topics: Topics,
}

/// Splits `mqtt://host:port` (or a bare host) into host and port.
pub fn parse_broker_url(broker_url: &str) -> (String, u16) {
    let without_scheme = broker_url.strip_prefix("mqtt://").unwrap_or(broker_url);
    match without_scheme.rsplit_once(':') {
        Some((host, port)) => (host.to_string(), port.parse().unwrap_or(DEFAULT_PORT)),
        None => (without_scheme.to_string(), DEFAULT_PORT),
    }
}

impl MqttClient {
    pub async fn new(
        broker_url: &str,
        kiosk_id: String,
        transport: TransportHandle,
    ) -> Result<Self, TransportError> {
        let (hostname, port) = parse_broker_url(broker_url);
        let topics = Topics::new(&kiosk_id);

        let offline = serde_json::to_string(&StatusMessage {
            kiosk_id: &kiosk_id,
            online: false,
            status: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        })?;

        let mut mqttoptions = MqttOptions::new(&kiosk_id, &hostname, port);
        mqttoptions.set_keep_alive(Duration::from_secs(60));
        mqttoptions.set_clean_session(true);
        mqttoptions.set_last_will(LastWill::new(&topics.status, offline, QoS::AtLeastOnce, true));

        let (client, mut eventloop) = AsyncClient::new(mqttoptions, 10);

        let mqtt_client = Self {
            client: client.clone(),
            kiosk_id,
            topics: topics.clone(),
        };

        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                        info!(host = %hostname, port, "MQTT connected");
                        // Clean sessions lose their subscriptions on every reconnect.
                        for topic in [&topics.media, &topics.system, &topics.admin] {
                            if let Err(e) = client.subscribe(topic.as_str(), QoS::AtLeastOnce).await {
                                error!(%topic, error = %e, "MQTT subscribe failed");
                            }
                        }
                    }
                    Ok(Event::Incoming(Incoming::Publish(publish))) => {
                        let Some(event) = topics.route(&publish.topic, &publish.payload) else {
                            debug!(topic = %publish.topic, "ignoring MQTT message");
                            continue;
                        };
                        if transport.send(event).await.is_err() {
                            info!("player stopped, closing MQTT event loop");
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "MQTT connection error, retrying");
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        });

        Ok(mqtt_client)
    }

    pub async fn publish_status(&self, status: &PlayerStatus) -> Result<(), TransportError> {
        let payload = serde_json::to_string(&StatusMessage {
            kiosk_id: &self.kiosk_id,
            online: true,
            status: Some(status),
            timestamp: chrono::Utc::now().to_rfc3339(),
        })?;

        self.client
            .publish(&self.topics.status, QoS::AtLeastOnce, true, payload)
            .await?;
        Ok(())
    }

    pub async fn publish_error(&self, failure: &CommandFailure) -> Result<(), TransportError> {
        let payload = serde_json::to_string(&ErrorMessage {
            kiosk_id: &self.kiosk_id,
            failure,
            timestamp: chrono::Utc::now().to_rfc3339(),
        })?;

        self.client
            .publish(&self.topics.error, QoS::AtLeastOnce, false, payload)
            .await?;
        Ok(())
    }

    /// Publishes every status change and every rejected command until the
    /// player shuts down.
    pub fn run_publishers(&self, transport: &TransportHandle) {
        let status_client = self.clone();
        let mut status = transport.status();
        tokio::spawn(async move {
            loop {
                let current = status.borrow_and_update().clone();
                if let Err(e) = status_client.publish_status(&current).await {
                    warn!(error = %e, "failed to publish status");
                }
                if status.changed().await.is_err() {
                    break;
                }
            }
        });

        let error_client = self.clone();
        let mut failures = transport.failures();
        tokio::spawn(async move {
            loop {
                match failures.recv().await {
                    Ok(failure) => {
                        if let Err(e) = error_client.publish_error(&failure).await {
                            warn!(error = %e, "failed to publish command error");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "dropped command errors");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }
}

/// `kiosk_<hostname>`, or a short random id when the hostname is useless.
pub fn generate_kiosk_id() -> String {
    if let Ok(hostname) = std::process::Command::new("hostname").output() {
        if let Ok(hostname_str) = String::from_utf8(hostname.stdout) {
            let clean_hostname = hostname_str.trim().replace(' ', "_");
            if !clean_hostname.is_empty() && clean_hostname != "localhost" {
                return format!("kiosk_{}", clean_hostname);
            }
        }
    }

    format!("kiosk_{}", &Uuid::new_v4().simple().to_string()[..8])
}
