//! Plumbing between the network adapters and the player loop.
//!
//! Adapters (MQTT, HTTP) hold a cloneable [`TransportHandle`]; the player owns
//! the single [`PlayerLink`] on the other end.

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};

use crate::controller::PlayerStatus;
use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Media,
    System,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Media { session: String, tokens: Vec<String> },
    System { session: String, tokens: Vec<String> },
    AdminConnected { session: String },
    AdminDisconnected,
}

impl TransportEvent {
    pub fn command(channel: Channel, session: impl Into<String>, tokens: Vec<String>) -> Self {
        let session = session.into();
        match channel {
            Channel::Media => TransportEvent::Media { session, tokens },
            Channel::System => TransportEvent::System { session, tokens },
        }
    }
}

/// A command the player rejected, fanned out to every adapter that reports errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandFailure {
    pub session: String,
    pub command: String,
    pub error: String,
}

/// Splits a text payload into wire tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

#[derive(Clone)]
pub struct TransportHandle {
    events: mpsc::Sender<TransportEvent>,
    failures: broadcast::Sender<CommandFailure>,
    status: watch::Receiver<PlayerStatus>,
}

impl TransportHandle {
    pub async fn send(&self, event: TransportEvent) -> Result<(), TransportError> {
        self.events
            .send(event)
            .await
            .map_err(|_| TransportError::ChannelClosed)
    }

    pub fn failures(&self) -> broadcast::Receiver<CommandFailure> {
        self.failures.subscribe()
    }

    pub fn status(&self) -> watch::Receiver<PlayerStatus> {
        self.status.clone()
    }

    pub fn current_status(&self) -> PlayerStatus {
        self.status.borrow().clone()
    }
}

/// The player's end: the only receiver of transport events.
pub struct PlayerLink {
    pub events: mpsc::Receiver<TransportEvent>,
    pub failures: broadcast::Sender<CommandFailure>,
    pub status: watch::Sender<PlayerStatus>,
}

pub fn link(capacity: usize, initial: PlayerStatus) -> (TransportHandle, PlayerLink) {
    let (events_tx, events_rx) = mpsc::channel(capacity);
    let (failures_tx, _) = broadcast::channel(capacity);
    let (status_tx, status_rx) = watch::channel(initial);

    let handle = TransportHandle {
        events: events_tx,
        failures: failures_tx.clone(),
        status: status_rx,
    };
    let link = PlayerLink {
        events: events_rx,
        failures: failures_tx,
        status: status_tx,
    };
    (handle, link)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ActiveMedia;

    fn idle() -> PlayerStatus {
        PlayerStatus {
            state: ActiveMedia::Idle,
            media: None,
            position: None,
            volume: 1.0,
            seeking: false,
        }
    }

    #[test]
    fn tokenize_collapses_whitespace() {
        assert_eq!(tokenize("  volume\tset  0.5\n"), vec!["volume", "set", "0.5"]);
        assert!(tokenize("   ").is_empty());
    }

    #[tokio::test]
    async fn events_reach_the_player_in_order() {
        let (handle, mut link) = link(8, idle());
        handle
            .send(TransportEvent::command(Channel::Media, "mqtt", tokenize("play 3")))
            .await
            .unwrap();
        handle.send(TransportEvent::AdminDisconnected).await.unwrap();

        assert_eq!(
            link.events.recv().await,
            Some(TransportEvent::Media {
                session: "mqtt".to_string(),
                tokens: vec!["play".to_string(), "3".to_string()],
            })
        );
        assert_eq!(link.events.recv().await, Some(TransportEvent::AdminDisconnected));
    }

    #[tokio::test]
    async fn send_fails_once_the_player_is_gone() {
        let (handle, link) = link(1, idle());
        drop(link);
        assert!(matches!(
            handle.send(TransportEvent::AdminDisconnected).await,
            Err(TransportError::ChannelClosed)
        ));
    }

    #[test]
    fn status_updates_are_visible_to_adapters() {
        let (handle, link) = link(1, idle());
        link.status.send_modify(|status| status.state = ActiveMedia::PlayingVideo);
        assert_eq!(handle.current_status().state, ActiveMedia::PlayingVideo);
    }
}
