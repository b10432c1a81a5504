use std::path::PathBuf;

use thiserror::Error;

use crate::media_library::MediaId;

/// A token list that does not match the wire grammar.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandParseError {
    #[error("unknown command: {tokens:?}")]
    Unknown { tokens: String },
    #[error("expected a number but got {token:?} in {tokens:?}")]
    NotANumber { token: String, tokens: String },
}

impl CommandParseError {
    pub(crate) fn unknown(words: &[&str]) -> Self {
        Self::Unknown { tokens: words.join(" ") }
    }

    pub(crate) fn not_a_number(token: &str, words: &[&str]) -> Self {
        Self::NotANumber {
            token: token.to_string(),
            tokens: words.join(" "),
        }
    }
}

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("media {id} has unsupported type {media_type:?}")]
    UnsupportedMediaType { id: MediaId, media_type: String },
}

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("video playback failed for {path}: {reason}")]
    Playback { path: PathBuf, reason: String },
    #[error("framebuffer I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is not a valid settings file: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path} has invalid entries: {}", .problems.join("; "))]
    Invalid { path: PathBuf, problems: Vec<String> },
}

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("failed to read media library at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid media manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("media id {0} is listed more than once")]
    DuplicateId(MediaId),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("command channel closed")]
    ChannelClosed,
}
