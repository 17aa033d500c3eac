// Transport seam. The real channel (e.g. STOMP over a websocket) lives outside this crate: the
// event loop subscribes through `Transport` and forwards whatever arrives to
// `ClientState::process_message`. Only per-topic FIFO delivery while connected is assumed.

use std::fmt;

use serde::{Serialize, de};

use crate::session::{ConnectionState, GameId};


#[derive(Clone, PartialEq, Eq, Debug)]
pub enum TransportError {
    NotConnected,
    Rejected(String),
}

#[derive(Debug)]
pub enum CommunicationError {
    Transport(TransportError),
    Serde(serde_json::Error),
}

pub trait Transport {
    fn connection_state(&self) -> ConnectionState;
    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;
    fn unsubscribe(&mut self, topic: &str);
    // Fire-and-forget: `Ok` means the message was handed to the channel, not that it arrived.
    fn publish(&mut self, topic: &str, payload: String) -> Result<(), TransportError>;
}

pub fn moves_topic(game_id: &GameId) -> String { format!("game/{game_id}/moves") }
pub fn clock_topic(game_id: &GameId) -> String { format!("game/{game_id}/clock") }

pub fn write_obj<T: Serialize>(
    transport: &mut dyn Transport, topic: &str, obj: &T,
) -> Result<(), CommunicationError> {
    let serialized = serde_json::to_string(obj).map_err(CommunicationError::Serde)?;
    transport.publish(topic, serialized).map_err(CommunicationError::Transport)
}

pub fn parse_obj<T: de::DeserializeOwned>(payload: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(payload)
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::NotConnected => write!(f, "not connected"),
            TransportError::Rejected(reason) => write!(f, "rejected by transport: {reason}"),
        }
    }
}

impl fmt::Display for CommunicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommunicationError::Transport(err) => write!(f, "{err}"),
            CommunicationError::Serde(err) => write!(f, "serialization error: {err}"),
        }
    }
}

impl std::error::Error for TransportError {}
impl std::error::Error for CommunicationError {}
