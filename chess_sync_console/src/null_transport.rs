use chess_sync::network::{Transport, TransportError};
use chess_sync::session::ConnectionState;


// For commands that only talk to the REST API.
pub struct NullTransport;

impl Transport for NullTransport {
    fn connection_state(&self) -> ConnectionState { ConnectionState::Disconnected }
    fn subscribe(&mut self, _topic: &str) -> Result<(), TransportError> {
        Err(TransportError::NotConnected)
    }
    fn unsubscribe(&mut self, _topic: &str) {}
    fn publish(&mut self, _topic: &str, _payload: String) -> Result<(), TransportError> {
        Err(TransportError::NotConnected)
    }
}
