use std::fmt;

use async_trait::async_trait;

use crate::event::{GameSnapshot, MoveLogEntry};
use crate::session::{GameId, PlayerId};


#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ApiError {
    NotFound,
    Network(String),
    Server { status: u16, message: String },
    BadResponse(String),
}

// Request/response half of the server interface. Everything here is awaited by the event loop,
// so implementations need not be `Send`.
#[async_trait(?Send)]
pub trait GameApi {
    // `GET /games/{id}`
    async fn fetch_game(&self, game_id: &GameId) -> Result<GameSnapshot, ApiError>;
    // `GET /games/{id}/moves`
    async fn fetch_moves(&self, game_id: &GameId) -> Result<Vec<MoveLogEntry>, ApiError>;
    // `POST /games/{id}/resign?playerId=...`
    async fn resign(&self, game_id: &GameId, player_id: &PlayerId) -> Result<(), ApiError>;
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotFound => write!(f, "game not found"),
            ApiError::Network(err) => write!(f, "network error: {err}"),
            ApiError::Server { status, message } => write!(f, "server error {status}: {message}"),
            ApiError::BadResponse(err) => write!(f, "unexpected response: {err}"),
        }
    }
}

impl std::error::Error for ApiError {}
