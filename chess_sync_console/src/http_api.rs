use async_trait::async_trait;
use chess_sync::api::{ApiError, GameApi};
use chess_sync::event::{ApiEnvelope, GameSnapshot, MoveLogEntry};
use chess_sync::session::{GameId, PlayerId};
use log::debug;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use url::Url;


// `GameApi` over the server's REST interface. Every response body is wrapped as `{"data": ...}`.
pub struct HttpGameApi {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpGameApi {
    // `base_url` is the API root, e.g. "http://localhost:8080/api".
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }
        Ok(HttpGameApi { client: reqwest::Client::new(), base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url.join(path).map_err(|err| ApiError::BadResponse(err.to_string()))
    }

    async fn unwrap_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::Server { status: status.as_u16(), message });
        }
        let envelope: ApiEnvelope<T> =
            response.json().await.map_err(|err| ApiError::BadResponse(err.to_string()))?;
        Ok(envelope.data)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.endpoint(path)?;
        debug!("GET {url}");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| ApiError::Network(err.to_string()))?;
        Self::unwrap_response(response).await
    }
}

#[async_trait(?Send)]
impl GameApi for HttpGameApi {
    async fn fetch_game(&self, game_id: &GameId) -> Result<GameSnapshot, ApiError> {
        self.get(&format!("games/{game_id}")).await
    }

    async fn fetch_moves(&self, game_id: &GameId) -> Result<Vec<MoveLogEntry>, ApiError> {
        self.get(&format!("games/{game_id}/moves")).await
    }

    async fn resign(&self, game_id: &GameId, player_id: &PlayerId) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("games/{game_id}/resign"))?;
        debug!("POST {url}");
        let response = self
            .client
            .post(url)
            .query(&[("playerId", player_id.as_str())])
            .send()
            .await
            .map_err(|err| ApiError::Network(err.to_string()))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status == StatusCode::NOT_FOUND {
            Err(ApiError::NotFound)
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(ApiError::Server { status: status.as_u16(), message })
        }
    }
}
