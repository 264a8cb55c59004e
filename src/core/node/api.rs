use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use super::models::NodeBlock;
use super::models::NodeHeader;
use super::NodeError;
use crate::core::types::Level;

#[derive(Debug, Clone)]
pub struct NodeAPI {
    url: String,
    client: reqwest::Client,
}

impl NodeAPI {
    pub fn new(url: &str) -> Self {
        tracing::event!(tracing::Level::INFO, url);
        Self {
            url: String::from(url.trim_end_matches('/')),
            client: reqwest::Client::new(),
        }
    }

    /// Header of the current head block
    pub async fn head_header(&self) -> Result<NodeHeader, NodeError> {
        let url = format!("{}/chains/main/blocks/head/header", self.url);
        self.get_json(&url).await
    }

    /// Header of the main chain block at `level`
    pub async fn header(&self, level: Level) -> Result<NodeHeader, NodeError> {
        let url = format!("{}/chains/main/blocks/{level}/header", self.url);
        self.get_json(&url).await
    }

    /// Full block at `level`, operations left undecoded
    pub async fn block(&self, level: Level) -> Result<NodeBlock, NodeError> {
        let url = format!("{}/chains/main/blocks/{level}", self.url);
        self.get_json(&url).await
    }
}

impl NodeAPI {
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, NodeError> {
        let response = self.get(url).await?;
        response
            .json()
            .await
            .map_err(|e| NodeError::DeserializationError(e.to_string()))
    }

    /// Send a GET request
    async fn get(&self, url: &str) -> Result<reqwest::Response, NodeError> {
        tracing::trace!("GET {url}");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|_| NodeError::NodeUnreachable)?;

        match response.status() {
            StatusCode::OK => Ok(response),
            StatusCode::BAD_REQUEST => Err(NodeError::API400BadRequest(url.to_string())),
            StatusCode::NOT_FOUND => Err(NodeError::API404Notfound(url.to_string())),
            _ => Err(NodeError::APIError(url.to_string())),
        }
    }
}
