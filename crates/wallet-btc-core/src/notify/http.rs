use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CoreError;
use crate::rpc::http_adapter::connection::parse_http_url;
use crate::types::{DirectoryEntry, PushEvent};

use super::{NotifyHub, TOKEN_NAME};

/// `{errno, errmsg, data}` as answered by the hub; `errno == 0` is success.
#[derive(Deserialize)]
struct Envelope {
    errno: i64,
    #[serde(default)]
    errmsg: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Deserialize)]
struct DirectoryData {
    addresses: Vec<DirectoryEntry>,
}

#[derive(Serialize)]
struct PushRequest<'a> {
    push_list: &'a [PushEvent],
}

/// HTTP client for the notify hub.
pub struct HubClient {
    client: reqwest::Client,
    base_url: String,
    chain_id: String,
}

impl HubClient {
    pub fn new(base_url: &str, chain_id: &str, timeout: Duration) -> Result<Self, CoreError> {
        let base_url = parse_http_url(base_url)?;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| CoreError::Param(format!("build notify hub http client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            chain_id: chain_id.to_owned(),
        })
    }

    async fn read_envelope(
        &self,
        endpoint: &str,
        response: reqwest::Response,
    ) -> Result<serde_json::Value, CoreError> {
        let status = response.status();
        if status != StatusCode::OK {
            return Err(CoreError::Network {
                status: status.as_u16(),
            });
        }
        let body = response
            .text()
            .await
            .map_err(|e| CoreError::Socket(format!("{endpoint}: {e}")))?;
        let envelope: Envelope = serde_json::from_str(&body).map_err(|e| {
            CoreError::InvalidResponse(format!("{endpoint}: decode hub response: {e}; body={body}"))
        })?;
        if envelope.errno != 0 {
            return Err(CoreError::Rpc {
                code: envelope.errno,
                message: envelope.errmsg,
            });
        }
        Ok(envelope.data)
    }
}

#[async_trait]
impl NotifyHub for HubClient {
    async fn fetch_directory(&self) -> Result<Vec<DirectoryEntry>, CoreError> {
        let endpoint = format!("{}/v1/cids", self.base_url);
        let response = self
            .client
            .get(&endpoint)
            .query(&[("chain_type", TOKEN_NAME), ("chain_id", self.chain_id.as_str())])
            .send()
            .await
            .map_err(|e| CoreError::Socket(format!("{endpoint}: {e}")))?;

        let data: DirectoryData =
            serde_json::from_value(self.read_envelope(&endpoint, response).await?).map_err(|e| {
                CoreError::InvalidResponse(format!("{endpoint}: unexpected directory data: {e}"))
            })?;
        debug!(entries = data.addresses.len(), "fetched subscriber directory");
        Ok(data.addresses)
    }

    async fn push(&self, events: &[PushEvent]) -> Result<(), CoreError> {
        let endpoint = format!("{}/v1/push", self.base_url);
        let response = self
            .client
            .post(&endpoint)
            .json(&PushRequest { push_list: events })
            .send()
            .await
            .map_err(|e| CoreError::Socket(format!("{endpoint}: {e}")))?;

        self.read_envelope(&endpoint, response).await.map(|_| ())
    }
}
