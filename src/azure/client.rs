use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::ArmError;
use super::poller::{LongRunningOperation, OperationKind};

const ARM_API_BASE: &str = "https://management.azure.com";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Thin REST client for Azure Resource Manager.
///
/// Every call takes the full ARM resource ID plus the API version of the
/// resource type, which is how the generated SDK clients are versioned.
#[derive(Clone)]
pub struct ArmClient {
    client: reqwest::Client,
    subscription_id: String,
    base_url: String,
    poll_interval: Duration,
}

impl ArmClient {
    pub fn new(token: String, subscription_id: String) -> Result<Self, ArmError> {
        Self::with_base_url(token, subscription_id, ARM_API_BASE.to_string())
    }

    /// NOTE: Primarily used for testing with mock servers.
    pub fn with_base_url(
        token: String,
        subscription_id: String,
        base_url: String,
    ) -> Result<Self, ArmError> {
        let mut headers = HeaderMap::new();
        let header_value =
            HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| ArmError::Auth {
                status: 0,
                message: "Invalid token format".to_string(),
            })?;
        headers.insert(AUTHORIZATION, header_value);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(ArmError::Network)?;

        Ok(Self {
            client,
            subscription_id,
            base_url: base_url.trim_end_matches('/').to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn api_base(&self) -> &str {
        &self.base_url
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub(crate) fn http_client(&self) -> &reqwest::Client {
        &self.client
    }

    pub(crate) fn resource_url(&self, id: &str, api_version: &str) -> String {
        format!("{}{}?api-version={}", self.base_url, id, api_version)
    }

    pub async fn get<T: DeserializeOwned>(&self, id: &str, api_version: &str) -> Result<T, ArmError> {
        let url = self.resource_url(id, api_version);
        tracing::debug!(%id, api_version, "GET resource");

        let response = self.client.get(&url).send().await?;
        let response = check_status(response, id).await?;

        response.json::<T>().await.map_err(|e| ArmError::Decode {
            message: format!("Failed to parse {}: {}", id, e),
        })
    }

    pub async fn begin_create_or_update<B: Serialize + ?Sized>(
        &self,
        id: &str,
        api_version: &str,
        body: &B,
    ) -> Result<LongRunningOperation, ArmError> {
        let url = self.resource_url(id, api_version);
        tracing::debug!(%id, api_version, "PUT resource");

        let response = self.client.put(&url).json(body).send().await?;
        let response = check_status(response, id).await?;

        LongRunningOperation::start(OperationKind::CreateOrUpdate, id, url, response).await
    }

    pub async fn begin_delete(
        &self,
        id: &str,
        api_version: &str,
    ) -> Result<LongRunningOperation, ArmError> {
        let url = self.resource_url(id, api_version);
        tracing::debug!(%id, api_version, "DELETE resource");

        let response = self.client.delete(&url).send().await?;
        let response = check_status(response, id).await?;

        LongRunningOperation::start(OperationKind::Delete, id, url, response).await
    }

    pub async fn create_or_update_and_wait<B: Serialize + ?Sized>(
        &self,
        id: &str,
        api_version: &str,
        body: &B,
    ) -> Result<(), ArmError> {
        self.begin_create_or_update(id, api_version, body)
            .await?
            .wait(self)
            .await
    }

    /// Deletes `id` and waits for completion. A 404 surfaces as
    /// [`ArmError::NotFound`] so callers can decide whether it matters.
    pub async fn delete_and_wait(&self, id: &str, api_version: &str) -> Result<(), ArmError> {
        self.begin_delete(id, api_version).await?.wait(self).await
    }
}

impl std::fmt::Debug for ArmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArmClient")
            .field("subscription_id", &self.subscription_id)
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Maps non-success responses onto [`ArmError`], reading the standard ARM
/// `{"error": {"code": ..., "message": ...}}` envelope when present.
pub(crate) async fn check_status(response: Response, id: &str) -> Result<Response, ArmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::NOT_FOUND {
        return Err(ArmError::NotFound { id: id.to_string() });
    }

    let body: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);
    let (code, message) = error_details(&body);

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ArmError::Auth {
            status: status.as_u16(),
            message,
        });
    }

    Err(ArmError::Api {
        status: status.as_u16(),
        code,
        message,
    })
}

pub(crate) fn error_details(body: &serde_json::Value) -> (String, String) {
    let error = body.get("error");
    let code = error
        .and_then(|e| e.get("code"))
        .and_then(|c| c.as_str())
        .unwrap_or("Unknown")
        .to_string();
    let message = error
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .unwrap_or("Unknown error")
        .to_string();
    (code, message)
}
