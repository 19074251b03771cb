use std::time::Duration;

use reqwest::header::{HeaderMap, LOCATION, RETRY_AFTER};
use reqwest::{Response, StatusCode};

use super::client::{ArmClient, check_status, error_details};
use super::ArmError;

const AZURE_ASYNC_OPERATION: &str = "azure-asyncoperation";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    CreateOrUpdate,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PollState {
    Done,
    AsyncOperation(String),
    Location(String),
    ProvisioningState,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    AsyncOperation,
    Location,
    ProvisioningState,
}

/// A started ARM operation which may still be running server side.
///
/// Polling prefers `Azure-AsyncOperation`, then `Location`, then the
/// resource's own `provisioningState`.
#[derive(Debug)]
pub struct LongRunningOperation {
    kind: OperationKind,
    id: String,
    resource_url: String,
    state: PollState,
    retry_after: Option<Duration>,
}

impl LongRunningOperation {
    pub(crate) async fn start(
        kind: OperationKind,
        id: &str,
        resource_url: String,
        response: Response,
    ) -> Result<Self, ArmError> {
        let status = response.status();
        let headers = response.headers().clone();
        let retry_after = parse_retry_after(&headers);

        let state = if let Some(url) = header_str(&headers, AZURE_ASYNC_OPERATION) {
            PollState::AsyncOperation(url)
        } else if status == StatusCode::ACCEPTED {
            match header_str(&headers, LOCATION.as_str()) {
                Some(url) => PollState::Location(url),
                None => PollState::ProvisioningState,
            }
        } else if kind == OperationKind::Delete {
            PollState::Done
        } else {
            let body: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);
            match provisioning_state(&body) {
                None => PollState::Done,
                Some(state) if state.eq_ignore_ascii_case("Succeeded") => PollState::Done,
                Some(state) if is_failed(state) => {
                    return Err(ArmError::OperationFailed {
                        status: state.to_string(),
                        code: "ProvisioningFailed".to_string(),
                        message: format!("{} entered provisioning state {:?}", id, state),
                    });
                }
                Some(_) => PollState::ProvisioningState,
            }
        };

        Ok(Self {
            kind,
            id: id.to_string(),
            resource_url,
            state,
            retry_after,
        })
    }

    pub fn is_done(&self) -> bool {
        self.state == PollState::Done
    }

    /// Blocks until the operation reaches a terminal state.
    pub async fn wait(mut self, client: &ArmClient) -> Result<(), ArmError> {
        loop {
            let (url, phase) = match &self.state {
                PollState::Done => return Ok(()),
                PollState::AsyncOperation(url) => (url.clone(), Phase::AsyncOperation),
                PollState::Location(url) => (url.clone(), Phase::Location),
                PollState::ProvisioningState => {
                    (self.resource_url.clone(), Phase::ProvisioningState)
                }
            };

            let delay = self.retry_after.unwrap_or(client.poll_interval());
            tokio::time::sleep(delay).await;

            tracing::debug!(id = %self.id, kind = ?self.kind, "polling long-running operation");
            let response = client.http_client().get(&url).send().await?;
            self.retry_after = parse_retry_after(response.headers());

            if response.status() == StatusCode::NOT_FOUND && self.kind == OperationKind::Delete {
                self.state = PollState::Done;
                continue;
            }

            let status = response.status();
            let response = check_status(response, &self.id).await?;

            match phase {
                Phase::AsyncOperation => {
                    let body: serde_json::Value =
                        response.json().await.map_err(|e| ArmError::Decode {
                            message: format!("Failed to parse operation status: {}", e),
                        })?;
                    let op_status = body
                        .get("status")
                        .and_then(|s| s.as_str())
                        .unwrap_or("InProgress");

                    if op_status.eq_ignore_ascii_case("Succeeded") {
                        self.state = PollState::Done;
                    } else if is_failed(op_status) {
                        let (code, message) = error_details(&body);
                        return Err(ArmError::OperationFailed {
                            status: op_status.to_string(),
                            code,
                            message,
                        });
                    }
                }
                Phase::Location => {
                    if status != StatusCode::ACCEPTED {
                        self.state = PollState::Done;
                    }
                }
                Phase::ProvisioningState => {
                    let body: serde_json::Value =
                        response.json().await.unwrap_or(serde_json::Value::Null);
                    match provisioning_state(&body) {
                        None => self.state = PollState::Done,
                        Some(state) if state.eq_ignore_ascii_case("Succeeded") => {
                            self.state = PollState::Done
                        }
                        Some(state) if is_failed(state) => {
                            return Err(ArmError::OperationFailed {
                                status: state.to_string(),
                                code: "ProvisioningFailed".to_string(),
                                message: format!(
                                    "{} entered provisioning state {:?}",
                                    self.id, state
                                ),
                            });
                        }
                        Some(_) => {}
                    }
                }
            }
        }
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

fn provisioning_state(body: &serde_json::Value) -> Option<&str> {
    body.get("properties")
        .and_then(|p| p.get("provisioningState"))
        .and_then(|s| s.as_str())
}

fn is_failed(state: &str) -> bool {
    state.eq_ignore_ascii_case("Failed") || state.eq_ignore_ascii_case("Canceled")
}
