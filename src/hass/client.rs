use log::{error, warn};
use std::time::Duration;
use thiserror::Error;
use url::Url;

const MAX_RETRIES: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 500;
const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum HassError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("server error {status}: {message}")]
    ServerError { status: u16, message: String },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid entity url: {0}")]
    Url(#[from] url::ParseError),
    #[error("request task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Client for the Home Assistant REST API
#[derive(Clone)]
pub struct HassClient {
    base_url: Url,
    token: Option<String>,
    agent: ureq::Agent,
    retry_base_delay: Duration,
}

impl HassClient {
    pub fn new(mut base_url: Url, token: Option<String>) -> Self {
        // Url::join replaces the last path segment unless the base ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("ruuvi-hass/", env!("CARGO_PKG_VERSION")))
            .build();

        HassClient {
            base_url,
            token,
            agent,
            retry_base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
        }
    }

    /// URL of the states endpoint for one entity
    pub fn state_url(&self, entity_id: &str) -> Result<Url, HassError> {
        Ok(self.base_url.join(&format!("api/states/{}", entity_id))?)
    }

    /// POST a JSON body, retrying on transport errors, 5xx and 429
    pub async fn post_json(&self, url: Url, body: String) -> Result<(), HassError> {
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = self.retry_base_delay * (1 << (attempt - 1));
                tokio::time::sleep(delay).await;
            }

            let mut request = self
                .agent
                .post(url.as_str())
                .set("Content-Type", "application/json");
            if let Some(token) = &self.token {
                request = request.set("Authorization", &format!("Bearer {}", token));
            }

            let payload = body.clone();
            let response = tokio::task::spawn_blocking(move || request.send_string(&payload)).await?;

            match response {
                Ok(_) => return Ok(()),
                Err(ureq::Error::Status(status, resp)) => {
                    let message = resp.into_string().unwrap_or_default();
                    if status >= 500 || status == 429 {
                        warn!(
                            "Attempt {}: {} returned {}, retrying",
                            attempt + 1,
                            url,
                            status
                        );
                        last_error = Some(HassError::ServerError { status, message });
                    } else {
                        // Client errors (bad token, malformed entity) will not improve on retry
                        return Err(HassError::ServerError { status, message });
                    }
                }
                Err(ureq::Error::Transport(e)) => {
                    error!("Attempt {}: connection error: {}", attempt + 1, e);
                    last_error = Some(HassError::Request(e.to_string()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| HassError::Request("max retries exceeded".into())))
    }
}
