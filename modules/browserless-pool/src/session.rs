use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::warn;

use crate::error::{PoolError, Result};

/// One stateful rendering session. Implementations wrap whatever heavyweight
/// resource actually renders pages for the extractors.
#[async_trait]
pub trait RenderSession: Send + Sync {
    /// Fetch fully-rendered HTML for a URL.
    async fn render(&self, url: &str) -> Result<String>;

    /// Whether the session is still usable. Disconnected sessions are pruned
    /// from the pool on the next acquire.
    fn is_connected(&self) -> bool;

    /// Tear down the underlying resource.
    async fn close(&self) -> Result<()>;
}

/// Creates sessions on demand as the pool grows.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(&self) -> Result<Box<dyn RenderSession>>;
}

/// Max retry attempts for transient failures while probing Browserless.
const SESSION_MAX_ATTEMPTS: u32 = 3;
/// Base backoff for create retries. Actual delay is base * 3^attempt + jitter.
const SESSION_RETRY_BASE: Duration = Duration::from_millis(500);

/// Rendering session backed by the Browserless /content endpoint.
///
/// Browserless keeps the browser process on its side, so "connected" here
/// means the last request did not fail at the transport level. API-level
/// errors (non-2xx) leave the session usable.
pub struct BrowserlessSession {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    connected: AtomicBool,
}

#[async_trait]
impl RenderSession for BrowserlessSession {
    async fn render(&self, url: &str) -> Result<String> {
        let mut endpoint = format!("{}/content", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }

        let body = serde_json::json!({ "url": url });

        let resp = match self
            .client
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                self.connected.store(false, Ordering::SeqCst);
                return Err(PoolError::Network(e.to_string()));
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(PoolError::Api {
                status: status.as_u16(),
                message,
            });
        }

        match resp.text().await {
            Ok(html) => Ok(html),
            Err(e) => {
                self.connected.store(false, Ordering::SeqCst);
                Err(PoolError::Network(e.to_string()))
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Creates `BrowserlessSession`s, probing the service's /pressure endpoint
/// first so a dead Browserless fails the create instead of the first render.
pub struct BrowserlessFactory {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BrowserlessFactory {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        }
    }

    /// Health-check Browserless, retrying transient transport failures.
    async fn probe(&self) -> Result<()> {
        let mut endpoint = format!("{}/pressure", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }

        let mut attempt = 0;
        loop {
            let err = match self.client.get(&endpoint).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(());
                    }
                    // The service answered; retrying will not change a 4xx/5xx.
                    let message = resp.text().await.unwrap_or_default();
                    return Err(PoolError::Api {
                        status: status.as_u16(),
                        message,
                    });
                }
                Err(e) => e,
            };

            attempt += 1;
            if attempt >= SESSION_MAX_ATTEMPTS {
                return Err(PoolError::SessionCreation(format!(
                    "Browserless unreachable after {SESSION_MAX_ATTEMPTS} attempts: {err}"
                )));
            }
            let backoff = SESSION_RETRY_BASE * 3u32.pow(attempt - 1);
            let jitter = Duration::from_millis(rand::rng().random_range(0..250));
            warn!(
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "Browserless unreachable, retrying after backoff"
            );
            tokio::time::sleep(backoff + jitter).await;
        }
    }
}

#[async_trait]
impl SessionFactory for BrowserlessFactory {
    async fn create(&self) -> Result<Box<dyn RenderSession>> {
        self.probe().await?;
        Ok(Box::new(BrowserlessSession {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: self.token.clone(),
            connected: AtomicBool::new(true),
        }))
    }
}
