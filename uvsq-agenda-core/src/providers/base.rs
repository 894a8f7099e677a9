use std::time::Duration;

use reqwest::{Client, ClientBuilder};

use crate::{Error, FetchError, ProviderConfig, Result};

/// Shared HTTP plumbing of the timetable providers
pub struct BaseProviderBuilder {
    pub client_builder: ClientBuilder,
    pub info: ProviderInfo,
}

pub struct BaseProvider {
    pub client: Client,
    pub info: ProviderInfo,
}

pub struct ProviderInfo {
    pub name: String,
    pub description: String,
}

impl BaseProviderBuilder {
    pub fn new(info: ProviderInfo) -> Self {
        let client_builder = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("UVSQ-Agenda-Rust/", env!("CARGO_PKG_VERSION")))
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::ACCEPT,
                    reqwest::header::HeaderValue::from_static("application/json, */*"),
                );
                headers.insert(
                    "X-Requested-With",
                    reqwest::header::HeaderValue::from_static("XMLHttpRequest"),
                );
                headers
            });

        Self {
            client_builder,
            info,
        }
    }

    pub fn from_config(config: &ProviderConfig, description: impl Into<String>) -> Self {
        let mut s = Self::new(ProviderInfo {
            name: config.name.clone(),
            description: description.into(),
        });
        if let Some(timeout_secs) = config.timeout {
            s.client_builder = s.client_builder.timeout(Duration::from_secs(timeout_secs));
        }
        s
    }

    pub fn build(self) -> Result<BaseProvider> {
        let client = self
            .client_builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(BaseProvider {
            client,
            info: self.info,
        })
    }
}

impl BaseProvider {
    /// Map a transport error onto the fetch taxonomy
    pub fn handle_error_req(&self, error: &reqwest::Error) -> FetchError {
        tracing::debug!(provider = %self.info.name, "request error: {error:?}");
        if error.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Transport(error.to_string())
        }
    }
}
