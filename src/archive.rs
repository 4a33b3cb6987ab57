use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::config::Credentials;
use crate::error::StrikeError;

/// Remote strike archive. `Err(ArchiveStatus { status: 404, .. })` means the resource is absent.
pub trait ArchiveClient: Send + Sync {
    fn get(&self, url: &str) -> Result<Vec<u8>, StrikeError>;
}

#[derive(Clone)]
pub struct ArchiveHttpClient {
    client: Client,
    credentials: Option<Credentials>,
}

impl ArchiveHttpClient {
    pub fn new(credentials: Option<Credentials>, timeout: Duration) -> Result<Self, StrikeError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("thunderstruck/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| StrikeError::ArchiveHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| StrikeError::ArchiveHttp(err.to_string()))?;
        Ok(Self {
            client,
            credentials,
        })
    }
}

impl ArchiveClient for ArchiveHttpClient {
    fn get(&self, url: &str) -> Result<Vec<u8>, StrikeError> {
        let mut request = self.client.get(url);
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.username, credentials.password.as_ref());
        }
        let response = request
            .send()
            .map_err(|err| StrikeError::ArchiveHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .status()
                .canonical_reason()
                .unwrap_or("archive request failed")
                .to_string();
            return Err(StrikeError::ArchiveStatus { status, message });
        }
        let bytes = response
            .bytes()
            .map_err(|err| StrikeError::ArchiveHttp(err.to_string()))?;
        Ok(bytes.to_vec())
    }
}
