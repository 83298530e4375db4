//! Remote library sources.
//!
//! The store only ever asks a source for the raw archive bytes of one
//! library; extraction and validation happen in the store.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::LibraryIdentifier;
use crate::error::{CompileError, Result};

/// Default endpoint of the public content type hub
pub const DEFAULT_URL_TEMPLATE: &str = "https://api.h5p.org/v1/content-types/{name}";

/// Something that can fetch library archives
#[async_trait]
pub trait LibrarySource: Send + Sync {
    /// Human-readable description used in logs and errors
    fn describe(&self, id: &LibraryIdentifier) -> String;

    /// Fetch the archive bytes for a library (single attempt)
    async fn fetch(&self, id: &LibraryIdentifier) -> Result<Vec<u8>>;
}

/// HTTP source using a URL template with `{name}`, `{major}`, `{minor}`
pub struct HttpLibrarySource {
    url_template: String,
    client: reqwest::Client,
}

impl HttpLibrarySource {
    pub fn new(url_template: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("h5pack/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            url_template: url_template.into(),
            client,
        })
    }

    /// Expand the template for one library
    pub fn url_for(&self, id: &LibraryIdentifier) -> String {
        self.url_template
            .replace("{name}", &id.name)
            .replace("{major}", &id.major.to_string())
            .replace("{minor}", &id.minor.to_string())
    }

    fn fetch_error(&self, id: &LibraryIdentifier, reason: String) -> CompileError {
        let url = self.url_for(id);
        CompileError::Fetch {
            library: id.clone(),
            remediation: "Check your network connection and that the library endpoint is \
                          reachable (configure it with H5PACK_LIBRARY_URL or library.url_template)"
                .to_string(),
            url,
            reason,
        }
    }
}

#[async_trait]
impl LibrarySource for HttpLibrarySource {
    fn describe(&self, id: &LibraryIdentifier) -> String {
        self.url_for(id)
    }

    async fn fetch(&self, id: &LibraryIdentifier) -> Result<Vec<u8>> {
        let url = self.url_for(id);
        debug!(library = %id, %url, "Fetching library archive");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.fetch_error(id, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.fetch_error(id, format!("server responded with {}", status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.fetch_error(id, format!("failed to read response body: {}", e)))?;

        Ok(bytes.to_vec())
    }
}
