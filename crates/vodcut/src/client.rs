//! HTTP plumbing: client construction and the [`Transport`] seam used for
//! playlists and media segments.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use rustls::ClientConfig;
use rustls_platform_verifier::BuilderVerifierExt;
use tracing::{debug, trace};
use url::Url;

use crate::config::HttpConfig;
use crate::error::{Result, TransportError, VodError};

/// Create a reqwest [`Client`] with rustls and the platform certificate verifier.
pub fn create_client(config: &HttpConfig) -> Result<Client> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());

    let tls_config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| VodError::internal(format!("failed to configure TLS versions: {e}")))?
        .with_platform_verifier()
        .map_err(|e| VodError::internal(format!("failed to load platform verifier: {e}")))?
        .with_no_client_auth();

    let mut builder = Client::builder()
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .use_preconfigured_tls(tls_config)
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        builder = builder.timeout(config.timeout);
    }
    if !config.connect_timeout.is_zero() {
        builder = builder.connect_timeout(config.connect_timeout);
    }
    if !config.read_timeout.is_zero() {
        builder = builder.read_timeout(config.read_timeout);
    }
    if !config.use_system_proxy {
        builder = builder.no_proxy();
        debug!("System proxy disabled for downloads");
    }

    builder.build().map_err(VodError::from)
}

/// Fetches a resource in full. Segment and playlist downloads go through this.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url) -> std::result::Result<Bytes, TransportError>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &Url) -> std::result::Result<Bytes, TransportError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::from_status(status, url.as_str()));
        }
        let body = response.bytes().await?;
        trace!(url = %url, bytes = body.len(), "Fetched resource");
        Ok(body)
    }
}

/// Fetch a text resource (playlist) through any transport.
pub async fn get_text(transport: &dyn Transport, url: &Url) -> Result<String> {
    let body = transport
        .get(url)
        .await
        .map_err(|e| VodError::manifest(format!("failed to fetch playlist {url}: {e}")))?;
    String::from_utf8(body.to_vec())
        .map_err(|e| VodError::playlist(format!("playlist {url} is not valid UTF-8: {e}")))
}
