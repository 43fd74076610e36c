//! Client for a remote render service.
//!
//! `POST <endpoint>/api/render` with the snapshot parameters. The service
//! answers either with raw PNG bytes or with a JSON envelope.

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::encode::PNG_CONTENT_TYPE;
use crate::error::{Result, SketchError};
use crate::protocol::PROTOCOL_VERSION;
use crate::snapshot::{RenderParams, RenderedImage, SnapshotRenderer};
use crate::vars::ProtocolVariables;

/// Response header carrying the remote runtime's identity hash.
pub const RUNTIME_HASH_HEADER: &str = "x-runtime-hash";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RenderRequest<'a> {
    code: &'a str,
    seed: i64,
    #[serde(rename = "VAR")]
    vars: ProtocolVariables,
    width: u32,
    height: u32,
    protocol_version: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenderEnvelope {
    png_base64: Option<String>,
    runtime_hash: Option<String>,
    error: Option<String>,
}

/// Renders snapshots on a remote service. Requests are never retried.
#[derive(Debug, Clone)]
pub struct RemoteRenderer {
    client: Client,
    endpoint: String,
}

impl RemoteRenderer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(Client::new(), endpoint)
    }

    pub fn with_client(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    /// Full URL of the render route.
    pub fn render_url(&self) -> String {
        format!("{}/api/render", self.endpoint)
    }
}

#[async_trait]
impl SnapshotRenderer for RemoteRenderer {
    async fn render_png(&self, params: RenderParams<'_>) -> Result<RenderedImage> {
        let body = RenderRequest {
            code: params.code,
            seed: params.seed,
            vars: params.vars,
            width: params.width,
            height: params.height,
            protocol_version: PROTOCOL_VERSION,
        };

        tracing::debug!(url = %self.render_url(), "requesting remote render");
        let response = self
            .client
            .post(self.render_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| SketchError::RemoteRender(e.to_string()))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let header_hash = response
            .headers()
            .get(RUNTIME_HASH_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let payload = response
            .bytes()
            .await
            .map_err(|e| SketchError::RemoteRender(e.to_string()))?;

        if content_type.starts_with(PNG_CONTENT_TYPE) {
            if !status.is_success() {
                return Err(SketchError::RemoteRender(format!("service returned {status}")));
            }
            return Ok(RenderedImage {
                bytes: payload.to_vec(),
                runtime_hash: header_hash.unwrap_or_default(),
            });
        }

        let envelope: RenderEnvelope = serde_json::from_slice(&payload).map_err(|e| {
            SketchError::RemoteRender(format!("service returned {status} with unreadable body: {e}"))
        })?;
        let image = parse_envelope(envelope, header_hash)?;
        if !status.is_success() {
            return Err(SketchError::RemoteRender(format!("service returned {status}")));
        }
        Ok(image)
    }
}

fn parse_envelope(envelope: RenderEnvelope, header_hash: Option<String>) -> Result<RenderedImage> {
    if let Some(error) = envelope.error {
        return Err(SketchError::RemoteRender(error));
    }
    let encoded = envelope
        .png_base64
        .ok_or_else(|| SketchError::RemoteRender("response has neither pngBase64 nor error".to_string()))?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| SketchError::RemoteRender(format!("invalid pngBase64: {e}")))?;
    Ok(RenderedImage {
        bytes,
        runtime_hash: envelope.runtime_hash.or(header_hash).unwrap_or_default(),
    })
}
