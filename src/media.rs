//! # Media — Blob Storage Collaborator
//!
//! Posts, pets, submissions and listings store only the public URL of their
//! media. [`prepare_upload`] validates an upload (content type, size, folder)
//! and names the object after the SHA-256 of its bytes, so the same file
//! uploaded twice lands on the same key. A [`BlobStore`] then writes it:
//!
//! - [`LocalBlobStore`] writes under a directory that the HTTP layer serves
//!   at `/media`.
//! - [`HttpBlobStore`] `PUT`s the object to an S3-style endpoint with a
//!   bearer token.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::config::{MediaBackend, MediaConfig};
use crate::error::PetnetError;

const DEFAULT_FOLDER: &str = "uploads";

/// Accepted content types and the extension their objects get.
const CONTENT_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/heic", "heic"),
    ("video/mp4", "mp4"),
    ("video/quicktime", "mov"),
    ("video/webm", "webm"),
];

/// A validated upload, ready for a [`BlobStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    /// `<folder>/<sha256>.<ext>`
    pub key: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

fn extension_for(content_type: &str) -> Option<&'static str> {
    CONTENT_TYPES
        .iter()
        .find(|(ct, _)| *ct == content_type)
        .map(|(_, ext)| *ext)
}

fn valid_folder(folder: &str) -> bool {
    (1..=32).contains(&folder.len())
        && folder
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

/// Decode and validate a base64 upload.
pub fn prepare_upload(
    data: &str,
    content_type: &str,
    folder: Option<&str>,
    max_bytes: usize,
) -> crate::error::Result<Upload> {
    let content_type = content_type.trim().to_ascii_lowercase();
    let ext = extension_for(&content_type).ok_or_else(|| {
        PetnetError::invalid(format!("content type '{}' is not accepted", content_type))
    })?;
    let folder = folder.map(str::trim).filter(|f| !f.is_empty()).unwrap_or(DEFAULT_FOLDER);
    if !valid_folder(folder) {
        return Err(PetnetError::invalid(format!("folder '{}' is not allowed", folder)));
    }
    // Tolerate data URLs from browser FileReader.
    let encoded = data
        .split_once(";base64,")
        .map_or(data, |(_, rest)| rest)
        .trim();
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| PetnetError::invalid(format!("data is not valid base64: {}", e)))?;
    if bytes.is_empty() {
        return Err(PetnetError::invalid("upload is empty"));
    }
    if bytes.len() > max_bytes {
        return Err(PetnetError::invalid(format!(
            "upload is {} bytes, the limit is {}",
            bytes.len(),
            max_bytes
        )));
    }
    let digest = hex::encode(Sha256::digest(&bytes));
    Ok(Upload {
        key: format!("{}/{}.{}", folder, digest, ext),
        content_type,
        bytes,
    })
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store the object and return its public URL.
    async fn put(&self, upload: &Upload) -> Result<String>;
}

fn public_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key)
}

pub struct LocalBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        LocalBlobStore {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, upload: &Upload) -> Result<String> {
        let path = self.root.join(&upload.key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        tokio::fs::write(&path, &upload.bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        info!(key = %upload.key, bytes = upload.bytes.len(), "stored media locally");
        Ok(public_url(&self.public_base_url, &upload.key))
    }
}

pub struct HttpBlobStore {
    client: reqwest::Client,
    endpoint: String,
    public_base_url: String,
    token: Option<String>,
}

impl HttpBlobStore {
    pub fn new(endpoint: impl Into<String>, public_base_url: impl Into<String>, token: Option<String>) -> Self {
        HttpBlobStore {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            public_base_url: public_base_url.into(),
            token,
        }
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn put(&self, upload: &Upload) -> Result<String> {
        let url = public_url(&self.endpoint, &upload.key);
        let mut request = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, &upload.content_type)
            .body(upload.bytes.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
            .send()
            .await
            .with_context(|| format!("uploading {}", upload.key))?
            .error_for_status()
            .with_context(|| format!("object store rejected {}", upload.key))?;
        info!(key = %upload.key, bytes = upload.bytes.len(), "stored media remotely");
        Ok(public_url(&self.public_base_url, &upload.key))
    }
}

/// Build the configured blob store.
pub fn from_config(config: &MediaConfig) -> Result<Arc<dyn BlobStore>> {
    match config.backend {
        MediaBackend::Local => Ok(Arc::new(LocalBlobStore::new(
            config.local_dir.clone(),
            config.public_base_url.clone(),
        ))),
        MediaBackend::Http => {
            let endpoint = config
                .endpoint
                .clone()
                .context("media.endpoint is required for the http media backend")?;
            Ok(Arc::new(HttpBlobStore::new(
                endpoint,
                config.public_base_url.clone(),
                config.token.clone(),
            )))
        }
    }
}
