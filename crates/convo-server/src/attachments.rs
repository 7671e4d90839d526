use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use convo_shared::Attachment;

use crate::config::ObjectStorageConfig;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upload rejected: {0}")]
    Rejected(String),
}

/// One file received with a send request, already read into memory.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub media_type: String,
    pub data: Bytes,
}

/// Where attachment bytes end up. Returns the descriptor that gets stored
/// on the message.
#[async_trait]
pub trait AttachmentStorage: Send + Sync {
    async fn upload(&self, upload: &Upload) -> Result<Attachment, StorageError>;

    /// Short policy name for logs and `/info`.
    fn policy(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// Local disk
// ---------------------------------------------------------------------------

/// Writes files under a directory that the HTTP server exposes as static
/// files at `route`.
#[derive(Debug, Clone)]
pub struct LocalDiskStorage {
    base_path: PathBuf,
    route: String,
}

impl LocalDiskStorage {
    pub async fn new(base_path: PathBuf, route: impl Into<String>) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path).await?;
        info!(path = %base_path.display(), "Local attachment storage initialized");
        Ok(Self {
            base_path,
            route: route.into(),
        })
    }
}

#[async_trait]
impl AttachmentStorage for LocalDiskStorage {
    async fn upload(&self, upload: &Upload) -> Result<Attachment, StorageError> {
        let stored_name = stored_file_name(&upload.file_name);
        let path = self.base_path.join(&stored_name);

        fs::write(&path, &upload.data).await?;
        debug!(file = %stored_name, size = upload.data.len(), "Stored attachment");

        Ok(Attachment {
            url: format!("{}/{}", self.route.trim_end_matches('/'), stored_name),
            media_type: upload.media_type.clone(),
            name: upload.file_name.clone(),
            size: upload.data.len() as u64,
        })
    }

    fn policy(&self) -> &'static str {
        "local"
    }
}

/// `<millis>-<8 hex chars>-<sanitised stem><ext>`. Never contains a path
/// separator, so the result always lands directly in the base directory.
fn stored_file_name(original: &str) -> String {
    let original = Path::new(original)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    let (stem, ext) = match original.rfind('.') {
        Some(idx) if idx > 0 => (&original[..idx], &original[idx..]),
        _ => (original, ""),
    };

    let mut stem = sanitize(stem);
    if stem.is_empty() {
        stem.push_str("file");
    }
    let ext = match sanitize(ext) {
        e if e.is_empty() => String::new(),
        e => format!(".{e}"),
    };

    let unique = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}{}",
        chrono::Utc::now().timestamp_millis(),
        &unique[..8],
        stem,
        ext
    )
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim_start_matches('.')
        .chars()
        .take(64)
        .collect()
}

// ---------------------------------------------------------------------------
// Remote object storage
// ---------------------------------------------------------------------------

/// Posts each file as multipart to a hosted media service and keeps the
/// `secure_url` it returns.
#[derive(Debug, Clone)]
pub struct ObjectStorage {
    client: reqwest::Client,
    config: ObjectStorageConfig,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
}

impl ObjectStorage {
    pub fn new(config: ObjectStorageConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl AttachmentStorage for ObjectStorage {
    async fn upload(&self, upload: &Upload) -> Result<Attachment, StorageError> {
        let part = reqwest::multipart::Part::stream(upload.data.clone())
            .file_name(upload.file_name.clone())
            .mime_str(&upload.media_type)?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("folder", self.config.folder.clone());
        if let Some(preset) = &self.config.upload_preset {
            form = form.text("upload_preset", preset.clone());
        }

        let response = self
            .client
            .post(&self.config.upload_url)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Rejected(format!("status {status}")));
        }

        let body: UploadResponse = response.json().await?;
        let url = body
            .secure_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| StorageError::Rejected("response has no secure_url".to_string()))?;

        debug!(file = %upload.file_name, size = upload.data.len(), "Uploaded attachment");

        Ok(Attachment {
            url,
            media_type: upload.media_type.clone(),
            name: upload.file_name.clone(),
            size: upload.data.len() as u64,
        })
    }

    fn policy(&self) -> &'static str {
        "object"
    }
}
