//! Request body parsing for `POST /incidencias`.
//!
//! Multipart bodies carry the form fields plus at most one evidence file in
//! the `archivo` field. The file is streamed to the upload directory under a
//! generated name. JSON bodies carry the same fields without a file.

use std::path::{Path, PathBuf};

use actix_multipart::{Field, Multipart};
use actix_web::web;
use cusco_reporta_database_models::{EvidenceFile, IncidentSubmission};
use futures::StreamExt as _;
use tokio::io::AsyncWriteExt as _;

/// Multipart field holding the evidence file.
pub const FILE_FIELD: &str = "archivo";

/// Maximum evidence file size (6 MiB).
pub const MAX_UPLOAD_BYTES: usize = 6 * 1024 * 1024;

const MAX_TEXT_FIELD_BYTES: usize = 64 * 1024;

const MAX_EXTENSION_LEN: usize = 10;

/// Errors from reading an incident request body.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The multipart stream was malformed.
    #[error("Malformed multipart body: {0}")]
    Multipart(#[from] actix_multipart::MultipartError),

    /// The request body could not be read.
    #[error("Failed to read request body: {0}")]
    Payload(#[from] actix_web::error::PayloadError),

    /// The JSON body could not be parsed.
    #[error("Malformed JSON body: {0}")]
    Json(#[from] serde_json::Error),

    /// The JSON body was valid but not an object.
    #[error("JSON body must be an object")]
    NotAnObject,

    /// A text field was oversized or not UTF-8.
    #[error("Field {name} is too large or not valid UTF-8")]
    InvalidTextField {
        /// Field name.
        name: String,
    },

    /// The evidence file or body exceeded the size limit.
    #[error("Upload exceeds the {limit} byte limit")]
    TooLarge {
        /// Limit in bytes.
        limit: usize,
    },

    /// Writing the evidence file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
}

/// An evidence file written to the upload directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    /// Stored name and declared media type.
    pub file: EvidenceFile,
    /// Full path of the stored file.
    pub path: PathBuf,
}

impl StoredUpload {
    /// Removes the stored file. Used when the submission it belongs to was
    /// rejected.
    pub async fn discard(self) {
        remove_quietly(&self.path).await;
    }
}

/// A parsed incident request.
#[derive(Debug)]
pub struct ParsedSubmission {
    /// Form fields.
    pub submission: IncidentSubmission,
    /// The evidence file, if one was attached.
    pub upload: Option<StoredUpload>,
}

/// Generates the stored filename `ev_<unix millis>_<random hex><ext>`.
///
/// The extension is taken from the client's filename only when it is short
/// and alphanumeric, and is lowercased.
#[must_use]
pub fn generate_filename(original: Option<&str>) -> String {
    let extension = original
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default();

    format!(
        "ev_{}_{}{extension}",
        chrono::Utc::now().timestamp_millis(),
        uuid::Uuid::new_v4().simple()
    )
}

/// Converts a JSON object body into a submission.
///
/// Strings, numbers, and booleans are accepted as field values. Nulls,
/// arrays, nested objects, and unknown names are ignored.
///
/// # Errors
///
/// Returns [`UploadError::NotAnObject`] if `value` is not an object.
pub fn submission_from_json(value: serde_json::Value) -> Result<IncidentSubmission, UploadError> {
    let serde_json::Value::Object(map) = value else {
        return Err(UploadError::NotAnObject);
    };

    Ok(IncidentSubmission::from_fields(map.into_iter().filter_map(
        |(name, value)| {
            let text = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                serde_json::Value::Null
                | serde_json::Value::Array(_)
                | serde_json::Value::Object(_) => return None,
            };
            Some((name, text))
        },
    )))
}

/// Reads a JSON request body of at most `limit` bytes.
///
/// # Errors
///
/// Returns [`UploadError`] if the body is too large, unreadable, or not a
/// JSON object.
pub async fn read_json(
    mut payload: web::Payload,
    limit: usize,
) -> Result<IncidentSubmission, UploadError> {
    let mut body = web::BytesMut::new();

    while let Some(chunk) = payload.next().await {
        let chunk = chunk?;
        if body.len() + chunk.len() > limit {
            return Err(UploadError::TooLarge { limit });
        }
        body.extend_from_slice(&chunk);
    }

    submission_from_json(serde_json::from_slice(&body)?)
}

/// Reads a multipart request, streaming the evidence file into
/// `upload_dir`.
///
/// On error nothing is left behind in `upload_dir`.
///
/// # Errors
///
/// Returns [`UploadError`] if the body is malformed, a text field is
/// invalid, the file exceeds `limit` bytes, or the file cannot be written.
pub async fn read_multipart(
    mut payload: Multipart,
    upload_dir: &Path,
    limit: usize,
) -> Result<ParsedSubmission, UploadError> {
    let mut submission = IncidentSubmission::default();
    let mut upload = None;

    if let Err(e) = read_fields(&mut payload, upload_dir, limit, &mut submission, &mut upload).await
    {
        if let Some(upload) = upload {
            upload.discard().await;
        }
        return Err(e);
    }

    Ok(ParsedSubmission { submission, upload })
}

async fn read_fields(
    payload: &mut Multipart,
    upload_dir: &Path,
    limit: usize,
    submission: &mut IncidentSubmission,
    upload: &mut Option<StoredUpload>,
) -> Result<(), UploadError> {
    while let Some(field) = payload.next().await {
        let mut field = field?;
        let name = field.name().unwrap_or_default().to_string();
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .filter(|f| !f.is_empty())
            .map(ToString::to_string);

        match filename {
            Some(filename) if name == FILE_FIELD && upload.is_none() => {
                *upload = Some(store_file(&mut field, upload_dir, &filename, limit).await?);
            }
            Some(filename) => {
                log::warn!("Ignoring extra file {filename:?} in field {name:?}");
                drain(&mut field).await?;
            }
            None => {
                let value = read_text(&mut field, &name).await?;
                if !submission.set(&name, value) {
                    log::debug!("Ignoring unknown field {name:?}");
                }
            }
        }
    }

    Ok(())
}

async fn store_file(
    field: &mut Field,
    upload_dir: &Path,
    original: &str,
    limit: usize,
) -> Result<StoredUpload, UploadError> {
    let stored_filename = generate_filename(Some(original));
    let path = upload_dir.join(&stored_filename);
    let media_type = field.content_type().map(ToString::to_string);

    match write_field(field, &path, limit).await {
        Ok(size) => {
            log::debug!("Stored evidence {stored_filename} ({size} bytes)");
            Ok(StoredUpload {
                file: EvidenceFile {
                    stored_filename,
                    media_type,
                },
                path,
            })
        }
        Err(e) => {
            remove_quietly(&path).await;
            Err(e)
        }
    }
}

async fn write_field(field: &mut Field, path: &Path, limit: usize) -> Result<usize, UploadError> {
    let io_err = |source: std::io::Error| UploadError::Io {
        path: path.display().to_string(),
        source,
    };

    let mut file = tokio::fs::File::create(path).await.map_err(io_err)?;
    let mut size = 0;

    while let Some(chunk) = field.next().await {
        let chunk = chunk?;
        size += chunk.len();
        if size > limit {
            return Err(UploadError::TooLarge { limit });
        }
        file.write_all(&chunk).await.map_err(io_err)?;
    }

    file.flush().await.map_err(io_err)?;

    Ok(size)
}

async fn read_text(field: &mut Field, name: &str) -> Result<String, UploadError> {
    let mut bytes = Vec::new();

    while let Some(chunk) = field.next().await {
        let chunk = chunk?;
        if bytes.len() + chunk.len() > MAX_TEXT_FIELD_BYTES {
            return Err(UploadError::InvalidTextField {
                name: name.to_string(),
            });
        }
        bytes.extend_from_slice(&chunk);
    }

    String::from_utf8(bytes).map_err(|_| UploadError::InvalidTextField {
        name: name.to_string(),
    })
}

async fn drain(field: &mut Field) -> Result<(), UploadError> {
    while let Some(chunk) = field.next().await {
        chunk?;
    }
    Ok(())
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        log::warn!("Failed to remove {}: {e}", path.display());
    }
}
