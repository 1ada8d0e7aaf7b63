use actix_multipart::{Field, Multipart};
use chrono::Utc;
use futures_util::TryStreamExt;
use log::{debug, error};
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::config::UploadSettings;
use crate::errors::AppError;
use crate::models::employee::FieldSet;

/// Keys the server derives or assigns; client-sent values are dropped.
const DERIVED_FIELDS: [&str; 3] = ["imageFilename", "createdAt", "id"];

const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Parsed text fields of one submission plus the files written for it.
#[derive(Debug)]
pub struct Upload {
    pub fields: FieldSet,
    stored_files: Vec<PathBuf>,
}

impl Upload {
    /// Removes every file stored for this submission.
    pub async fn discard(self) {
        for path in self.stored_files {
            match fs::remove_file(&path).await {
                Ok(()) => debug!("Removed uploaded file {}", path.display()),
                Err(err) => error!("Failed to remove uploaded file {}: {}", path.display(), err),
            }
        }
    }
}

/// Reads the multipart body, writing file parts under the upload directory and
/// injecting the stored name as `imageFilename`.
pub async fn intercept(mut payload: Multipart, settings: &UploadSettings) -> Result<Upload, AppError> {
    let mut upload = Upload {
        fields: FieldSet::new(),
        stored_files: Vec::new(),
    };

    if let Err(err) = read_parts(&mut payload, settings, &mut upload).await {
        upload.discard().await;
        return Err(err);
    }

    Ok(upload)
}

async fn read_parts(
    payload: &mut Multipart,
    settings: &UploadSettings,
    upload: &mut Upload,
) -> Result<(), AppError> {
    // Shared by all text parts so the number of fields cannot grow memory unbounded.
    let mut text_budget = settings.max_upload_bytes;

    while let Some(mut field) = payload.try_next().await? {
        let (name, filename) = {
            let disposition = field.content_disposition();
            (
                disposition.get_name().unwrap_or_default().to_string(),
                disposition.get_filename().map(str::to_string),
            )
        };

        match filename {
            Some(original) if !original.is_empty() => {
                fs::create_dir_all(&settings.upload_dir)
                    .await
                    .map_err(|err| AppError::UploadError(format!("Failed to create upload directory: {}", err)))?;
                let (stored_name, file) = create_unique(settings, &original).await?;
                let path = settings.upload_dir.join(&stored_name);
                upload.stored_files.push(path.clone());

                write_file(&mut field, file, settings.max_upload_bytes).await?;
                debug!("Stored upload for field '{}' as {}", name, path.display());
                upload.fields.set("imageFilename", stored_name);
            }
            // An empty file input still sends a part with `filename=""`.
            Some(_) => {
                read_bytes(&mut field, settings.max_upload_bytes).await?;
            }
            None => {
                let bytes = read_bytes(&mut field, text_budget).await?;
                text_budget -= bytes.len();
                if DERIVED_FIELDS.contains(&name.as_str()) {
                    continue;
                }
                let value = String::from_utf8(bytes)
                    .map_err(|_| AppError::BadRequest(format!("Field '{}' is not valid UTF-8", name)))?;
                upload.fields.insert(&name, value);
            }
        }
    }

    Ok(())
}

/// Opens a file that did not exist before, so no two requests ever share a path.
async fn create_unique(settings: &UploadSettings, original: &str) -> Result<(String, fs::File), AppError> {
    let millis = Utc::now().timestamp_millis();

    for attempt in 0..MAX_NAME_ATTEMPTS {
        let stored_name = stored_file_name(original, millis, attempt);
        let opened = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(settings.upload_dir.join(&stored_name))
            .await;

        match opened {
            Ok(file) => return Ok((stored_name, file)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(AppError::UploadError(format!("Failed to store file: {}", err))),
        }
    }

    Err(AppError::UploadError(format!(
        "Failed to find a free file name for '{}'",
        original
    )))
}

async fn write_file(field: &mut Field, mut file: fs::File, limit: usize) -> Result<(), AppError> {
    let mut written = 0usize;

    while let Some(chunk) = field.try_next().await? {
        written += chunk.len();
        if written > limit {
            return Err(AppError::PayloadTooLarge(format!("File exceeds the {} byte limit", limit)));
        }
        file.write_all(&chunk)
            .await
            .map_err(|err| AppError::UploadError(format!("Failed to store file: {}", err)))?;
    }

    file.flush()
        .await
        .map_err(|err| AppError::UploadError(format!("Failed to store file: {}", err)))
}

async fn read_bytes(field: &mut Field, limit: usize) -> Result<Vec<u8>, AppError> {
    let mut bytes = Vec::new();

    while let Some(chunk) = field.try_next().await? {
        if bytes.len() + chunk.len() > limit {
            return Err(AppError::PayloadTooLarge("Form data exceeds the upload byte limit".to_string()));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

/// `<millis>_<basename>`, or `<millis>-<attempt>_<basename>` after a name clash.
/// Client-side directories are stripped.
fn stored_file_name(original: &str, millis: i64, attempt: u32) -> String {
    let basename = original
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();

    let basename = match basename {
        "" | "." | ".." => "upload",
        name => name,
    };

    match attempt {
        0 => format!("{}_{}", millis, basename),
        n => format!("{}-{}_{}", millis, n, basename),
    }
}
