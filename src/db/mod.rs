use log::error;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::employee::EmployeeRecord;

/// Flat JSON document of named collections, e.g. `{ "employees": [ ... ] }`.
pub struct JsonStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();

        if fs::metadata(&path).await.is_err() {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|err| AppError::StorageError(format!("Failed to create database directory: {}", err)))?;
            }
            write_document(&path, &Map::new()).await?;
        }

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Assigns an `id`, appends the record to `resource` and returns what was stored.
    pub async fn insert(&self, resource: &str, mut record: EmployeeRecord) -> Result<Value, AppError> {
        let _guard = self.write_lock.lock().await;

        let mut document = read_document(&self.path).await?;
        record.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        let stored = Value::Object(record);

        match document
            .entry(resource.to_string())
            .or_insert_with(|| Value::Array(Vec::new()))
        {
            Value::Array(items) => items.push(stored.clone()),
            _ => {
                error!("Collection '{}' in {} is not an array", resource, self.path.display());
                return Err(AppError::StorageError(format!("Collection '{}' is not an array", resource)));
            }
        }

        write_document(&self.path, &document).await?;
        Ok(stored)
    }
}

async fn read_document(path: &Path) -> Result<Map<String, Value>, AppError> {
    let raw = fs::read(path)
        .await
        .map_err(|err| AppError::StorageError(format!("Failed to read database: {}", err)))?;

    match serde_json::from_slice(&raw) {
        Ok(Value::Object(document)) => Ok(document),
        Ok(_) => Err(AppError::StorageError("Database root is not an object".to_string())),
        Err(err) => Err(AppError::StorageError(format!("Failed to parse database: {}", err))),
    }
}

async fn write_document(path: &Path, document: &Map<String, Value>) -> Result<(), AppError> {
    let body = serde_json::to_vec_pretty(document)
        .map_err(|err| AppError::StorageError(format!("Failed to serialize database: {}", err)))?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, body)
        .await
        .map_err(|err| AppError::StorageError(format!("Failed to write database: {}", err)))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|err| AppError::StorageError(format!("Failed to write database: {}", err)))
}
