use std::env;
use std::path::PathBuf;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: String,
    pub db_path: PathBuf,
    pub upload: UploadSettings,
}

/// Where the upload interceptor writes files and how large a single part may be.
#[derive(Clone, Debug)]
pub struct UploadSettings {
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let bind_address = env::var("BIND_ADDRESS")
            .unwrap_or_else(|_| "127.0.0.1:4000".to_string());

        let db_path = env::var("DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("db.json"));

        let upload_dir = env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("public/images"));

        let max_upload_bytes = match env::var("MAX_UPLOAD_BYTES") {
            Ok(raw) => parse_max_upload_bytes(&raw)?,
            Err(_) => DEFAULT_MAX_UPLOAD_BYTES,
        };

        Ok(Self {
            bind_address,
            db_path,
            upload: UploadSettings {
                upload_dir,
                max_upload_bytes,
            },
        })
    }
}

fn parse_max_upload_bytes(raw: &str) -> Result<usize, String> {
    let value: usize = raw
        .trim()
        .parse()
        .map_err(|_| "MAX_UPLOAD_BYTES must be a valid number".to_string())?;

    if value == 0 {
        return Err("MAX_UPLOAD_BYTES must be greater than zero".to_string());
    }

    Ok(value)
}
