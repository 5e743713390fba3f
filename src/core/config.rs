//! Application paths and settings.
//!
//! `Settings` is loaded once at startup (optional `config.yml` plus
//! environment overrides) and passed into the pipelines explicitly, so
//! tests can construct their own without touching the environment.

use std::env;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub objects_dir: PathBuf,
    pub log_dir: PathBuf,
    pub db_path: PathBuf,
}

impl AppPaths {
    pub fn from_env() -> Self {
        let data_dir = env::var("CORPORA_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));
        Self::rooted_at(data_dir)
    }

    pub fn rooted_at(data_dir: PathBuf) -> Self {
        let objects_dir = data_dir.join("objects");
        let log_dir = data_dir.join("logs");
        let db_path = data_dir.join("corpora.db");

        for dir in [&data_dir, &objects_dir, &log_dir] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            data_dir,
            objects_dir,
            log_dir,
            db_path,
        }
    }
}

/// Runtime settings. Defaults mirror the production deployment; every
/// field can be overridden from `config.yml` in the data directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind_addr: String,
    pub stage: String,
    pub documents_bucket: String,
    pub generation_model: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub search_limit: usize,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: i64,
    pub max_output_tokens: i64,
    pub api_base_url: String,
    pub db_connect_attempts: u32,
    pub db_connect_delay_ms: u64,
    /// Loaded only from the environment, never from the config file.
    #[serde(skip)]
    pub api_key: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            stage: "dev".to_string(),
            documents_bucket: "documents".to_string(),
            generation_model: "gemini-2.0-flash".to_string(),
            embedding_model: "text-embedding-004".to_string(),
            embedding_dimension: 768,
            chunk_size: 1000,
            chunk_overlap: 200,
            search_limit: 5,
            temperature: 0.2,
            top_p: 0.8,
            top_k: 40,
            max_output_tokens: 1024,
            api_base_url: "https://generativelanguage.googleapis.com".to_string(),
            db_connect_attempts: 5,
            db_connect_delay_ms: 2000,
            api_key: String::new(),
        }
    }
}

impl Settings {
    pub fn load(paths: &AppPaths) -> Result<Self, ApiError> {
        let config_path = paths.data_dir.join("config.yml");

        let mut settings: Settings = if config_path.exists() {
            let raw = fs::read_to_string(&config_path).map_err(ApiError::internal)?;
            serde_yaml::from_str(&raw)
                .map_err(|err| ApiError::Internal(format!("invalid config.yml: {err}")))?
        } else {
            Settings::default()
        };

        if let Ok(stage) = env::var("STAGE") {
            settings.stage = stage;
        }
        if let Ok(addr) = env::var("CORPORA_BIND_ADDR") {
            settings.bind_addr = addr;
        }
        settings.api_key = env::var("GEMINI_API_KEY").unwrap_or_default();

        Ok(settings)
    }
}
