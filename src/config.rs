//! Configuração do chunkline carregada a partir de `chunkline.toml`.
//!
//! A struct [`ChunklineConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `CHUNKLINE_STORE` tem precedência sobre o arquivo.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::chunk::{ChunkSettings, RetryPolicy};
use crate::error::BatchError;

pub const DEFAULT_CONFIG_FILE: &str = "chunkline.toml";
pub const STORE_ENV_VAR: &str = "CHUNKLINE_STORE";

/// Configuração de nível superior carregada de `chunkline.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunklineConfig {
    /// Itens gravados por chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Retentativas de um chunk falho antes de marcar o step como falho.
    #[serde(default = "default_max_chunk_retries")]
    pub max_chunk_retries: u32,

    /// Atraso base em milissegundos para backoff exponencial entre retentativas.
    #[serde(default)]
    pub retry_base_delay_ms: u64,

    /// Limite de tempo por leitura de item.
    #[serde(default)]
    pub read_timeout_ms: Option<u64>,

    /// Limite de tempo por escrita de chunk.
    #[serde(default)]
    pub write_timeout_ms: Option<u64>,

    /// Arquivo SQLite com o histórico de runs.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Valor padrão para o tamanho do chunk: 10.
fn default_chunk_size() -> usize {
    10
}

// Valor padrão para retentativas por chunk: 1.
fn default_max_chunk_retries() -> u32 {
    1
}

fn default_store_path() -> PathBuf {
    PathBuf::from("chunkline.db")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ChunklineConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_chunk_retries: default_max_chunk_retries(),
            retry_base_delay_ms: 0,
            read_timeout_ms: None,
            write_timeout_ms: None,
            store_path: default_store_path(),
            log_level: default_log_level(),
        }
    }
}

impl ChunklineConfig {
    /// Carrega a configuração de `path` ou de `chunkline.toml` no diretório atual.
    /// Um caminho explícito precisa existir; o arquivo padrão pode faltar.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };

        // Variável de ambiente tem precedência sobre o arquivo de configuração.
        if let Ok(store) = std::env::var(STORE_ENV_VAR)
            && !store.is_empty()
        {
            config.store_path = PathBuf::from(store);
        }

        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Parâmetros de chunk para os steps construídos a partir desta configuração.
    pub fn chunk_settings(&self) -> Result<ChunkSettings, BatchError> {
        let chunk_size = NonZeroUsize::new(self.chunk_size)
            .ok_or_else(|| BatchError::Config("chunk_size must be at least 1".into()))?;
        let mut settings = ChunkSettings::new(chunk_size).with_retry(RetryPolicy {
            max_retries: self.max_chunk_retries,
            base_delay_ms: self.retry_base_delay_ms,
        });
        if let Some(ms) = self.read_timeout_ms {
            settings = settings.with_read_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.write_timeout_ms {
            settings = settings.with_write_timeout(Duration::from_millis(ms));
        }
        Ok(settings)
    }
}
