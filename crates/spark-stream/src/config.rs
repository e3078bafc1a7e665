//! `spark-pipe` 的 TOML 配置。
//!
//! ```toml
//! input = "in.bin"        # 缺省读取 stdin
//! output = "out.bin"      # 缺省写入 stdout
//! read_buffer = 8192
//! write_buffer = 8192
//! log_filter = "info"     # 未设置 RUST_LOG 时使用的 EnvFilter 指令
//! ```
//!
//! 所有键都有默认值；未知键会被拒绝，避免拼写错误被静默忽略。

use std::{fs, io, path::Path, path::PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 缓冲区的缺省容量，与 `std::io::BufReader` 的默认值保持一致。
pub const DEFAULT_BUFFER_CAPACITY: usize = 8 * 1024;

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PipeConfig {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub read_buffer: usize,
    pub write_buffer: usize,
    pub log_filter: String,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            input: None,
            output: None,
            read_buffer: DEFAULT_BUFFER_CAPACITY,
            write_buffer: DEFAULT_BUFFER_CAPACITY,
            log_filter: "info".to_owned(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl PipeConfig {
    /// 解析并校验 TOML 文本。
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: PipeConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_buffer == 0 {
            return Err(ConfigError::Invalid("read_buffer must be greater than 0".into()));
        }
        if self.write_buffer == 0 {
            return Err(ConfigError::Invalid(
                "write_buffer must be greater than 0".into(),
            ));
        }
        if self.log_filter.trim().is_empty() {
            return Err(ConfigError::Invalid("log_filter must not be blank".into()));
        }
        Ok(())
    }
}
