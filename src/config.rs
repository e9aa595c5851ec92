use std::{
    env, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::{debug, info};
use serde::Deserialize;

/// ベースURLを上書きする環境変数。
pub const API_BASE_URL_ENV: &str = "TIMEBILL_API_BASE_URL";
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_RATE: f64 = 75.0;

/// 設定ファイル`config.json`の内容。
#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct FileConfig {
    pub api_base_url: Option<String>,
    pub default_rate: Option<f64>,
}

/// アプリケーションの設定。
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_base_url: String,
    pub default_rate: f64,
}

impl Config {
    /// 設定ファイルと環境変数から設定を読み込む。
    ///
    /// 設定ファイルが存在しない場合はデフォルト値を利用する。
    pub fn load() -> Result<Self> {
        let file = match config_path() {
            Some(path) => read_file_config(&path)?,
            None => None,
        };
        let env_url = env::var(API_BASE_URL_ENV).ok();

        Ok(Self::from_sources(file, env_url))
    }

    /// 設定ファイル、環境変数の順に値を重ねる。
    pub fn from_sources(file: Option<FileConfig>, env_url: Option<String>) -> Self {
        let file = file.unwrap_or_default();
        let api_base_url = env_url
            .filter(|url| !url.trim().is_empty())
            .or(file.api_base_url)
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        Self {
            api_base_url: api_base_url.trim().trim_end_matches('/').to_string(),
            default_rate: file.default_rate.unwrap_or(DEFAULT_RATE),
        }
    }

    /// コマンドライン引数で指定されたURLで上書きする。
    pub fn with_api_url(mut self, api_url: Option<String>) -> Self {
        if let Some(url) = api_url.filter(|url| !url.trim().is_empty()) {
            self.api_base_url = url.trim().trim_end_matches('/').to_string();
        }
        self
    }
}

/// 設定ファイルのパス。`<config_dir>/timebill/config.json`。
fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("timebill").join("config.json"))
}

fn read_file_config(path: &Path) -> Result<Option<FileConfig>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("Config file not found: {}", path.display());
            return Ok(None);
        }
        Err(err) => {
            return Err(err).with_context(|| format!("Failed to read config: {}", path.display()))
        }
    };
    info!("Loading config from {}", path.display());
    let config = parse_file_config(&content)
        .with_context(|| format!("Failed to parse config: {}", path.display()))?;

    Ok(Some(config))
}

fn parse_file_config(content: &str) -> Result<FileConfig> {
    Ok(serde_json::from_str(content)?)
}
