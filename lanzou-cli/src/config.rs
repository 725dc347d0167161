use std::path::{Path, PathBuf};

use anyhow::Context;
use lanzou_core::{DEFAULT_BASE_URL, Session};
use lanzou_transfer::QueueConfig;

#[derive(Clone, Debug)]
pub struct CliConfig {
    pub base_url: String,
    pub session: Session,
    pub download_dir: PathBuf,
    pub queue: QueueConfig,
}

impl CliConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let base_url = non_empty_env("LANZOU_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let mut session = Session::new(non_empty_env("LANZOU_COOKIE").unwrap_or_default());
        if let Some(user) = non_empty_env("LANZOU_USER") {
            session = session.with_user(user);
        }
        let download_dir = match non_empty_env("LANZOU_DOWNLOAD_DIR") {
            Some(value) => {
                let home = dirs::home_dir().context("home directory is unavailable")?;
                expand_with_home(&value, &home)
            }
            None => default_download_dir()?,
        };

        Ok(Self {
            base_url,
            session,
            download_dir,
            queue: QueueConfig::from_env(),
        })
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

fn default_download_dir() -> anyhow::Result<PathBuf> {
    if let Some(dir) = dirs::download_dir() {
        return Ok(dir);
    }
    std::env::current_dir().context("current directory is unavailable")
}
