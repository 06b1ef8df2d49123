use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

const DEFAULT_API_URL: &str = "https://cloud-api.yandex.net";
const DEFAULT_REMOTE_ROOT: &str = "disk:/";
const DEFAULT_DESTINATION: &str = "Camera Uploads";
const DEFAULT_TIME_BUDGET_SECS: u64 = 25;
const DEFAULT_SETTLE_ATTEMPTS: u64 = 4;
const DEFAULT_SETTLE_BASE_MS: u64 = 500;
const DEFAULT_SETTLE_MAX_MS: u64 = 5_000;
const DEFAULT_PAGE_SIZE: u64 = 200;

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub api_url: String,
    pub media_root: PathBuf,
    pub data_dir: PathBuf,
    pub remote_root: String,
    pub destination: String,
    pub time_budget: Duration,
    pub settle_attempts: u32,
    pub settle_base: Duration,
    pub settle_max: Duration,
    pub page_size: u32,
}

impl AgentConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let home = dirs::home_dir().context("home directory is unavailable")?;
        let media_root = std::env::var("CAMUP_MEDIA_DIR")
            .ok()
            .map(|value| expand_with_home(&value, &home))
            .unwrap_or_else(|| default_media_root(&home));
        let data_dir = std::env::var("CAMUP_DATA_DIR")
            .ok()
            .map(|value| expand_with_home(&value, &home))
            .unwrap_or_else(default_data_dir);

        Ok(Self {
            api_url: std::env::var("CAMUP_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            media_root,
            data_dir,
            remote_root: std::env::var("CAMUP_REMOTE_ROOT")
                .unwrap_or_else(|_| DEFAULT_REMOTE_ROOT.to_string()),
            destination: std::env::var("CAMUP_DESTINATION")
                .ok()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_DESTINATION.to_string()),
            time_budget: Duration::from_secs(read_u64_env(
                "CAMUP_TIME_BUDGET_SECS",
                DEFAULT_TIME_BUDGET_SECS,
            )),
            settle_attempts: read_u64_env("CAMUP_SETTLE_ATTEMPTS", DEFAULT_SETTLE_ATTEMPTS)
                .min(u64::from(u32::MAX)) as u32,
            settle_base: Duration::from_millis(read_u64_env(
                "CAMUP_SETTLE_BASE_MS",
                DEFAULT_SETTLE_BASE_MS,
            )),
            settle_max: Duration::from_millis(read_u64_env(
                "CAMUP_SETTLE_MAX_MS",
                DEFAULT_SETTLE_MAX_MS,
            )),
            page_size: read_u64_env("CAMUP_PAGE_SIZE", DEFAULT_PAGE_SIZE).clamp(1, 1_000) as u32,
        })
    }

    pub fn working_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn progress_db(&self) -> PathBuf {
        self.data_dir.join("progress.db")
    }
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

fn default_media_root(home: &Path) -> PathBuf {
    let pictures = dirs::picture_dir().unwrap_or_else(|| home.join("Pictures"));
    let camera = pictures.join("Camera");
    if camera.is_dir() { camera } else { pictures }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("camup")
}

fn read_u64_env(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}
