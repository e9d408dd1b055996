use crate::camera::{AutoFocusBehavior, SimCamera};
use anyhow::{Result, anyhow};
use directories::UserDirs;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraProfile {
    pub zoom: i32,
    pub max_zoom: i32,
    #[serde(default = "default_true")]
    pub zoom_supported: bool,
    #[serde(default)]
    pub autofocus: AutoFocusBehavior,
    #[serde(default)]
    pub focus_latency_ms: u64,
}

fn default_true() -> bool {
    true
}

impl Default for CameraProfile {
    fn default() -> Self {
        Self {
            zoom: 0,
            max_zoom: 10,
            zoom_supported: true,
            autofocus: AutoFocusBehavior::Success,
            focus_latency_ms: 0,
        }
    }
}

impl CameraProfile {
    pub fn build(&self) -> SimCamera {
        SimCamera::new(self.zoom, self.max_zoom, self.zoom_supported)
            .with_behavior(self.autofocus)
            .with_latency(self.focus_latency_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSettings {
    pub device: Option<String>,
    pub surface_width: u32,
    pub surface_height: u32,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            device: None,
            surface_width: 1080,
            surface_height: 1920,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub meta: Meta,
    #[serde(default)]
    pub camera: CameraProfile,
    #[serde(default)]
    pub input: InputSettings,
}

#[derive(Debug, Clone)]
pub struct ConfigState {
    pub settings: Settings,
    pub path: PathBuf,
}

fn config_dir() -> Result<PathBuf> {
    let dirs = UserDirs::new().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(dirs.home_dir().join(".config").join("camtouch"))
}

fn default_settings_text() -> &'static str {
    include_str!("../config/default.toml")
}

impl ConfigState {
    pub fn load_or_install_default() -> Result<Self> {
        let dir = config_dir()?;
        fs::create_dir_all(&dir)?;

        let path = dir.join("settings.toml");
        if !path.exists() {
            fs::write(&path, default_settings_text())?;
            info!("installed default settings at {}", path.display());
        }
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let txt = fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
        let settings = parse_settings(&txt)
            .map_err(|e| anyhow!("failed to parse {}: {e}", path.display()))?;
        Ok(Self {
            settings,
            path: path.to_path_buf(),
        })
    }

    pub fn report(&self) -> serde_json::Value {
        serde_json::json!({
            "path": self.path,
            "settings": self.settings,
        })
    }
}

pub fn parse_settings(txt: &str) -> Result<Settings> {
    let settings: Settings = toml::from_str(txt)?;
    validate_settings(&settings)?;
    Ok(settings)
}

pub fn validate_camera(c: &CameraProfile) -> Result<()> {
    if c.max_zoom < 0 {
        return Err(anyhow!("camera.max_zoom must not be negative"));
    }
    if !(0..=c.max_zoom).contains(&c.zoom) {
        return Err(anyhow!(
            "camera.zoom {} outside 0..={}",
            c.zoom,
            c.max_zoom
        ));
    }
    if c.focus_latency_ms > 10_000 {
        return Err(anyhow!("camera.focus_latency_ms is unreasonably large"));
    }
    Ok(())
}

fn validate_settings(s: &Settings) -> Result<()> {
    validate_camera(&s.camera)?;
    if s.input.surface_width == 0 || s.input.surface_height == 0 {
        return Err(anyhow!("input surface size must be positive"));
    }
    if let Some(dev) = &s.input.device {
        if dev.trim().is_empty() {
            return Err(anyhow!("input.device must not be empty when set"));
        }
    }
    Ok(())
}
