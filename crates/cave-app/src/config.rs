// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::path::Path;

use cave_platform::WindowSpec;
use cave_render::{PresentPreference, RenderSize, RendererConfig};
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeCfg {
    #[default]
    Mailbox,
    Fifo,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct WindowCfg {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_title")]
    pub title: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RenderCfg {
    /// Unset means "on in debug builds".
    #[serde(default)]
    pub validation: Option<bool>,
    #[serde(default)]
    pub present_mode: PresentModeCfg,
    #[serde(default = "default_frames_in_flight")]
    pub frames_in_flight: u32,
    #[serde(default = "default_clear")]
    pub clear_color: [f32; 4],
    /// 0 renders until the window closes.
    #[serde(default)]
    pub max_frames: u64,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct AppCfg {
    #[serde(default)]
    pub window: WindowCfg,
    #[serde(default)]
    pub render: RenderCfg,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            width: default_width(),
            height: default_height(),
            title: default_title(),
        }
    }
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            validation: None,
            present_mode: PresentModeCfg::Mailbox,
            frames_in_flight: default_frames_in_flight(),
            clear_color: default_clear(),
            max_frames: 0,
        }
    }
}

fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    480
}
fn default_title() -> String {
    "Cave Explorer".into()
}
fn default_frames_in_flight() -> u32 {
    2
}
fn default_clear() -> [f32; 4] {
    [0.02, 0.02, 0.04, 1.0]
}

/// Missing or broken files fall back to defaults; the app always starts.
pub fn load_cfg(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => match toml::from_str::<AppCfg>(&s) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("{}: {e}; using defaults", path.display());
                AppCfg::default()
            }
        },
        Err(_) => {
            debug!("{} not found; using defaults", path.display());
            AppCfg::default()
        }
    }
}

/// `CAVE_VALIDATION` accepts 0/1 and false/true.
pub fn validation_override(value: Option<&str>) -> Option<bool> {
    match value?.trim() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        other => {
            warn!("ignoring CAVE_VALIDATION={other}");
            None
        }
    }
}

impl AppCfg {
    pub fn window_spec(&self) -> WindowSpec {
        WindowSpec {
            title: self.window.title.clone(),
            width: self.window.width,
            height: self.window.height,
        }
    }

    /// Environment beats the file, the file beats the build profile.
    pub fn renderer_config(&self, size: RenderSize, env_validation: Option<bool>) -> RendererConfig {
        let validation = env_validation
            .or(self.render.validation)
            .unwrap_or(cfg!(debug_assertions));
        RendererConfig {
            app_name: self.window.title.clone(),
            size,
            validation,
            present_mode: match self.render.present_mode {
                PresentModeCfg::Mailbox => PresentPreference::Mailbox,
                PresentModeCfg::Fifo => PresentPreference::Fifo,
            },
            frames_in_flight: self.render.frames_in_flight,
            clear_color: self.render.clear_color,
        }
    }
}
