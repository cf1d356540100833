//! Configuration management for displayd.
//!
//! A TOML file supplies defaults; CLI switches override it. A missing file
//! is not an error, the built-in defaults describe a standard install.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Device node paths
    #[serde(default)]
    pub devices: DeviceConfig,

    /// Client socket configuration
    #[serde(default)]
    pub socket: SocketConfig,

    /// Session configuration
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Framebuffer device
    #[serde(default = "default_video")]
    pub video: PathBuf,

    /// Keyboard TTY emitting 32-bit units
    #[serde(default = "default_keyboard")]
    pub keyboard: PathBuf,

    /// Pointer device emitting 3-byte packets
    #[serde(default = "default_pointer")]
    pub pointer: PathBuf,

    /// Character ROM: 256 glyphs of 16 rows
    #[serde(default = "default_font")]
    pub font: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketConfig {
    /// Listening socket path, also exported as DISPLAY_SOCKET
    #[serde(default = "default_socket")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Terminal program for the Ctrl+Alt+T chord
    #[serde(default = "default_terminal")]
    pub terminal: String,
}

fn default_video() -> PathBuf {
    "/dev/fb0".into()
}

fn default_keyboard() -> PathBuf {
    "/dev/kbd".into()
}

fn default_pointer() -> PathBuf {
    "/dev/input/mice".into()
}

fn default_font() -> PathBuf {
    "/usr/share/displayd/font.f16".into()
}

fn default_socket() -> PathBuf {
    "/run/display".into()
}

fn default_terminal() -> String {
    "terminal".into()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            video: default_video(),
            keyboard: default_keyboard(),
            pointer: default_pointer(),
            font: default_font(),
        }
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        SocketConfig { path: default_socket() }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig { terminal: default_terminal() }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.socket.path.as_os_str().is_empty() {
            return Err("socket path must not be empty".into());
        }
        for (name, path) in [
            ("video", &self.devices.video),
            ("keyboard", &self.devices.keyboard),
            ("pointer", &self.devices.pointer),
            ("font", &self.devices.font),
        ] {
            if path.as_os_str().is_empty() {
                return Err(format!("{} device path must not be empty", name));
            }
        }
        if self.session.terminal.is_empty() {
            return Err("terminal command must not be empty".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn defaults_validate() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_terminal() {
        let mut cfg = Config::default();
        cfg.session.terminal = String::new();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn toml_overrides_defaults() {
        let cfg: Config = toml::from_str(
            "[devices]\npointer = \"/dev/mouse0\"\n[socket]\npath = \"/run/test-display\"\n",
        )
        .expect("parse");
        assert_eq!(cfg.devices.pointer, std::path::PathBuf::from("/dev/mouse0"));
        assert_eq!(cfg.devices.video, std::path::PathBuf::from("/dev/fb0"));
        assert_eq!(cfg.socket.path, std::path::PathBuf::from("/run/test-display"));
    }
}
