// smartmarks platform abstraction
// Provides platform-specific paths and the system browser launcher for
// Windows, macOS, and Linux.
//
// Uses `cfg(target_os)` for conditional compilation to select the correct
// platform-specific implementation at compile time.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "windows")]
mod windows;

#[cfg(target_os = "linux")]
use linux as imp;
#[cfg(target_os = "macos")]
use macos as imp;
#[cfg(target_os = "windows")]
use windows as imp;

/// Returns the platform-specific configuration directory for smartmarks.
///
/// - **Linux**: `~/.config/smartmarks` (or `$XDG_CONFIG_HOME/smartmarks`)
/// - **macOS**: `~/Library/Application Support/Smartmarks`
/// - **Windows**: `%APPDATA%/Smartmarks`
pub fn get_config_dir() -> PathBuf {
    imp::get_config_dir()
}

/// Returns the platform-specific data directory for smartmarks.
///
/// - **Linux**: `~/.local/share/smartmarks` (or `$XDG_DATA_HOME/smartmarks`)
/// - **macOS**: `~/Library/Application Support/Smartmarks`
/// - **Windows**: `%APPDATA%/Smartmarks`
pub fn get_data_dir() -> PathBuf {
    imp::get_data_dir()
}

/// Opens `url` in the user's default browser without waiting for it.
pub fn open_url(url: &str) -> io::Result<()> {
    imp::browser_command(url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
}

/// Something that can send the user to a web page.
pub trait UrlOpener: Send + Sync {
    fn open(&self, url: &str) -> Result<(), String>;
}

/// Opens pages in the system browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl UrlOpener for SystemBrowser {
    fn open(&self, url: &str) -> Result<(), String> {
        open_url(url).map_err(|e| e.to_string())
    }
}
