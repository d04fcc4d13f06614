// smartmarks platform paths for Linux
// Config: ~/.config/smartmarks
// Data:   ~/.local/share/smartmarks
// Browser: xdg-open

use std::env;
use std::path::PathBuf;
use std::process::Command;

fn home_dir() -> PathBuf {
    PathBuf::from(env::var("HOME").unwrap_or_else(|_| String::from("/tmp")))
}

/// Uses `$XDG_CONFIG_HOME/smartmarks` if set, otherwise `~/.config/smartmarks`.
pub fn get_config_dir() -> PathBuf {
    match env::var("XDG_CONFIG_HOME") {
        Ok(xdg) if !xdg.is_empty() => PathBuf::from(xdg).join("smartmarks"),
        _ => home_dir().join(".config").join("smartmarks"),
    }
}

/// Uses `$XDG_DATA_HOME/smartmarks` if set, otherwise `~/.local/share/smartmarks`.
pub fn get_data_dir() -> PathBuf {
    match env::var("XDG_DATA_HOME") {
        Ok(xdg) if !xdg.is_empty() => PathBuf::from(xdg).join("smartmarks"),
        _ => home_dir().join(".local").join("share").join("smartmarks"),
    }
}

pub fn browser_command(url: &str) -> Command {
    let mut command = Command::new("xdg-open");
    command.arg(url);
    command
}
