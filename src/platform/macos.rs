// smartmarks platform paths for macOS
// Config: ~/Library/Application Support/Smartmarks
// Data:   ~/Library/Application Support/Smartmarks
// Browser: open

use std::env;
use std::path::PathBuf;
use std::process::Command;

fn app_support_dir() -> PathBuf {
    PathBuf::from(env::var("HOME").unwrap_or_else(|_| String::from("/tmp")))
        .join("Library")
        .join("Application Support")
        .join("Smartmarks")
}

pub fn get_config_dir() -> PathBuf {
    app_support_dir()
}

pub fn get_data_dir() -> PathBuf {
    app_support_dir()
}

pub fn browser_command(url: &str) -> Command {
    let mut command = Command::new("open");
    command.arg(url);
    command
}
