// smartmarks platform paths for Windows
// Config: %APPDATA%/Smartmarks
// Data:   %APPDATA%/Smartmarks
// Browser: cmd /C start

use std::env;
use std::path::PathBuf;
use std::process::Command;

fn roaming_dir() -> PathBuf {
    let appdata = env::var("APPDATA")
        .unwrap_or_else(|_| String::from("C:\\Users\\Default\\AppData\\Roaming"));
    PathBuf::from(appdata).join("Smartmarks")
}

pub fn get_config_dir() -> PathBuf {
    roaming_dir()
}

pub fn get_data_dir() -> PathBuf {
    roaming_dir()
}

/// `start` treats its first quoted argument as a window title, hence the empty one.
pub fn browser_command(url: &str) -> Command {
    let mut command = Command::new("cmd");
    command.args(["/C", "start", ""]).arg(url);
    command
}
