use std::path::PathBuf;

const APP_DIR: &str = "voicetriage";

pub fn config_dir() -> Option<PathBuf> {
    if let Ok(config_dir) = std::env::var("XDG_CONFIG_HOME") {
        if !config_dir.is_empty() {
            return Some(PathBuf::from(config_dir).join(APP_DIR));
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        return Some(PathBuf::from(home).join(".config").join(APP_DIR));
    }

    None
}

pub fn state_dir() -> Option<PathBuf> {
    if let Ok(state_dir) = std::env::var("XDG_STATE_HOME") {
        if !state_dir.is_empty() {
            return Some(PathBuf::from(state_dir).join(APP_DIR));
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        return Some(
            PathBuf::from(home)
                .join(".local")
                .join("state")
                .join(APP_DIR),
        );
    }

    None
}
