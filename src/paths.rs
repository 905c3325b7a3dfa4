use directories::ProjectDirs;
use std::path::PathBuf;

pub fn default_data_dir() -> PathBuf {
    match ProjectDirs::from("com", "aireplyassistant", "reply-bubble") {
        Some(dirs) => {
            let path = dirs.data_dir().to_path_buf();
            let _ = std::fs::create_dir_all(&path);
            path
        }
        None => PathBuf::from("."),
    }
}

pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}
