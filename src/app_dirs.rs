use directories::ProjectDirs;
use std::path::PathBuf;

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    pub fn state_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            Some(
                PathBuf::from(home)
                    .join(".local")
                    .join("state")
                    .join("timesnap"),
            )
        } else {
            ProjectDirs::from("", "", "timesnap").map(|proj_dirs| proj_dirs.data_local_dir().to_path_buf())
        }
    }

    pub fn state_file() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("timesnap-data.json"))
    }

    pub fn db_path() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("timesnap.db"))
    }

    pub fn config_file() -> Option<PathBuf> {
        ProjectDirs::from("", "", "timesnap").map(|pd| pd.config_dir().join("config.json"))
    }
}
