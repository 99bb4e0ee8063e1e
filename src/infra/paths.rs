// src/infra/paths.rs — Platform path management
//
// DOCKERSMITH_HOME overrides everything; otherwise the platform config dir
// (e.g. ~/.config/dockersmith) is used.

use directories::ProjectDirs;
use std::path::PathBuf;

fn dockersmith_home() -> Option<PathBuf> {
    std::env::var_os("DOCKERSMITH_HOME").map(PathBuf::from)
}

/// Configuration directory: $DOCKERSMITH_HOME/ or the platform config dir.
pub fn config_dir() -> Option<PathBuf> {
    if let Some(home) = dockersmith_home() {
        return Some(home);
    }
    ProjectDirs::from("", "", "dockersmith").map(|d| d.config_dir().to_path_buf())
}

/// Config file path, if a config directory can be determined.
pub fn config_file_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}
