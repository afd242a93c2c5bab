//! Where the CLI keeps its state

use directories::ProjectDirs;
use portier_client::ProcessEnv;
use std::path::PathBuf;
use tracing::warn;

const COOKIE_FILE: &str = "cookies.json";
const CONFIG_FILE: &str = "portier.toml";

#[derive(Debug, Clone)]
pub struct Paths {
    pub data_dir: PathBuf,
    pub config_file: PathBuf,
}

impl Paths {
    /// Combine command-line overrides with platform defaults
    pub fn resolve(data_dir: Option<PathBuf>, config_file: Option<PathBuf>) -> Self {
        let project_dirs = ProjectDirs::from("dev", "Portier", "portier");
        if project_dirs.is_none() && (data_dir.is_none() || config_file.is_none()) {
            warn!("Failed to determine platform-specific directories, using current directory");
        }

        let data_dir = data_dir.unwrap_or_else(|| {
            project_dirs
                .as_ref()
                .map_or_else(|| PathBuf::from("./data"), |dirs| dirs.data_dir().to_path_buf())
        });
        let config_file = config_file.unwrap_or_else(|| {
            project_dirs.as_ref().map_or_else(
                || PathBuf::from(CONFIG_FILE),
                |dirs| dirs.config_dir().join(CONFIG_FILE),
            )
        });

        Self {
            data_dir,
            config_file,
        }
    }

    pub fn cookie_jar(&self) -> PathBuf {
        self.data_dir.join(COOKIE_FILE)
    }

    /// Base URLs from the config file, overridden by `PORTIER_*` variables
    pub fn env_source(&self) -> ProcessEnv {
        ProcessEnv::new().with_file(&self.config_file)
    }
}
