use std::fs::OpenOptions;
use std::path::PathBuf;
use directories_next::ProjectDirs;
use fd_lock::{RwLock, RwLockWriteGuard};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::config::types::Config;
use crate::error::ConfigError;

// creates a path to aq-buzz.json in an os dependent standard directory, such
// as %AppData% on windows.
fn get_local_config_path() -> Option<PathBuf> {
    ProjectDirs::from("org", "aq-buzz", "aq-buzz").map(|dirs| {
        dirs.config_dir().join("aq-buzz.json")
    })
}

pub struct ConfigIOLocker {
    rw_lock: RwLock<std::fs::File>,
}

impl ConfigIOLocker {
    pub fn lock(&mut self) -> Result<RwLockWriteGuard<'_, std::fs::File>, ConfigError> {
        match self.rw_lock.try_write() {
            Ok(guard) => Ok(guard),
            Err(source) => Err(ConfigError::CanNotLock { source }),
        }
    }
}

pub struct ConfigIO {
    file: std::fs::File,
}

impl ConfigIO {
    pub fn open(path_override: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = match path_override {
            Some(path) => path,
            None => get_local_config_path().ok_or(ConfigError::NoConfigPath)?,
        };
        println!("Using config file {}", path.to_string_lossy());

        if let Some(directory) = path.parent() {
            std::fs::create_dir_all(directory)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .truncate(false)
            .append(false)
            .create(true)
            .open(path)?;

        Ok(ConfigIO { file })
    }

    // obtain an exclusive file lock so that only one instance of the bridge
    // drives the actuator.
    pub fn locker(&self) -> Result<ConfigIOLocker, ConfigError> {
        Ok(ConfigIOLocker {
            rw_lock: RwLock::new(self.file.try_clone()?),
        })
    }

    pub async fn read(&self) -> Result<Config, ConfigError> {
        let mut file = File::from_std(self.file.try_clone()?);

        let mut content = vec![];
        file.read_to_end(&mut content).await?;

        if content.is_empty() {
            return Ok(Config::default());
        }

        let mut config: Config = serde_json::from_slice(&content)?;
        config.sanitize();
        Ok(config)
    }
}
