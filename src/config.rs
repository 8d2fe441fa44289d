//! Configuración del motor.
//!
//! El núcleo no lee variables de entorno: quien embebe la biblioteca construye un
//! [`ScrubConfig`] (o lo deserializa de JSON) y lo pasa a cada operación.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_VIDEO_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("video_timeout_secs must be greater than zero")]
    ZeroTimeout,

    #[error("{field} must not be empty")]
    EmptyProgram { field: &'static str },

    #[error("temp_dir {0} is not a directory")]
    TempDirMissing(PathBuf),

    #[error("could not read configuration file: {0}")]
    Read(String),

    #[error("invalid configuration file: {0}")]
    Parse(String),
}

/// Parámetros de ejecución compartidos por todos los manejadores.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrubConfig {
    /// Ejecutable usado para el remux de video.
    pub ffmpeg_path: PathBuf,
    /// Ejecutable usado para inspeccionar video.
    pub ffprobe_path: PathBuf,
    /// Tiempo máximo de reloj para cada proceso externo.
    pub video_timeout_secs: u64,
    /// Directorio para archivos temporales; `None` usa el del sistema.
    pub temp_dir: Option<PathBuf>,
}

impl Default for ScrubConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            video_timeout_secs: DEFAULT_VIDEO_TIMEOUT_SECS,
            temp_dir: None,
        }
    }
}

impl ScrubConfig {
    /// Carga la configuración desde un archivo JSON; los campos ausentes toman su valor por defecto.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
        let config: Self =
            serde_json::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.video_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.ffmpeg_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyProgram {
                field: "ffmpeg_path",
            });
        }
        if self.ffprobe_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyProgram {
                field: "ffprobe_path",
            });
        }
        if let Some(dir) = &self.temp_dir
            && !dir.is_dir()
        {
            return Err(ConfigError::TempDirMissing(dir.clone()));
        }
        Ok(())
    }

    pub fn video_timeout(&self) -> Duration {
        Duration::from_secs(self.video_timeout_secs)
    }

    /// Directorio efectivo donde se crean los archivos temporales.
    pub fn scratch_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
