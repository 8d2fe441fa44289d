//! Video: remux sin recodificar mediante `ffmpeg` e inspección con `ffprobe`.
//!
//! El contenido se copia a un archivo temporal, la herramienta externa corre con un
//! tiempo límite y ambos temporales desaparecen en cualquier camino de salida.

mod process;

use serde_json::Value;
use std::ffi::OsStr;
use std::io::{self, Read, Seek};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::classify::Family;
use crate::config::ScrubConfig;
use crate::error::CleanError;
use crate::file::{MetadataReport, read_from_start};
use process::{RunError, ScratchFile};

/// Formatos que acepta el manejador; `3g2` se clasifica como video pero no se procesa.
const ALLOWED_FORMATS: [&str; 10] = [
    "mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "mpeg", "mpg", "3gp",
];

/// Contenedores de la familia MOV, los únicos que entienden `-movflags`.
const MOV_FAMILY: [&str; 3] = ["mp4", "mov", "3gp"];

#[derive(Debug, Error)]
enum VideoError {
    #[error("E/S: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Run(#[from] RunError),

    #[error("la herramienta no produjo salida")]
    EmptyOutput,

    #[error("respuesta de ffprobe inválida: {0}")]
    Probe(#[from] serde_json::Error),
}

impl VideoError {
    fn into_clean_error(self) -> CleanError {
        match self {
            VideoError::Run(RunError::TimedOut(_)) => CleanError::VideoTimeout,
            _ => CleanError::Processing(Family::Video),
        }
    }
}

fn allowed_extension(format_tag: &str) -> Option<String> {
    let extension = format_tag.to_lowercase();
    ALLOWED_FORMATS
        .contains(&extension.as_str())
        .then_some(extension)
}

/// Devuelve el video sin metadata de contenedor, con las pistas copiadas tal cual.
pub fn strip_video<R: Read + Seek>(
    reader: &mut R,
    format_tag: &str,
    config: &ScrubConfig,
) -> Result<Vec<u8>, CleanError> {
    let Some(extension) = allowed_extension(format_tag) else {
        return Err(CleanError::FormatNotAvailable(format_tag.to_string()));
    };

    remux(reader, &extension, config).map_err(|e| {
        warn!(format = format_tag, error = %e, "no se pudo limpiar el video");
        e.into_clean_error()
    })
}

fn remux<R: Read + Seek>(
    reader: &mut R,
    extension: &str,
    config: &ScrubConfig,
) -> Result<Vec<u8>, VideoError> {
    let contents = read_from_start(reader)?;
    let dir = config.scratch_dir();
    let input = ScratchFile::with_contents(&dir, extension, &contents)?;
    let output = ScratchFile::create(&dir, extension)?;

    let mut args: Vec<&OsStr> = ["-y", "-loglevel", "error", "-i"]
        .into_iter()
        .map(OsStr::new)
        .collect();
    args.push(input.path().as_os_str());
    args.extend(
        ["-map", "0", "-c", "copy", "-map_metadata", "-1", "-map_chapters", "-1"].map(OsStr::new),
    );
    if MOV_FAMILY.contains(&extension) {
        args.extend(["-movflags", "faststart"].map(OsStr::new));
    }
    args.push(output.path().as_os_str());

    process::run(&config.ffmpeg_path, &args, config.video_timeout())?;

    let cleaned = output.read()?;
    if cleaned.is_empty() {
        return Err(VideoError::EmptyOutput);
    }
    info!(
        format = extension,
        input_bytes = contents.len(),
        output_bytes = cleaned.len(),
        "video remuxeado sin metadata"
    );
    Ok(cleaned)
}

/// Etiquetas de contenedor y de cada pista según `ffprobe`.
pub fn inspect_video<R: Read + Seek>(
    reader: &mut R,
    format_tag: &str,
    config: &ScrubConfig,
) -> MetadataReport {
    let Some(extension) = allowed_extension(format_tag) else {
        return MetadataReport::error(
            CleanError::FormatNotAvailable(format_tag.to_string()).to_string(),
        );
    };

    match probe(reader, &extension, config) {
        Ok(entries) => MetadataReport::from_entries(entries),
        Err(e) => {
            warn!(format = format_tag, error = %e, "no se pudo inspeccionar el video");
            match e {
                VideoError::Run(RunError::TimedOut(_)) => {
                    MetadataReport::error(CleanError::VideoTimeout.to_string())
                }
                _ => MetadataReport::error("Error reading video file."),
            }
        }
    }
}

fn probe<R: Read + Seek>(
    reader: &mut R,
    extension: &str,
    config: &ScrubConfig,
) -> Result<Vec<(String, String)>, VideoError> {
    let contents = read_from_start(reader)?;
    let input = ScratchFile::with_contents(&config.scratch_dir(), extension, &contents)?;

    let mut args: Vec<&OsStr> = [
        "-v",
        "quiet",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
    ]
    .into_iter()
    .map(OsStr::new)
    .collect();
    args.push(input.path().as_os_str());

    let stdout = process::run(&config.ffprobe_path, &args, config.video_timeout())?;
    let probe: Value = serde_json::from_slice(&stdout)?;
    let entries = flatten_probe(&probe);
    debug!(fields = entries.len(), "etiquetas de video leídas");
    Ok(entries)
}

/// Aplana `format.tags` y `streams[N].tags` en claves `format.<tag>` y `stream<N>.<tag>`.
fn flatten_probe(probe: &Value) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    if let Some(tags) = probe["format"]["tags"].as_object() {
        entries.extend(
            tags.iter()
                .map(|(key, value)| (format!("format.{key}"), display_value(value))),
        );
    }
    if let Some(streams) = probe["streams"].as_array() {
        for (index, stream) in streams.iter().enumerate() {
            let Some(tags) = stream["tags"].as_object() else {
                continue;
            };
            entries.extend(
                tags.iter()
                    .map(|(key, value)| (format!("stream{index}.{key}"), display_value(value))),
            );
        }
    }
    entries
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
