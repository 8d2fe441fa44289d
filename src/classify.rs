//! Clasificación de archivos por extensión.

use serde::Serialize;
use std::fmt;

const IMAGE_EXTENSIONS: [&str; 20] = [
    "jpg", "jpeg", "png", "tiff", "bmp", "gif", "webp", "ppm", "pgm", "pbm", "pnm", "tif", "ico",
    "icns", "jfif", "pcx", "sgi", "tga", "xbm", "xpm",
];

const OFFICE_EXTENSIONS: [&str; 3] = ["docx", "xlsx", "pptx"];

const AUDIO_EXTENSIONS: [&str; 13] = [
    "mp3", "flac", "ogg", "opus", "wv", "asf", "wma", "mpc", "m4a", "aac", "aiff", "ape", "wav",
];

const VIDEO_EXTENSIONS: [&str; 11] = [
    "mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "mpeg", "mpg", "3gp", "3g2",
];

/// Familia de archivo que decide qué manejador procesa el contenido.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Image,
    Pdf,
    Office,
    Audio,
    Video,
    Unsupported,
}

impl Family {
    /// Nombre usado en los mensajes de error dirigidos al usuario.
    pub fn label(self) -> &'static str {
        match self {
            Family::Image => "image",
            Family::Pdf => "PDF",
            Family::Office => "Office",
            Family::Audio => "audio",
            Family::Video => "video",
            Family::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Resultado de clasificar un nombre de archivo.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FileClassification {
    pub family: Family,
    /// Extensión canónica en mayúsculas (`JPEG`, `DOCX`, `MP3`...).
    pub format_tag: String,
    pub mime_type: Option<String>,
}

/// Clasifica un archivo usando únicamente la extensión de su nombre.
///
/// Nunca falla: una extensión desconocida (o ausente) produce [`Family::Unsupported`]
/// con la extensión cruda en mayúsculas como etiqueta.
pub fn classify(filename: &str) -> FileClassification {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();

    let mime_type = mime_guess::from_path(filename)
        .first()
        .map(|mime| mime.essence_str().to_string());

    let ext = extension.as_str();
    let (family, canonical) = if IMAGE_EXTENSIONS.contains(&ext) {
        let canonical = match ext {
            "jpg" => "jpeg",
            "tif" => "tiff",
            other => other,
        };
        (Family::Image, canonical)
    } else if ext == "pdf" {
        (Family::Pdf, ext)
    } else if OFFICE_EXTENSIONS.contains(&ext) {
        (Family::Office, ext)
    } else if AUDIO_EXTENSIONS.contains(&ext) {
        (Family::Audio, ext)
    } else if VIDEO_EXTENSIONS.contains(&ext) {
        (Family::Video, ext)
    } else {
        (Family::Unsupported, ext)
    };

    FileClassification {
        family,
        format_tag: canonical.to_uppercase(),
        mime_type,
    }
}
