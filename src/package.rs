//! Empaquetado de resultados para la descarga.
//!
//! Un archivo limpio se descarga como `cleaned_<nombre seguro>`; varios archivos van en
//! `cleaned_files.zip` con una entrada `cleaned_<nombre original>` por archivo.

use std::collections::HashSet;
use std::io::{self, Cursor, Write};
use thiserror::Error;
use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::file::CleanedFile;

pub const ARCHIVE_NAME: &str = "cleaned_files.zip";
pub const ARCHIVE_MIME: &str = "application/zip";

const CLEANED_PREFIX: &str = "cleaned_";
const FALLBACK_NAME: &str = "file";

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Nombre de descarga de un único archivo limpio.
pub fn download_name(original: &str) -> String {
    format!("{CLEANED_PREFIX}{}", secure_filename(original))
}

/// Reduce `name` a caracteres seguros para un nombre de archivo.
///
/// Los separadores de ruta y los espacios se convierten en `_`, se descartan los
/// caracteres fuera de `[A-Za-z0-9_.-]` y se recortan `.` y `_` de los extremos,
/// así que el resultado nunca sale del directorio de destino.
pub fn secure_filename(name: &str) -> String {
    let spaced = name.replace(['/', '\\'], " ");
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let filtered: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    let trimmed = filtered.trim_matches(['.', '_']);
    if trimmed.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Nombre de la entrada; los repetidos reciben un sufijo numérico antes de la extensión.
fn entry_name(original: &str, taken: &mut HashSet<String>) -> String {
    let base = format!("{CLEANED_PREFIX}{original}");
    if taken.insert(base.clone()) {
        return base;
    }
    let (stem, extension) = match base.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => (stem.to_string(), format!(".{extension}")),
        _ => (base.clone(), String::new()),
    };
    (2..)
        .map(|n| format!("{stem}_{n}{extension}"))
        .find(|candidate| taken.insert(candidate.clone()))
        .unwrap_or(base)
}

/// Comprime los archivos limpios en un ZIP deflate, en el orden recibido.
pub fn zip_files(files: &[CleanedFile]) -> Result<Vec<u8>, PackageError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::<'_, ()>::default().compression_method(CompressionMethod::Deflated);
    let mut taken = HashSet::new();

    for file in files {
        let name = entry_name(&file.filename, &mut taken);
        debug!(entry = %name, bytes = file.content.len(), "añadiendo al ZIP");
        writer.start_file(name, options)?;
        writer.write_all(&file.content)?;
    }

    Ok(writer.finish()?.into_inner())
}
