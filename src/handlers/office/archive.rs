use std::io::{Cursor, Read, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Abre el paquete Office contenido en `contents`.
pub(crate) fn open_package(contents: &[u8]) -> Result<ZipArchive<Cursor<&[u8]>>, String> {
    ZipArchive::new(Cursor::new(contents))
        .map_err(|e| format!("No es un documento Office válido: {}", e))
}

/// Lee una parte del paquete; `None` si no existe.
pub(crate) fn read_part(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Option<Vec<u8>>, String> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(format!("No se pudo acceder a {}: {}", name, e)),
    };
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)
        .map_err(|e| format!("No se pudo leer {}: {}", name, e))?;
    Ok(Some(contents))
}

/// Reescribe el paquete en memoria aplicando una transformación por parte.
///
/// Cada entrada conserva su método de compresión, permisos y fecha; solo cambia el
/// contenido que devuelva `transform`. Las partes de `additions` se escriben primero,
/// comprimidas con deflate.
pub(crate) fn rewrite_package<F>(
    contents: &[u8],
    additions: &[(&str, Vec<u8>)],
    mut transform: F,
) -> Result<Vec<u8>, String>
where
    F: FnMut(&str, Vec<u8>) -> Result<Vec<u8>, String>,
{
    let mut archive = open_package(contents)?;
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    let added = FileOptions::<'_, ()>::default().compression_method(CompressionMethod::Deflated);
    for (name, part) in additions {
        writer
            .start_file(*name, added)
            .map_err(|e| format!("Error creando {}: {}", name, e))?;
        writer
            .write_all(part)
            .map_err(|e| format!("Error escribiendo {}: {}", name, e))?;
    }

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| format!("Error leyendo archivo del ZIP: {}", e))?;
        let name = file.name().to_string();

        let mut options = FileOptions::<'_, ()>::default().compression_method(file.compression());
        if let Some(mode) = file.unix_mode() {
            options = options.unix_permissions(mode);
        }
        if let Some(time) = file.last_modified() {
            options = options.last_modified_time(time);
        }

        if file.is_dir() {
            writer
                .add_directory(name, options)
                .map_err(|e| format!("Error creando directorio en ZIP: {}", e))?;
            continue;
        }

        let mut part = Vec::new();
        file.read_to_end(&mut part)
            .map_err(|e| format!("Error leyendo contenido de {}: {}", name, e))?;

        let rewritten = transform(&name, part)?;

        writer
            .start_file(name, options)
            .map_err(|e| format!("Error escribiendo contenido: {}", e))?;
        writer
            .write_all(&rewritten)
            .map_err(|e| format!("Error escribiendo contenido: {}", e))?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| format!("Error finalizando archivo: {}", e))?;
    Ok(cursor.into_inner())
}
