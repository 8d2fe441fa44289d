//! Orquestación: clasificar, despachar al manejador y agregar resultados.
//!
//! Un lote es todo o nada. El primer archivo no soportado o fallido aborta el lote y
//! se descartan los resultados ya producidos.

use std::io::{Read, Seek, SeekFrom};
use tracing::{debug, info, warn};

use crate::classify::{Family, classify};
use crate::config::ScrubConfig;
use crate::error::{CleanError, Outcome, Purpose};
use crate::file::{CleanedFile, InputFile, InspectionResult};
use crate::handlers;

/// Bytes iniciales que se entregan a `infer` para reconocer el contenido.
const SNIFF_LEN: u64 = 8192;

/// Limpia un único archivo y devuelve el resultado del manejador tal cual.
pub fn strip_file<R: Read + Seek>(file: &mut InputFile<R>, config: &ScrubConfig) -> Outcome {
    let classification = classify(&file.filename);
    if classification.family == Family::Unsupported {
        return Err(CleanError::UnsupportedFile {
            filename: file.filename.clone(),
            purpose: Purpose::Removal,
        });
    }

    debug!(
        filename = %file.filename,
        family = %classification.family,
        format = %classification.format_tag,
        "limpiando archivo"
    );
    let content = handlers::strip(
        classification.family,
        &classification.format_tag,
        &mut file.reader,
        config,
    )?;

    info!(filename = %file.filename, bytes = content.len(), "metadata eliminada");
    Ok(CleanedFile {
        filename: file.filename.clone(),
        mime_type: classification.mime_type,
        content,
    })
}

/// Limpia todos los archivos en orden, deteniéndose en el primer fallo.
///
/// Un lote vacío es [`CleanError::NoFiles`]. El error devuelto es el del primer archivo
/// que falló, sin modificar; los archivos siguientes no se procesan.
pub fn process_batch<R: Read + Seek>(
    files: &mut [InputFile<R>],
    config: &ScrubConfig,
) -> Result<Vec<CleanedFile>, CleanError> {
    if files.is_empty() {
        return Err(CleanError::NoFiles);
    }

    let total = files.len();
    let cleaned = files
        .iter_mut()
        .enumerate()
        .map(|(index, file)| {
            strip_file(file, config).inspect_err(|e| {
                warn!(
                    filename = %file.filename,
                    position = index + 1,
                    total,
                    error = %e,
                    "lote abortado"
                );
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    info!(files = cleaned.len(), "lote completado");
    Ok(cleaned)
}

/// Lee la metadata de un archivo sin modificarlo.
///
/// Una subida sin nombre de archivo equivale a no haber enviado nada.
pub fn inspect_file<R: Read + Seek>(
    file: &mut InputFile<R>,
    config: &ScrubConfig,
) -> Result<InspectionResult, CleanError> {
    if file.filename.is_empty() {
        return Err(CleanError::NoFiles);
    }

    let classification = classify(&file.filename);
    if classification.family == Family::Unsupported {
        return Err(CleanError::UnsupportedFile {
            filename: file.filename.clone(),
            purpose: Purpose::Inspection,
        });
    }

    let detected_mime = sniff_mime(&mut file.reader);
    let report = handlers::inspect(
        classification.family,
        &classification.format_tag,
        &mut file.reader,
        config,
    );
    debug!(
        filename = %file.filename,
        detected = detected_mime.as_deref().unwrap_or("desconocido"),
        error = report.is_error(),
        "archivo inspeccionado"
    );

    Ok(InspectionResult {
        filename: file.filename.clone(),
        mime_type: classification.mime_type,
        detected_mime,
        report,
    })
}

fn sniff_mime<R: Read + Seek>(reader: &mut R) -> Option<String> {
    reader.seek(SeekFrom::Start(0)).ok()?;
    let mut head = Vec::new();
    reader.by_ref().take(SNIFF_LEN).read_to_end(&mut head).ok()?;
    infer::get(&head).map(|kind| kind.mime_type().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn png_bytes() -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, 2, 2);
            encoder.set_color(png::ColorType::Rgb);
            encoder.set_depth(png::BitDepth::Eight);
            encoder.add_text_chunk("Author".to_string(), "Alice".to_string())?;
            let mut writer = encoder.write_header()?;
            writer.write_image_data(&[200; 12])?;
        }
        Ok(out)
    }

    fn input(name: &str, bytes: Vec<u8>) -> InputFile<Cursor<Vec<u8>>> {
        InputFile::new(name, Cursor::new(bytes))
    }

    /// Trama MPEG mínima precedida de una etiqueta ID3v2 vacía.
    fn tagged_mp3() -> Vec<u8> {
        let mut data = b"ID3\x03\x00\x00\x00\x00\x00\x04".to_vec();
        data.extend_from_slice(&[0; 4]);
        data.extend_from_slice(&[0xFF, 0xFB, 0x90, 0x64]);
        data.extend_from_slice(&[0x55; 60]);
        data
    }

    #[test]
    fn single_file_passes_through_the_handler() -> TestResult {
        let mut file = input("foto.png", png_bytes()?);
        let cleaned = strip_file(&mut file, &ScrubConfig::default())?;
        assert_eq!(cleaned.filename, "foto.png");
        assert_eq!(cleaned.mime_type.as_deref(), Some("image/png"));
        assert!(!cleaned.content.windows(5).any(|w| w == b"Alice"));
        Ok(())
    }

    #[test]
    fn unsupported_extension_is_rejected_by_name() {
        let mut file = input("notas.xyz", b"hola".to_vec());
        let err = strip_file(&mut file, &ScrubConfig::default()).err();
        assert_eq!(
            err.map(|e| e.to_string()).as_deref(),
            Some("File type of notas.xyz is not supported for metadata removal.")
        );
    }

    #[test]
    fn batch_keeps_request_order() -> TestResult {
        let mut files = vec![input("b.png", png_bytes()?), input("a.mp3", tagged_mp3())];
        let cleaned = process_batch(&mut files, &ScrubConfig::default())?;
        let names: Vec<&str> = cleaned.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, ["b.png", "a.mp3"]);
        assert!(cleaned[1].content.starts_with(&[0xFF, 0xFB]));
        Ok(())
    }

    #[test]
    fn batch_aborts_on_the_first_failure() -> TestResult {
        let mut files = vec![
            input("a.png", png_bytes()?),
            input("b.mp3", tagged_mp3()),
            input("roto.pdf", b"esto no es un pdf".to_vec()),
            input("d.xyz", b"nunca se mira".to_vec()),
        ];
        let err = process_batch(&mut files, &ScrubConfig::default()).err();
        assert_eq!(err, Some(CleanError::Processing(Family::Pdf)));
        Ok(())
    }

    #[test]
    fn unsupported_file_in_a_batch_is_reported_as_is() -> TestResult {
        let mut files = vec![input("a.png", png_bytes()?), input("b.exe", vec![0x4D, 0x5A])];
        let err = process_batch(&mut files, &ScrubConfig::default()).err();
        assert_eq!(
            err,
            Some(CleanError::UnsupportedFile {
                filename: "b.exe".into(),
                purpose: Purpose::Removal,
            })
        );
        assert_eq!(err.map(|e| e.status_code()), Some(400));
        Ok(())
    }

    #[test]
    fn empty_batch_is_a_client_error() {
        let mut files: Vec<InputFile<Cursor<Vec<u8>>>> = Vec::new();
        let err = process_batch(&mut files, &ScrubConfig::default()).err();
        assert_eq!(err, Some(CleanError::NoFiles));
    }

    #[test]
    fn inspection_reports_names_and_sniffed_type() -> TestResult {
        let mut file = input("foto.png", png_bytes()?);
        let result = inspect_file(&mut file, &ScrubConfig::default())?;
        assert_eq!(result.mime_type.as_deref(), Some("image/png"));
        assert_eq!(result.detected_mime.as_deref(), Some("image/png"));

        let json = serde_json::to_value(&result)?;
        assert_eq!(json["filename"], "foto.png");
        assert_eq!(json["metadata"]["Author"], "Alice");
        assert!(json.get("error").is_none());
        Ok(())
    }

    #[test]
    fn inspection_of_unknown_types_names_the_checker() {
        let mut file = input("datos.bin", vec![1, 2, 3]);
        let err = inspect_file(&mut file, &ScrubConfig::default()).err();
        assert_eq!(
            err.map(|e| e.to_string()).as_deref(),
            Some("File type of datos.bin is not supported for metadata checker.")
        );

        let mut nameless = input("", vec![1, 2, 3]);
        assert_eq!(
            inspect_file(&mut nameless, &ScrubConfig::default()).err(),
            Some(CleanError::NoFiles)
        );
    }
}
