//! Errores visibles para quien llama a la biblioteca.
//!
//! Cada variante lleva el mensaje exacto que se muestra al usuario y un código de estado
//! sugerido (400 cuando el problema es el formato enviado, 500 cuando falla el procesamiento).
//! Los detalles internos de cada biblioteca de formato se registran con `tracing` y nunca
//! aparecen en el mensaje.

use std::fmt;
use thiserror::Error;

use crate::classify::Family;
use crate::file::CleanedFile;

/// Resultado de procesar un archivo: contenido limpio o un fallo terminal.
pub type Outcome = Result<CleanedFile, CleanError>;

/// Operación para la que se rechazó un archivo no soportado.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Purpose {
    Removal,
    Inspection,
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Purpose::Removal => "metadata removal",
            Purpose::Inspection => "metadata checker",
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CleanError {
    /// La petición no contenía archivos.
    #[error("No files provided in the request.")]
    NoFiles,

    /// El clasificador no reconoció la extensión.
    #[error("File type of {filename} is not supported for {purpose}.")]
    UnsupportedFile { filename: String, purpose: Purpose },

    /// Sub-formato Office fuera de DOCX/XLSX/PPTX.
    #[error("Unsupported Office file format: {0}")]
    UnsupportedOfficeFormat(String),

    /// El manejador de audio o video rechaza la etiqueta con su propia lista permitida.
    #[error("Format not available for use for the moment.")]
    FormatNotAvailable(String),

    /// Fallo al decodificar, analizar o reescribir el archivo.
    #[error("Error processing {0} file.")]
    Processing(Family),

    /// El remux externo excedió el tiempo límite.
    #[error("Error processing video file, it may be corrupted.")]
    VideoTimeout,
}

impl CleanError {
    /// Indica si el fallo se debe a lo que envió el cliente.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CleanError::NoFiles
                | CleanError::UnsupportedFile { .. }
                | CleanError::UnsupportedOfficeFormat(_)
                | CleanError::FormatNotAvailable(_)
        )
    }

    /// Código HTTP sugerido para la capa de transporte.
    pub fn status_code(&self) -> u16 {
        if self.is_client_error() { 400 } else { 500 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_the_public_contract() {
        assert_eq!(
            CleanError::Processing(Family::Image).to_string(),
            "Error processing image file."
        );
        assert_eq!(
            CleanError::Processing(Family::Pdf).to_string(),
            "Error processing PDF file."
        );
        assert_eq!(
            CleanError::UnsupportedOfficeFormat("ODT".into()).to_string(),
            "Unsupported Office file format: ODT"
        );
        assert_eq!(
            CleanError::UnsupportedFile {
                filename: "a.xyz".into(),
                purpose: Purpose::Removal,
            }
            .to_string(),
            "File type of a.xyz is not supported for metadata removal."
        );
        assert!(CleanError::VideoTimeout.to_string().contains("may be corrupted"));
    }

    #[test]
    fn status_codes_split_client_and_processing_errors() {
        assert_eq!(CleanError::NoFiles.status_code(), 400);
        assert_eq!(CleanError::FormatNotAvailable("3G2".into()).status_code(), 400);
        assert_eq!(CleanError::Processing(Family::Audio).status_code(), 500);
        assert_eq!(CleanError::VideoTimeout.status_code(), 500);
    }
}
