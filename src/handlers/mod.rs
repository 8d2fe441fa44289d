//! Manejadores por familia y despacho exhaustivo sobre [`Family`].

pub mod audio;
pub mod image;
pub mod office;
pub mod pdf;
pub mod video;

use std::io::{Read, Seek};

use crate::classify::Family;
use crate::config::ScrubConfig;
use crate::error::CleanError;
use crate::file::MetadataReport;

/// Devuelve los bytes limpios del archivo según su familia.
///
/// `Family::Unsupported` nunca llega aquí desde el orquestador; si llega, se trata
/// como un fallo de procesamiento.
pub fn strip<R: Read + Seek>(
    family: Family,
    format_tag: &str,
    reader: &mut R,
    config: &ScrubConfig,
) -> Result<Vec<u8>, CleanError> {
    match family {
        Family::Image => image::strip_image(reader, format_tag),
        Family::Pdf => pdf::strip_pdf(reader),
        Family::Office => office::strip_office(reader, format_tag),
        Family::Audio => audio::strip_audio(reader, format_tag),
        Family::Video => video::strip_video(reader, format_tag, config),
        Family::Unsupported => Err(CleanError::Processing(Family::Unsupported)),
    }
}

/// Lee la metadata nativa del archivo según su familia.
pub fn inspect<R: Read + Seek>(
    family: Family,
    format_tag: &str,
    reader: &mut R,
    config: &ScrubConfig,
) -> MetadataReport {
    match family {
        Family::Image => image::inspect_image(reader, format_tag),
        Family::Pdf => pdf::inspect_pdf(reader),
        Family::Office => office::inspect_office(reader, format_tag),
        Family::Audio => audio::inspect_audio(reader, format_tag),
        Family::Video => video::inspect_video(reader, format_tag, config),
        Family::Unsupported => MetadataReport::error("Unsupported file type."),
    }
}
