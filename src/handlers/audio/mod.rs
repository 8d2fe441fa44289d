//! Audio: elimina las etiquetas de cada contenedor sin tocar las muestras.
//!
//! El contenedor se reconoce por su firma (no por la extensión). Las etiquetas ID3v2
//! iniciales se descartan siempre; ID3v1 y APE finales se descartan en los flujos
//! crudos (MPEG, AAC ADTS, FLAC y los formatos con etiqueta APE).

mod ape;
mod asf;
mod bytes;
mod flac;
mod id3;
mod mp4;
mod ogg;
mod riff;
mod vorbis;


use std::io::{Read, Seek};
use tracing::{debug, warn};

use crate::classify::Family;
use crate::error::CleanError;
use crate::file::{MetadataReport, read_from_start};

/// Formatos que este manejador acepta, revisados aunque el clasificador ya los haya filtrado.
const ALLOWED_FORMATS: [&str; 13] = [
    "mp3", "flac", "ogg", "opus", "wv", "asf", "wma", "mpc", "m4a", "aac", "aiff", "ape", "wav",
];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Container {
    /// Tramas MPEG o AAC (ADTS/ADIF) sin contenedor.
    Mpeg,
    /// WavPack, Monkey's Audio y Musepack, etiquetados con APE.
    ApeTagged,
    Flac,
    Ogg,
    Mp4,
    Asf,
    Wave,
    Aiff,
}

impl Container {
    fn detect(data: &[u8]) -> Option<Self> {
        let at = |range: std::ops::Range<usize>| data.get(range).unwrap_or_default();

        if data.starts_with(b"fLaC") {
            Some(Container::Flac)
        } else if data.starts_with(b"OggS") {
            Some(Container::Ogg)
        } else if at(4..8) == b"ftyp" {
            Some(Container::Mp4)
        } else if data.starts_with(&asf::HEADER_OBJECT) {
            Some(Container::Asf)
        } else if data.starts_with(b"RIFF") && at(8..12) == b"WAVE" {
            Some(Container::Wave)
        } else if data.starts_with(b"FORM") && matches!(at(8..12), b"AIFF" | b"AIFC") {
            Some(Container::Aiff)
        } else if [&b"wvpk"[..], b"MAC ", b"MPCK", b"MP+"]
            .iter()
            .any(|magic| data.starts_with(magic))
        {
            Some(Container::ApeTagged)
        } else if is_mpeg_stream(data) {
            Some(Container::Mpeg)
        } else {
            None
        }
    }

    fn has_trailing_tags(self) -> bool {
        matches!(self, Container::Mpeg | Container::ApeTagged | Container::Flac)
    }
}

/// Sincronía de trama MPEG/ADTS (tras un posible relleno de ceros) o cabecera ADIF.
fn is_mpeg_stream(data: &[u8]) -> bool {
    if data.starts_with(b"ADIF") {
        return true;
    }
    let start = data.iter().position(|&b| b != 0).unwrap_or(data.len());
    matches!(data.get(start..start + 2), Some([0xFF, second]) if second & 0xE0 == 0xE0)
}

fn is_allowed(format_tag: &str) -> bool {
    let tag = format_tag.to_lowercase();
    ALLOWED_FORMATS.contains(&tag.as_str())
}

/// Inicio de las etiquetas finales (ID3v1 y APE, en cualquier orden) de `data`.
fn trailing_tags_start(data: &[u8]) -> usize {
    let mut end = data.len();
    loop {
        if id3::has_id3v1_at(data, end) {
            end -= id3::ID3V1_LEN;
        } else if let Some(tag) = ape::find_tag(data, end) {
            end = tag.start;
        } else {
            return end;
        }
    }
}

fn trailing_entries(data: &[u8]) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    let mut end = data.len();
    loop {
        if id3::has_id3v1_at(data, end) {
            entries.extend(id3::id3v1_entries(data, end));
            end -= id3::ID3V1_LEN;
        } else if let Some(tag) = ape::find_tag(data, end) {
            entries.extend(ape::entries(data, &tag));
            end = tag.start;
        } else {
            return entries;
        }
    }
}

/// Elimina las etiquetas del archivo de audio y devuelve el flujo limpio.
pub fn strip_audio<R: Read + Seek>(reader: &mut R, format_tag: &str) -> Result<Vec<u8>, CleanError> {
    if !is_allowed(format_tag) {
        return Err(CleanError::FormatNotAvailable(format_tag.to_string()));
    }

    let contents = read_from_start(reader)
        .map_err(|e| e.to_string())
        .and_then(|contents| strip_tags(&contents));
    contents.map_err(|e| {
        warn!(format = format_tag, error = %e, "no se pudo limpiar el audio");
        CleanError::Processing(Family::Audio)
    })
}

pub(crate) fn strip_tags(data: &[u8]) -> Result<Vec<u8>, String> {
    let start = id3::leading_tags_len(data)?;
    let body = &data[start..];
    let container =
        Container::detect(body).ok_or_else(|| "contenedor de audio no reconocido".to_string())?;

    let body = if container.has_trailing_tags() {
        &body[..trailing_tags_start(body)]
    } else {
        body
    };

    let cleaned = match container {
        Container::Mpeg | Container::ApeTagged => body.to_vec(),
        Container::Flac => flac::strip(body)?,
        Container::Ogg => ogg::strip(body)?,
        Container::Mp4 => mp4::strip(body)?,
        Container::Asf => asf::strip(body)?,
        Container::Wave => riff::strip_wave(body)?,
        Container::Aiff => riff::strip_aiff(body)?,
    };

    debug!(
        container = ?container,
        removed = data.len().saturating_sub(cleaned.len()),
        "etiquetas de audio eliminadas"
    );
    Ok(cleaned)
}

/// Reporta las etiquetas de cada contenedor con su clave nativa.
pub fn inspect_audio<R: Read + Seek>(reader: &mut R, format_tag: &str) -> MetadataReport {
    if !is_allowed(format_tag) {
        return MetadataReport::error(CleanError::FormatNotAvailable(format_tag.to_string()).to_string());
    }

    let collected = read_from_start(reader)
        .map_err(|e| e.to_string())
        .and_then(|contents| collect_tags(&contents));
    match collected {
        Ok(entries) => MetadataReport::from_entries(entries),
        Err(e) => {
            warn!(format = format_tag, error = %e, "no se pudieron leer las etiquetas");
            MetadataReport::error("Error reading audio file.")
        }
    }
}

fn collect_tags(data: &[u8]) -> Result<Vec<(String, String)>, String> {
    let start = id3::leading_tags_len(data)?;
    let mut entries = id3::leading_entries(data);
    let body = &data[start..];
    let container =
        Container::detect(body).ok_or_else(|| "contenedor de audio no reconocido".to_string())?;

    let content = if container.has_trailing_tags() {
        entries.extend(trailing_entries(body));
        &body[..trailing_tags_start(body)]
    } else {
        body
    };

    match container {
        Container::Mpeg | Container::ApeTagged => {}
        Container::Flac => entries.extend(flac::entries(content)?),
        Container::Ogg => entries.extend(ogg::entries(content)?),
        Container::Mp4 => entries.extend(mp4::entries(content)?),
        Container::Asf => entries.extend(asf::entries(content)?),
        Container::Wave => entries.extend(riff::wave_entries(content)?),
        Container::Aiff => entries.extend(riff::aiff_entries(content)?),
    }
    Ok(entries)
}
