//! Contenedores de fragmentos: RIFF/WAVE (little-endian) y FORM/AIFF (big-endian).
//!
//! Se copian todos los fragmentos salvo los de metadata y se corrige el tamaño del
//! contenedor.

use super::bytes::{be_u16, be_u32, latin1, le_u32};
use super::id3;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Endian {
    Little,
    Big,
}

impl Endian {
    fn read_u32(self, data: &[u8], at: usize) -> Option<u32> {
        match self {
            Endian::Little => le_u32(data, at),
            Endian::Big => be_u32(data, at),
        }
    }

    fn write_u32(self, value: u32) -> [u8; 4] {
        match self {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        }
    }
}

/// Descripción de un tipo de contenedor de fragmentos.
struct Layout {
    magic: &'static [u8; 4],
    endian: Endian,
    /// Fragmento obligatorio para considerar el archivo válido.
    required: &'static [u8; 4],
    dropped: &'static [&'static [u8; 4]],
}

const WAVE: Layout = Layout {
    magic: b"RIFF",
    endian: Endian::Little,
    required: b"fmt ",
    dropped: &[b"id3 ", b"ID3 ", b"_PMX", b"iXML", b"bext"],
};

const AIFF: Layout = Layout {
    magic: b"FORM",
    endian: Endian::Big,
    required: b"COMM",
    dropped: &[b"ID3 ", b"NAME", b"AUTH", b"(c) ", b"ANNO", b"COMT"],
};

#[derive(Clone, Copy, Debug)]
struct Chunk {
    id: [u8; 4],
    start: usize,
    /// Fin del contenido, sin el byte de relleno.
    body_end: usize,
    /// Fin del fragmento, con el byte de relleno si lo hay.
    end: usize,
}

impl Chunk {
    fn body<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.start + 8..self.body_end]
    }
}

/// Fragmentos del contenedor y fin del área que declara su cabecera.
fn chunks(data: &[u8], layout: &Layout) -> Result<(Vec<Chunk>, usize), String> {
    if data.len() < 12 || &data[..4] != layout.magic {
        return Err("cabecera de contenedor inválida".to_string());
    }
    let declared = layout.endian.read_u32(data, 4).unwrap_or(0) as usize;
    let form_end = (declared + 8).min(data.len());

    let mut chunks = Vec::new();
    let mut offset = 12;
    while offset + 8 <= form_end {
        let mut id = [0_u8; 4];
        id.copy_from_slice(&data[offset..offset + 4]);
        let size = layout.endian.read_u32(data, offset + 4).unwrap_or(0) as usize;
        let body_end = offset + 8 + size;
        if body_end > form_end {
            return Err(format!(
                "fragmento '{}' truncado",
                String::from_utf8_lossy(&id)
            ));
        }
        let end = (body_end + (size & 1)).min(form_end);
        chunks.push(Chunk {
            id,
            start: offset,
            body_end,
            end,
        });
        offset = end;
    }

    if !chunks.iter().any(|chunk| &chunk.id == layout.required) {
        return Err(format!(
            "falta el fragmento '{}'",
            String::from_utf8_lossy(layout.required)
        ));
    }
    Ok((chunks, form_end))
}

fn is_dropped(layout: &Layout, chunk: &Chunk, data: &[u8]) -> bool {
    if layout.dropped.iter().any(|id| **id == chunk.id) {
        return true;
    }
    layout.endian == Endian::Little && &chunk.id == b"LIST" && chunk.body(data).starts_with(b"INFO")
}

fn strip_chunks(data: &[u8], layout: &Layout) -> Result<Vec<u8>, String> {
    let (chunks, form_end) = chunks(data, layout)?;

    let mut output = Vec::with_capacity(data.len());
    output.extend_from_slice(&data[..12]);
    for chunk in chunks.iter().filter(|chunk| !is_dropped(layout, chunk, data)) {
        output.extend_from_slice(&data[chunk.start..chunk.end]);
    }
    let size = u32::try_from(output.len() - 8).map_err(|_| "contenedor demasiado grande".to_string())?;
    output[4..8].copy_from_slice(&layout.endian.write_u32(size));

    // Una etiqueta pegada tras el contenedor también es metadata.
    let tail = &data[form_end..];
    if !(tail.starts_with(b"ID3") || tail.starts_with(b"TAG")) {
        output.extend_from_slice(tail);
    }
    Ok(output)
}

pub(crate) fn strip_wave(data: &[u8]) -> Result<Vec<u8>, String> {
    strip_chunks(data, &WAVE)
}

pub(crate) fn strip_aiff(data: &[u8]) -> Result<Vec<u8>, String> {
    strip_chunks(data, &AIFF)
}

pub(crate) fn wave_entries(data: &[u8]) -> Result<Vec<(String, String)>, String> {
    let (chunks, _) = chunks(data, &WAVE)?;
    let mut entries = Vec::new();
    for chunk in &chunks {
        let body = chunk.body(data);
        match &chunk.id {
            b"LIST" if body.starts_with(b"INFO") => entries.extend(info_entries(&body[4..])),
            b"id3 " | b"ID3 " => entries.extend(id3::tag_entries(body)),
            b"bext" if body.len() >= 338 => {
                let fields = [
                    ("bext:description", latin1(&body[..256])),
                    ("bext:originator", latin1(&body[256..288])),
                    ("bext:originator_reference", latin1(&body[288..320])),
                    ("bext:origination_date", latin1(&body[320..330])),
                    ("bext:origination_time", latin1(&body[330..338])),
                ];
                entries.extend(
                    fields
                        .into_iter()
                        .filter(|(_, value)| !value.is_empty())
                        .map(|(key, value)| (key.to_string(), value)),
                );
            }
            b"iXML" | b"_PMX" => {
                let key = String::from_utf8_lossy(&chunk.id).trim().to_string();
                entries.push((key, format!("{} bytes", body.len())));
            }
            _ => {}
        }
    }
    Ok(entries)
}

/// Subfragmentos de texto de una lista `INFO` (`INAM`, `IART`, `ICMT`...).
fn info_entries(list: &[u8]) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    let mut offset = 0;
    while offset + 8 <= list.len() {
        let id = String::from_utf8_lossy(&list[offset..offset + 4]).into_owned();
        let size = le_u32(list, offset + 4).unwrap_or(0) as usize;
        let Some(text) = list.get(offset + 8..offset + 8 + size) else {
            break;
        };
        let text = String::from_utf8_lossy(text)
            .trim_end_matches('\0')
            .trim()
            .to_string();
        if !text.is_empty() {
            entries.push((id, text));
        }
        offset += 8 + size + (size & 1);
    }
    entries
}

pub(crate) fn aiff_entries(data: &[u8]) -> Result<Vec<(String, String)>, String> {
    let (chunks, _) = chunks(data, &AIFF)?;
    let mut entries = Vec::new();
    for chunk in &chunks {
        let body = chunk.body(data);
        let key = String::from_utf8_lossy(&chunk.id).trim().to_string();
        match &chunk.id {
            b"NAME" | b"AUTH" | b"(c) " | b"ANNO" => {
                let text = latin1(body);
                if !text.is_empty() {
                    entries.push((key, text));
                }
            }
            b"COMT" => entries.extend(comment_entries(body).into_iter().map(|text| (key.clone(), text))),
            b"ID3 " => entries.extend(id3::tag_entries(body)),
            _ => {}
        }
    }
    Ok(entries)
}

/// Textos del fragmento `COMT`: marca de tiempo, marcador y texto por comentario.
fn comment_entries(body: &[u8]) -> Vec<String> {
    let count = be_u16(body, 0).unwrap_or(0);
    let mut comments = Vec::new();
    let mut offset = 2;
    for _ in 0..count {
        let Some(len) = be_u16(body, offset + 6) else {
            break;
        };
        let start = offset + 8;
        let end = start + len as usize;
        let Some(text) = body.get(start..end) else {
            break;
        };
        comments.push(latin1(text));
        offset = end + (len as usize & 1);
    }
    comments
}

#[cfg(test)]
pub(crate) mod fixtures {
    pub(crate) fn le_chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut chunk = id.to_vec();
        chunk.extend_from_slice(&(body.len() as u32).to_le_bytes());
        chunk.extend_from_slice(body);
        if body.len() % 2 == 1 {
            chunk.push(0);
        }
        chunk
    }

    pub(crate) fn be_chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut chunk = id.to_vec();
        chunk.extend_from_slice(&(body.len() as u32).to_be_bytes());
        chunk.extend_from_slice(body);
        if body.len() % 2 == 1 {
            chunk.push(0);
        }
        chunk
    }

    pub(crate) fn wave(chunks: &[Vec<u8>]) -> Vec<u8> {
        let inner = chunks.concat();
        let mut file = b"RIFF".to_vec();
        file.extend_from_slice(&((inner.len() + 4) as u32).to_le_bytes());
        file.extend_from_slice(b"WAVE");
        file.extend(inner);
        file
    }

    pub(crate) fn aiff(chunks: &[Vec<u8>]) -> Vec<u8> {
        let inner = chunks.concat();
        let mut file = b"FORM".to_vec();
        file.extend_from_slice(&((inner.len() + 4) as u32).to_be_bytes());
        file.extend_from_slice(b"AIFF");
        file.extend(inner);
        file
    }

    pub(crate) fn info_list(items: &[(&[u8; 4], &str)]) -> Vec<u8> {
        let mut body = b"INFO".to_vec();
        for (id, text) in items {
            let mut value = text.as_bytes().to_vec();
            value.push(0);
            body.extend(le_chunk(id, &value));
        }
        le_chunk(b"LIST", &body)
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{info_list, le_chunk, wave};
    use super::*;

    #[test]
    fn info_list_is_reported() -> Result<(), Box<dyn std::error::Error>> {
        let data = wave(&[
            le_chunk(b"fmt ", &[1; 16]),
            info_list(&[(b"INAM", "Secreto"), (b"IART", "Alice")]),
            le_chunk(b"data", &[0; 10]),
        ]);
        let found = wave_entries(&data)?;
        assert!(found.contains(&("INAM".to_string(), "Secreto".to_string())));
        assert!(found.contains(&("IART".to_string(), "Alice".to_string())));
        Ok(())
    }

    #[test]
    fn wave_without_format_is_rejected() {
        let data = wave(&[le_chunk(b"data", &[0; 4])]);
        assert!(strip_wave(&data).is_err());
    }

    #[test]
    fn odd_chunks_keep_their_padding() -> Result<(), Box<dyn std::error::Error>> {
        let data = wave(&[
            le_chunk(b"fmt ", &[1; 16]),
            le_chunk(b"data", &[5; 7]),
            le_chunk(b"iXML", b"<x/>"),
        ]);
        let cleaned = strip_wave(&data)?;
        let expected = wave(&[le_chunk(b"fmt ", &[1; 16]), le_chunk(b"data", &[5; 7])]);
        assert_eq!(cleaned, expected);
        Ok(())
    }
}
