//! Etiquetas ID3: v2 al inicio del flujo (o dentro de un fragmento RIFF/AIFF) y v1 al final.

use super::bytes::{be_u24, be_u32, latin1, synchsafe_to_u32, utf16_be, utf16_le};

pub(crate) const ID3V1_LEN: usize = 128;
const HEADER_LEN: usize = 10;

const FLAG_UNSYNC: u8 = 0x80;
const FLAG_EXTENDED: u8 = 0x40;
const FLAG_FOOTER: u8 = 0x10;

#[derive(Clone, Copy, Debug)]
struct Id3v2Header {
    major: u8,
    flags: u8,
    body_len: usize,
}

impl Id3v2Header {
    fn parse(data: &[u8]) -> Option<Self> {
        let header = data.get(..HEADER_LEN)?;
        if &header[..3] != b"ID3" || header[3] == 0xFF || header[4] == 0xFF {
            return None;
        }
        if header[6..10].iter().any(|b| b & 0x80 != 0) {
            return None;
        }
        Some(Self {
            major: header[3],
            flags: header[5],
            body_len: synchsafe_to_u32(&header[6..10]) as usize,
        })
    }

    fn total_len(&self) -> usize {
        let footer = if self.major >= 4 && self.flags & FLAG_FOOTER != 0 {
            HEADER_LEN
        } else {
            0
        };
        HEADER_LEN + self.body_len + footer
    }
}

/// Longitud de las etiquetas ID3v2 consecutivas al inicio de `data`.
pub(crate) fn leading_tags_len(data: &[u8]) -> Result<usize, String> {
    let mut offset = 0;
    while let Some(header) = Id3v2Header::parse(&data[offset..]) {
        let end = offset + header.total_len();
        if end > data.len() {
            return Err("etiqueta ID3v2 truncada".to_string());
        }
        offset = end;
    }
    Ok(offset)
}

/// Frames de todas las etiquetas ID3v2 al inicio de `data`.
pub(crate) fn leading_entries(data: &[u8]) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    let mut offset = 0;
    while let Some(tag) = data.get(offset..)
        && let Some(header) = Id3v2Header::parse(tag)
    {
        entries.extend(tag_entries(tag));
        offset += header.total_len();
    }
    entries
}

/// Frames de una etiqueta ID3v2 completa que empieza en `tag[0]`.
pub(crate) fn tag_entries(tag: &[u8]) -> Vec<(String, String)> {
    let Some(header) = Id3v2Header::parse(tag) else {
        return Vec::new();
    };
    let end = (HEADER_LEN + header.body_len).min(tag.len());
    let raw = &tag[HEADER_LEN..end];
    let body = if header.flags & FLAG_UNSYNC != 0 && header.major < 4 {
        remove_unsync(raw)
    } else {
        raw.to_vec()
    };

    let mut offset = 0;
    if header.flags & FLAG_EXTENDED != 0 {
        offset = match header.major {
            3 => be_u32(&body, 0).map(|size| size as usize + 4).unwrap_or(body.len()),
            4 => body.get(..4).map(|size| synchsafe_to_u32(size) as usize).unwrap_or(body.len()),
            _ => 0,
        };
    }

    let (id_len, frame_header_len) = if header.major == 2 { (3, 6) } else { (4, HEADER_LEN) };
    let mut entries = Vec::new();
    while offset + frame_header_len <= body.len() {
        let id = &body[offset..offset + id_len];
        if !id.iter().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()) {
            break;
        }
        let size = match header.major {
            2 => be_u24(&body, offset + 3),
            3 => be_u32(&body, offset + 4),
            _ => body.get(offset + 4..offset + 8).map(synchsafe_to_u32),
        };
        let Some(size) = size.map(|size| size as usize) else {
            break;
        };
        let start = offset + frame_header_len;
        let end = start + size;
        if end > body.len() {
            break;
        }

        let mut frame = &body[start..end];
        let format_flags = if header.major >= 3 { body[offset + 9] } else { 0 };
        let compressed = match header.major {
            3 => format_flags & 0x80 != 0,
            4 => format_flags & 0x08 != 0,
            _ => false,
        };
        if header.major == 4 && format_flags & 0x01 != 0 && frame.len() >= 4 {
            frame = &frame[4..];
        }

        let key = String::from_utf8_lossy(id).into_owned();
        let value = if compressed {
            format!("{} bytes comprimidos", frame.len())
        } else {
            describe_frame(id, frame)
        };
        entries.push((key, value));
        offset = end;
    }
    entries
}

/// Indica si hay una etiqueta ID3v1 terminando justo en `end`.
pub(crate) fn has_id3v1_at(data: &[u8], end: usize) -> bool {
    end >= ID3V1_LEN && data[end - ID3V1_LEN..end].starts_with(b"TAG")
}

/// Campos de la etiqueta ID3v1 que termina en `end`.
pub(crate) fn id3v1_entries(data: &[u8], end: usize) -> Vec<(String, String)> {
    if !has_id3v1_at(data, end) {
        return Vec::new();
    }
    let tag = &data[end - ID3V1_LEN..end];

    // ID3v1.1: pista en el último byte del comentario.
    let has_track = tag[125] == 0 && tag[126] != 0;
    let comment_end = if has_track { 125 } else { 127 };
    let mut fields = vec![
        ("ID3v1:title", latin1(&tag[3..33])),
        ("ID3v1:artist", latin1(&tag[33..63])),
        ("ID3v1:album", latin1(&tag[63..93])),
        ("ID3v1:year", latin1(&tag[93..97])),
        ("ID3v1:comment", latin1(&tag[97..comment_end])),
    ];
    if has_track {
        fields.push(("ID3v1:track", tag[126].to_string()));
    }
    if tag[127] != 0xFF {
        fields.push(("ID3v1:genre", tag[127].to_string()));
    }

    fields
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

fn describe_frame(id: &[u8], frame: &[u8]) -> String {
    match id {
        b"TXXX" | b"TXX" => decode_user_text(frame),
        b"COMM" | b"COM" | b"USLT" | b"ULT" => decode_comment(frame),
        b"APIC" | b"PIC" => parse_apic(frame).unwrap_or_else(|| format!("{} bytes", frame.len())),
        b"WXXX" | b"WXX" => decode_user_text(frame),
        _ if id[0] == b'T' => decode_id3_text(frame).unwrap_or_default(),
        _ if id[0] == b'W' => latin1(frame),
        _ => format!("{} bytes", frame.len()),
    }
}

fn decode_id3_text(frame: &[u8]) -> Option<String> {
    let (&encoding, data) = frame.split_first()?;
    let text = decode_text(encoding, data)?;
    Some(text.trim_end_matches('\0').replace('\0', "; ").trim().to_string())
}

fn decode_text(encoding: u8, data: &[u8]) -> Option<String> {
    match encoding {
        0 => Some(latin1(data)),
        1 => Some(match data {
            [0xFF, 0xFE, rest @ ..] => utf16_le(rest),
            [0xFE, 0xFF, rest @ ..] => utf16_be(rest),
            _ => utf16_be(data),
        }),
        2 => Some(utf16_be(data)),
        3 => Some(String::from_utf8_lossy(data).trim_end_matches('\0').to_string()),
        _ => None,
    }
}

/// Separa `data` en el primer terminador de la codificación dada.
fn split_terminated(encoding: u8, data: &[u8]) -> (&[u8], &[u8]) {
    if matches!(encoding, 1 | 2) {
        let mut pos = 0;
        while pos + 1 < data.len() {
            if data[pos] == 0 && data[pos + 1] == 0 {
                return (&data[..pos], &data[pos + 2..]);
            }
            pos += 2;
        }
        (data, &[])
    } else {
        match data.iter().position(|&b| b == 0) {
            Some(pos) => (&data[..pos], &data[pos + 1..]),
            None => (data, &[]),
        }
    }
}

fn decode_user_text(frame: &[u8]) -> String {
    let Some((&encoding, data)) = frame.split_first() else {
        return String::new();
    };
    let (description, value) = split_terminated(encoding, data);
    let description = decode_text(encoding, description).unwrap_or_default();
    let value = decode_text(encoding, value).unwrap_or_default();
    if description.is_empty() {
        value
    } else {
        format!("{description}: {value}")
    }
}

fn decode_comment(frame: &[u8]) -> String {
    match frame.split_first() {
        Some((&encoding, data)) if data.len() >= 3 => {
            let mut with_encoding = vec![encoding];
            with_encoding.extend_from_slice(&data[3..]);
            decode_user_text(&with_encoding)
        }
        _ => String::new(),
    }
}

fn parse_apic(frame: &[u8]) -> Option<String> {
    if frame.len() < 4 {
        return None;
    }
    let mut pos = 1;
    while pos < frame.len() && frame[pos] != 0 {
        pos += 1;
    }
    let mime = String::from_utf8_lossy(&frame[1..pos]).to_string();
    let size = frame.len();
    Some(format!("{mime} ({size} bytes)"))
}

fn remove_unsync(data: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(data.len());
    let mut previous = 0_u8;
    for &b in data {
        if previous == 0xFF && b == 0x00 {
            previous = b;
            continue;
        }
        output.push(b);
        previous = b;
    }
    output
}


#[cfg(test)]
mod tests {
    use super::fixtures::{id3v1_tag, id3v23_tag};
    use super::*;

    #[test]
    fn reads_text_and_comment_frames() {
        let mut tag = id3v23_tag(&[("TIT2", "Secreto"), ("TPE1", "Alice")]);
        tag.extend_from_slice(b"audio");
        let entries = leading_entries(&tag);
        assert!(entries.contains(&("TIT2".to_string(), "Secreto".to_string())));
        assert!(entries.contains(&("TPE1".to_string(), "Alice".to_string())));
        assert_eq!(leading_tags_len(&tag), Ok(tag.len() - 5));
    }

    #[test]
    fn truncated_tag_is_an_error() {
        let tag = id3v23_tag(&[("TIT2", "Secreto")]);
        assert!(leading_tags_len(&tag[..tag.len() - 4]).is_err());
    }

    #[test]
    fn id3v1_fields_are_trimmed() {
        let tag = id3v1_tag("Titulo", "Alice");
        let entries = id3v1_entries(&tag, tag.len());
        assert!(entries.contains(&("ID3v1:title".to_string(), "Titulo".to_string())));
        assert!(entries.contains(&("ID3v1:artist".to_string(), "Alice".to_string())));
        assert!(entries.contains(&("ID3v1:track".to_string(), "7".to_string())));
    }

    #[test]
    fn utf16_with_bom_is_decoded() {
        let mut frame = vec![1_u8, 0xFF, 0xFE];
        for unit in "Año".encode_utf16() {
            frame.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode_id3_text(&frame).as_deref(), Some("Año"));
    }
}
