//! ASF/WMA: los objetos de descripción se reemplazan por objetos de relleno del mismo tamaño.

use super::bytes::{le_u16, le_u32, le_u64, utf16_le};

pub(crate) type Guid = [u8; 16];

pub(crate) const HEADER_OBJECT: Guid = [
    0x30, 0x26, 0xB2, 0x75, 0x8E, 0x66, 0xCF, 0x11, 0xA6, 0xD9, 0x00, 0xAA, 0x00, 0x62, 0xCE, 0x6C,
];
const CONTENT_DESCRIPTION: Guid = [
    0x33, 0x26, 0xB2, 0x75, 0x8E, 0x66, 0xCF, 0x11, 0xA6, 0xD9, 0x00, 0xAA, 0x00, 0x62, 0xCE, 0x6C,
];
const EXTENDED_CONTENT_DESCRIPTION: Guid = [
    0x40, 0xA4, 0xD0, 0xD2, 0x07, 0xE3, 0xD2, 0x11, 0x97, 0xF0, 0x00, 0xA0, 0xC9, 0x5E, 0xA8, 0x50,
];
const HEADER_EXTENSION: Guid = [
    0xB5, 0x03, 0xBF, 0x5F, 0x2E, 0xA9, 0xCF, 0x11, 0x8E, 0xE3, 0x00, 0xC0, 0x0C, 0x20, 0x53, 0x65,
];
const METADATA: Guid = [
    0xEA, 0xF8, 0xCB, 0xC5, 0xAF, 0x5B, 0x77, 0x48, 0x84, 0x67, 0xAA, 0x8C, 0x44, 0xFA, 0x4C, 0xCA,
];
const METADATA_LIBRARY: Guid = [
    0x94, 0x1C, 0x23, 0x44, 0x98, 0x94, 0xD1, 0x49, 0xA1, 0x41, 0x1D, 0x13, 0x4E, 0x45, 0x70, 0x54,
];
pub(crate) const PADDING: Guid = [
    0x74, 0xD4, 0x06, 0x18, 0xDF, 0xCA, 0x09, 0x45, 0xA4, 0xBA, 0x9A, 0xAB, 0xCB, 0x96, 0xAA, 0xE8,
];

const OBJECT_HEADER_LEN: usize = 24;
const HEADER_OBJECT_LEN: usize = 30;
const EXTENSION_DATA_OFFSET: usize = 46;

#[derive(Clone, Copy, Debug)]
struct Object {
    guid: Guid,
    start: usize,
    end: usize,
}

fn objects(data: &[u8], from: usize, to: usize) -> Result<Vec<Object>, String> {
    let mut objects = Vec::new();
    let mut offset = from;
    while offset + OBJECT_HEADER_LEN <= to {
        let mut guid = [0_u8; 16];
        guid.copy_from_slice(&data[offset..offset + 16]);
        let size = le_u64(data, offset + 16).unwrap_or(0) as usize;
        let end = offset.saturating_add(size);
        if size < OBJECT_HEADER_LEN || end > to {
            return Err("objeto ASF con tamaño inválido".to_string());
        }
        objects.push(Object {
            guid,
            start: offset,
            end,
        });
        offset = end;
    }
    Ok(objects)
}

fn header_objects(data: &[u8]) -> Result<Vec<Object>, String> {
    if !data.starts_with(&HEADER_OBJECT) {
        return Err("falta el objeto de cabecera ASF".to_string());
    }
    let header_end = le_u64(data, 16).unwrap_or(0) as usize;
    if header_end < HEADER_OBJECT_LEN || header_end > data.len() {
        return Err("cabecera ASF truncada".to_string());
    }
    objects(data, HEADER_OBJECT_LEN, header_end)
}

fn extension_objects(data: &[u8], extension: &Object) -> Result<Vec<Object>, String> {
    let start = extension.start + EXTENSION_DATA_OFFSET;
    if start > extension.end {
        return Err("extensión de cabecera ASF truncada".to_string());
    }
    objects(data, start, extension.end)
}

pub(crate) fn strip(data: &[u8]) -> Result<Vec<u8>, String> {
    let mut output = data.to_vec();
    for object in header_objects(data)? {
        match object.guid {
            CONTENT_DESCRIPTION | EXTENDED_CONTENT_DESCRIPTION => pad(&mut output, &object),
            HEADER_EXTENSION => {
                for inner in extension_objects(data, &object)? {
                    if matches!(inner.guid, METADATA | METADATA_LIBRARY) {
                        pad(&mut output, &inner);
                    }
                }
            }
            _ => {}
        }
    }
    Ok(output)
}

fn pad(output: &mut [u8], object: &Object) {
    output[object.start..object.start + 16].copy_from_slice(&PADDING);
    output[object.start + OBJECT_HEADER_LEN..object.end].fill(0);
}

pub(crate) fn entries(data: &[u8]) -> Result<Vec<(String, String)>, String> {
    let mut entries = Vec::new();
    for object in header_objects(data)? {
        let body = &data[object.start + OBJECT_HEADER_LEN..object.end];
        match object.guid {
            CONTENT_DESCRIPTION => entries.extend(content_description(body)),
            EXTENDED_CONTENT_DESCRIPTION => entries.extend(extended_description(body)),
            _ => {}
        }
    }
    Ok(entries)
}

fn content_description(body: &[u8]) -> Vec<(String, String)> {
    const LABELS: [&str; 5] = ["Title", "Author", "Copyright", "Description", "Rating"];
    let mut entries = Vec::new();
    let mut offset = 10;
    for (index, label) in LABELS.iter().enumerate() {
        let Some(len) = le_u16(body, index * 2) else {
            break;
        };
        let end = offset + len as usize;
        let Some(raw) = body.get(offset..end) else {
            break;
        };
        let text = utf16_le(raw);
        if !text.is_empty() {
            entries.push((label.to_string(), text));
        }
        offset = end;
    }
    entries
}

fn extended_description(body: &[u8]) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    let Some(count) = le_u16(body, 0) else {
        return entries;
    };
    let mut offset = 2;
    for _ in 0..count {
        let Some(name_len) = le_u16(body, offset) else {
            break;
        };
        let name_end = offset + 2 + name_len as usize;
        let (Some(name), Some(kind), Some(value_len)) = (
            body.get(offset + 2..name_end),
            le_u16(body, name_end),
            le_u16(body, name_end + 2),
        ) else {
            break;
        };
        let value_start = name_end + 4;
        let value_end = value_start + value_len as usize;
        let Some(value) = body.get(value_start..value_end) else {
            break;
        };

        let value = match kind {
            0 => utf16_le(value),
            2 | 3 => le_u32(value, 0).map(|v| v.to_string()).unwrap_or_default(),
            4 => le_u64(value, 0).map(|v| v.to_string()).unwrap_or_default(),
            5 => le_u16(value, 0).map(|v| v.to_string()).unwrap_or_default(),
            _ => format!("{} bytes", value.len()),
        };
        entries.push((utf16_le(name), value));
        offset = value_end;
    }
    entries
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::{CONTENT_DESCRIPTION, Guid, HEADER_OBJECT};

    pub(crate) fn object(guid: &Guid, body: &[u8]) -> Vec<u8> {
        let mut object = guid.to_vec();
        object.extend_from_slice(&((body.len() + 24) as u64).to_le_bytes());
        object.extend_from_slice(body);
        object
    }

    fn utf16(text: &str) -> Vec<u8> {
        let mut bytes: Vec<u8> = text.encode_utf16().flat_map(u16::to_le_bytes).collect();
        bytes.extend_from_slice(&[0, 0]);
        bytes
    }

    pub(crate) fn content_description(title: &str, author: &str) -> Vec<u8> {
        let (title, author) = (utf16(title), utf16(author));
        let mut body = Vec::new();
        for len in [title.len(), author.len(), 0, 0, 0] {
            body.extend_from_slice(&(len as u16).to_le_bytes());
        }
        body.extend(title);
        body.extend(author);
        object(&CONTENT_DESCRIPTION, &body)
    }

    /// Cabecera ASF con los objetos dados seguida de un objeto de datos arbitrario.
    pub(crate) fn asf(children: &[Vec<u8>], payload: &[u8]) -> Vec<u8> {
        let inner: Vec<u8> = children.concat();
        let mut file = HEADER_OBJECT.to_vec();
        file.extend_from_slice(&((inner.len() + 30) as u64).to_le_bytes());
        file.extend_from_slice(&(children.len() as u32).to_le_bytes());
        file.extend_from_slice(&[1, 2]);
        file.extend(inner);
        file.extend_from_slice(payload);
        file
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{asf, content_description};
    use super::*;

    #[test]
    fn content_description_is_read() -> Result<(), Box<dyn std::error::Error>> {
        let data = asf(&[content_description("Secreto", "Alice")], b"data");
        let found = entries(&data)?;
        assert_eq!(
            found,
            vec![
                ("Title".to_string(), "Secreto".to_string()),
                ("Author".to_string(), "Alice".to_string()),
            ]
        );
        Ok(())
    }

    #[test]
    fn truncated_header_is_rejected() {
        let mut data = asf(&[content_description("Secreto", "Alice")], b"");
        data.truncate(40);
        assert!(strip(&data).is_err());
    }
}
