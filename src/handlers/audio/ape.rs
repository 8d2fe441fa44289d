//! Etiquetas APEv1/APEv2 al final del flujo.

use super::bytes::le_u32;

const PREAMBLE: &[u8; 8] = b"APETAGEX";
const FOOTER_LEN: usize = 32;
const HAS_HEADER: u32 = 1 << 31;

/// Posición de una etiqueta APE dentro del flujo.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct ApeTag {
    /// Inicio de la etiqueta, incluida la cabecera opcional.
    pub(crate) start: usize,
    items_start: usize,
    items_end: usize,
    item_count: u32,
}

/// Busca una etiqueta cuyo pie termine exactamente en `end`.
pub(crate) fn find_tag(data: &[u8], end: usize) -> Option<ApeTag> {
    let footer_start = end.checked_sub(FOOTER_LEN)?;
    let footer = data.get(footer_start..end)?;
    if &footer[..8] != PREAMBLE {
        return None;
    }
    let size = le_u32(footer, 12)? as usize;
    let item_count = le_u32(footer, 16)?;
    let flags = le_u32(footer, 20)?;
    if size < FOOTER_LEN {
        return None;
    }

    let header_len = if flags & HAS_HEADER != 0 { FOOTER_LEN } else { 0 };
    let items_start = end.checked_sub(size)?;
    let start = items_start.checked_sub(header_len)?;
    Some(ApeTag {
        start,
        items_start,
        items_end: footer_start,
        item_count,
    })
}

pub(crate) fn entries(data: &[u8], tag: &ApeTag) -> Vec<(String, String)> {
    let items = &data[tag.items_start..tag.items_end];
    let mut entries = Vec::new();
    let mut offset = 0;

    for _ in 0..tag.item_count {
        let (Some(value_len), Some(flags)) = (le_u32(items, offset), le_u32(items, offset + 4))
        else {
            break;
        };
        let key_start = offset + 8;
        let Some(key_len) = items.get(key_start..).and_then(|rest| rest.iter().position(|&b| b == 0))
        else {
            break;
        };
        let value_start = key_start + key_len + 1;
        let value_end = value_start + value_len as usize;
        let Some(value) = items.get(value_start..value_end) else {
            break;
        };

        let key = format!("APE:{}", String::from_utf8_lossy(&items[key_start..key_start + key_len]));
        let value = match (flags >> 1) & 0x03 {
            1 => format!("{} bytes", value.len()),
            _ => String::from_utf8_lossy(value)
                .trim_end_matches('\0')
                .replace('\0', "; "),
        };
        entries.push((key, value));
        offset = value_end;
    }
    entries
}


#[cfg(test)]
mod tests {
    use super::fixtures::apev2_tag;
    use super::*;

    #[test]
    fn finds_tag_with_header() {
        let mut data = b"audio-frames".to_vec();
        let audio_len = data.len();
        data.extend_from_slice(&apev2_tag(&[("Artist", "Alice"), ("Title", "Secreto")]));

        let tag = find_tag(&data, data.len()).expect("se esperaba una etiqueta APE");
        assert_eq!(tag.start, audio_len);
        assert_eq!(
            entries(&data, &tag),
            vec![
                ("APE:Artist".to_string(), "Alice".to_string()),
                ("APE:Title".to_string(), "Secreto".to_string()),
            ]
        );
    }

    #[test]
    fn ignores_streams_without_tag() {
        let data = vec![0_u8; 64];
        assert_eq!(find_tag(&data, data.len()), None);
    }
}
