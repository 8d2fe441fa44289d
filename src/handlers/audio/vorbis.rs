//! Bloques de comentarios Vorbis, compartidos por FLAC, Ogg Vorbis y Opus.

use super::bytes::le_u32;

/// Cadena del codificador al inicio del bloque, sin los comentarios.
pub(crate) fn vendor(block: &[u8]) -> Option<&[u8]> {
    let vendor_len = le_u32(block, 0)? as usize;
    block.get(4..4 + vendor_len)
}

/// Bloque sin comentarios que conserva la cadena del codificador.
pub(crate) fn empty_block(vendor: &[u8]) -> Vec<u8> {
    let mut block = Vec::with_capacity(vendor.len() + 8);
    block.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    block.extend_from_slice(vendor);
    block.extend_from_slice(&0_u32.to_le_bytes());
    block
}

/// Comentarios `CAMPO=valor`, con el campo en mayúsculas.
pub(crate) fn entries(block: &[u8]) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    let Some(vendor) = vendor(block) else {
        return entries;
    };
    let mut offset = 4 + vendor.len();
    let Some(count) = le_u32(block, offset) else {
        return entries;
    };
    offset += 4;

    for _ in 0..count {
        let Some(len) = le_u32(block, offset) else {
            break;
        };
        let start = offset + 4;
        let end = start + len as usize;
        let Some(raw) = block.get(start..end) else {
            break;
        };
        let entry = String::from_utf8_lossy(raw);
        if let Some((key, value)) = entry.split_once('=') {
            entries.push((key.to_uppercase(), value.to_string()));
        }
        offset = end;
    }
    entries
}


#[cfg(test)]
mod tests {
    use super::fixtures::comment_block;
    use super::*;

    #[test]
    fn keys_are_upper_cased() {
        let block = comment_block("libVorbis", &["title=Secreto", "ARTIST=Alice"]);
        assert_eq!(
            entries(&block),
            vec![
                ("TITLE".to_string(), "Secreto".to_string()),
                ("ARTIST".to_string(), "Alice".to_string()),
            ]
        );
    }

    #[test]
    fn empty_block_keeps_vendor() {
        let block = empty_block(b"libVorbis");
        assert_eq!(vendor(&block), Some(&b"libVorbis"[..]));
        assert!(entries(&block).is_empty());
    }
}
