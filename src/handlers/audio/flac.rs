//! FLAC nativo: se descartan los bloques de comentarios e imágenes.

use super::bytes::{be_u24, be_u32};
use super::vorbis;

const STREAMINFO: u8 = 0;
const VORBIS_COMMENT: u8 = 4;
const PICTURE: u8 = 6;
const INVALID: u8 = 127;
const LAST_BLOCK: u8 = 0x80;

#[derive(Clone, Copy, Debug)]
struct Block {
    kind: u8,
    /// Posición de la cabecera de 4 bytes.
    start: usize,
    end: usize,
}

fn parse_blocks(data: &[u8]) -> Result<Vec<Block>, String> {
    if !data.starts_with(b"fLaC") {
        return Err("falta la firma fLaC".to_string());
    }

    let mut blocks = Vec::new();
    let mut offset = 4;
    loop {
        let header = data
            .get(offset..offset + 4)
            .ok_or_else(|| "bloque de metadata FLAC truncado".to_string())?;
        let kind = header[0] & !LAST_BLOCK;
        if kind == INVALID {
            return Err("tipo de bloque FLAC inválido".to_string());
        }
        let length = be_u24(header, 1).unwrap_or(0) as usize;
        let end = offset + 4 + length;
        if end > data.len() {
            return Err("bloque de metadata FLAC truncado".to_string());
        }
        blocks.push(Block {
            kind,
            start: offset,
            end,
        });
        if header[0] & LAST_BLOCK != 0 {
            return Ok(blocks);
        }
        offset = end;
    }
}

/// Reescribe la cabecera de metadata sin comentarios ni imágenes; las tramas se copian tal cual.
pub(crate) fn strip(data: &[u8]) -> Result<Vec<u8>, String> {
    let blocks = parse_blocks(data)?;
    let audio_start = blocks.last().map(|block| block.end).unwrap_or(4);

    let kept: Vec<&Block> = blocks
        .iter()
        .filter(|block| !matches!(block.kind, VORBIS_COMMENT | PICTURE))
        .collect();
    if kept.first().map(|block| block.kind) != Some(STREAMINFO) {
        return Err("el primer bloque FLAC no es STREAMINFO".to_string());
    }

    let mut output = Vec::with_capacity(data.len());
    output.extend_from_slice(b"fLaC");
    for (index, block) in kept.iter().enumerate() {
        let last = if index + 1 == kept.len() { LAST_BLOCK } else { 0 };
        output.push(block.kind | last);
        output.extend_from_slice(&data[block.start + 1..block.end]);
    }
    output.extend_from_slice(&data[audio_start..]);
    Ok(output)
}

pub(crate) fn entries(data: &[u8]) -> Result<Vec<(String, String)>, String> {
    let mut entries = Vec::new();
    for block in parse_blocks(data)? {
        let payload = &data[block.start + 4..block.end];
        match block.kind {
            VORBIS_COMMENT => entries.extend(vorbis::entries(payload)),
            PICTURE => entries.push(("PICTURE".to_string(), describe_picture(payload))),
            _ => {}
        }
    }
    Ok(entries)
}

fn describe_picture(payload: &[u8]) -> String {
    let mime = be_u32(payload, 4)
        .and_then(|len| payload.get(8..8 + len as usize))
        .map(|mime| String::from_utf8_lossy(mime).into_owned())
        .unwrap_or_default();
    format!("{mime} ({} bytes)", payload.len())
}


#[cfg(test)]
mod tests {
    use super::fixtures::block;
    use super::*;
    use crate::handlers::audio::vorbis::fixtures::comment_block;

    #[test]
    fn last_flag_moves_to_the_last_kept_block() -> Result<(), Box<dyn std::error::Error>> {
        let mut data = b"fLaC".to_vec();
        data.extend(block(STREAMINFO, false, &[7; 34]));
        data.extend(block(VORBIS_COMMENT, true, &comment_block("x", &["A=b"])));
        data.extend_from_slice(&[0xFF, 0xF8, 1, 2, 3]);

        let cleaned = strip(&data)?;
        let blocks = parse_blocks(&cleaned)?;
        assert_eq!(blocks.len(), 1);
        assert_eq!(cleaned[4], STREAMINFO | LAST_BLOCK);
        assert!(cleaned.ends_with(&[0xFF, 0xF8, 1, 2, 3]));
        Ok(())
    }

    #[test]
    fn missing_streaminfo_is_rejected() {
        let mut data = b"fLaC".to_vec();
        data.extend(block(PICTURE, true, &[0; 8]));
        assert!(strip(&data).is_err());
    }
}
