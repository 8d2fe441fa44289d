//! Ogg Vorbis y Ogg Opus.
//!
//! El paquete de comentarios se sustituye por uno vacío. Las páginas de cabecera se
//! vuelven a paginar y cada página posterior del mismo flujo se renumera con su CRC
//! recalculado; las páginas de audio conservan su contenido y posición de gránulo.

use super::bytes::le_u32;
use super::vorbis;

const CAPTURE: &[u8; 4] = b"OggS";
const PAGE_HEADER_LEN: usize = 27;
const FLAG_CONTINUED: u8 = 0x01;
const NO_PACKET_ENDS: u64 = u64::MAX;

const CRC_TABLE: [u32; 256] = crc_table();

const fn crc_table() -> [u32; 256] {
    let mut table = [0_u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ 0x04C1_1DB7
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// CRC de página Ogg (polinomio 0x04C11DB7, sin reflejar, semilla 0).
pub(crate) fn crc32(data: &[u8]) -> u32 {
    data.iter().fold(0_u32, |crc, &b| {
        (crc << 8) ^ CRC_TABLE[(((crc >> 24) as u8) ^ b) as usize]
    })
}

#[derive(Clone, Copy, Debug)]
struct Page<'a> {
    serial: u32,
    lacing: &'a [u8],
    body: &'a [u8],
    raw: &'a [u8],
}

fn parse_pages(data: &[u8]) -> Result<Vec<Page<'_>>, String> {
    let mut pages = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        let header = data
            .get(offset..offset + PAGE_HEADER_LEN)
            .ok_or_else(|| "página Ogg truncada".to_string())?;
        if &header[..4] != CAPTURE || header[4] != 0 {
            return Err(format!("página Ogg inválida en el byte {offset}"));
        }
        let serial = le_u32(header, 14).unwrap_or(0);
        let segments = header[26] as usize;
        let lacing_start = offset + PAGE_HEADER_LEN;
        let body_start = lacing_start + segments;
        let lacing = data
            .get(lacing_start..body_start)
            .ok_or_else(|| "tabla de segmentos Ogg truncada".to_string())?;
        let body_len: usize = lacing.iter().map(|&b| b as usize).sum();
        let end = body_start + body_len;
        let body = data
            .get(body_start..end)
            .ok_or_else(|| "página Ogg truncada".to_string())?;
        pages.push(Page {
            serial,
            lacing,
            body,
            raw: &data[offset..end],
        });
        offset = end;
    }
    Ok(pages)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Codec {
    Vorbis,
    Opus,
}

impl Codec {
    fn detect(first_packet: &[u8]) -> Result<Self, String> {
        if first_packet.starts_with(b"\x01vorbis") {
            Ok(Codec::Vorbis)
        } else if first_packet.starts_with(b"OpusHead") {
            Ok(Codec::Opus)
        } else {
            Err("códec Ogg no soportado".to_string())
        }
    }

    fn header_packets(self) -> usize {
        match self {
            Codec::Vorbis => 3,
            Codec::Opus => 2,
        }
    }

    fn comment_magic(self) -> &'static [u8] {
        match self {
            Codec::Vorbis => b"\x03vorbis",
            Codec::Opus => b"OpusTags",
        }
    }

    fn comment_block(self, packet: &[u8]) -> Result<&[u8], String> {
        packet
            .strip_prefix(self.comment_magic())
            .ok_or_else(|| "el segundo paquete no es de comentarios".to_string())
    }

    fn empty_comment(self, packet: &[u8]) -> Result<Vec<u8>, String> {
        let block = self.comment_block(packet)?;
        let vendor = vorbis::vendor(block).ok_or_else(|| "comentario Ogg truncado".to_string())?;
        let mut rebuilt = self.comment_magic().to_vec();
        rebuilt.extend(vorbis::empty_block(vendor));
        if self == Codec::Vorbis {
            rebuilt.push(1);
        }
        Ok(rebuilt)
    }
}

/// Paquetes de cabecera del primer flujo lógico e índices de las páginas que los contienen.
struct Headers {
    serial: u32,
    codec: Codec,
    packets: Vec<Vec<u8>>,
    pages: Vec<usize>,
}

fn read_headers(pages: &[Page<'_>]) -> Result<Headers, String> {
    let first = pages.first().ok_or_else(|| "sin páginas Ogg".to_string())?;
    let serial = first.serial;
    let codec = Codec::detect(first.body)?;

    // La primera página lleva únicamente el paquete de identificación.
    let ends_on_first = first.lacing.iter().filter(|&&lace| lace < 255).count();
    if ends_on_first != 1 || first.lacing.last().is_none_or(|&lace| lace == 255) {
        return Err("la primera página Ogg no contiene solo la identificación".to_string());
    }

    let mut packets = Vec::new();
    let mut current = Vec::new();
    let mut header_pages = Vec::new();
    for (index, page) in pages.iter().enumerate().filter(|(_, page)| page.serial == serial) {
        header_pages.push(index);
        let mut pos = 0;
        for &lace in page.lacing {
            let len = lace as usize;
            current.extend_from_slice(&page.body[pos..pos + len]);
            pos += len;
            if lace < 255 {
                packets.push(std::mem::take(&mut current));
            }
        }
        if packets.len() >= codec.header_packets() {
            break;
        }
    }

    if packets.len() != codec.header_packets() || !current.is_empty() {
        return Err("las cabeceras Ogg no terminan en un límite de página".to_string());
    }
    Ok(Headers {
        serial,
        codec,
        packets,
        pages: header_pages,
    })
}

pub(crate) fn strip(data: &[u8]) -> Result<Vec<u8>, String> {
    let pages = parse_pages(data)?;
    let headers = read_headers(&pages)?;

    let mut rebuilt = vec![headers.codec.empty_comment(&headers.packets[1])?];
    rebuilt.extend(headers.packets[2..].iter().cloned());
    let header_pages = paginate(&rebuilt, headers.serial, 1);
    let mut next_sequence = 1 + header_pages.len() as u32;

    let first_header = headers.pages[0];
    let second_header = headers.pages[1];
    let last_header = headers.pages[headers.pages.len() - 1];

    let mut output = Vec::with_capacity(data.len());
    for (index, page) in pages.iter().enumerate() {
        if page.serial != headers.serial || index == first_header {
            output.extend_from_slice(page.raw);
        } else if index == second_header {
            for rebuilt_page in &header_pages {
                output.extend_from_slice(rebuilt_page);
            }
        } else if index > last_header {
            output.extend(renumber(page.raw, next_sequence));
            next_sequence += 1;
        }
    }
    Ok(output)
}

pub(crate) fn entries(data: &[u8]) -> Result<Vec<(String, String)>, String> {
    let pages = parse_pages(data)?;
    let headers = read_headers(&pages)?;
    let block = headers.codec.comment_block(&headers.packets[1])?;
    Ok(vorbis::entries(block))
}

/// Reparte `packets` en páginas nuevas del flujo `serial`, numeradas desde `first_sequence`.
fn paginate(packets: &[Vec<u8>], serial: u32, first_sequence: u32) -> Vec<Vec<u8>> {
    let mut pages = Vec::new();
    let mut lacing: Vec<u8> = Vec::new();
    let mut body: Vec<u8> = Vec::new();
    let mut continued = false;
    let mut sequence = first_sequence;

    for packet in packets {
        let mut segments: Vec<&[u8]> = packet.chunks(255).collect();
        if packet.len() % 255 == 0 {
            segments.push(&[]);
        }
        for (index, segment) in segments.iter().enumerate() {
            if lacing.len() == 255 {
                pages.push(encode_page(continued, serial, sequence, &lacing, &body));
                sequence += 1;
                lacing.clear();
                body.clear();
                continued = index > 0;
            }
            lacing.push(segment.len() as u8);
            body.extend_from_slice(segment);
        }
    }
    if !lacing.is_empty() {
        pages.push(encode_page(continued, serial, sequence, &lacing, &body));
    }
    pages
}

fn encode_page(continued: bool, serial: u32, sequence: u32, lacing: &[u8], body: &[u8]) -> Vec<u8> {
    let granule = if lacing.iter().any(|&lace| lace < 255) {
        0
    } else {
        NO_PACKET_ENDS
    };

    let mut page = Vec::with_capacity(PAGE_HEADER_LEN + lacing.len() + body.len());
    page.extend_from_slice(CAPTURE);
    page.push(0);
    page.push(if continued { FLAG_CONTINUED } else { 0 });
    page.extend_from_slice(&granule.to_le_bytes());
    page.extend_from_slice(&serial.to_le_bytes());
    page.extend_from_slice(&sequence.to_le_bytes());
    page.extend_from_slice(&[0; 4]);
    page.push(lacing.len() as u8);
    page.extend_from_slice(lacing);
    page.extend_from_slice(body);

    let crc = crc32(&page);
    page[22..26].copy_from_slice(&crc.to_le_bytes());
    page
}

fn renumber(raw: &[u8], sequence: u32) -> Vec<u8> {
    let mut page = raw.to_vec();
    page[18..22].copy_from_slice(&sequence.to_le_bytes());
    page[22..26].copy_from_slice(&[0; 4]);
    let crc = crc32(&page);
    page[22..26].copy_from_slice(&crc.to_le_bytes());
    page
}

/// Posición de gránulo de una página ya validada.
#[cfg(test)]
pub(crate) fn granule(raw: &[u8]) -> Option<u64> {
    super::bytes::le_u64(raw, 6)
}

#[cfg(test)]
pub(crate) fn parse_raw_pages(data: &[u8]) -> Result<Vec<Vec<u8>>, String> {
    Ok(parse_pages(data)?.iter().map(|page| page.raw.to_vec()).collect())
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// Página con un paquete completo por entrada de `packets`.
    pub(crate) fn page(serial: u32, sequence: u32, granule: u64, first: bool, packets: &[&[u8]]) -> Vec<u8> {
        let mut lacing = Vec::new();
        let mut body = Vec::new();
        for packet in packets {
            let mut remaining = packet.len();
            while remaining >= 255 {
                lacing.push(255);
                remaining -= 255;
            }
            lacing.push(remaining as u8);
            body.extend_from_slice(packet);
        }

        let mut page = b"OggS".to_vec();
        page.push(0);
        page.push(if first { 0x02 } else { 0 });
        page.extend_from_slice(&granule.to_le_bytes());
        page.extend_from_slice(&serial.to_le_bytes());
        page.extend_from_slice(&sequence.to_le_bytes());
        page.extend_from_slice(&[0; 4]);
        page.push(lacing.len() as u8);
        page.extend_from_slice(&lacing);
        page.extend_from_slice(&body);
        let crc = super::crc32(&page);
        page[22..26].copy_from_slice(&crc.to_le_bytes());
        page
    }
}
