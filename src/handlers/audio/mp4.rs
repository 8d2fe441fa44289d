//! MP4/M4A: las cajas `udta` y `meta` se convierten en `free` del mismo tamaño.
//!
//! No se mueve ningún byte, así que las tablas de offsets (`stco`/`co64`) siguen
//! apuntando a las muestras correctas.

use super::bytes::{be_u32, be_u64};

#[derive(Clone, Copy, Debug)]
struct Atom {
    kind: [u8; 4],
    start: usize,
    header_len: usize,
    end: usize,
}

impl Atom {
    fn body<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.start + self.header_len..self.end]
    }

    fn body_range(&self) -> (usize, usize) {
        (self.start + self.header_len, self.end)
    }
}

fn atoms(data: &[u8], from: usize, to: usize) -> Result<Vec<Atom>, String> {
    let mut atoms = Vec::new();
    let mut offset = from;
    while offset + 8 <= to {
        let size = be_u32(data, offset).unwrap_or(0) as usize;
        let mut kind = [0_u8; 4];
        kind.copy_from_slice(&data[offset + 4..offset + 8]);

        let (header_len, end) = match size {
            0 => (8, to),
            1 => {
                let large = be_u64(data, offset + 8)
                    .ok_or_else(|| "caja MP4 de 64 bits truncada".to_string())?;
                (16, offset.saturating_add(large as usize))
            }
            _ => (8, offset + size),
        };
        if end < offset + header_len || end > to {
            return Err(format!(
                "caja MP4 '{}' con tamaño inválido",
                String::from_utf8_lossy(&kind)
            ));
        }
        atoms.push(Atom {
            kind,
            start: offset,
            header_len,
            end,
        });
        offset = end;
    }
    Ok(atoms)
}

fn find<'a>(atoms: &'a [Atom], kind: &[u8; 4]) -> Option<&'a Atom> {
    atoms.iter().find(|atom| &atom.kind == kind)
}

fn movie(data: &[u8]) -> Result<Atom, String> {
    let top = atoms(data, 0, data.len())?;
    if top.first().map(|atom| &atom.kind) != Some(b"ftyp") {
        return Err("falta la caja ftyp".to_string());
    }
    find(&top, b"moov")
        .copied()
        .ok_or_else(|| "falta la caja moov".to_string())
}

pub(crate) fn strip(data: &[u8]) -> Result<Vec<u8>, String> {
    let moov = movie(data)?;
    let (moov_start, moov_end) = moov.body_range();

    let mut output = data.to_vec();
    for child in atoms(data, moov_start, moov_end)? {
        match &child.kind {
            b"udta" | b"meta" => blank(&mut output, &child),
            b"trak" => {
                let (start, end) = child.body_range();
                for grandchild in atoms(data, start, end)? {
                    if matches!(&grandchild.kind, b"udta" | b"meta") {
                        blank(&mut output, &grandchild);
                    }
                }
            }
            _ => {}
        }
    }
    Ok(output)
}

/// Convierte la caja en `free` y borra su contenido.
fn blank(output: &mut [u8], atom: &Atom) {
    output[atom.start + 4..atom.start + 8].copy_from_slice(b"free");
    output[atom.start + atom.header_len..atom.end].fill(0);
}

pub(crate) fn entries(data: &[u8]) -> Result<Vec<(String, String)>, String> {
    let moov = movie(data)?;
    let (moov_start, moov_end) = moov.body_range();
    let children = atoms(data, moov_start, moov_end)?;

    let mut entries = Vec::new();
    let mut metas = Vec::new();
    if let Some(udta) = find(&children, b"udta") {
        let (start, end) = udta.body_range();
        metas.extend(atoms(data, start, end)?.into_iter().filter(|a| &a.kind == b"meta"));
    }
    metas.extend(find(&children, b"meta").copied());

    for meta in metas {
        // `meta` es una caja completa: versión y banderas antes de los hijos.
        let (start, end) = meta.body_range();
        let Some(children_start) = start.checked_add(4).filter(|&s| s <= end) else {
            continue;
        };
        let meta_children = atoms(data, children_start, end)?;
        if let Some(ilst) = find(&meta_children, b"ilst") {
            let (start, end) = ilst.body_range();
            for item in atoms(data, start, end)? {
                if let Some(entry) = describe_item(data, &item)? {
                    entries.push(entry);
                }
            }
        }
    }
    Ok(entries)
}

fn describe_item(data: &[u8], item: &Atom) -> Result<Option<(String, String)>, String> {
    let (start, end) = item.body_range();
    let children = atoms(data, start, end)?;

    let mut key: String = item.kind.iter().map(|&b| char::from(b)).collect();
    if &item.kind == b"----" {
        let text = |kind: &[u8; 4]| {
            find(&children, kind)
                .and_then(|atom| atom.body(data).get(4..))
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                .unwrap_or_default()
        };
        key = format!("----:{}:{}", text(b"mean"), text(b"name"));
    }

    let Some(value) = find(&children, b"data") else {
        return Ok(None);
    };
    let body = value.body(data);
    let Some(type_code) = be_u32(body, 0) else {
        return Ok(None);
    };
    let payload = body.get(8..).unwrap_or_default();

    let value = match (type_code & 0x00FF_FFFF, &item.kind) {
        (1, _) => String::from_utf8_lossy(payload).into_owned(),
        (13 | 14, _) => format!("imagen ({} bytes)", payload.len()),
        (21, _) => match payload.len() {
            1 => (payload[0] as i8).to_string(),
            2 => i16::from_be_bytes([payload[0], payload[1]]).to_string(),
            4 => i32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]).to_string(),
            _ => format!("{} bytes", payload.len()),
        },
        (0, b"trkn" | b"disk") if payload.len() >= 6 => {
            let number = u16::from_be_bytes([payload[2], payload[3]]);
            let total = u16::from_be_bytes([payload[4], payload[5]]);
            format!("{number}/{total}")
        }
        _ => format!("{} bytes", payload.len()),
    };
    Ok(Some((key, value)))
}

#[cfg(test)]
pub(crate) mod fixtures {
    pub(crate) fn atom(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut atom = ((body.len() + 8) as u32).to_be_bytes().to_vec();
        atom.extend_from_slice(kind);
        atom.extend_from_slice(body);
        atom
    }

    pub(crate) fn text_item(kind: &[u8; 4], text: &str) -> Vec<u8> {
        let mut data = 1_u32.to_be_bytes().to_vec();
        data.extend_from_slice(&0_u32.to_be_bytes());
        data.extend_from_slice(text.as_bytes());
        atom(kind, &atom(b"data", &data))
    }

    /// `ftyp` + `moov` con `udta/meta/ilst` + `mdat`.
    pub(crate) fn m4a(items: &[u8], samples: &[u8]) -> Vec<u8> {
        let ilst = atom(b"ilst", items);
        let mut meta_body = vec![0_u8; 4];
        meta_body.extend(atom(b"hdlr", &[0; 25]));
        meta_body.extend(ilst);
        let udta = atom(b"udta", &atom(b"meta", &meta_body));

        let mut moov_body = atom(b"mvhd", &[0; 100]);
        moov_body.extend(atom(b"trak", &atom(b"tkhd", &[0; 84])));
        moov_body.extend(udta);

        let mut file = atom(b"ftyp", b"M4A \x00\x00\x00\x00M4A isom");
        file.extend(atom(b"moov", &moov_body));
        file.extend(atom(b"mdat", samples));
        file
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{atom, m4a, text_item};
    use super::*;

    #[test]
    fn items_are_read_from_ilst() -> Result<(), Box<dyn std::error::Error>> {
        let mut items = text_item(b"\xa9nam", "Secreto");
        items.extend(text_item(b"\xa9ART", "Alice"));
        let data = m4a(&items, b"samples");

        let found = entries(&data)?;
        assert!(found.contains(&("\u{a9}nam".to_string(), "Secreto".to_string())));
        assert!(found.contains(&("\u{a9}ART".to_string(), "Alice".to_string())));
        Ok(())
    }

    #[test]
    fn oversized_atom_is_rejected() {
        let mut data = atom(b"ftyp", b"M4A ");
        data.extend_from_slice(&1000_u32.to_be_bytes());
        data.extend_from_slice(b"moov");
        assert!(strip(&data).is_err());
    }
}
