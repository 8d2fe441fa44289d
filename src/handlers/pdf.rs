//! Limpieza de PDFs reconstruyendo el catálogo y el árbol de páginas.
//!
//! Las páginas se conservan tal cual (contenido, fuentes, imágenes); lo que no se copia
//! al documento nuevo es el diccionario `Info`, el flujo XMP del catálogo y cualquier
//! otra entrada del catálogo original.

use lopdf::{Dictionary, Document, Object, ObjectId, dictionary};
use std::io::{Read, Seek};
use tracing::{debug, warn};

use crate::classify::Family;
use crate::error::CleanError;
use crate::file::{MetadataReport, read_from_start};

/// Atributos que una página puede heredar de sus nodos `Pages` ancestros.
const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Límite de profundidad al recorrer el árbol de páginas.
const MAX_TREE_DEPTH: usize = 64;

pub fn strip_pdf<R: Read + Seek>(reader: &mut R) -> Result<Vec<u8>, CleanError> {
    strip_pdf_inner(reader).map_err(|e| {
        warn!(error = %e, "no se pudo limpiar el PDF");
        CleanError::Processing(Family::Pdf)
    })
}

fn strip_pdf_inner<R: Read + Seek>(reader: &mut R) -> Result<Vec<u8>, String> {
    let contents = read_from_start(reader).map_err(|e| format!("No se pudo leer el PDF: {e}"))?;
    let mut doc =
        Document::load_mem(&contents).map_err(|e| format!("PDF inválido: {e}"))?;

    if doc.is_encrypted() {
        return Err("PDF cifrado".to_string());
    }

    let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
    if pages.is_empty() {
        return Err("el PDF no contiene páginas".to_string());
    }

    let flattened: Vec<(ObjectId, Vec<(Vec<u8>, Object)>)> = pages
        .iter()
        .map(|&page_id| inherited_attributes(&doc, page_id).map(|attrs| (page_id, attrs)))
        .collect::<Result<_, _>>()?;

    drop_document_metadata(&mut doc);

    let pages_id = doc.new_object_id();
    for (page_id, attributes) in flattened {
        let page = doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| format!("página {page_id:?} ilegible: {e}"))?;
        for (key, value) in attributes {
            page.set(key, value);
        }
        page.set("Parent", pages_id);
        page.remove(b"Metadata");
    }

    let kids: Vec<Object> = pages.iter().map(|&id| Object::Reference(id)).collect();
    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });

    doc.trailer = Dictionary::new();
    doc.trailer.set("Root", catalog_id);
    let pruned = doc.prune_objects();
    doc.trailer.set("Size", i64::from(doc.max_id + 1));
    debug!(pages = page_count, pruned = pruned.len(), "árbol de páginas reconstruido");

    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| format!("No se pudo escribir el PDF limpio: {e}"))?;
    Ok(output)
}

/// Elimina del documento el diccionario `Info`, el XMP del catálogo y el catálogo original.
fn drop_document_metadata(doc: &mut Document) {
    if let Ok(Object::Reference(info_id)) = doc.trailer.get(b"Info") {
        let info_id = *info_id;
        doc.objects.remove(&info_id);
    }

    let Ok(root_id) = doc.trailer.get(b"Root").and_then(Object::as_reference) else {
        return;
    };
    if let Ok(Object::Reference(xmp_id)) =
        doc.get_dictionary(root_id).and_then(|root| root.get(b"Metadata"))
    {
        let xmp_id = *xmp_id;
        doc.objects.remove(&xmp_id);
    }
    doc.objects.remove(&root_id);
}

/// Busca en los ancestros los atributos heredables que la página no define por sí misma.
fn inherited_attributes(
    doc: &Document,
    page_id: ObjectId,
) -> Result<Vec<(Vec<u8>, Object)>, String> {
    let page = doc
        .get_dictionary(page_id)
        .map_err(|e| format!("página {page_id:?} ilegible: {e}"))?;

    let mut missing: Vec<&[u8]> = INHERITABLE_KEYS
        .iter()
        .copied()
        .filter(|key| !page.has(key))
        .collect();
    let mut found = Vec::new();
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();

    for _ in 0..MAX_TREE_DEPTH {
        let Some(parent_id) = parent else { break };
        if missing.is_empty() {
            break;
        }
        let Ok(node) = doc.get_dictionary(parent_id) else {
            break;
        };
        missing.retain(|key| match node.get(key) {
            Ok(value) => {
                found.push((key.to_vec(), value.clone()));
                false
            }
            Err(_) => true,
        });
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }

    Ok(found)
}

/// Devuelve el diccionario `Info` sin normalizar, con las claves en la forma `/Author`.
pub fn inspect_pdf<R: Read + Seek>(reader: &mut R) -> MetadataReport {
    let contents = match read_from_start(reader) {
        Ok(contents) => contents,
        Err(e) => {
            warn!(error = %e, "no se pudo leer el PDF");
            return MetadataReport::error("Error reading PDF file.");
        }
    };
    let doc = match Document::load_mem(&contents) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(error = %e, "PDF inválido");
            return MetadataReport::error("Error reading PDF file.");
        }
    };

    let Some(info) = doc
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|obj| deref_dictionary(&doc, obj))
    else {
        return MetadataReport::from_entries(Vec::<(String, String)>::new());
    };

    let entries = info.iter().filter_map(|(key, value)| {
        let value = object_to_string(&doc, value)?;
        Some((format!("/{}", String::from_utf8_lossy(key)), value))
    });
    MetadataReport::from_entries(entries)
}

fn deref_dictionary<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match obj {
        Object::Reference(reference) => doc.get_dictionary(*reference).ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

fn object_to_string(doc: &Document, obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes, _) => Some(decode_text_string(bytes).trim().to_string()),
        Object::Name(name) => Some(String::from_utf8_lossy(name).trim().to_string()),
        Object::Integer(value) => Some(value.to_string()),
        Object::Real(value) => Some(value.to_string()),
        Object::Boolean(value) => Some(value.to_string()),
        Object::Reference(reference) => doc
            .get_object(*reference)
            .ok()
            .and_then(|inner| object_to_string(doc, inner)),
        _ => None,
    }
}

/// Decodifica una cadena de texto PDF: UTF-16BE con BOM o bytes tratados como Latin-1.
fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::Stream;
    use std::io::Cursor;

    const XMP_PACKET: &[u8] =
        b"<x:xmpmeta xmlns:x=\"adobe:ns:meta/\"><dc:creator>Alice XMP</dc:creator></x:xmpmeta>";

    fn sample_pdf(page_count: usize) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
        for index in 0..page_count {
            let content = format!("BT /F1 24 Tf 72 720 Td (Page {}) Tj ET", index + 1);
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => page_count as i64,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );

        let xmp_id = doc.add_object(Stream::new(
            dictionary! { "Type" => "Metadata", "Subtype" => "XML" },
            XMP_PACKET.to_vec(),
        ));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
            "Metadata" => xmp_id,
        });
        let info_id = doc.add_object(dictionary! {
            "Author" => Object::string_literal("Alice"),
            "Producer" => Object::string_literal("Suite Ofimática 9"),
            "Title" => Object::string_literal("Informe"),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);

        let mut output = Vec::new();
        doc.save_to(&mut output)?;
        Ok(output)
    }

    #[test]
    fn inspect_returns_info_dictionary() -> Result<(), Box<dyn std::error::Error>> {
        let source = sample_pdf(1)?;
        let report = inspect_pdf(&mut Cursor::new(source));
        let metadata = report.metadata().ok_or("se esperaba metadata")?;
        assert_eq!(metadata.get("/Author").map(String::as_str), Some("Alice"));
        assert_eq!(metadata.get("/Title").map(String::as_str), Some("Informe"));
        Ok(())
    }

    #[test]
    fn strip_keeps_pages_in_order_and_drops_metadata() -> Result<(), Box<dyn std::error::Error>> {
        let source = sample_pdf(3)?;
        let cleaned = strip_pdf(&mut Cursor::new(source.clone()))?;

        let before = Document::load_mem(&source)?;
        let after = Document::load_mem(&cleaned)?;

        let before_pages: Vec<ObjectId> = before.get_pages().into_values().collect();
        let after_pages: Vec<ObjectId> = after.get_pages().into_values().collect();
        assert_eq!(before_pages.len(), after_pages.len());
        for (old, new) in before_pages.iter().zip(&after_pages) {
            assert_eq!(before.get_page_content(*old)?, after.get_page_content(*new)?);
        }

        assert!(after.trailer.get(b"Info").is_err());
        let root = after.trailer.get(b"Root").and_then(Object::as_reference)?;
        assert!(after.get_dictionary(root)?.get(b"Metadata").is_err());

        let raw = String::from_utf8_lossy(&cleaned);
        assert!(!raw.contains("Alice"));
        assert!(!raw.contains("Informe"));

        let report = inspect_pdf(&mut Cursor::new(cleaned));
        assert_eq!(report.metadata().map(|m| m.len()), Some(0));
        Ok(())
    }

    #[test]
    fn inherited_media_box_is_flattened() -> Result<(), Box<dyn std::error::Error>> {
        let cleaned = strip_pdf(&mut Cursor::new(sample_pdf(2)?))?;
        let after = Document::load_mem(&cleaned)?;
        for page_id in after.get_pages().into_values() {
            let page = after.get_dictionary(page_id)?;
            assert!(page.has(b"MediaBox"));
            assert!(page.has(b"Resources"));
        }
        Ok(())
    }

    #[test]
    fn malformed_pdf_fails_with_500() {
        let err = strip_pdf(&mut Cursor::new(b"%PDF-1.4 garbage".to_vec()))
            .expect_err("un PDF truncado no debería procesarse");
        assert_eq!(err.to_string(), "Error processing PDF file.");
        assert_eq!(err.status_code(), 500);

        assert!(inspect_pdf(&mut Cursor::new(b"nope".to_vec())).is_error());
    }

    #[test]
    fn utf16_strings_are_decoded() {
        let bytes = [0xFE, 0xFF, 0x00, 0x41, 0x00, 0xF1];
        assert_eq!(decode_text_string(&bytes), "Añ");
    }
}
