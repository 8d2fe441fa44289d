use chrono::{DateTime, Utc};
use std::io::{Read, Seek};
use tracing::{debug, warn};
use xmltree::{Element, Namespace};

use crate::classify::Family;
use crate::error::CleanError;
use crate::file::read_from_start;

use super::OfficeKind;
use super::archive::{open_package, rewrite_package};
use super::properties::{
    APP_PART, CLEAN_REVISION, CLEARED_FIELDS, CONTENT_TYPES_PART, CORE_CONTENT_TYPE, CORE_PART,
    CORE_RELATIONSHIP, CREATED, EMPTY_CONTENT_TYPES, EMPTY_CORE, EMPTY_RELS, MODIFIED, Part,
    REVISION, ROOT_RELS_PART, TIMESTAMP_FORMAT, XSI_NS,
};
use super::xml::{append_entry, child_elements, parse_part, set_field, write_part};

/// Vacía las propiedades de autoría del documento y devuelve el paquete reescrito.
///
/// La revisión queda en `1` y las fechas de creación y modificación pasan a ser el
/// instante de la limpieza, también en documentos que no traían `docProps/core.xml`.
/// Las propiedades personalizadas no se tocan.
pub fn strip_office<R: Read + Seek>(reader: &mut R, format_tag: &str) -> Result<Vec<u8>, CleanError> {
    let kind = OfficeKind::from_tag(format_tag)
        .ok_or_else(|| CleanError::UnsupportedOfficeFormat(format_tag.to_string()))?;

    let contents = read_from_start(reader).map_err(|e| {
        warn!(format = format_tag, error = %e, "no se pudo leer el documento");
        CleanError::Processing(Family::Office)
    })?;

    clean_package(&contents, kind, Utc::now()).map_err(|e| {
        warn!(format = format_tag, error = %e, "no se pudo limpiar el documento");
        CleanError::Processing(Family::Office)
    })
}

pub(crate) fn clean_package(
    contents: &[u8],
    kind: OfficeKind,
    now: DateTime<Utc>,
) -> Result<Vec<u8>, String> {
    let archive = open_package(contents)?;
    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    let has_part = |part: &str| names.iter().any(|name| name == part);

    let main_part = kind.main_part();
    if !has_part(main_part) {
        return Err(format!("El paquete no contiene {}", main_part));
    }

    let stamp = now.format(TIMESTAMP_FORMAT).to_string();
    let missing_core = !has_part(CORE_PART);
    let mut additions = Vec::new();
    if missing_core {
        additions.push((CORE_PART, clean_core(EMPTY_CORE.as_bytes(), &stamp)?));
        if !has_part(CONTENT_TYPES_PART) {
            additions.push((CONTENT_TYPES_PART, register_core_type(EMPTY_CONTENT_TYPES.as_bytes())?));
        }
        if !has_part(ROOT_RELS_PART) {
            additions.push((ROOT_RELS_PART, register_core_relationship(EMPTY_RELS.as_bytes())?));
        }
    }

    let mut touched = Vec::new();
    let cleaned = rewrite_package(contents, &additions, |name, part| match name {
        CORE_PART => {
            touched.push(CORE_PART);
            clean_core(&part, &stamp)
        }
        APP_PART => {
            touched.push(APP_PART);
            clean_app(&part)
        }
        CONTENT_TYPES_PART if missing_core => {
            touched.push(CONTENT_TYPES_PART);
            register_core_type(&part)
        }
        ROOT_RELS_PART if missing_core => {
            touched.push(ROOT_RELS_PART);
            register_core_relationship(&part)
        }
        _ => Ok(part),
    })?;

    debug!(
        kind = ?kind,
        parts = ?touched,
        created_core = missing_core,
        "propiedades de documento limpiadas"
    );
    Ok(cleaned)
}

/// Declara el tipo de contenido de `docProps/core.xml` si aún no figura.
fn register_core_type(contents: &[u8]) -> Result<Vec<u8>, String> {
    let mut root = parse_part(contents)?;
    let part_name = format!("/{CORE_PART}");
    let declared = child_elements(&root, "Override").any(|entry| {
        entry
            .attributes
            .get("PartName")
            .is_some_and(|name| name.eq_ignore_ascii_case(&part_name))
    });
    if !declared {
        append_entry(
            &mut root,
            "Override",
            &[("PartName", &part_name), ("ContentType", CORE_CONTENT_TYPE)],
        );
    }
    write_part(&root)
}

/// Enlaza `docProps/core.xml` desde las relaciones del paquete con un `Id` libre.
fn register_core_relationship(contents: &[u8]) -> Result<Vec<u8>, String> {
    let mut root = parse_part(contents)?;
    let relationships: Vec<&Element> = child_elements(&root, "Relationship").collect();
    if relationships
        .iter()
        .any(|rel| rel.attributes.get("Type").map(String::as_str) == Some(CORE_RELATIONSHIP))
    {
        return write_part(&root);
    }

    let taken: Vec<&str> = relationships
        .iter()
        .filter_map(|rel| rel.attributes.get("Id").map(String::as_str))
        .collect();
    let id = (1..=taken.len() + 1)
        .map(|n| format!("rId{n}"))
        .find(|candidate| !taken.contains(&candidate.as_str()))
        .ok_or_else(|| "No hay identificador de relación libre".to_string())?;

    append_entry(
        &mut root,
        "Relationship",
        &[("Id", &id), ("Type", CORE_RELATIONSHIP), ("Target", CORE_PART)],
    );
    write_part(&root)
}

fn clean_core(contents: &[u8], stamp: &str) -> Result<Vec<u8>, String> {
    let mut root = parse_part(contents)?;
    clear_fields(&mut root, Part::Core);
    set_field(&mut root, &REVISION, CLEAN_REVISION);

    root.namespaces
        .get_or_insert_with(Namespace::empty)
        .put("xsi", XSI_NS);
    for spec in [CREATED, MODIFIED] {
        if let Some(element) = set_field(&mut root, &spec, stamp) {
            mark_w3cdtf(element);
        }
    }

    write_part(&root)
}

fn clean_app(contents: &[u8]) -> Result<Vec<u8>, String> {
    let mut root = parse_part(contents)?;
    clear_fields(&mut root, Part::App);
    write_part(&root)
}

fn clear_fields(root: &mut Element, part: Part) {
    for field in CLEARED_FIELDS.iter().filter(|field| field.part == part) {
        set_field(root, &field.spec, field.value);
    }
}

/// Los atributos se leen sin prefijo; se reescribe el tipo con su prefijo `xsi`.
fn mark_w3cdtf(element: &mut Element) {
    element.attributes.remove("type");
    element
        .attributes
        .insert("xsi:type".to_string(), "dcterms:W3CDTF".to_string());
}
