use std::io::{Read, Seek};
use tracing::warn;
use xmltree::{Element, XMLNode};

use crate::file::{MetadataReport, read_from_start};

use super::OfficeKind;
use super::archive::{open_package, read_part};
use super::properties::{
    APP_PART, APPLICATION, CLEARED_FIELDS, CORE_PART, CREATED, CUSTOM_NS, CUSTOM_PART,
    LAST_PRINTED, MODIFIED, Part, REVISION,
};
use super::xml::{FieldSpec, element_text_content, find_field, parse_part};

/// Lee propiedades núcleo, de aplicación y personalizadas del documento.
pub fn inspect_office<R: Read + Seek>(reader: &mut R, format_tag: &str) -> MetadataReport {
    if OfficeKind::from_tag(format_tag).is_none() {
        return MetadataReport::error(format!("Unsupported Office file format: {format_tag}"));
    }

    let collected = read_from_start(reader)
        .map_err(|e| e.to_string())
        .and_then(|contents| collect_properties(&contents));
    match collected {
        Ok(entries) => MetadataReport::from_entries(entries),
        Err(e) => {
            warn!(format = format_tag, error = %e, "no se pudieron leer las propiedades");
            MetadataReport::error("Error reading Office file.")
        }
    }
}

fn collect_properties(contents: &[u8]) -> Result<Vec<(String, String)>, String> {
    let mut archive = open_package(contents)?;
    let mut entries = Vec::new();

    if let Some(core) = read_part(&mut archive, CORE_PART)? {
        let root = parse_part(&core)?;
        let extra = [
            ("revision", REVISION),
            ("created", CREATED),
            ("modified", MODIFIED),
            ("last_printed", LAST_PRINTED),
        ];
        collect_fields(&root, Part::Core, &extra, &mut entries);
    }

    if let Some(app) = read_part(&mut archive, APP_PART)? {
        let root = parse_part(&app)?;
        collect_fields(&root, Part::App, &[("application", APPLICATION)], &mut entries);
    }

    if let Some(custom) = read_part(&mut archive, CUSTOM_PART)? {
        let root = parse_part(&custom)?;
        for (name, value) in custom_properties(&root) {
            entries.push((format!("custom:{}", name), value));
        }
    }

    Ok(entries)
}

/// Añade los campos con texto; los alias de un mismo nodo se reportan una sola vez.
fn collect_fields(
    root: &Element,
    part: Part,
    extra: &[(&'static str, FieldSpec)],
    entries: &mut Vec<(String, String)>,
) {
    let mut seen: Vec<FieldSpec> = Vec::new();
    let table = CLEARED_FIELDS
        .iter()
        .filter(|field| field.part == part)
        .map(|field| (field.name, field.spec));

    for (name, spec) in table.chain(extra.iter().copied()) {
        if seen.iter().any(|known| known.same_node(&spec)) {
            continue;
        }
        seen.push(spec);

        if let Some(element) = find_field(root, &spec) {
            let value = element_text_content(element);
            if !value.is_empty() {
                entries.push((name.to_string(), value));
            }
        }
    }
}

fn custom_properties(root: &Element) -> Vec<(String, String)> {
    let mut props = Vec::new();
    for node in &root.children {
        let XMLNode::Element(child) = node else {
            continue;
        };
        if child.name != "property" || child.namespace.as_deref() != Some(CUSTOM_NS) {
            continue;
        }
        let name = match child.attributes.get("name") {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => continue,
        };
        let value = child
            .children
            .iter()
            .find_map(|node| match node {
                XMLNode::Element(value_node) => Some(element_text_content(value_node)),
                _ => None,
            })
            .unwrap_or_default();
        props.push((name, value));
    }
    props
}
