//! Tabla de propiedades de documento que se vacían al limpiar.

use super::xml::FieldSpec;

pub(crate) const DC_NS: &str = "http://purl.org/dc/elements/1.1/";
pub(crate) const CP_NS: &str =
    "http://schemas.openxmlformats.org/package/2006/metadata/core-properties";
pub(crate) const DCTERMS_NS: &str = "http://purl.org/dc/terms/";
pub(crate) const APP_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/extended-properties";
pub(crate) const CUSTOM_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/custom-properties";
pub(crate) const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

pub(crate) const CORE_PART: &str = "docProps/core.xml";
pub(crate) const APP_PART: &str = "docProps/app.xml";
pub(crate) const CUSTOM_PART: &str = "docProps/custom.xml";
pub(crate) const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub(crate) const ROOT_RELS_PART: &str = "_rels/.rels";

pub(crate) const CORE_CONTENT_TYPE: &str = "application/vnd.openxmlformats-package.core-properties+xml";
pub(crate) const CORE_RELATIONSHIP: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties";

/// Partes mínimas para documentos que llegan sin propiedades de núcleo.
pub(crate) const EMPTY_CORE: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties""#,
    r#" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/""#,
    r#" xmlns:dcmitype="http://purl.org/dc/dcmitype/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"/>"#,
);
pub(crate) const EMPTY_CONTENT_TYPES: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
    r#"<Default Extension="xml" ContentType="application/xml"/>"#,
    r#"</Types>"#,
);
pub(crate) const EMPTY_RELS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"/>"#,
);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Part {
    Core,
    App,
}

/// Campo de propiedades con el valor que recibe al limpiar.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ClearedField {
    pub(crate) name: &'static str,
    pub(crate) part: Part,
    pub(crate) spec: FieldSpec,
    pub(crate) value: &'static str,
}

const fn core(name: &'static str, prefix: &'static str, local: &'static str, ns: &'static str) -> ClearedField {
    ClearedField {
        name,
        part: Part::Core,
        spec: FieldSpec::prefixed(prefix, local, ns),
        value: "",
    }
}

const fn app(name: &'static str, local: &'static str) -> ClearedField {
    ClearedField {
        name,
        part: Part::App,
        spec: FieldSpec::unprefixed(local, APP_NS),
        value: "",
    }
}

/// Campos de texto que se vacían. `author`/`creator` y `comments`/`description`
/// son alias del mismo nodo.
pub(crate) const CLEARED_FIELDS: [ClearedField; 16] = [
    core("author", "dc", "creator", DC_NS),
    core("title", "dc", "title", DC_NS),
    core("subject", "dc", "subject", DC_NS),
    core("keywords", "cp", "keywords", CP_NS),
    core("comments", "dc", "description", DC_NS),
    core("last_modified_by", "cp", "lastModifiedBy", CP_NS),
    core("category", "cp", "category", CP_NS),
    core("content_status", "cp", "contentStatus", CP_NS),
    core("identifier", "dc", "identifier", DC_NS),
    core("language", "dc", "language", DC_NS),
    core("version", "cp", "version", CP_NS),
    core("creator", "dc", "creator", DC_NS),
    core("description", "dc", "description", DC_NS),
    app("manager", "Manager"),
    app("company", "Company"),
    app("hyperlink_base", "HyperlinkBase"),
];

pub(crate) const REVISION: FieldSpec = FieldSpec::prefixed("cp", "revision", CP_NS);
pub(crate) const CREATED: FieldSpec = FieldSpec::prefixed("dcterms", "created", DCTERMS_NS);
pub(crate) const MODIFIED: FieldSpec = FieldSpec::prefixed("dcterms", "modified", DCTERMS_NS);
pub(crate) const LAST_PRINTED: FieldSpec = FieldSpec::prefixed("cp", "lastPrinted", CP_NS);
pub(crate) const APPLICATION: FieldSpec = FieldSpec::unprefixed("Application", APP_NS);

pub(crate) const CLEAN_REVISION: &str = "1";

/// Formato W3CDTF con que se escriben las fechas de limpieza.
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
