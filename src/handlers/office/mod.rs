//! Documentos Office basados en OOXML (DOCX, XLSX, PPTX).
//!
//! Los tres subformatos guardan sus propiedades en las mismas partes
//! (`docProps/core.xml` y `docProps/app.xml`), así que la limpieza es común y el
//! subformato solo decide qué parte principal debe existir.

mod archive;
mod clean;
mod inspect;
mod properties;
mod xml;


pub use clean::strip_office;
pub use inspect::inspect_office;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum OfficeKind {
    Word,
    Spreadsheet,
    Presentation,
}

impl OfficeKind {
    pub(crate) fn from_tag(format_tag: &str) -> Option<Self> {
        match format_tag.to_ascii_uppercase().as_str() {
            "DOCX" => Some(OfficeKind::Word),
            "XLSX" => Some(OfficeKind::Spreadsheet),
            "PPTX" => Some(OfficeKind::Presentation),
            _ => None,
        }
    }

    /// Parte que identifica al subformato dentro del paquete.
    pub(crate) fn main_part(self) -> &'static str {
        match self {
            OfficeKind::Word => "word/document.xml",
            OfficeKind::Spreadsheet => "xl/workbook.xml",
            OfficeKind::Presentation => "ppt/presentation.xml",
        }
    }
}
