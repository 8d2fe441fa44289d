//! Modelos de entrada y salida compartidos por los manejadores.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, Read, Seek, SeekFrom};

/// Archivo recibido: nombre original más un flujo de bytes rebobinable.
///
/// Los manejadores rebobinan y leen el flujo, pero nunca escriben sobre él.
pub struct InputFile<R> {
    pub filename: String,
    pub reader: R,
}

impl<R: Read + Seek> InputFile<R> {
    pub fn new(filename: impl Into<String>, reader: R) -> Self {
        Self {
            filename: filename.into(),
            reader,
        }
    }

    /// Lee el flujo completo desde el inicio.
    pub fn read_all(&mut self) -> io::Result<Vec<u8>> {
        read_from_start(&mut self.reader)
    }
}

/// Rebobina `reader` y devuelve todo su contenido.
pub(crate) fn read_from_start<R: Read + Seek>(reader: &mut R) -> io::Result<Vec<u8>> {
    reader.seek(SeekFrom::Start(0))?;
    let mut contents = Vec::new();
    reader.read_to_end(&mut contents)?;
    Ok(contents)
}

/// Archivo limpio listo para devolverse al cliente.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CleanedFile {
    /// Nombre original, tal como llegó.
    pub filename: String,
    pub mime_type: Option<String>,
    pub content: Vec<u8>,
}

/// Metadata leída de un archivo, sin normalizar.
///
/// Se serializa como `{"metadata": {...}}` o `{"error": {...}}`; nunca ambos.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataReport {
    Metadata(BTreeMap<String, String>),
    Error(BTreeMap<String, String>),
}

impl MetadataReport {
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map: BTreeMap<String, String> = BTreeMap::new();
        for (key, value) in entries {
            let value = value.into();
            map.entry(key.into())
                .and_modify(|existing| {
                    existing.push_str("; ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }
        MetadataReport::Metadata(map)
    }

    /// Reporte de error con un único mensaje.
    pub fn error(message: impl Into<String>) -> Self {
        let mut map = BTreeMap::new();
        map.insert("message".to_string(), message.into());
        MetadataReport::Error(map)
    }

    pub fn metadata(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            MetadataReport::Metadata(map) => Some(map),
            MetadataReport::Error(_) => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, MetadataReport::Error(_))
    }
}

/// Respuesta completa del camino de inspección.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct InspectionResult {
    pub filename: String,
    /// Tipo MIME deducido del nombre.
    pub mime_type: Option<String>,
    /// Tipo MIME deducido del contenido, si se reconoce.
    pub detected_mime: Option<String>,
    #[serde(flatten)]
    pub report: MetadataReport,
}
