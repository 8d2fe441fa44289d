//! MetaScrub: clasificación de archivos subidos y eliminación o inspección de su metadata.
//!
//! El flujo es siempre el mismo: [`classify`] decide la familia a partir del nombre,
//! el manejador de esa familia limpia o inspecciona los bytes, y [`process_batch`]
//! agrega los resultados abortando el lote completo ante el primer fallo.

pub mod batch;
pub mod classify;
pub mod config;
pub mod error;
pub mod file;
pub mod handlers;
pub mod package;

pub use batch::{inspect_file, process_batch, strip_file};
pub use classify::{Family, FileClassification, classify};
pub use config::{ConfigError, ScrubConfig};
pub use error::{CleanError, Outcome, Purpose};
pub use file::{CleanedFile, InputFile, InspectionResult, MetadataReport};
