//! Procesos externos con tiempo límite y archivos temporales con limpieza garantizada.
//!
//! El proceso hijo queda dentro de un guardián que lo mata y lo recoge al salir de
//! alcance, así que ningún camino de salida (éxito, error, tiempo agotado o pánico)
//! deja procesos huérfanos. Los archivos temporales se borran en su `Drop`.

use std::ffi::OsStr;
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tempfile::{NamedTempFile, TempPath};
use thiserror::Error;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const SCRATCH_PREFIX: &str = "metascrub-";

#[derive(Debug, Error)]
pub(crate) enum RunError {
    #[error("no se pudo iniciar {program}: {source}")]
    Spawn { program: String, source: io::Error },

    #[error("error esperando al proceso: {0}")]
    Wait(#[from] io::Error),

    #[error("el proceso excedió el límite de {0:?}")]
    TimedOut(Duration),

    #[error("el proceso terminó con {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },
}

/// Archivo temporal con nombre único; `tempfile` lo borra al salir de alcance.
///
/// Solo se conserva la ruta: el descriptor se cierra enseguida para que el proceso
/// externo pueda reemplazar el archivo.
#[derive(Debug)]
pub(crate) struct ScratchFile {
    path: Option<TempPath>,
}

impl ScratchFile {
    fn builder(suffix: &str) -> tempfile::Builder<'_, '_> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX).suffix(suffix);
        builder
    }

    /// Crea un archivo vacío `metascrub-XXXX.<extension>` dentro de `dir`.
    pub(crate) fn create(dir: &Path, extension: &str) -> io::Result<Self> {
        let suffix = format!(".{extension}");
        let file = Self::builder(&suffix).tempfile_in(dir)?;
        Ok(Self {
            path: Some(file.into_temp_path()),
        })
    }

    pub(crate) fn with_contents(dir: &Path, extension: &str, contents: &[u8]) -> io::Result<Self> {
        let suffix = format!(".{extension}");
        let mut file: NamedTempFile = Self::builder(&suffix).tempfile_in(dir)?;
        file.write_all(contents)?;
        file.as_file().sync_all()?;
        Ok(Self {
            path: Some(file.into_temp_path()),
        })
    }

    pub(crate) fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or(Path::new(""))
    }

    pub(crate) fn read(&self) -> io::Result<Vec<u8>> {
        fs::read(self.path())
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        let shown = path.display().to_string();
        match path.close() {
            Ok(()) => debug!(path = %shown, "archivo temporal eliminado"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %shown, error = %e, "no se pudo eliminar el archivo temporal"),
        }
    }
}

/// Proceso hijo que se mata y se recoge si no terminó por sí mismo.
struct ChildGuard {
    child: Child,
    reaped: bool,
}

impl ChildGuard {
    /// Espera hasta `deadline`; `None` si el proceso sigue vivo al vencer el plazo.
    fn wait_until(&mut self, deadline: Instant) -> io::Result<Option<ExitStatus>> {
        loop {
            if let Some(status) = self.child.try_wait()? {
                self.reaped = true;
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        let pid = self.child.id();
        if let Err(e) = self.child.kill() {
            debug!(pid, error = %e, "no se pudo terminar el proceso");
        }
        match self.child.wait() {
            Ok(status) => debug!(pid, %status, "proceso terminado y recogido"),
            Err(e) => warn!(pid, error = %e, "no se pudo recoger el proceso"),
        }
    }
}

fn drain<P: Read + Send + 'static>(pipe: Option<P>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe
            && let Err(e) = pipe.read_to_end(&mut buffer)
        {
            debug!(error = %e, "lectura de la tubería interrumpida");
        }
        buffer
    })
}

fn collect(handle: JoinHandle<Vec<u8>>) -> Vec<u8> {
    handle.join().unwrap_or_default()
}

/// Ejecuta `program` con `args` y devuelve su salida estándar.
///
/// Un código de salida distinto de cero es [`RunError::Failed`] con el stderr
/// recortado; si el proceso sigue vivo tras `timeout` se mata y se devuelve
/// [`RunError::TimedOut`].
pub(crate) fn run(program: &Path, args: &[&OsStr], timeout: Duration) -> Result<Vec<u8>, RunError> {
    let deadline = Instant::now() + timeout;
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| RunError::Spawn {
            program: program.display().to_string(),
            source,
        })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let mut guard = ChildGuard {
        child,
        reaped: false,
    };
    debug!(program = %program.display(), pid = guard.child.id(), "proceso iniciado");

    let Some(status) = guard.wait_until(deadline)? else {
        // Los hilos lectores quedan sueltos: un nieto podría mantener abiertas las tuberías.
        return Err(RunError::TimedOut(timeout));
    };

    let stdout = collect(stdout);
    let stderr = collect(stderr);
    if !status.success() {
        return Err(RunError::Failed {
            status,
            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
        });
    }
    Ok(stdout)
}

/// Serializa las pruebas que escriben ejecutables y lanzan procesos.
#[cfg(test)]
pub(crate) static SPAWN_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;

    fn lock() -> std::sync::MutexGuard<'static, ()> {
        SPAWN_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[test]
    fn scratch_files_are_removed_on_drop() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let scratch = ScratchFile::with_contents(dir.path(), "mkv", b"contenido")?;
        let path = scratch.path().to_path_buf();

        assert!(path.file_name().and_then(|n| n.to_str()).is_some_and(|n| {
            n.starts_with(SCRATCH_PREFIX) && n.ends_with(".mkv")
        }));
        assert_eq!(scratch.read()?, b"contenido");

        drop(scratch);
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn scratch_file_replaced_by_a_tool_is_still_removed() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let scratch = ScratchFile::create(dir.path(), "webm")?;
        fs::write(scratch.path(), b"salida nueva")?;
        assert_eq!(scratch.read()?, b"salida nueva");

        let path = scratch.path().to_path_buf();
        drop(scratch);
        assert!(!path.exists());
        assert_eq!(fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let _lock = lock();
        let result = run(
            Path::new("/definitely/not/a/program"),
            &[],
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(RunError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn slow_process_is_killed_at_the_deadline() {
        let _lock = lock();
        let started = Instant::now();
        let result = run(
            Path::new("sleep"),
            &[OsStr::new("5")],
            Duration::from_millis(200),
        );
        assert!(matches!(result, Err(RunError::TimedOut(_))));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn stdout_and_exit_status_are_reported() -> Result<(), Box<dyn std::error::Error>> {
        let _lock = lock();
        let output = run(
            Path::new("sh"),
            &[OsStr::new("-c"), OsStr::new("printf hola")],
            Duration::from_secs(5),
        )?;
        assert_eq!(output, b"hola");

        let failed = run(
            Path::new("sh"),
            &[OsStr::new("-c"), OsStr::new("echo roto >&2; exit 3")],
            Duration::from_secs(5),
        );
        match failed {
            Err(RunError::Failed { status, stderr }) => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr, "roto");
            }
            other => panic!("se esperaba un fallo, llegó {other:?}"),
        }
        Ok(())
    }
}
