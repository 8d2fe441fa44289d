use clap::{Parser, Subcommand};
use metascrub::package::{self, ARCHIVE_NAME, PackageError};
use metascrub::{CleanError, ConfigError, InputFile, ScrubConfig, inspect_file, process_batch};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "metascrub", version, about = "Inspecciona y elimina la metadata de archivos")]
struct Cli {
    /// Archivo JSON con la configuración (rutas de ffmpeg/ffprobe, tiempo límite, temporales)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Elimina la metadata; con varios archivos se genera cleaned_files.zip
    Strip {
        /// Archivos a limpiar, procesados en orden
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Directorio donde se escribe el resultado
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
    /// Muestra la metadata de un archivo como JSON
    Inspect {
        file: PathBuf,
    },
}

#[derive(Error, Debug)]
enum CliError {
    #[error("configuración inválida: {0}")]
    Config(#[from] ConfigError),

    #[error("{} (estado {})", .0, .0.status_code())]
    Clean(#[from] CleanError),

    #[error("no se pudo empaquetar el resultado: {0}")]
    Package(#[from] PackageError),

    #[error("{}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("no se pudo serializar el reporte: {0}")]
    Json(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> CliError + '_ {
    move |source| CliError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "metascrub=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    match execute(cli) {
        Ok(printed) => {
            println!("{printed}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "operación fallida");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Ejecuta el subcomando y devuelve lo que se imprime en la salida estándar.
fn execute(cli: Cli) -> Result<String, CliError> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Strip { files, output } => {
            strip(&files, &output, &config).map(|target| target.display().to_string())
        }
        Commands::Inspect { file } => inspect(&file, &config),
    }
}

fn load_config(path: Option<&Path>) -> Result<ScrubConfig, CliError> {
    match path {
        Some(path) => Ok(ScrubConfig::from_json_file(path)?),
        None => Ok(ScrubConfig::default()),
    }
}

/// Nombre con el que el archivo "se sube": el último componente de la ruta.
fn upload_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn open_input(path: &Path) -> Result<InputFile<File>, CliError> {
    let file = File::open(path).map_err(io_error(path))?;
    Ok(InputFile::new(upload_name(path), file))
}

/// Limpia los archivos y escribe el resultado en `output`; devuelve la ruta escrita.
fn strip(paths: &[PathBuf], output: &Path, config: &ScrubConfig) -> Result<PathBuf, CliError> {
    let mut inputs = paths
        .iter()
        .map(|path| open_input(path))
        .collect::<Result<Vec<_>, _>>()?;
    let cleaned = process_batch(&mut inputs, config)?;

    fs::create_dir_all(output).map_err(io_error(output))?;
    let (target, bytes) = match cleaned.as_slice() {
        [single] => (output.join(package::download_name(&single.filename)), single.content.clone()),
        many => (output.join(ARCHIVE_NAME), package::zip_files(many)?),
    };
    fs::write(&target, &bytes).map_err(io_error(&target))?;

    info!(path = %target.display(), files = cleaned.len(), "resultado escrito");
    Ok(target)
}

fn inspect(path: &Path, config: &ScrubConfig) -> Result<String, CliError> {
    let mut input = open_input(path)?;
    let result = inspect_file(&mut input, config)?;
    Ok(serde_json::to_string_pretty(&result)?)
}
