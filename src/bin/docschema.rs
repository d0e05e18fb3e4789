//! Document Schema CLI
//!
//! Command-line interface for compiling Swagger/OpenAPI definitions into
//! document-store schemas.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use docschema::{compile, CompileOptions, CompiledSchemas, ValidatorRegistry};
use serde_json::Value;
use tracing::debug;

#[derive(Parser)]
#[command(name = "docschema")]
#[command(about = "Compile Swagger/OpenAPI definitions into document-store schemas")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a schema document and print the compiled schemas as JSON
    Compile {
        /// Schema document (JSON file)
        spec: PathBuf,

        /// Overlay file with directives keyed by "default", "Type" or "Type.field"
        #[arg(long)]
        overlay: Option<PathBuf>,

        /// Only print the schema of this type
        #[arg(long = "type", short)]
        type_name: Option<String>,

        /// Accept a validator name without checking values (repeatable)
        #[arg(long = "validator", value_name = "NAME")]
        validators: Vec<String>,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// List the type names a schema document compiles to
    Types {
        /// Schema document (JSON file)
        spec: PathBuf,

        /// Overlay file with directives keyed by "default", "Type" or "Type.field"
        #[arg(long)]
        overlay: Option<PathBuf>,

        /// Accept a validator name without checking values (repeatable)
        #[arg(long = "validator", value_name = "NAME")]
        validators: Vec<String>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Compile {
            spec,
            overlay,
            type_name,
            validators,
            output,
            pretty,
        } => run_compile(CompileArgs {
            spec,
            overlay,
            type_name,
            validators,
            output,
            pretty,
        }),

        Commands::Types {
            spec,
            overlay,
            validators,
        } => run_types(&spec, overlay.as_deref(), &validators),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

struct CompileArgs {
    spec: PathBuf,
    overlay: Option<PathBuf>,
    type_name: Option<String>,
    validators: Vec<String>,
    output: Option<PathBuf>,
    pretty: bool,
}

fn run_compile(args: CompileArgs) -> Result<(), u8> {
    let CompileArgs {
        spec,
        overlay,
        type_name,
        validators,
        output,
        pretty,
    } = args;

    let schemas = compile_file(&spec, overlay.as_deref(), &validators)?;

    let rendered = match &type_name {
        Some(name) => {
            let schema = schemas.get(name).ok_or_else(|| {
                eprintln!("Error: type \"{}\" not found in compiled schemas", name);
                2u8
            })?;
            to_json(schema, pretty)
        }
        None => to_json(&schemas, pretty),
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    match output {
        Some(path) => {
            std::fs::write(&path, &rendered).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", rendered);
        }
    }

    Ok(())
}

fn run_types(spec: &Path, overlay: Option<&Path>, validators: &[String]) -> Result<(), u8> {
    let schemas = compile_file(spec, overlay, validators)?;
    for name in schemas.names() {
        println!("{}", name);
    }
    Ok(())
}

fn compile_file(
    spec: &Path,
    overlay: Option<&Path>,
    validator_names: &[String],
) -> Result<CompiledSchemas, u8> {
    let bytes = read_file(spec)?;

    let mut options = CompileOptions::new().validators(placeholder_validators(validator_names));
    if let Some(path) = overlay {
        let raw = read_file(path)?;
        let overlay: Value = serde_json::from_slice(&raw).map_err(|e| {
            eprintln!("Error: invalid overlay {}: {}", path.display(), e);
            2u8
        })?;
        options = options.overlay(overlay);
    }

    compile(bytes, &options).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })
}

fn read_file(path: &Path) -> Result<Vec<u8>, u8> {
    debug!(path = %path.display(), "reading file");
    std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            eprintln!("Error: file not found: {}", path.display());
        } else {
            eprintln!("Error: cannot read {}: {}", path.display(), e);
        }
        3u8
    })
}

/// Validators named on the command line accept every value: the CLI only
/// inspects schemas, it never validates documents.
fn placeholder_validators(names: &[String]) -> ValidatorRegistry {
    names.iter().fold(ValidatorRegistry::new(), |registry, name| {
        registry.register(name.clone(), "{VALUE} rejected", |_| true)
    })
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> serde_json::Result<String> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
}
