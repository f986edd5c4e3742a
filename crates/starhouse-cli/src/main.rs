//! Starhouse CLI (starctl)
//!
//! Builds, inspects and queries catalogs. Catalogs are immutable: `build`
//! only ever creates new directories and every other command is read-only.
//!
//! ## Usage
//! ```bash
//! # One catalog per magnitude limit under catalogs/
//! starctl --catalog catalogs build --config build.json --input stars.ndjson \
//!     --max-magnitude 6.5 --max-magnitude 9
//!
//! # Catalog properties
//! starctl --catalog catalogs/bright-stars/v1 info
//!
//! # First ten records as JSON
//! starctl --catalog catalogs/bright-stars/v1 --format json scan --limit 10
//!
//! # Exact-match lookup
//! starctl --catalog catalogs/bright-stars/v1 get --where name=Sirius
//!
//! # Everything within 5 degrees of Sirius
//! starctl --catalog catalogs/bright-stars/v1 cone 101.287 -16.716 5
//!
//! # Full integrity check
//! starctl --catalog catalogs/bright-stars/v1 verify
//! ```
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`.

mod commands;
mod format;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{build, inspect, query};
use format::{Formatter, OutputFormat};

#[derive(Parser)]
#[command(name = "starctl")]
#[command(about = "Starhouse star catalog tool", long_about = None)]
#[command(version)]
struct Cli {
    /// Catalog directory (the one holding manifest.json). For `build`, the
    /// directory new catalogs are created under.
    #[arg(short, long, env = "STARHOUSE_CATALOG")]
    catalog: PathBuf,

    /// Expected HEALPix resolution; opening fails on a mismatch.
    /// When omitted the catalog's own resolution is used.
    #[arg(short, long, env = "STARHOUSE_RESOLUTION")]
    resolution: Option<u8>,

    /// Output format
    #[arg(short, long, env = "STARHOUSE_FORMAT", value_enum, default_value = "table")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build one catalog per magnitude limit from NDJSON records
    Build {
        /// Build config JSON; its output_path is replaced per limit
        #[arg(long)]
        config: PathBuf,
        /// Newline-delimited JSON records, or `-` for stdin
        #[arg(short, long, default_value = "-")]
        input: PathBuf,
        /// Keep stars at or below this magnitude; repeat for more catalogs
        #[arg(short = 'm', long = "max-magnitude", required = true, allow_negative_numbers = true)]
        max_magnitude: Vec<f64>,
        /// Catalog name used in the directory names
        #[arg(short, long, default_value = "bigsky")]
        name: String,
    },
    #[command(flatten)]
    Read(ReadCommand),
}

#[derive(Subcommand)]
enum ReadCommand {
    /// Show catalog properties from the manifest
    Info {
        /// List partition files instead
        #[arg(long)]
        files: bool,
    },
    /// Print records in stored order
    Scan {
        /// Maximum number of records to print
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Find the first record matching every field=value term
    Get {
        /// Term of the form field=value; repeat for a conjunction
        #[arg(short = 'w', long = "where", value_parser = query::parse_term, required = true)]
        terms: Vec<(String, String)>,
    },
    /// Find every record within a radius of a sky position
    Cone {
        /// Right ascension of the centre, degrees
        #[arg(allow_negative_numbers = true)]
        ra: f64,
        /// Declination of the centre, degrees
        #[arg(allow_negative_numbers = true)]
        dec: f64,
        /// Radius, degrees
        radius: f64,
    },
    /// Read every record and check the catalog's integrity
    Verify,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let formatter = Formatter::new(cli.format);
    let command = match cli.command {
        Commands::Build {
            config,
            input,
            max_magnitude,
            name,
        } => {
            return build::handle_build(
                &cli.catalog,
                &config,
                &input,
                &max_magnitude,
                &name,
                &formatter,
            )
        }
        Commands::Read(command) => command,
    };

    let catalog = commands::open_catalog(&cli.catalog, cli.resolution)?;
    match command {
        ReadCommand::Info { files } => inspect::handle_info(&catalog, files, &formatter)?,
        ReadCommand::Scan { limit } => query::handle_scan(&catalog, limit, &formatter)?,
        ReadCommand::Get { terms } => query::handle_get(&catalog, &terms, &formatter)?,
        ReadCommand::Cone { ra, dec, radius } => {
            query::handle_cone(&catalog, ra, dec, radius, &formatter)?
        }
        ReadCommand::Verify => inspect::handle_verify(&catalog, &formatter)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_get_terms() {
        let cli = Cli::try_parse_from([
            "starctl",
            "--catalog",
            "/tmp/c",
            "get",
            "-w",
            "name=Sirius",
            "--where",
            "hip=32349",
        ])
        .unwrap();
        match cli.command {
            Commands::Read(ReadCommand::Get { terms }) => {
                assert_eq!(terms.len(), 2);
                assert_eq!(terms[0], ("name".to_string(), "Sirius".to_string()));
                assert_eq!(terms[1], ("hip".to_string(), "32349".to_string()));
            }
            _ => panic!("expected get"),
        }
    }

    #[test]
    fn test_parse_cone_negative_dec() {
        let cli = Cli::try_parse_from([
            "starctl", "--catalog", "/tmp/c", "--format", "json", "cone", "101.3", "-16.7", "5",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Commands::Read(ReadCommand::Cone { ra, dec, radius }) => {
                assert_eq!((ra, dec, radius), (101.3, -16.7, 5.0));
            }
            _ => panic!("expected cone"),
        }
    }

    #[test]
    fn test_parse_build_limits() {
        let cli = Cli::try_parse_from([
            "starctl",
            "--catalog",
            "/tmp/catalogs",
            "build",
            "--config",
            "build.json",
            "--input",
            "stars.ndjson",
            "-m",
            "6.5",
            "--max-magnitude",
            "-1",
        ])
        .unwrap();
        match cli.command {
            Commands::Build {
                config,
                input,
                max_magnitude,
                name,
            } => {
                assert_eq!(config, PathBuf::from("build.json"));
                assert_eq!(input, PathBuf::from("stars.ndjson"));
                assert_eq!(max_magnitude, vec![6.5, -1.0]);
                assert_eq!(name, "bigsky");
            }
            _ => panic!("expected build"),
        }

        assert!(Cli::try_parse_from([
            "starctl", "--catalog", "/tmp/c", "build", "--config", "build.json"
        ])
        .is_err());
    }

    #[test]
    fn test_get_requires_terms() {
        assert!(Cli::try_parse_from(["starctl", "--catalog", "/tmp/c", "get"]).is_err());
        assert!(
            Cli::try_parse_from(["starctl", "--catalog", "/tmp/c", "get", "-w", "Sirius"])
                .is_err()
        );
    }
}
