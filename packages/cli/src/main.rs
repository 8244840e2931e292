#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for building and querying street address containers.

mod progress;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use street_index_indexer::{build_index, default_output_path};
use street_index_map::{MapSource, load_pbf};
use street_index_models::{AddressResult, IndexerConfig, ReaderConfig, SearchOptions};
use street_index_reader::AddressReader;
use street_index_rules::supported_countries;

use crate::progress::{IndicatifProgress, init_logger};

#[derive(Parser)]
#[command(name = "street_index", about = "Street address index builder and query tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an address container from an OSM PBF extract
    Build {
        /// Map file (`.osm.pbf`)
        #[arg(long)]
        map: PathBuf,
        /// ISO 3166-1 alpha-2 country code (e.g., "CA")
        #[arg(long)]
        country: String,
        /// Output container. Defaults to `<map stem>.<country>.addresses`
        /// next to the map.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Directory for temporary build files. Defaults to a directory
        /// next to the output.
        #[arg(long)]
        work_dir: Option<PathBuf>,
        /// Number of street drafts kept in memory before spilling to disk
        #[arg(long, default_value = "10")]
        cache_entries: usize,
    },
    /// Search subdivision names of a region
    City {
        /// Address container
        #[arg(long)]
        index: PathBuf,
        #[arg(long)]
        country: String,
        /// Principal subdivision code (e.g., "ON")
        #[arg(long)]
        region: String,
        #[arg(long, default_value = "10")]
        limit: usize,
        /// Name to search for
        name: String,
    },
    /// Search a street address within a city
    Address {
        /// Address container
        #[arg(long)]
        index: PathBuf,
        /// Map the container was built from. Required for `--full`.
        #[arg(long)]
        map: Option<PathBuf>,
        #[arg(long)]
        country: String,
        /// Principal subdivision code (e.g., "ON")
        #[arg(long)]
        region: String,
        /// City or any other subdivision of the region
        #[arg(long)]
        city: String,
        #[arg(long, default_value = "10")]
        limit: usize,
        /// Resolve coordinates and the containing city of every result
        #[arg(long)]
        full: bool,
        /// Street address, e.g. "12-1337A Main Street"
        address: String,
    },
    /// List countries with address rules
    Countries,
}

fn print_result(result: &AddressResult) {
    let unit = if result.unit.is_empty() {
        String::new()
    } else {
        format!("{}-", result.unit)
    };
    let interpolated = if result.interpolated { " (interpolated)" } else { "" };
    println!(
        "{unit}{}{} {}, {}, {} [{}]{interpolated}",
        result.street_number,
        result.street_number_suffix,
        result.street_name,
        result.subdivision,
        result.principal,
        result.element,
    );
    if let Some(location) = result.location {
        println!(
            "    {:.6}, {:.6} in {}",
            location.lat,
            location.lon,
            result.city.as_deref().unwrap_or("?")
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            map,
            country,
            output,
            work_dir,
            cache_entries,
        } => {
            let output = output.unwrap_or_else(|| default_output_path(&map, &country));
            let work_dir = work_dir.unwrap_or_else(|| output.with_extension("work"));

            log::info!("Loading {}", map.display());
            let source = load_pbf(&map).await?;

            let mut config = IndexerConfig::new(country, work_dir);
            config.street_cache_entries = cache_entries;

            let progress = IndicatifProgress::build_bar(&multi, "Building");
            let stats = build_index(&source, &config, &output, progress.as_ref()).await?;

            println!("Wrote {}", output.display());
            println!(
                "  {} principal subdivisions, {} subdivisions, {} streets",
                stats.principal_subdivisions, stats.subdivisions, stats.streets
            );
            println!(
                "  {} addresses, {} interpolations, {} skipped",
                stats.addresses,
                stats.interpolations,
                stats.skipped.total()
            );
        }
        Commands::City {
            index,
            country,
            region,
            limit,
            name,
        } => {
            let reader = AddressReader::open(&index, None, ReaderConfig::new(country)).await?;
            let names = reader.search_city(&name, &region, limit).await?;
            if names.is_empty() {
                println!("No subdivision matches {name}");
            }
            for name in names {
                println!("{name}");
            }
            reader.close();
        }
        Commands::Address {
            index,
            map,
            country,
            region,
            city,
            limit,
            full,
            address,
        } => {
            let source: Option<Arc<dyn MapSource>> = match map {
                Some(path) => {
                    log::info!("Loading {}", path.display());
                    let source: Arc<dyn MapSource> = Arc::new(load_pbf(&path).await?);
                    Some(source)
                }
                None => None,
            };

            let reader = AddressReader::open(&index, source, ReaderConfig::new(country)).await?;
            let options = SearchOptions { limit, full };
            for result in reader
                .search_address_text(&address, &city, &region, &options)
                .await?
            {
                print_result(&result);
            }
            reader.close();
        }
        Commands::Countries => {
            for code in supported_countries() {
                println!("{code}");
            }
        }
    }

    Ok(())
}
