use std::path::PathBuf;

use structopt::StructOpt;

use connmap::cluster::{self, WebMercator};
use connmap::config::Config;
use connmap::geocode::{GeocodingClient, HttpTransport, ProgressUpdate};
use connmap::{parser, pipeline, share};

/// Sign-in log geomapping command line interface
#[derive(StructOpt, Debug)]
#[structopt(name = "connmap", about = "Sign-in log geomapping pipeline CLI")]
pub enum Cli {
    /// Generate a default configuration file
    Config {
        /// Output path for the configuration file
        #[structopt(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
    /// Parse a log export and display record summaries
    Parse {
        /// Path to the log export
        #[structopt(short, long)]
        file: PathBuf,
        /// Number of records to display
        #[structopt(short, long, default_value = "10")]
        lines: usize,
    },
    /// Run the full pipeline and write the per-user dataset as JSON
    Map {
        /// Path to the log export
        #[structopt(short, long)]
        file: PathBuf,
        /// Output path for the dataset (stdout when omitted)
        #[structopt(short, long)]
        output: Option<PathBuf>,
        /// Path to configuration file
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
        /// Also print a marker summary clustered at the configured zoom
        #[structopt(long)]
        markers: bool,
    },
    /// Encode a dataset JSON file into a share payload
    Encode {
        /// Path to the dataset JSON
        #[structopt(short, long)]
        file: PathBuf,
    },
    /// Decode a share payload file back into dataset JSON
    Decode {
        /// Path to the payload file
        #[structopt(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::from_args();

    match cli {
        Cli::Config { output } => {
            let config = Config::default();
            config.to_file(&output)?;
            println!("Default configuration written to: {:?}", output);
        }
        Cli::Parse { file, lines } => {
            let raw = std::fs::read_to_string(&file)?;
            let records = parser::parse(&raw);
            let display_count = std::cmp::min(lines, records.len());

            println!("Parsed {} record(s) (showing {}):\n", records.len(), display_count);
            for record in records.iter().take(display_count) {
                println!(
                    "  User: {}, IP: {}, Time: {}, Status: {}",
                    record.user, record.ip, record.timestamp, record.status
                );
            }
        }
        Cli::Map {
            file,
            output,
            config,
            markers,
        } => {
            let config = if config.exists() {
                Config::from_file(&config)?
            } else {
                log::warn!("Config file not found, using defaults");
                Config::default()
            };

            let raw = std::fs::read_to_string(&file)?;
            let client = GeocodingClient::with_policy(
                HttpTransport::new(config.geocode.endpoint.clone()),
                config.geocode.batch_size,
                config.geocode.max_in_flight,
                config.geocode.retry.policy(),
            );

            let mut sink = |update: ProgressUpdate| {
                println!("[{:>5.1}%] {}", update.percent, update.message);
            };
            let users = pipeline::run(&raw, &client, &mut sink).await?;

            let connection_count: usize = users.iter().map(|u| u.all_connections.len()).sum();
            println!(
                "Mapped {} connection(s) across {} identit(y/ies)",
                connection_count,
                users.len()
            );

            if markers {
                let projection = WebMercator {
                    zoom: config.map.zoom,
                };
                let marker_list = cluster::cluster(&users, |lat, lon| projection.project(lat, lon));
                println!("{} marker(s) at zoom {}:", marker_list.len(), config.map.zoom);
                for marker in &marker_list {
                    println!(
                        "  ({:.4}, {:.4}) - {} IP(s), {} identit(y/ies)",
                        marker.lat,
                        marker.lon,
                        marker.ips.len(),
                        marker.users.len()
                    );
                }
            }

            let json = serde_json::to_string_pretty(&users)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    println!("Dataset written to: {:?}", path);
                }
                None => println!("{}", json),
            }
        }
        Cli::Encode { file } => {
            let json = std::fs::read_to_string(&file)?;
            let users: Vec<connmap::UserMapData> = serde_json::from_str(&json)?;
            println!("{}", share::encode(&users)?);
        }
        Cli::Decode { file } => {
            let payload = std::fs::read_to_string(&file)?;
            let users = share::decode(payload.trim())?;
            println!("{}", serde_json::to_string_pretty(&users)?);
        }
    }

    Ok(())
}
