mod client;
mod display;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;

use client::{Client, Probe};

#[derive(Parser)]
#[command(name = "identikit", about = "Identikit face identification CLI")]
struct Cli {
    /// Identikit daemon base URL
    #[arg(long, env = "IDENTIKIT_SERVER", default_value = "http://127.0.0.1:5000")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

/// Probe source: an image file or a camera device.
#[derive(Args)]
#[group(required = true, multiple = false)]
struct ProbeSource {
    /// Image file to upload
    #[arg(long)]
    file: Option<PathBuf>,
    /// V4L2 device to snap a still from (e.g. /dev/video0)
    #[arg(long)]
    camera: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Identify the face in a photo
    Identify {
        #[command(flatten)]
        source: ProbeSource,
    },
    /// List the closest enrolled persons
    Search {
        #[command(flatten)]
        source: ProbeSource,
        /// Maximum number of candidates
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Show a person's full record
    Show {
        /// Person ID
        id: String,
    },
    /// Enroll a new person
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        age: Option<u32>,
        #[arg(long)]
        nickname: Option<String>,
        #[arg(long)]
        police_station: Option<String>,
        #[arg(long)]
        crime: Option<String>,
        #[arg(long)]
        sections: Option<String>,
        /// Arrest date/time, free-form
        #[arg(long)]
        arrest_datetime: Option<String>,
        /// Photo file
        #[arg(long, conflicts_with = "camera", required_unless_present = "camera")]
        photo: Option<PathBuf>,
        /// V4L2 device to snap the photo from
        #[arg(long)]
        camera: Option<String>,
    },
    /// List enrolled persons
    List,
    /// Remove an enrolled person
    Remove {
        /// Person ID
        id: String,
    },
    /// Show daemon status
    Status,
    /// List camera devices
    Devices,
    /// Record an image URL on the server
    SaveUrl {
        url: String,
    },
}

impl ProbeSource {
    async fn into_probe(self) -> Result<Probe> {
        match (self.file, self.camera) {
            (Some(file), _) => Ok(Probe::File(file)),
            (None, Some(device)) => Probe::from_camera(device).await,
            (None, None) => bail!("either --file or --camera is required"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let client = Client::new(&cli.server)?;

    match cli.command {
        Commands::Identify { source } => {
            let probe = source.into_probe().await?;
            let result = client.identify(&probe).await?;
            if result.get("id").and_then(Value::as_str) == Some("NEW") {
                println!("No match (best similarity {})", display::format_value(&result["confidence"]));
            } else {
                print!("{}", display::card(&result));
            }
        }
        Commands::Search { source, limit } => {
            let probe = source.into_probe().await?;
            let candidates = client.search(&probe, limit).await?;
            if candidates.is_empty() {
                println!("No candidates");
            }
            for (rank, candidate) in candidates.iter().enumerate() {
                print!("{}. {}", rank + 1, display::card(candidate));
            }
        }
        Commands::Show { id } => {
            let person = client.person(&id).await?;
            print!("{}", display::detail(&person));
        }
        Commands::Add {
            name,
            age,
            nickname,
            police_station,
            crime,
            sections,
            arrest_datetime,
            photo,
            camera,
        } => {
            let photo = match (photo, camera) {
                (Some(path), _) => identikit_core::dataurl::read_file(&path)?,
                (None, Some(device)) => client::capture_data_url(device).await?,
                (None, None) => bail!("either --photo or --camera is required"),
            };
            let form = json!({
                "name": name,
                "age": age,
                "nickname": nickname,
                "police_station": police_station,
                "crime": crime,
                "sections": sections,
                "arrest_datetime": arrest_datetime,
                "photo": photo,
            });
            let person = client.add_person(&form).await?;
            println!("Enrolled {} ({})", display::heading(&person), display::format_value(&person["id"]));
        }
        Commands::List => {
            let persons = client.list().await?;
            if persons.is_empty() {
                println!("No persons enrolled");
            }
            for person in &persons {
                println!(
                    "{}  {}  {}",
                    display::format_value(&person["id"]),
                    display::heading(person),
                    display::format_value(&person["created_at"])
                );
            }
        }
        Commands::Remove { id } => {
            client.remove(&id).await?;
            println!("Removed {id}");
        }
        Commands::Status => match client.health().await {
            Ok(health) => {
                println!("identikitd: {}", display::format_value(&health["status"]));
                println!("  version: {}", display::format_value(&health["version"]));
                println!("  uptime: {}s", health["uptime_seconds"]);
                println!("  models loaded: {}", health["models_loaded"]);
                println!("  gallery size: {}", health["gallery_size"]);
                println!("  threshold: {}", display::format_value(&health["similarity_threshold"]));
            }
            Err(e) => {
                tracing::debug!(error = %e, "health request failed");
                println!("identikitd: not reachable at {} ({e})", cli.server);
            }
        },
        Commands::Devices => {
            let devices = identikit_capture::Camera::list_devices();
            if devices.is_empty() {
                println!("No capture devices found");
            }
            for dev in devices {
                println!("{}  {} [{}] {}", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
        Commands::SaveUrl { url } => {
            client.save_image_url(&url).await?;
            println!("Saved {url}");
        }
    }

    Ok(())
}
