mod auth;
mod config;
mod error;
mod exif_data;
mod exiftool;
mod maps_url;
mod places;
mod publish;
mod stamper;
mod uploader;

use crate::config::AuthConfig;
use crate::maps_url::PlaceExtract;
use crate::uploader::LocationArgs;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "streetview_uploader",
    version,
    about = "Stamp and publish 360 equirectangular photos to Google Street View"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write Photo Sphere (GPano) XMP tags onto an equirectangular JPEG
    Stamp {
        /// Image to stamp; overwritten in place, no backup kept
        image: PathBuf,
    },
    /// Publish a stamped 360 photo through the Street View Publish API
    Upload {
        /// JPEG image to upload
        image: PathBuf,
        /// Latitude in decimal degrees (requires --lng)
        #[arg(long = "lat", visible_alias = "latitude")]
        lat: Option<f64>,
        /// Longitude in decimal degrees (requires --lat)
        #[arg(long = "lng", visible_alias = "longitude")]
        lng: Option<f64>,
        /// Altitude in meters above sea level
        #[arg(long = "alt", visible_alias = "altitude")]
        alt: Option<f64>,
        /// Compass heading in degrees, 0 = North, within [0, 360)
        #[arg(long)]
        heading: Option<f64>,
        /// Place ID to associate with the photo
        #[arg(long = "place-id")]
        place_id: Option<String>,
        /// OAuth client secrets file
        #[arg(long, default_value = "credentials.json")]
        credentials: PathBuf,
        /// Cached token file, created on first run
        #[arg(long, default_value = "token.json")]
        token: PathBuf,
    },
    /// Resolve a free-text place query to a Place ID
    FindPlace {
        /// Place name or address to search for
        query: String,
        /// Maps API key; without one, manual lookup instructions are printed
        #[arg(long = "api-key")]
        api_key: Option<String>,
    },
    /// Extract a Place ID or coordinates from a pasted Maps URL
    ExtractPlace {
        url: String,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Stamp { image } => {
            let (width, height) = stamper::stamp(&image)?;
            println!(
                "Stamped Photo Sphere metadata onto {} ({}x{})",
                image.display(),
                width,
                height
            );
        }
        Command::Upload {
            image,
            lat,
            lng,
            alt,
            heading,
            place_id,
            credentials,
            token,
        } => {
            let auth_config = AuthConfig::new(credentials, token);
            let location = LocationArgs {
                latitude: lat,
                longitude: lng,
                altitude: alt,
                heading,
            };
            let photo = uploader::run(&auth_config, &image, &location, place_id)?;
            println!("Photo uploaded successfully!");
            println!("  Photo ID: {}", photo.photo_id.id);
            println!("  Share link: {}", uploader::share_link(&photo));
            if let Some(ref count) = photo.view_count {
                println!("  View count: {}", count);
            }
            if let Some(ref status) = photo.maps_publish_status {
                println!("  Publish status: {}", status);
            }
        }
        Command::FindPlace { query, api_key } => match api_key {
            Some(key) => {
                println!("Searching for: {}\n", query);
                let matches = places::PlacesClient::new(key)?.search(&query)?;
                if matches.is_empty() {
                    println!("No places matched \"{}\".", query);
                } else {
                    for (i, place) in matches.iter().enumerate() {
                        println!("{}. {}", i + 1, place.name);
                        println!("   Address: {}", place.address);
                        println!("   Place ID: {}", place.place_id);
                        if !place.types.is_empty() {
                            let types: Vec<_> = place.types.iter().take(3).cloned().collect();
                            println!("   Types: {}", types.join(", "));
                        }
                        println!();
                    }
                    println!("Use a Place ID with the uploader:");
                    println!("  streetview_uploader upload image.jpg --place-id PLACE_ID");
                }
            }
            None => println!("{}", places::manual_lookup_instructions(&query)),
        },
        Command::ExtractPlace { url } => {
            let (extract, details) = maps_url::analyze(&url)?;
            if let Some(ref name) = details.name {
                println!("Place name: {}", name);
            }
            if let Some((lat, lng)) = details.coordinates {
                println!("Coordinates: {}, {}", lat, lng);
            }
            match extract {
                Some(PlaceExtract::Id(id)) => {
                    println!("Place ID: {}", id);
                    println!("\nUse with the uploader:");
                    println!("  streetview_uploader upload image.jpg --place-id {}", id);
                }
                Some(PlaceExtract::HexId(hex)) => {
                    println!("Found internal hex Place ID: {}", hex);
                    println!("\nThis format cannot be used directly. To get the proper Place ID:");
                    println!("1. Open the URL in your browser");
                    println!("2. Click on the place name");
                    println!("3. Click the 'Share' button, then the 'Embed a map' tab");
                    println!("4. The Place ID is in the iframe src URL (place_id=ChIJ...)");
                }
                None => {
                    if let Some((lat, lng)) = details.coordinates {
                        println!("\nNo Place ID in this URL; use the coordinates instead:");
                        println!(
                            "  streetview_uploader upload image.jpg --lat {} --lng {}",
                            lat, lng
                        );
                    } else if let Some(ref name) = details.name {
                        println!("\nNo Place ID in this URL; try a text search:");
                        println!("  streetview_uploader find-place \"{}\" --api-key KEY", name);
                    }
                }
            }
        }
    }

    Ok(())
}
