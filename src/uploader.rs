use crate::auth;
use crate::config::AuthConfig;
use crate::error::AppError;
use crate::exif_data::{self, ExifSummary};
use crate::publish::{LatLngPair, NewPhoto, Photo, PlaceRef, Pose, PublishClient};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::Path;

/// Pose-related CLI arguments, each independently optional.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocationArgs {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub heading: Option<f64>,
}

/// Runs the whole publish pipeline for one image: authenticate, verify the
/// file, open an upload session, stream the bytes, create the photo.
/// Single attempt, no retry at any step.
pub fn run(
    config: &AuthConfig,
    image: &Path,
    location: &LocationArgs,
    place_id: Option<String>,
) -> Result<Photo, AppError> {
    validate_location_args(location)?;
    validate_image_file(image)?;

    // The EXIF read is local; resolving the pose here keeps every usage
    // error ahead of authentication and its token-file writes.
    let exif = exif_data::read_summary(image);
    let pose = resolve_pose(location, &exif)?;
    let capture_time = capture_time(image, &exif)?;

    let access_token = auth::access_token(config)?;
    println!("Authentication successful.");

    let bytes = fs::read(image)?;
    println!("Uploading {} ({} bytes)...", image.display(), bytes.len());

    let client = PublishClient::new(access_token)?;
    let upload_ref = client.start_upload()?;
    client.upload_bytes(&upload_ref, bytes)?;
    println!("Image data uploaded, creating photo entry...");

    if let Some(ref pose) = pose {
        println!(
            "  Location: {:.6}, {:.6}",
            pose.lat_lng_pair.latitude, pose.lat_lng_pair.longitude
        );
        if let Some(alt) = pose.altitude {
            println!("  Altitude: {:.1}m", alt);
        }
        if let Some(heading) = pose.heading {
            println!("  Heading: {:.1} degrees", heading);
        }
    }
    if let Some(ref id) = place_id {
        println!("  Place ID: {}", id);
    }

    let photo = NewPhoto {
        upload_reference: upload_ref,
        capture_time: capture_time.to_rfc3339(),
        pose,
        places: place_id.map(|id| vec![PlaceRef { place_id: id }]),
    };

    client.create_photo(&photo).map_err(|e| add_stamp_hint(e, image))
}

fn validate_image_file(image: &Path) -> Result<(), AppError> {
    if !image.is_file() {
        return Err(AppError::Precondition(format!(
            "image file not found: {}",
            image.display()
        )));
    }
    let mime = mime_guess::from_path(image).first_or_octet_stream();
    if mime != mime_guess::mime::IMAGE_JPEG {
        return Err(AppError::Precondition(format!(
            "file must be a JPEG image, got {}: {}",
            mime,
            image.display()
        )));
    }
    Ok(())
}

fn validate_location_args(args: &LocationArgs) -> Result<(), AppError> {
    if args.latitude.is_some() != args.longitude.is_some() {
        return Err(AppError::Usage(
            "--lat and --lng must be supplied together".to_string(),
        ));
    }
    if let Some(lat) = args.latitude {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(AppError::Usage(format!(
                "latitude must lie in [-90, 90], got {}",
                lat
            )));
        }
    }
    if let Some(lng) = args.longitude {
        if !(-180.0..=180.0).contains(&lng) {
            return Err(AppError::Usage(format!(
                "longitude must lie in [-180, 180], got {}",
                lng
            )));
        }
    }
    if let Some(heading) = args.heading {
        // Rejected rather than normalized; 360 itself is out of range.
        if !(0.0..360.0).contains(&heading) {
            return Err(AppError::Usage(format!(
                "heading must lie in [0, 360), got {}",
                heading
            )));
        }
    }
    Ok(())
}

/// Combines CLI arguments with the EXIF fallback into an optional pose.
/// Altitude and heading given explicitly on the command line are rejected
/// when no coordinate pair can be resolved; EXIF-derived altitude is simply
/// dropped in that case.
fn resolve_pose(args: &LocationArgs, exif: &ExifSummary) -> Result<Option<Pose>, AppError> {
    let pair = match (args.latitude, args.longitude) {
        (Some(lat), Some(lng)) => Some((lat, lng)),
        _ => match (exif.latitude, exif.longitude) {
            (Some(lat), Some(lng)) => {
                log::info!("Using GPS coordinates from EXIF: {:.6}, {:.6}", lat, lng);
                Some((lat, lng))
            }
            _ => None,
        },
    };

    let Some((latitude, longitude)) = pair else {
        if args.altitude.is_some() || args.heading.is_some() {
            return Err(AppError::Usage(
                "--alt and --heading require a coordinate pair (--lat/--lng or EXIF GPS)"
                    .to_string(),
            ));
        }
        return Ok(None);
    };

    Ok(Some(Pose {
        lat_lng_pair: LatLngPair {
            latitude,
            longitude,
        },
        altitude: args.altitude.or(exif.altitude),
        heading: args.heading,
    }))
}

fn capture_time(image: &Path, exif: &ExifSummary) -> Result<DateTime<Utc>, AppError> {
    if let Some(t) = exif.capture_time {
        return Ok(t);
    }
    let modified = fs::metadata(image)?.modified()?;
    Ok(DateTime::<Utc>::from(modified))
}

/// The API rejects images without Photo Sphere XMP with a "not a 360 photo"
/// message; point the user at the stamp subcommand when that happens.
fn add_stamp_hint(err: AppError, image: &Path) -> AppError {
    match err {
        AppError::Api { status, message } if mentions_missing_pano(&message) => AppError::Api {
            status,
            message: format!(
                "{} (hint: run `streetview_uploader stamp {}` to add Photo Sphere metadata, then retry)",
                message,
                image.display()
            ),
        },
        other => other,
    }
}

fn mentions_missing_pano(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("360") || lower.contains("pano")
}

/// The server usually returns a share link; construct a pano viewer URL from
/// the photo id when it does not.
pub fn share_link(photo: &Photo) -> String {
    match photo.share_link {
        Some(ref link) => link.clone(),
        None => format!(
            "https://www.google.com/maps/@?api=1&map_action=pano&pano={}",
            photo.photo_id.id
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exif_with(lat: Option<f64>, lng: Option<f64>, alt: Option<f64>) -> ExifSummary {
        ExifSummary {
            latitude: lat,
            longitude: lng,
            altitude: alt,
            capture_time: None,
        }
    }

    #[test]
    fn lone_latitude_is_a_usage_error() {
        let args = LocationArgs {
            latitude: Some(37.0),
            ..Default::default()
        };
        assert!(matches!(
            validate_location_args(&args),
            Err(AppError::Usage(_))
        ));
    }

    #[test]
    fn lone_longitude_is_a_usage_error() {
        let args = LocationArgs {
            longitude: Some(-122.0),
            ..Default::default()
        };
        assert!(matches!(
            validate_location_args(&args),
            Err(AppError::Usage(_))
        ));
    }

    #[test]
    fn heading_must_be_below_360() {
        let mut args = LocationArgs {
            latitude: Some(0.0),
            longitude: Some(0.0),
            heading: Some(360.0),
            ..Default::default()
        };
        assert!(validate_location_args(&args).is_err());
        args.heading = Some(359.9);
        assert!(validate_location_args(&args).is_ok());
        args.heading = Some(-0.1);
        assert!(validate_location_args(&args).is_err());
    }

    #[test]
    fn coordinates_out_of_range_are_rejected() {
        let args = LocationArgs {
            latitude: Some(91.0),
            longitude: Some(0.0),
            ..Default::default()
        };
        assert!(validate_location_args(&args).is_err());
        let args = LocationArgs {
            latitude: Some(0.0),
            longitude: Some(181.0),
            ..Default::default()
        };
        assert!(validate_location_args(&args).is_err());
    }

    #[test]
    fn explicit_coordinates_win_over_exif() {
        let args = LocationArgs {
            latitude: Some(10.0),
            longitude: Some(20.0),
            ..Default::default()
        };
        let pose = resolve_pose(&args, &exif_with(Some(1.0), Some(2.0), None))
            .unwrap()
            .unwrap();
        assert_eq!(pose.lat_lng_pair.latitude, 10.0);
        assert_eq!(pose.lat_lng_pair.longitude, 20.0);
    }

    #[test]
    fn exif_gps_fills_in_missing_coordinates() {
        let args = LocationArgs::default();
        let pose = resolve_pose(&args, &exif_with(Some(48.85), Some(2.29), Some(35.0)))
            .unwrap()
            .unwrap();
        assert_eq!(pose.lat_lng_pair.latitude, 48.85);
        assert_eq!(pose.altitude, Some(35.0));
    }

    #[test]
    fn no_coordinates_anywhere_means_no_pose() {
        let pose = resolve_pose(&LocationArgs::default(), &exif_with(None, None, None)).unwrap();
        assert!(pose.is_none());
    }

    #[test]
    fn altitude_without_any_pair_is_a_usage_error() {
        let args = LocationArgs {
            altitude: Some(12.0),
            ..Default::default()
        };
        let err = resolve_pose(&args, &exif_with(None, None, None)).unwrap_err();
        assert!(matches!(err, AppError::Usage(_)));
    }

    #[test]
    fn cli_altitude_overrides_exif_altitude() {
        let args = LocationArgs {
            latitude: Some(1.0),
            longitude: Some(2.0),
            altitude: Some(99.0),
            ..Default::default()
        };
        let pose = resolve_pose(&args, &exif_with(None, None, Some(5.0)))
            .unwrap()
            .unwrap();
        assert_eq!(pose.altitude, Some(99.0));
    }

    #[test]
    fn pano_rejection_gets_a_stamp_hint() {
        let err = add_stamp_hint(
            AppError::Api {
                status: 400,
                message: "Photo is not a 360 photo.".to_string(),
            },
            Path::new("pano.jpg"),
        );
        assert!(err.to_string().contains("stamp pano.jpg"));
        assert!(err.to_string().contains("Photo is not a 360 photo."));
    }

    #[test]
    fn unrelated_api_errors_are_left_untouched() {
        let err = add_stamp_hint(
            AppError::Api {
                status: 429,
                message: "Quota exceeded.".to_string(),
            },
            Path::new("pano.jpg"),
        );
        assert_eq!(err.to_string(), "API error (HTTP 429): Quota exceeded.");
    }

    #[test]
    fn share_link_falls_back_to_a_pano_url() {
        let photo: Photo = serde_json::from_str(r#"{"photoId":{"id":"abc123"}}"#).unwrap();
        assert_eq!(
            share_link(&photo),
            "https://www.google.com/maps/@?api=1&map_action=pano&pano=abc123"
        );
        let photo: Photo =
            serde_json::from_str(r#"{"photoId":{"id":"abc123"},"shareLink":"https://s/x"}"#)
                .unwrap();
        assert_eq!(share_link(&photo), "https://s/x");
    }

    #[test]
    fn bad_location_args_fail_before_authentication() {
        // No credentials or token files exist; a usage error must surface
        // without the pipeline ever reaching the auth step.
        let dir = tempfile::tempdir().unwrap();
        let jpeg = dir.path().join("pano.jpg");
        fs::write(&jpeg, b"\xff\xd8\xff\xe0").unwrap();
        let config = AuthConfig::new(
            dir.path().join("credentials.json"),
            dir.path().join("token.json"),
        );
        let location = LocationArgs {
            altitude: Some(5.0),
            ..Default::default()
        };

        let err = run(&config, &jpeg, &location, None).unwrap_err();
        assert!(matches!(err, AppError::Usage(_)), "got {:?}", err);
        assert!(!config.token_path.exists());
    }

    #[test]
    fn capture_time_falls_back_to_file_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let jpeg = dir.path().join("untagged.jpg");
        fs::write(&jpeg, b"\xff\xd8\xff\xe0").unwrap();

        let t = capture_time(&jpeg, &exif_with(None, None, None)).unwrap();
        let modified = DateTime::<Utc>::from(fs::metadata(&jpeg).unwrap().modified().unwrap());
        assert_eq!(t, modified);
    }

    #[test]
    fn non_jpeg_file_fails_the_precondition() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("image.png");
        fs::write(&png, b"png").unwrap();
        let err = validate_image_file(&png).unwrap_err();
        assert!(err.to_string().contains("JPEG"));
    }

    #[test]
    fn missing_file_fails_before_any_network_step() {
        let err = validate_image_file(Path::new("missing.jpg")).unwrap_err();
        assert!(matches!(err, AppError::Precondition(_)));
    }
}
