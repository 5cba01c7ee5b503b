use chrono::{DateTime, NaiveDateTime, Utc};
use exif::{In, Rational, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// GPS and capture-time fields pulled from the image itself, used when the
/// caller supplies no coordinates on the command line.
#[derive(Debug, Default, Clone)]
pub struct ExifSummary {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub capture_time: Option<DateTime<Utc>>,
}

/// Best-effort read; an unreadable or EXIF-less file yields an empty summary.
pub fn read_summary(path: &Path) -> ExifSummary {
    match try_read_summary(path) {
        Ok(summary) => summary,
        Err(e) => {
            log::warn!("Could not extract EXIF data from {:?}: {}", path, e);
            ExifSummary::default()
        }
    }
}

fn try_read_summary(path: &Path) -> Result<ExifSummary, exif::Error> {
    let file = File::open(path)?;
    let mut buf_reader = BufReader::new(file);
    let exif = Reader::new().read_from_container(&mut buf_reader)?;

    let mut summary = ExifSummary::default();

    if let Some(field) = exif.get_field(Tag::GPSLatitude, In::PRIMARY) {
        if let Value::Rational(ref dms) = field.value {
            let sign = hemisphere_sign(&exif, Tag::GPSLatitudeRef, b'S');
            summary.latitude = dms_to_degrees(dms).map(|d| d * sign);
            log::trace!("EXIF GPS latitude: {:?}", summary.latitude);
        }
    }
    if let Some(field) = exif.get_field(Tag::GPSLongitude, In::PRIMARY) {
        if let Value::Rational(ref dms) = field.value {
            let sign = hemisphere_sign(&exif, Tag::GPSLongitudeRef, b'W');
            summary.longitude = dms_to_degrees(dms).map(|d| d * sign);
            log::trace!("EXIF GPS longitude: {:?}", summary.longitude);
        }
    }
    if let Some(field) = exif.get_field(Tag::GPSAltitude, In::PRIMARY) {
        if let Value::Rational(ref alt) = field.value {
            summary.altitude = alt.first().map(|r| r.to_f64());
            log::trace!("EXIF GPS altitude: {:?}", summary.altitude);
        }
    }

    for tag in [Tag::DateTimeOriginal, Tag::DateTime] {
        if let Some(field) = exif.get_field(tag, In::PRIMARY) {
            summary.capture_time = parse_exif_datetime(&field.display_value().to_string());
            if summary.capture_time.is_some() {
                log::trace!("EXIF capture time: {:?}", summary.capture_time);
                break;
            }
        }
    }

    Ok(summary)
}

/// -1.0 for the given negative hemisphere marker, 1.0 otherwise.
fn hemisphere_sign(exif: &exif::Exif, ref_tag: Tag, negative: u8) -> f64 {
    if let Some(field) = exif.get_field(ref_tag, In::PRIMARY) {
        if let Value::Ascii(ref v) = field.value {
            if v.first().and_then(|s| s.first()) == Some(&negative) {
                return -1.0;
            }
        }
    }
    1.0
}

fn dms_to_degrees(dms: &[Rational]) -> Option<f64> {
    if dms.len() < 3 {
        return None;
    }
    Some(dms[0].to_f64() + dms[1].to_f64() / 60.0 + dms[2].to_f64() / 3600.0)
}

fn parse_exif_datetime(s: &str) -> Option<DateTime<Utc>> {
    for format in ["%Y:%m:%d %H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s.trim(), format) {
            return Some(naive.and_utc());
        }
    }
    None
}
