use crate::error::AppError;
use lazy_static::lazy_static;
use percent_encoding::percent_decode_str;
use regex::Regex;

lazy_static! {
    // Google's internal hex id pair inside the !1s data parameter.
    static ref HEX_ID_RE: Regex =
        Regex::new(r"!1s(0x[a-fA-F0-9]+:[a-fA-F0-9x]+)").unwrap();
    static ref DATA_PLACE_ID_RE: Regex = Regex::new(r"place_id:([A-Za-z0-9_-]+)").unwrap();
    // At least 22 id characters after the prefix; shorter tokens are noise.
    static ref STANDARD_ID_RE: Regex = Regex::new(r"(ChIJ[a-zA-Z0-9_-]{22,})").unwrap();
    static ref PLACE_NAME_RE: Regex = Regex::new(r"/place/([^/@]+)").unwrap();
    static ref COORDS_RE: Regex = Regex::new(r"@(-?\d+\.\d+),(-?\d+\.\d+)").unwrap();
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaceExtract {
    /// Canonical id, directly usable with `upload --place-id`.
    Id(String),
    /// Internal hex pair; only convertible through the Maps share dialog.
    HexId(String),
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct UrlDetails {
    pub name: Option<String>,
    pub coordinates: Option<(f64, f64)>,
}

impl UrlDetails {
    fn is_empty(&self) -> bool {
        self.name.is_none() && self.coordinates.is_none()
    }
}

/// Pattern-matches a pasted Maps URL. A string matching none of the known
/// URL conventions is a distinct "not recognized" error, never a panic.
pub fn analyze(url: &str) -> Result<(Option<PlaceExtract>, UrlDetails), AppError> {
    let decoded = percent_decode_str(url).decode_utf8_lossy();
    let extract = extract_place(&decoded);
    let details = extract_details(&decoded);
    if extract.is_none() && details.is_empty() {
        return Err(AppError::UrlNotRecognized);
    }
    Ok((extract, details))
}

fn extract_place(url: &str) -> Option<PlaceExtract> {
    if let Some(captures) = HEX_ID_RE.captures(url) {
        return Some(PlaceExtract::HexId(captures[1].to_string()));
    }
    if let Some(captures) = DATA_PLACE_ID_RE.captures(url) {
        return Some(PlaceExtract::Id(captures[1].to_string()));
    }
    if let Some(captures) = STANDARD_ID_RE.captures(url) {
        return Some(PlaceExtract::Id(captures[1].to_string()));
    }
    None
}

fn extract_details(url: &str) -> UrlDetails {
    let mut details = UrlDetails::default();

    if let Some(captures) = PLACE_NAME_RE.captures(url) {
        details.name = Some(captures[1].replace('+', " "));
    }
    if let Some(captures) = COORDS_RE.captures(url) {
        // The regex only admits decimal floats, so parsing cannot fail.
        let latitude: f64 = captures[1].parse().unwrap_or_default();
        let longitude: f64 = captures[2].parse().unwrap_or_default();
        details.coordinates = Some((latitude, longitude));
    }

    details
}
