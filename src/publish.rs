use crate::error::AppError;
use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};

const API_BASE: &str = "https://streetviewpublish.googleapis.com/v1";

/// Opaque handle for streaming photo bytes, issued by `photo:startUpload`
/// and consumed exactly once by the create call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRef {
    pub upload_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatLngPair {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pose {
    pub lat_lng_pair: LatLngPair,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceRef {
    pub place_id: String,
}

/// Body of the create-photo call.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPhoto {
    pub upload_reference: UploadRef,
    /// RFC3339; when the photo was captured, not uploaded.
    pub capture_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pose: Option<Pose>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub places: Option<Vec<PlaceRef>>,
}

#[derive(Debug, Deserialize)]
pub struct PhotoId {
    pub id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub photo_id: PhotoId,
    #[serde(default)]
    pub share_link: Option<String>,
    /// int64 fields arrive as JSON strings.
    #[serde(default)]
    pub view_count: Option<String>,
    #[serde(default)]
    pub maps_publish_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

pub struct PublishClient {
    http: Client,
    base_url: String,
    access_token: String,
}

impl PublishClient {
    pub fn new(access_token: String) -> Result<Self, AppError> {
        Self::with_base_url(access_token, API_BASE.to_string())
    }

    fn with_base_url(access_token: String, base_url: String) -> Result<Self, AppError> {
        // Panorama uploads routinely exceed the default 30s request timeout.
        let http = Client::builder().timeout(None).build()?;
        Ok(PublishClient {
            http,
            base_url,
            access_token,
        })
    }

    pub fn start_upload(&self) -> Result<UploadRef, AppError> {
        log::debug!("Requesting upload session from {}", self.base_url);
        let response = self
            .http
            .post(format!("{}/photo:startUpload", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({}))
            .send()?;
        let upload_ref: UploadRef = check(response)?.json()?;
        log::debug!("Upload session: {}", upload_ref.upload_url);
        Ok(upload_ref)
    }

    /// Streams the raw image bytes to the session endpoint. Single attempt,
    /// no retry; an interrupted upload leaves the session uncommitted.
    pub fn upload_bytes(&self, upload_ref: &UploadRef, bytes: Vec<u8>) -> Result<(), AppError> {
        log::debug!("Uploading {} bytes to session", bytes.len());
        let response = self
            .http
            .post(&upload_ref.upload_url)
            .bearer_auth(&self.access_token)
            .header("Content-Type", "image/jpeg")
            .header("X-Goog-Upload-Protocol", "raw")
            .header("X-Goog-Upload-Content-Length", bytes.len().to_string())
            .body(bytes)
            .send()?;
        check(response)?;
        Ok(())
    }

    pub fn create_photo(&self, photo: &NewPhoto) -> Result<Photo, AppError> {
        log::debug!("Creating photo entry");
        let response = self
            .http
            .post(format!("{}/photo", self.base_url))
            .bearer_auth(&self.access_token)
            .json(photo)
            .send()?;
        Ok(check(response)?.json()?)
    }
}

/// Maps a non-2xx response to an API error carrying the vendor's message
/// verbatim (decoded from the standard error envelope when possible).
fn check(response: Response) -> Result<Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.error.message)
        .unwrap_or(body);
    Err(AppError::Api {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn client_for(server: &Server) -> PublishClient {
        PublishClient::with_base_url("test-token".to_string(), server.url()).unwrap()
    }

    #[test]
    fn start_upload_returns_session_url() {
        let mut server = Server::new();
        let mock = server
            .mock("POST", "/photo:startUpload")
            .match_header("authorization", "Bearer test-token")
            .with_status(200)
            .with_body(r#"{"uploadUrl":"https://upload.example/session/1"}"#)
            .create();

        let upload_ref = client_for(&server).start_upload().unwrap();
        assert_eq!(upload_ref.upload_url, "https://upload.example/session/1");
        mock.assert();
    }

    #[test]
    fn upload_bytes_posts_raw_protocol_headers() {
        let mut server = Server::new();
        let mock = server
            .mock("POST", "/session")
            .match_header("x-goog-upload-protocol", "raw")
            .match_header("content-type", "image/jpeg")
            .match_header("x-goog-upload-content-length", "4")
            .match_body("JPEG")
            .with_status(200)
            .create();

        let client = client_for(&server);
        let upload_ref = UploadRef {
            upload_url: format!("{}/session", server.url()),
        };
        client.upload_bytes(&upload_ref, b"JPEG".to_vec()).unwrap();
        mock.assert();
    }

    #[test]
    fn create_photo_parses_id_and_share_link() {
        let mut server = Server::new();
        server
            .mock("POST", "/photo")
            .with_status(200)
            .with_body(
                r#"{"photoId":{"id":"CAoSK0FGMVFp"},"shareLink":"https://maps.example/p","viewCount":"0","mapsPublishStatus":"PUBLISHED"}"#,
            )
            .create();

        let photo = client_for(&server)
            .create_photo(&NewPhoto {
                upload_reference: UploadRef {
                    upload_url: "https://upload.example/session/1".to_string(),
                },
                capture_time: "2024-06-15T12:30:00+00:00".to_string(),
                pose: None,
                places: None,
            })
            .unwrap();
        assert_eq!(photo.photo_id.id, "CAoSK0FGMVFp");
        assert_eq!(photo.share_link.as_deref(), Some("https://maps.example/p"));
        assert_eq!(photo.maps_publish_status.as_deref(), Some("PUBLISHED"));
    }

    #[test]
    fn vendor_error_message_is_preserved_verbatim() {
        let mut server = Server::new();
        server
            .mock("POST", "/photo")
            .with_status(400)
            .with_body(
                r#"{"error":{"code":400,"message":"Photo is not a 360 photo.","status":"INVALID_ARGUMENT"}}"#,
            )
            .create();

        let err = client_for(&server)
            .create_photo(&NewPhoto {
                upload_reference: UploadRef {
                    upload_url: "u".to_string(),
                },
                capture_time: "2024-06-15T12:30:00+00:00".to_string(),
                pose: None,
                places: None,
            })
            .unwrap_err();
        match err {
            AppError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Photo is not a 360 photo.");
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[test]
    fn unset_pose_and_places_are_omitted_from_the_body() {
        let photo = NewPhoto {
            upload_reference: UploadRef {
                upload_url: "u".to_string(),
            },
            capture_time: "2024-06-15T12:30:00+00:00".to_string(),
            pose: None,
            places: None,
        };
        let value = serde_json::to_value(&photo).unwrap();
        assert!(value.get("pose").is_none());
        assert!(value.get("places").is_none());
        assert_eq!(value["uploadReference"]["uploadUrl"], "u");
    }

    #[test]
    fn pose_serializes_with_camel_case_pair() {
        let pose = Pose {
            lat_lng_pair: LatLngPair {
                latitude: 37.7749,
                longitude: -122.4194,
            },
            altitude: Some(10.5),
            heading: None,
        };
        let value = serde_json::to_value(&pose).unwrap();
        assert_eq!(value["latLngPair"]["latitude"], 37.7749);
        assert_eq!(value["altitude"], 10.5);
        assert!(value.get("heading").is_none());
    }
}
