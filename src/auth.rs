use crate::config::AuthConfig;
use crate::error::AppError;
use chrono::{DateTime, Duration, Utc};
use oauth2::basic::BasicClient;
use oauth2::reqwest::http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, RefreshToken,
    Scope, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use url::Url;

const SCOPE: &str = "https://www.googleapis.com/auth/streetviewpublish";
const EXPIRY_MARGIN_SECS: i64 = 60;

fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// The vendor-issued client secrets file holds the secrets under either an
/// `installed` (desktop app) or `web` key.
#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl ClientSecrets {
    pub fn load(config: &AuthConfig) -> Result<Self, AppError> {
        let path = &config.credentials_path;
        if !path.is_file() {
            return Err(AppError::Auth(format!(
                "client secrets file not found: {}; download an OAuth client ID \
                 (Desktop app) from the Google Cloud console and save it there",
                path.display()
            )));
        }
        let raw = fs::read_to_string(path)?;
        let file: ClientSecretsFile = serde_json::from_str(&raw)?;
        file.installed.or(file.web).ok_or_else(|| {
            AppError::Auth(format!(
                "{} has neither an \"installed\" nor a \"web\" section",
                path.display()
            ))
        })
    }
}

/// On-disk token cache, written after every successful exchange or refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl StoredToken {
    fn is_fresh(&self) -> bool {
        self.expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) > Utc::now()
    }

    fn load(config: &AuthConfig) -> Result<Option<Self>, AppError> {
        if !config.token_path.is_file() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&config.token_path)?;
        let token = serde_json::from_str(&raw).map_err(|e| {
            AppError::Auth(format!(
                "could not parse {}: {}; delete it and run again to re-authenticate",
                config.token_path.display(),
                e
            ))
        })?;
        Ok(Some(token))
    }

    fn save(&self, config: &AuthConfig) -> Result<(), AppError> {
        fs::write(&config.token_path, serde_json::to_string_pretty(self)?)?;
        log::info!("Saved token to {:?}", config.token_path);
        Ok(())
    }
}

/// Returns a valid access token, reusing or refreshing the cached token when
/// possible and falling back to the interactive browser consent flow.
pub fn access_token(config: &AuthConfig) -> Result<String, AppError> {
    if let Some(token) = StoredToken::load(config)? {
        if token.is_fresh() {
            log::debug!("Reusing cached token from {:?}", config.token_path);
            return Ok(token.access_token);
        }
        if let Some(refresh_token) = token.refresh_token.clone() {
            println!("Refreshing authentication token...");
            let refreshed = refresh(config, &token, &refresh_token)?;
            refreshed.save(config)?;
            return Ok(refreshed.access_token);
        }
        log::debug!("Cached token expired and has no refresh token");
    }

    println!("Starting authentication flow...");
    let token = interactive_consent(config)?;
    token.save(config)?;
    Ok(token.access_token)
}

fn oauth_client(secrets: &ClientSecrets, redirect: Option<String>) -> Result<BasicClient, AppError> {
    let mut client = BasicClient::new(
        ClientId::new(secrets.client_id.clone()),
        Some(ClientSecret::new(secrets.client_secret.clone())),
        AuthUrl::new(secrets.auth_uri.clone())?,
        Some(TokenUrl::new(secrets.token_uri.clone())?),
    );
    if let Some(redirect) = redirect {
        client = client.set_redirect_uri(RedirectUrl::new(redirect)?);
    }
    Ok(client)
}

fn refresh(
    config: &AuthConfig,
    old: &StoredToken,
    refresh_token: &str,
) -> Result<StoredToken, AppError> {
    let secrets = ClientSecrets::load(config)?;
    let client = oauth_client(&secrets, None)?;
    let response = client
        .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
        .request(http_client)
        .map_err(|e| {
            AppError::Auth(format!(
                "token refresh failed: {}; delete {} and run again to re-authenticate",
                e,
                config.token_path.display()
            ))
        })?;

    Ok(StoredToken {
        access_token: response.access_token().secret().clone(),
        // Google only returns a refresh token on the initial consent.
        refresh_token: response
            .refresh_token()
            .map(|t| t.secret().clone())
            .or_else(|| old.refresh_token.clone()),
        expires_at: expires_at(response.expires_in()),
    })
}

fn interactive_consent(config: &AuthConfig) -> Result<StoredToken, AppError> {
    let secrets = ClientSecrets::load(config)?;

    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    let client = oauth_client(&secrets, Some(format!("http://127.0.0.1:{}", port)))?;

    let (auth_url, csrf_state) = client
        .authorize_url(CsrfToken::new_random)
        .add_scope(Scope::new(SCOPE.to_string()))
        .add_extra_param("access_type", "offline")
        .add_extra_param("prompt", "consent")
        .url();

    println!("Opening your browser for Google consent...");
    println!("If it does not open, visit this URL:\n{}", auth_url);
    if let Err(e) = webbrowser::open(auth_url.as_str()) {
        log::warn!("Could not launch a browser: {}", e);
    }

    let redirect = wait_for_redirect(&listener)?;
    if redirect.state != *csrf_state.secret() {
        return Err(AppError::Auth(
            "state mismatch in OAuth redirect; aborting".to_string(),
        ));
    }

    let response = client
        .exchange_code(AuthorizationCode::new(redirect.code))
        .request(http_client)
        .map_err(|e| AppError::Auth(format!("code exchange failed: {}", e)))?;

    Ok(StoredToken {
        access_token: response.access_token().secret().clone(),
        refresh_token: response.refresh_token().map(|t| t.secret().clone()),
        expires_at: expires_at(response.expires_in()),
    })
}

fn expires_at(expires_in: Option<std::time::Duration>) -> DateTime<Utc> {
    let lifetime = expires_in
        .and_then(|d| Duration::from_std(d).ok())
        .unwrap_or_else(|| Duration::minutes(55));
    Utc::now() + lifetime
}

#[derive(Debug, PartialEq)]
struct AuthRedirect {
    code: String,
    state: String,
}

/// Blocks until the browser hits the loopback redirect, answers it with a
/// close-this-tab page, and returns the authorization code.
fn wait_for_redirect(listener: &TcpListener) -> Result<AuthRedirect, AppError> {
    let (mut stream, peer) = listener.accept()?;
    log::debug!("OAuth redirect connection from {}", peer);

    let mut request_line = String::new();
    BufReader::new(&stream).read_line(&mut request_line)?;
    let redirect = parse_redirect(&request_line);

    let body = match redirect {
        Ok(_) => "Authentication complete. You can close this tab and return to the terminal.",
        Err(_) => "Authentication failed. Return to the terminal for details.",
    };
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(response.as_bytes())?;

    redirect
}

fn parse_redirect(request_line: &str) -> Result<AuthRedirect, AppError> {
    let path = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| AppError::Auth("malformed redirect request".to_string()))?;
    let url = Url::parse(&format!("http://127.0.0.1{}", path))?;

    if let Some((_, reason)) = url.query_pairs().find(|(k, _)| k == "error") {
        return Err(AppError::Auth(format!(
            "consent was not granted: {}",
            reason
        )));
    }

    let code = url.query_pairs().find(|(k, _)| k == "code").map(|(_, v)| v.into_owned());
    let state = url.query_pairs().find(|(k, _)| k == "state").map(|(_, v)| v.into_owned());
    match (code, state) {
        (Some(code), Some(state)) => Ok(AuthRedirect { code, state }),
        _ => Err(AppError::Auth(
            "redirect carried no authorization code".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config_in(dir: &std::path::Path) -> AuthConfig {
        AuthConfig::new(dir.join("credentials.json"), dir.join("token.json"))
    }

    #[test]
    fn parses_code_and_state_from_redirect() {
        let line = "GET /?state=abc123&code=4%2F0Axyz HTTP/1.1\r\n";
        let redirect = parse_redirect(line).unwrap();
        assert_eq!(redirect.code, "4/0Axyz");
        assert_eq!(redirect.state, "abc123");
    }

    #[test]
    fn declined_consent_is_an_auth_error() {
        let line = "GET /?error=access_denied HTTP/1.1\r\n";
        let err = parse_redirect(line).unwrap_err();
        assert!(err.to_string().contains("access_denied"));
    }

    #[test]
    fn garbage_request_line_does_not_panic() {
        assert!(parse_redirect("").is_err());
        assert!(parse_redirect("GET").is_err());
    }

    #[test]
    fn token_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let token = StoredToken {
            access_token: "ya29.test".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            expires_at: Utc::now() + Duration::hours(1),
        };
        token.save(&config).unwrap();

        let loaded = StoredToken::load(&config).unwrap().unwrap();
        assert_eq!(loaded.access_token, "ya29.test");
        assert_eq!(loaded.refresh_token.as_deref(), Some("1//refresh"));
        assert!(loaded.is_fresh());
    }

    #[test]
    fn fresh_cached_token_skips_the_consent_flow() {
        // No credentials file and no network: a fresh cached token must be
        // returned without ever reaching the interactive flow.
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        StoredToken {
            access_token: "ya29.cached".to_string(),
            refresh_token: None,
            expires_at: Utc::now() + Duration::hours(1),
        }
        .save(&config)
        .unwrap();

        assert_eq!(access_token(&config).unwrap(), "ya29.cached");
    }

    #[test]
    fn missing_token_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(StoredToken::load(&config_in(dir.path())).unwrap().is_none());
    }

    #[test]
    fn corrupt_token_file_suggests_deleting_it() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        fs::write(&config.token_path, "not json").unwrap();
        let err = StoredToken::load(&config).unwrap_err();
        assert!(err.to_string().contains("delete"));
    }

    #[test]
    fn expired_token_is_not_fresh() {
        let token = StoredToken {
            access_token: "ya29.test".to_string(),
            refresh_token: None,
            expires_at: Utc::now() - Duration::seconds(1),
        };
        assert!(!token.is_fresh());
    }

    #[test]
    fn secrets_accept_installed_and_web_sections() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        fs::write(
            &config.credentials_path,
            r#"{"installed":{"client_id":"id","client_secret":"secret"}}"#,
        )
        .unwrap();
        let secrets = ClientSecrets::load(&config).unwrap();
        assert_eq!(secrets.client_id, "id");
        assert_eq!(secrets.token_uri, "https://oauth2.googleapis.com/token");

        fs::write(
            &config.credentials_path,
            r#"{"web":{"client_id":"wid","client_secret":"wsecret"}}"#,
        )
        .unwrap();
        assert_eq!(ClientSecrets::load(&config).unwrap().client_id, "wid");
    }

    #[test]
    fn missing_secrets_name_the_path() {
        let config = AuthConfig::new(PathBuf::from("/nope/creds.json"), PathBuf::from("t.json"));
        let err = ClientSecrets::load(&config).unwrap_err();
        assert!(err.to_string().contains("/nope/creds.json"));
    }
}
