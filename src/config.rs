use std::path::PathBuf;

/// Locations of the two authentication artifacts shared across runs.
///
/// Built once from CLI flags and passed down the call chain so the token
/// lifecycle (absent -> created on first auth -> reused -> expired) is
/// never ambient state.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub credentials_path: PathBuf,
    pub token_path: PathBuf,
}

impl AuthConfig {
    pub fn new(credentials_path: PathBuf, token_path: PathBuf) -> Self {
        AuthConfig {
            credentials_path,
            token_path,
        }
    }
}
