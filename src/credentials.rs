use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Read-only view of state persisted by the app shell: the auth token and
/// the mountain the user has selected.
pub trait CredentialStore: Send + Sync {
    fn auth_token(&self) -> Option<String>;
    fn selected_mountain(&self) -> Option<String>;
}

/// Credentials held in memory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticCredentials {
    pub token: Option<String>,
    pub selected_mountain: Option<String>,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>, selected_mountain: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            selected_mountain: Some(selected_mountain.into()),
        }
    }
}

impl CredentialStore for StaticCredentials {
    fn auth_token(&self) -> Option<String> {
        self.token.clone().filter(|t| !t.is_empty())
    }

    fn selected_mountain(&self) -> Option<String> {
        self.selected_mountain.clone().filter(|m| !m.is_empty())
    }
}

/// Credentials in a JSON file owned by another process. Re-read on every
/// access.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn read(&self) -> Option<StaticCredentials> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) => {
                log::debug!("[credentials] {} unreadable: {}", self.path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(credentials) => Some(credentials),
            Err(e) => {
                log::warn!("[credentials] {} is not valid JSON: {}", self.path.display(), e);
                None
            }
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn auth_token(&self) -> Option<String> {
        self.read().and_then(|c| c.auth_token())
    }

    fn selected_mountain(&self) -> Option<String> {
        self.read().and_then(|c| c.selected_mountain())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_credentials_treat_empty_as_missing() {
        let creds = StaticCredentials {
            token: Some(String::new()),
            selected_mountain: Some("zermatt".to_string()),
        };
        assert_eq!(creds.auth_token(), None);
        assert_eq!(creds.selected_mountain().as_deref(), Some("zermatt"));
    }

    #[test]
    fn test_file_store_sees_external_updates() {
        let path = std::env::temp_dir().join(format!("slope_tracker_creds_{}.json", std::process::id()));
        let store = FileCredentialStore::new(&path);

        let _ = fs::remove_file(&path);
        assert_eq!(store.auth_token(), None);

        fs::write(&path, r#"{ "token": "abc", "selected_mountain": null }"#).unwrap();
        assert_eq!(store.auth_token().as_deref(), Some("abc"));
        assert_eq!(store.selected_mountain(), None);

        fs::write(&path, r#"{ "token": "def", "selected_mountain": "verbier" }"#).unwrap();
        assert_eq!(store.auth_token().as_deref(), Some("def"));
        assert_eq!(store.selected_mountain().as_deref(), Some("verbier"));

        fs::write(&path, "garbage").unwrap();
        assert_eq!(store.auth_token(), None);

        let _ = fs::remove_file(&path);
    }
}
