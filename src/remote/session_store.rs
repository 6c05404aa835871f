//! Session persistence used by the identity layer.

use anyhow::Result;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use std::{collections::HashMap, io::ErrorKind, path::PathBuf};
use tokio::{
    fs,
    io::{AsyncWriteExt, BufWriter},
};

use super::session::Session;

/// Abstract session persistence, so tests can stub it out.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Store or replace the session issued by the given identity service.
    async fn set(&self, issuer_url: &str, session: &Session) -> Result<()>;
    /// Retrieve the stored session for the given identity service, if any.
    async fn get(&self, issuer_url: &str) -> Option<Session>;
}

/// Stores sessions in a local JSON file (session.json).
#[derive(Clone)]
pub struct FileSessionStore {
    /// Location of the session cache on disk.
    path: PathBuf,
}

impl FileSessionStore {
    /// Create a new store backed by the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Stable hash of the issuer URL, so one file can hold sessions for
    /// several environments.
    fn issuer_key(issuer_url: &str) -> String {
        let hash = Sha256::digest(issuer_url.trim_end_matches('/').as_bytes());
        URL_SAFE_NO_PAD.encode(hash)
    }

    /// Key used in the session map for the given issuer.
    fn entry_key(issuer_url: &str) -> String {
        format!("session:{}", Self::issuer_key(issuer_url))
    }

    /// Load the entire session map from disk.
    async fn load_map(&self) -> Result<HashMap<String, Session>> {
        match fs::read(&self.path).await {
            Ok(data) => {
                if data.is_empty() {
                    return Ok(HashMap::new());
                }
                Ok(serde_json::from_slice(&data)?)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist the session map to disk, creating directories if needed.
    async fn save_map(&self, map: &HashMap<String, Session>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let data = serde_json::to_vec_pretty(map)?;
        let file = fs::File::create(&self.path).await?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&data).await?;
        writer.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStorage for FileSessionStore {
    async fn set(&self, issuer_url: &str, session: &Session) -> Result<()> {
        let mut map = self.load_map().await?;
        map.insert(Self::entry_key(issuer_url), session.clone());
        self.save_map(&map).await
    }

    async fn get(&self, issuer_url: &str) -> Option<Session> {
        let mut map = self.load_map().await.ok()?;
        map.remove(&Self::entry_key(issuer_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(access: &str) -> Session {
        Session {
            access_token: access.into(),
            refresh_token: "r1".into(),
            expires_at: Some(4_102_444_800),
        }
    }

    #[test]
    fn issuer_keys_are_stable_and_distinct() {
        assert_eq!(
            FileSessionStore::entry_key("https://id.example"),
            FileSessionStore::entry_key("https://id.example/")
        );
        assert_ne!(
            FileSessionStore::entry_key("https://id.example"),
            FileSessionStore::entry_key("https://other.example")
        );
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let path = std::env::temp_dir().join(format!("session-{}.json", uuid::Uuid::new_v4()));
        let store = FileSessionStore::new(&path);

        assert!(store.get("https://id.example").await.is_none());

        store.set("https://id.example", &session("a1")).await.unwrap();
        let got = store.get("https://id.example").await.unwrap();
        assert_eq!(got.access_token, "a1");

        // A second issuer does not clobber the first.
        store.set("https://other.example", &session("b2")).await.unwrap();
        assert_eq!(store.get("https://id.example").await.unwrap().access_token, "a1");

        let _ = tokio::fs::remove_file(&path).await;
    }
}
