//! Playback progress and the session-scoped store it survives navigation in.

use crate::{Error, Result};
use async_trait::async_trait;
use eoka::Page;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

/// Persisted playback progress for one tutorial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackSession {
    #[serde(rename = "tutorial", default)]
    pub tutorial_id: String,
    #[serde(rename = "step", default)]
    pub step_index: usize,
    #[serde(rename = "completed", default)]
    pub completed: BTreeSet<usize>,
    #[serde(rename = "url", default)]
    pub last_url: String,
}

impl PlaybackSession {
    pub fn new(tutorial_id: &str) -> Self {
        Self {
            tutorial_id: tutorial_id.to_string(),
            step_index: 0,
            completed: BTreeSet::new(),
            last_url: String::new(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::MalformedTutorial(format!("session: {}", e)))
    }
}

/// Session-scoped key/value store.
#[async_trait(?Send)]
pub trait SessionStore {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// In-process store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    map: Arc<Mutex<HashMap<String, String>>>,
    unavailable: Arc<Mutex<bool>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail, like a browser with storage disabled.
    pub fn set_unavailable(&self, unavailable: bool) {
        if let Ok(mut flag) = self.unavailable.lock() {
            *flag = unavailable;
        }
    }

    /// Current keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .map
            .lock()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    fn check(&self) -> Result<()> {
        match self.unavailable.lock() {
            Ok(flag) if !*flag => Ok(()),
            _ => Err(Error::StorageUnavailable("storage disabled".into())),
        }
    }

    fn with_map<T>(&self, f: impl FnOnce(&mut HashMap<String, String>) -> T) -> Result<T> {
        self.check()?;
        let mut map = self
            .map
            .lock()
            .map_err(|_| Error::StorageUnavailable("store lock poisoned".into()))?;
        Ok(f(&mut map))
    }
}

#[async_trait(?Send)]
impl SessionStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_map(|m| m.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.with_map(|m| {
            m.insert(key.to_string(), value.to_string());
        })
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.with_map(|m| {
            m.remove(key);
        })
    }
}

/// The live page's `sessionStorage`.
pub struct PageStore<'a> {
    page: &'a Page,
}

impl<'a> PageStore<'a> {
    pub fn new(page: &'a Page) -> Self {
        Self { page }
    }

    /// Run a storage call page-side. Storage exceptions come back as
    /// `{ok:false}` instead of surfacing as script errors.
    async fn call(&self, op: &str, key: &str, value: Option<&str>) -> Result<Option<String>> {
        let js = format!(
            r#"(() => {{
    try {{
        const op = {op}, key = {key}, value = {value};
        if (op === 'get') return JSON.stringify({{ ok: true, value: sessionStorage.getItem(key) }});
        if (op === 'set') sessionStorage.setItem(key, value);
        else sessionStorage.removeItem(key);
        return JSON.stringify({{ ok: true, value: null }});
    }} catch (e) {{
        return JSON.stringify({{ ok: false, error: String(e) }});
    }}
}})()"#,
            op = serde_json::to_string(op)?,
            key = serde_json::to_string(key)?,
            value = serde_json::to_string(&value)?,
        );
        let raw: String = self
            .page
            .evaluate(&js)
            .await
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        let reply: StorageReply = serde_json::from_str(&raw)?;
        if reply.ok {
            Ok(reply.value)
        } else {
            Err(Error::StorageUnavailable(reply.error.unwrap_or_default()))
        }
    }
}

#[derive(Deserialize)]
struct StorageReply {
    ok: bool,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait(?Send)]
impl SessionStore for PageStore<'_> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.call("get", key, None).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.call("set", key, Some(value)).await.map(|_| ())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.call("remove", key, None).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_round_trip() {
        let mut s = PlaybackSession::new("Login_flow");
        s.step_index = 3;
        s.completed.extend([0, 2]);
        s.last_url = "https://x.test/a".into();
        let json = s.to_json().unwrap();
        assert!(json.contains("\"step\":3"));
        assert!(json.contains("\"completed\":[0,2]"));
        let back = PlaybackSession::from_json(&json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn session_accepts_minimal_shape() {
        let s = PlaybackSession::from_json(r#"{"step":1,"completed":[0]}"#).unwrap();
        assert_eq!(s.step_index, 1);
        assert!(s.completed.contains(&0));
        assert!(PlaybackSession::from_json("nope").is_err());
    }

    #[tokio::test]
    async fn memory_store_shares_between_clones() {
        let a = MemoryStore::new();
        let b = a.clone();
        a.set("k", "v").await.unwrap();
        assert_eq!(b.get("k").await.unwrap().as_deref(), Some("v"));
        b.remove("k").await.unwrap();
        assert_eq!(a.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_store_can_be_disabled() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.set("k", "v").await,
            Err(Error::StorageUnavailable(_))
        ));
        store.set_unavailable(false);
        assert!(store.set("k", "v").await.is_ok());
    }
}
