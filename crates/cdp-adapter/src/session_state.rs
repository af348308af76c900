//! Persisted browsing identity: cookies plus per-origin localStorage, in the
//! `{cookies, origins}` layout other automation tools also read and write.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::adapter::Cdp;
use crate::commands::CookieParam;
use crate::error::AdapterError;

#[derive(Debug, Error)]
pub enum SessionStateError {
    #[error("session state i/o failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("session state at {path} is malformed: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Browser(#[from] AdapterError),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageEntry {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OriginState {
    pub origin: String,
    #[serde(rename = "localStorage", default)]
    pub local_storage: Vec<StorageEntry>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub cookies: Vec<CookieParam>,
    #[serde(default)]
    pub origins: Vec<OriginState>,
}

impl SessionState {
    /// Reads the state file; a missing file is `Ok(None)`.
    pub async fn load(path: &Path) -> Result<Option<Self>, SessionStateError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SessionStateError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let state = serde_json::from_slice(&bytes).map_err(|source| SessionStateError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Some(state))
    }

    /// Writes atomically via a sibling temp file.
    pub async fn save(&self, path: &Path) -> Result<(), SessionStateError> {
        let io_err = |source: std::io::Error| SessionStateError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let bytes = serde_json::to_vec_pretty(self).map_err(|source| SessionStateError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
        info!(
            target: "cdp-adapter",
            path = %path.display(),
            cookies = self.cookies.len(),
            "session state saved"
        );
        Ok(())
    }

    /// Drops cookies whose name is in `names`; returns how many were removed.
    pub fn strip_cookies(&mut self, names: &[&str]) -> usize {
        let before = self.cookies.len();
        self.cookies
            .retain(|cookie| !names.iter().any(|name| *name == cookie.name));
        before - self.cookies.len()
    }

    /// Loads cookies into the browser and seeds localStorage for each origin
    /// before that origin's scripts run.
    pub async fn apply(&self, cdp: &dyn Cdp) -> Result<(), SessionStateError> {
        cdp.set_cookies(&self.cookies).await?;
        if let Some(script) = self.local_storage_script() {
            cdp.add_init_script(&script).await?;
        }
        debug!(
            target: "cdp-adapter",
            cookies = self.cookies.len(),
            origins = self.origins.len(),
            "session state applied"
        );
        Ok(())
    }

    /// Snapshots the browser's cookies and the current origin's localStorage.
    pub async fn capture(cdp: &dyn Cdp) -> Result<Self, SessionStateError> {
        let cookies = cdp.cookies().await?;
        let snapshot = cdp
            .evaluate(
                "(() => { try { return { origin: location.origin, entries: Object.entries(localStorage) }; } catch (e) { return null; } })()",
            )
            .await?;
        let origins = parse_storage_snapshot(&snapshot).into_iter().collect();
        Ok(Self { cookies, origins })
    }

    fn local_storage_script(&self) -> Option<String> {
        let populated: Vec<&OriginState> = self
            .origins
            .iter()
            .filter(|o| !o.local_storage.is_empty())
            .collect();
        if populated.is_empty() {
            return None;
        }
        let payload = serde_json::to_string(&populated).ok()?;
        Some(format!(
            "(() => {{\n  const origins = {payload};\n  const hit = origins.find((o) => o.origin === location.origin);\n  if (!hit) {{ return; }}\n  try {{\n    for (const e of hit.localStorage) {{\n      if (localStorage.getItem(e.name) === null) {{ localStorage.setItem(e.name, e.value); }}\n    }}\n  }} catch (e) {{}}\n}})();"
        ))
    }
}

fn parse_storage_snapshot(value: &Value) -> Option<OriginState> {
    let origin = value.get("origin")?.as_str()?;
    if origin == "null" || origin.is_empty() {
        return None;
    }
    let local_storage = value
        .get("entries")?
        .as_array()?
        .iter()
        .filter_map(|pair| {
            let pair = pair.as_array()?;
            Some(StorageEntry {
                name: pair.first()?.as_str()?.to_string(),
                value: pair.get(1)?.as_str()?.to_string(),
            })
        })
        .collect();
    Some(OriginState {
        origin: origin.to_string(),
        local_storage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn sample() -> SessionState {
        SessionState {
            cookies: vec![
                CookieParam::new("auth", "token"),
                CookieParam::new("_abck", "tracking"),
                CookieParam::new("bm_sz", "tracking"),
            ],
            origins: vec![OriginState {
                origin: "https://www.shop.test".into(),
                local_storage: vec![StorageEntry {
                    name: "cart".into(),
                    value: "{}".into(),
                }],
            }],
        }
    }

    #[test]
    fn strip_removes_only_named_cookies() {
        let mut state = sample();
        let removed = state.strip_cookies(&["_abck", "bm_sz", "rxVisitor"]);
        assert_eq!(removed, 2);
        assert_eq!(state.cookies.len(), 1);
        assert_eq!(state.cookies[0].name, "auth");
    }

    #[test]
    fn reads_foreign_state_layout() {
        let raw = json!({
            "cookies": [{
                "name": "auth", "value": "t", "domain": ".shop.test", "path": "/",
                "expires": -1, "httpOnly": true, "secure": true, "sameSite": "Lax"
            }],
            "origins": [{
                "origin": "https://www.shop.test",
                "localStorage": [{ "name": "k", "value": "v" }]
            }]
        });
        let state: SessionState = serde_json::from_value(raw).unwrap();
        assert_eq!(state.cookies[0].same_site.as_deref(), Some("Lax"));
        assert_eq!(state.origins[0].local_storage[0].name, "k");
    }

    #[tokio::test]
    async fn save_then_load_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        assert!(SessionState::load(&path).await.unwrap().is_none());

        sample().save(&path).await.unwrap();
        let loaded = SessionState::load(&path).await.unwrap().unwrap();
        assert_eq!(loaded, sample());
    }

    #[tokio::test]
    async fn malformed_file_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();
        let err = SessionState::load(&path).await.unwrap_err();
        assert!(matches!(err, SessionStateError::Parse { .. }));
    }

    #[test]
    fn storage_snapshot_skips_opaque_origins() {
        assert!(parse_storage_snapshot(&json!({ "origin": "null", "entries": [] })).is_none());
        let parsed = parse_storage_snapshot(&json!({
            "origin": "https://www.shop.test",
            "entries": [["a", "1"], ["b", "2"]]
        }))
        .unwrap();
        assert_eq!(parsed.local_storage.len(), 2);
    }

    #[test]
    fn init_script_only_when_storage_present() {
        assert!(SessionState::default().local_storage_script().is_none());
        let script = sample().local_storage_script().unwrap();
        assert!(script.contains("https://www.shop.test"));
    }
}
