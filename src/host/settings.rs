use async_trait::async_trait;
use serde_json::{Map, Value};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use super::SettingsStore;
use crate::error::{Result, SyncError};

/// `.vscode/settings.json` with flat dotted keys.
///
/// The file is parsed as JSONC, the dialect VS Code itself writes. Updates
/// re-serialize the whole document as pretty JSON, so comments do not survive
/// a write.
#[derive(Debug)]
pub struct SettingsFile {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SettingsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> std::result::Result<Map<String, Value>, String> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => return Err(format!("{}: {err}", self.path.display())),
        };
        parse_settings(&contents).map_err(|message| format!("{}: {message}", self.path.display()))
    }

    async fn store(&self, settings: Map<String, Value>) -> io::Result<()> {
        let path = self.path.clone();
        let mut contents = serde_json::to_string_pretty(&Value::Object(settings))?;
        contents.push('\n');

        tokio::task::spawn_blocking(move || write_atomic(&path, contents.as_bytes()))
            .await
            .map_err(io::Error::other)?
    }
}

#[async_trait]
impl SettingsStore for SettingsFile {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let settings = self.load().await.map_err(|message| SyncError::ConfigRead {
            key: key.to_string(),
            message,
        })?;
        Ok(settings.get(key).cloned())
    }

    async fn update(&self, key: &str, value: Value) -> Result<()> {
        let _guard = self.lock.lock().await;

        let mut settings = self.load().await.map_err(|message| SyncError::ConfigWrite {
            key: key.to_string(),
            message,
        })?;
        settings.insert(key.to_string(), value);

        self.store(settings)
            .await
            .map_err(|err| SyncError::ConfigWrite {
                key: key.to_string(),
                message: format!("{}: {err}", self.path.display()),
            })?;
        debug!("Wrote {key} to {:?}", self.path);
        Ok(())
    }
}

fn parse_settings(contents: &str) -> std::result::Result<Map<String, Value>, String> {
    let parsed = jsonc_parser::parse_to_value(contents, &jsonc_parser::ParseOptions::default())
        .map_err(|err| format!("invalid JSONC: {err}"))?;

    match parsed.map(convert_jsonc_to_serde_value) {
        None => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err("top-level value is not an object".to_string()),
    }
}

fn convert_jsonc_to_serde_value(value: jsonc_parser::JsonValue) -> Value {
    match value {
        jsonc_parser::JsonValue::Null => Value::Null,
        jsonc_parser::JsonValue::Boolean(b) => Value::Bool(b),
        jsonc_parser::JsonValue::Number(n) => {
            if let Ok(i) = n.parse::<i64>() {
                Value::Number(i.into())
            } else if let Ok(f) = n.parse::<f64>() {
                serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number)
            } else {
                Value::Null
            }
        }
        jsonc_parser::JsonValue::String(s) => Value::String(s.to_string()),
        jsonc_parser::JsonValue::Array(items) => {
            Value::Array(items.into_iter().map(convert_jsonc_to_serde_value).collect())
        }
        jsonc_parser::JsonValue::Object(obj) => Value::Object(
            obj.into_iter()
                .map(|(key, value)| (key, convert_jsonc_to_serde_value(value)))
                .collect(),
        ),
    }
}

/// Replace `path` via a sibling temp file so readers never see a partial write.
fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn settings_in(temp: &TempDir) -> SettingsFile {
        SettingsFile::new(temp.path().join(".vscode/settings.json"))
    }

    #[tokio::test]
    async fn missing_file_reads_as_unset() {
        let temp = TempDir::new().unwrap();
        let settings = settings_in(&temp);

        assert_eq!(settings.get("deno.path").await.unwrap(), None);
    }

    #[tokio::test]
    async fn reads_jsonc_with_comments() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join(".vscode")).unwrap();
        fs::write(
            temp.path().join(".vscode/settings.json"),
            r#"{
                // pinned by hand
                "deno.path": "/usr/local/bin/deno",
                "ruff.path": ["a", "b",],
                "editor.tabSize": 4,
            }"#,
        )
        .unwrap();
        let settings = settings_in(&temp);

        assert_eq!(
            settings.get("deno.path").await.unwrap(),
            Some(json!("/usr/local/bin/deno"))
        );
        assert_eq!(
            settings.get("ruff.path").await.unwrap(),
            Some(json!(["a", "b"]))
        );
        assert_eq!(settings.get("editor.tabSize").await.unwrap(), Some(json!(4)));
    }

    #[tokio::test]
    async fn update_creates_file_and_preserves_other_keys() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join(".vscode")).unwrap();
        fs::write(
            temp.path().join(".vscode/settings.json"),
            r#"{ "editor.fontSize": 14 }"#,
        )
        .unwrap();
        let settings = settings_in(&temp);

        settings
            .update("deno.path", json!(".vscode/vscode-mise-installs/deno/bin/deno"))
            .await
            .unwrap();

        let written: Value =
            serde_json::from_str(&fs::read_to_string(settings.path()).unwrap()).unwrap();
        assert_eq!(written["editor.fontSize"], json!(14));
        assert_eq!(
            written["deno.path"],
            json!(".vscode/vscode-mise-installs/deno/bin/deno")
        );
    }

    #[tokio::test]
    async fn concurrent_updates_keep_every_key() {
        let temp = TempDir::new().unwrap();
        let settings = Arc::new(settings_in(&temp));

        let keys = ["deno.path", "ruff.path", "go.goroot", "bun.runtime"];
        let mut tasks = tokio::task::JoinSet::new();
        for key in keys {
            let settings = Arc::clone(&settings);
            tasks.spawn(async move { settings.update(key, json!(key)).await });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }

        for key in keys {
            assert_eq!(settings.get(key).await.unwrap(), Some(json!(key)));
        }
    }

    #[rstest]
    #[case::garbage("{ not json")]
    #[case::array("[1, 2]")]
    #[tokio::test]
    async fn unreadable_settings_are_errors(#[case] contents: &str) {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join(".vscode")).unwrap();
        fs::write(temp.path().join(".vscode/settings.json"), contents).unwrap();
        let settings = settings_in(&temp);

        let read = settings.get("deno.path").await.unwrap_err();
        assert!(matches!(read, SyncError::ConfigRead { .. }));

        let write = settings.update("deno.path", json!("x")).await.unwrap_err();
        assert!(matches!(write, SyncError::ConfigWrite { .. }));
        assert_eq!(
            fs::read_to_string(settings.path()).unwrap(),
            contents,
            "a file we could not parse is never overwritten"
        );
    }

    #[test]
    fn empty_file_is_empty_object() {
        assert!(parse_settings("  \n").unwrap().is_empty());
    }
}
