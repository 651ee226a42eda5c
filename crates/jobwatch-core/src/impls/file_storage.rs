//! JsonFileStorage - キーごとに 1 つの JSON ファイル
//!
//! `<dir>/<key>.json` に書き込みます。書き込みは一時ファイル + rename で行うので、
//! 途中でクラッシュしても前回の内容が壊れることはありません。

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::domain::TrackerError;
use crate::ports::RecordStorage;

#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    dir: PathBuf,
}

impl JsonFileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`. Keys are restricted to a safe character set.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, TrackerError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(TrackerError::storage(key, "invalid storage key"));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl RecordStorage for JsonFileStorage {
    async fn load(&self, key: &str) -> Result<Option<String>, TrackerError> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(TrackerError::storage(key, err)),
        }
    }

    async fn save(&self, key: &str, value: &str) -> Result<(), TrackerError> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|err| TrackerError::storage(key, err))?;

        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        tokio::fs::write(&tmp, value)
            .await
            .map_err(|err| TrackerError::storage(key, err))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|err| TrackerError::storage(key, err))?;
        Ok(())
    }
}
