//! Directory-backed [`Store`]: one `<key>.json` file per document.

use async_trait::async_trait;
use chainledger_core::error::StoreError;
use chainledger_core::store::Store;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::PathBuf;

pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(StoreError::Other(format!("invalid store key {key:?}")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl Store for FileStore {
    async fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.path(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Written to a sibling temp file first, then renamed over the target.
    async fn save(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        let path = self.path(key)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        let bytes = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::trace!(path = %path.display(), "saved document");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path(key)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("chainledger-store-{}-{name}", std::process::id()))
    }

    #[tokio::test]
    async fn save_load_delete() {
        let dir = scratch("roundtrip");
        let store = FileStore::new(&dir);

        assert_eq!(store.load("AddressBook").await.unwrap(), None);

        let doc = json!({ "0xabc": { "name": "me" } });
        store.save("AddressBook", &doc).await.unwrap();
        assert!(dir.join("AddressBook.json").exists());
        assert_eq!(store.load("AddressBook").await.unwrap(), Some(doc));

        store.delete("AddressBook").await.unwrap();
        store.delete("AddressBook").await.unwrap();
        assert_eq!(store.load("AddressBook").await.unwrap(), None);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn corrupt_documents_are_errors() {
        let dir = scratch("corrupt");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("EthereumData.json"), b"{not json").unwrap();

        let store = FileStore::new(&dir);
        assert!(matches!(
            store.load("EthereumData").await,
            Err(StoreError::Serde(_))
        ));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn keys_cannot_escape_the_directory() {
        let store = FileStore::new(scratch("escape"));
        assert!(store.load("../etc/passwd").await.is_err());
        assert!(store.save("", &json!({})).await.is_err());
    }
}
