use super::{ByteStream, ObjectInfo, ObjectStore};
use crate::core::fingerprint::{fingerprint_file, quote_etag};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use walkdir::WalkDir;

/// 写入中的临时文件所在目录，不属于任何对象 key
pub const TEMP_DIR_NAME: &str = ".txtmp";

/// 以本地目录充当存储桶（`Endpoint=file:///path`）
///
/// 对象 key 即目录下的相对路径，ETag 为文件内容 MD5。
pub struct LocalStorage {
    base_path: PathBuf,
    name: String,
}

impl LocalStorage {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let base_path = path.as_ref().to_path_buf();
        if !base_path.exists() {
            std::fs::create_dir_all(&base_path)
                .with_context(|| format!("Failed to create {}", base_path.display()))?;
        }
        let name = format!("local:{}", base_path.display());
        Ok(Self { base_path, name })
    }

    fn resolve_path(&self, key: &str) -> Result<PathBuf> {
        let key = key.trim_start_matches('/');
        if key.is_empty()
            || key == TEMP_DIR_NAME
            || key.starts_with(&format!("{}/", TEMP_DIR_NAME))
            || key.split('/').any(|part| part.is_empty() || part == "." || part == "..")
        {
            anyhow::bail!("非法的对象 key: {}", key);
        }
        Ok(self.base_path.join(key))
    }
}

#[async_trait]
impl ObjectStore for LocalStorage {
    async fn list_objects(&self) -> Result<Vec<ObjectInfo>> {
        let base = self.base_path.clone();

        // 使用 spawn_blocking 避免阻塞 async runtime
        let files: Vec<(String, PathBuf, u64)> = tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();
            let walker = WalkDir::new(&base)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| !(e.depth() == 1 && e.file_name() == TEMP_DIR_NAME));
            for entry in walker {
                let entry = entry?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let relative = entry.path().strip_prefix(&base)?;
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push((key, entry.path().to_path_buf(), entry.metadata()?.len()));
            }
            Ok::<_, anyhow::Error>(files)
        })
        .await??;

        let mut objects = Vec::with_capacity(files.len());
        for (key, path, size) in files {
            let hash = fingerprint_file(&path).await?;
            objects.push(ObjectInfo {
                key,
                etag: quote_etag(&hash),
                size,
                storage_class: None,
            });
        }

        Ok(objects)
    }

    async fn get_object(&self, key: &str) -> Result<ByteStream> {
        let path = self.resolve_path(key)?;
        let file = fs::File::open(&path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;

        Ok(ReaderStream::new(file).map_err(anyhow::Error::from).boxed())
    }

    async fn put_object(
        &self,
        key: &str,
        storage_class: Option<&str>,
        mut body: ByteStream,
        content_length: u64,
    ) -> Result<()> {
        let full_path = self.resolve_path(key)?;
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        if let Some(class) = storage_class {
            tracing::trace!("本地存储忽略存储类型 {}: {}", class, key);
        }

        // 先写入 .txtmp 下的临时文件，然后原子重命名
        let temp_dir = self.base_path.join(TEMP_DIR_NAME);
        fs::create_dir_all(&temp_dir).await?;
        let temp_path = temp_dir.join(format!("{}.part", uuid::Uuid::new_v4().simple()));
        let result = async {
            let mut file = fs::File::create(&temp_path).await?;
            let mut written = 0u64;
            while let Some(chunk) = body.try_next().await? {
                written += chunk.len() as u64;
                file.write_all(&chunk).await?;
            }
            file.flush().await?;
            if written != content_length {
                anyhow::bail!("长度不一致: 预期 {} 字节, 实际 {} 字节", content_length, written);
            }
            fs::rename(&temp_path, &full_path).await?;
            Ok(())
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&temp_path).await;
        }
        result.with_context(|| format!("Failed to write object {}", key))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fingerprint::hash_bytes;
    use bytes::Bytes;

    fn body(data: &'static [u8]) -> ByteStream {
        futures::stream::iter(vec![Ok(Bytes::from_static(data))]).boxed()
    }

    #[tokio::test]
    async fn test_put_list_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStorage::new(dir.path()).unwrap();

        store.put_object("docs/a.txt", None, body(b"hello"), 5).await.unwrap();

        let objects = store.list_objects().await.unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].key, "docs/a.txt");
        assert_eq!(objects[0].etag, quote_etag(&hash_bytes(b"hello")));
        assert_eq!(objects[0].size, 5);

        let data: Vec<Bytes> = store.get_object("docs/a.txt").await.unwrap().try_collect().await.unwrap();
        assert_eq!(data.concat(), b"hello");
    }

    #[tokio::test]
    async fn test_put_rejects_length_mismatch_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStorage::new(dir.path()).unwrap();

        assert!(store.put_object("a.txt", None, body(b"hello"), 9).await.is_err());
        assert!(store.list_objects().await.unwrap().is_empty());
        assert!(!dir.path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStorage::new(dir.path()).unwrap();
        assert!(store.get_object("../etc/passwd").await.is_err());
        assert!(store.put_object(".txtmp/x", None, body(b"x"), 1).await.is_err());
    }

    #[tokio::test]
    async fn test_txpart_suffix_is_an_ordinary_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStorage::new(dir.path()).unwrap();

        store.put_object("notes", None, body(b"plain"), 5).await.unwrap();
        store.put_object("notes.txpart", None, body(b"draft"), 5).await.unwrap();
        // 残留的临时文件不会出现在列表中
        std::fs::write(dir.path().join(TEMP_DIR_NAME).join("stale.part"), b"half").unwrap();

        let keys: Vec<_> = store.list_objects().await.unwrap().into_iter().map(|o| o.key).collect();
        assert_eq!(keys, vec!["notes", "notes.txpart"]);
    }
}
