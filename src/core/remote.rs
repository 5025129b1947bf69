use crate::core::scanner::ScanConfig;
use crate::error::{Result, SyncError};
use crate::storage::ObjectStore;
use std::collections::HashMap;
use tracing::{debug, info};

/// 远程对象记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObjectRecord {
    /// 对象 key，不带前导 `/`
    pub key: String,
    /// 带引号的 ETag
    pub etag: String,
    pub size: u64,
    pub storage_class: Option<String>,
}

impl RemoteObjectRecord {
    /// 和本地索引一致的路径形式（`/` 开头）
    pub fn remote_path(&self) -> String {
        format!("/{}", self.key)
    }
}

/// 远程对象索引：列举顺序的记录 + 按 `/key` 的查找表
#[derive(Debug, Default)]
pub struct RemoteIndex {
    records: Vec<RemoteObjectRecord>,
    lookup: HashMap<String, usize>,
}

impl RemoteIndex {
    pub fn from_records(records: Vec<RemoteObjectRecord>) -> Self {
        let lookup = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.remote_path(), i))
            .collect();
        Self { records, lookup }
    }

    pub fn get(&self, remote_path: &str) -> Option<&RemoteObjectRecord> {
        self.lookup.get(remote_path).map(|&i| &self.records[i])
    }

    pub fn records(&self) -> &[RemoteObjectRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// 拉取存储桶的完整对象列表
///
/// 目录占位对象和命中排除集合的 key 会被丢弃，
/// 因此下载永远不会写入 `.tx` 或版本控制目录。
pub async fn fetch_remote_index(store: &dyn ObjectStore, scan: &ScanConfig) -> Result<RemoteIndex> {
    info!("拉取远程文件列表: {}", store.name());

    let objects = store
        .list_objects()
        .await
        .map_err(|e| SyncError::RemoteList(format!("{:#}", e)))?;

    let mut records = Vec::with_capacity(objects.len());
    for object in objects {
        let key = object.key.trim_start_matches('/');
        if key.is_empty() || key.ends_with('/') {
            continue;
        }
        if scan.is_excluded_path(key) {
            debug!("忽略排除的远程对象: {}", key);
            continue;
        }
        records.push(RemoteObjectRecord {
            key: key.to_string(),
            etag: object.etag,
            size: object.size,
            storage_class: object.storage_class,
        });
    }

    info!("远程共 {} 个文件", records.len());
    Ok(RemoteIndex::from_records(records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ByteStream, ObjectInfo};
    use async_trait::async_trait;

    struct ListingStore {
        objects: Option<Vec<ObjectInfo>>,
    }

    #[async_trait]
    impl ObjectStore for ListingStore {
        async fn list_objects(&self) -> anyhow::Result<Vec<ObjectInfo>> {
            self.objects
                .clone()
                .ok_or_else(|| anyhow::anyhow!("access denied"))
        }

        async fn get_object(&self, _key: &str) -> anyhow::Result<ByteStream> {
            anyhow::bail!("not used")
        }

        async fn put_object(
            &self,
            _key: &str,
            _storage_class: Option<&str>,
            _body: ByteStream,
            _content_length: u64,
        ) -> anyhow::Result<()> {
            anyhow::bail!("not used")
        }

        fn name(&self) -> &str {
            "listing"
        }
    }

    fn object(key: &str) -> ObjectInfo {
        ObjectInfo {
            key: key.to_string(),
            etag: "\"d41d8cd98f00b204e9800998ecf8427e\"".to_string(),
            size: 0,
            storage_class: None,
        }
    }

    #[tokio::test]
    async fn test_fetch_builds_lookup_and_filters() {
        let store = ListingStore {
            objects: Some(vec![
                object("a.txt"),
                object("dir/"),
                object("dir/b.txt"),
                object(".tx/.config"),
                object("x/.git/HEAD"),
            ]),
        };

        let index = fetch_remote_index(&store, &ScanConfig::default()).await.unwrap();

        let keys: Vec<_> = index.records().iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["a.txt", "dir/b.txt"]);
        assert!(index.get("/dir/b.txt").is_some());
        assert!(index.get("dir/b.txt").is_none());
    }

    #[tokio::test]
    async fn test_listing_failure_maps_to_remote_list() {
        let store = ListingStore { objects: None };
        let err = fetch_remote_index(&store, &ScanConfig::default()).await.unwrap_err();
        assert!(matches!(err, SyncError::RemoteList(ref m) if m.contains("access denied")));
    }

    #[tokio::test]
    async fn test_empty_bucket_is_ok() {
        let store = ListingStore { objects: Some(vec![]) };
        assert!(fetch_remote_index(&store, &ScanConfig::default()).await.unwrap().is_empty());
    }
}
