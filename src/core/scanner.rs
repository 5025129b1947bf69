use crate::config::META_DIR_NAME;
use crate::core::fingerprint::fingerprint_file;
use crate::error::{Result, SyncError};
use std::collections::{HashMap, HashSet};
use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info};
use walkdir::WalkDir;

/// 本地扫描配置
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// 排除的文件/目录名（按名称精确匹配，对任意层级生效）
    pub exclude_names: HashSet<String>,
    /// 同时计算指纹的文件数
    pub hash_concurrency: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            exclude_names: [META_DIR_NAME, ".git", ".svn", ".hg"]
                .into_iter()
                .map(String::from)
                .collect(),
            hash_concurrency: 8,
        }
    }
}

impl ScanConfig {
    /// 在默认排除集合上追加额外的名称
    pub fn with_extra_excludes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_names.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn is_excluded(&self, name: &OsStr) -> bool {
        name.to_str()
            .is_some_and(|name| self.exclude_names.contains(name))
    }

    /// 规范化路径中是否有任一段命中排除集合
    pub fn is_excluded_path(&self, normalized: &str) -> bool {
        normalized
            .split('/')
            .any(|part| self.exclude_names.contains(part))
    }
}

/// 本地文件记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileRecord {
    /// 文件名（远程 key 的最后一段）
    pub file_name: String,
    /// 文件内容 MD5
    pub content_hash: String,
    /// 相对同步根目录的路径，`/` 分隔并以 `/` 开头
    pub remote_path: String,
    /// 本地绝对路径
    pub local_path: PathBuf,
    pub size: u64,
}

impl LocalFileRecord {
    /// 上传时使用的对象 key
    pub fn object_key(&self) -> &str {
        self.remote_path.trim_start_matches('/')
    }
}

/// 本地文件索引：遍历顺序的记录 + 按 `remote_path` 的查找表
#[derive(Debug, Default)]
pub struct LocalIndex {
    records: Vec<LocalFileRecord>,
    lookup: HashMap<String, usize>,
}

impl LocalIndex {
    pub fn from_records(records: Vec<LocalFileRecord>) -> Self {
        let lookup = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.remote_path.clone(), i))
            .collect();
        Self { records, lookup }
    }

    pub fn get(&self, remote_path: &str) -> Option<&LocalFileRecord> {
        self.lookup.get(remote_path).map(|&i| &self.records[i])
    }

    pub fn records(&self) -> &[LocalFileRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// 遍历时发现的待计算指纹的文件
struct Candidate {
    remote_path: String,
    file_name: String,
    local_path: PathBuf,
    size: u64,
}

/// 本地目录索引器
pub struct LocalIndexer {
    config: ScanConfig,
}

impl LocalIndexer {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    /// 递归扫描同步根目录，任何错误都会使整个索引失败
    pub async fn build(&self, root: &Path) -> Result<LocalIndex> {
        info!("开始扫描本地目录: {}", root.display());

        let root = tokio::fs::canonicalize(root)
            .await
            .map_err(|e| SyncError::io(root, e))?;
        let config = self.config.clone();

        // 使用 spawn_blocking 避免阻塞 async runtime
        let walk_root = root.clone();
        let candidates = tokio::task::spawn_blocking(move || walk(&walk_root, &config))
            .await
            .map_err(|e| SyncError::Hash {
                path: root.clone(),
                message: e.to_string(),
            })??;

        let records = self.fingerprint_all(candidates).await?;

        info!("扫描完成: {} 个文件", records.len());
        Ok(LocalIndex::from_records(records))
    }

    /// 有界并发地计算指纹，结果保持遍历顺序
    async fn fingerprint_all(&self, candidates: Vec<Candidate>) -> Result<Vec<LocalFileRecord>> {
        let semaphore = Arc::new(Semaphore::new(self.config.hash_concurrency.max(1)));
        let mut handles = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| SyncError::Hash {
                    path: candidate.local_path.clone(),
                    message: e.to_string(),
                })?;

            let path = candidate.local_path.clone();
            let handle = tokio::spawn(async move {
                let result = fingerprint_file(&candidate.local_path).await;
                drop(permit);
                result.map(|content_hash| LocalFileRecord {
                    file_name: candidate.file_name,
                    content_hash,
                    remote_path: candidate.remote_path,
                    local_path: candidate.local_path,
                    size: candidate.size,
                })
            });
            handles.push((path, handle));
        }

        let mut records = Vec::with_capacity(handles.len());
        let mut pending = handles.into_iter();
        while let Some((path, handle)) = pending.next() {
            let outcome = match handle.await {
                Ok(result) => result,
                Err(e) => Err(SyncError::Hash {
                    path,
                    message: e.to_string(),
                }),
            };

            match outcome {
                Ok(record) => {
                    debug!("已索引: {} ({})", record.remote_path, record.content_hash);
                    records.push(record);
                }
                Err(e) => {
                    for (_, rest) in pending {
                        rest.abort();
                    }
                    return Err(e);
                }
            }
        }

        Ok(records)
    }
}

/// 深度优先遍历，只收集普通文件；符号链接和特殊文件被忽略
fn walk(root: &Path, config: &ScanConfig) -> Result<Vec<Candidate>> {
    let metadata = std::fs::metadata(root).map_err(|e| SyncError::io(root, e))?;
    if !metadata.is_dir() {
        return Err(SyncError::io(
            root,
            io::Error::new(io::ErrorKind::NotFound, "同步根目录不是文件夹"),
        ));
    }

    let mut candidates = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !config.is_excluded(entry.file_name()));

    for entry in walker {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        let file_type = entry.file_type();

        if file_type.is_dir() {
            continue;
        }
        if !file_type.is_file() {
            debug!("忽略非普通文件: {}", entry.path().display());
            continue;
        }

        let remote_path = normalize(root, entry.path())?;
        let size = entry
            .metadata()
            .map_err(|e| walk_error(entry.path(), e))?
            .len();
        let file_name = remote_path
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();

        candidates.push(Candidate {
            remote_path,
            file_name,
            local_path: entry.into_path(),
            size,
        });
    }

    Ok(candidates)
}

/// 相对路径转为 `/` 开头、`/` 分隔的远程路径
pub fn normalize(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).map_err(|_| {
        SyncError::io(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "路径不在同步根目录下"),
        )
    })?;

    let mut normalized = String::new();
    for component in relative.components() {
        let part = component.as_os_str().to_str().ok_or_else(|| {
            SyncError::io(
                path,
                io::Error::new(io::ErrorKind::InvalidData, "路径包含非 UTF-8 字符"),
            )
        })?;
        normalized.push('/');
        normalized.push_str(part);
    }

    Ok(normalized)
}

fn walk_error(fallback: &Path, err: walkdir::Error) -> SyncError {
    let path = err
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| fallback.to_path_buf());
    let message = err.to_string();
    let source = err
        .into_io_error()
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, message));
    SyncError::io(path, source)
}
