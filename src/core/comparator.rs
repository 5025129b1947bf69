use crate::core::fingerprint::{is_multipart_etag, quote_etag};
use crate::core::remote::{RemoteIndex, RemoteObjectRecord};
use crate::core::scanner::{LocalFileRecord, LocalIndex};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 同步方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// 本地 -> 存储桶
    Upload,
    /// 存储桶 -> 本地
    Download,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upload => write!(f, "上传"),
            Direction::Download => write!(f, "下载"),
        }
    }
}

/// 需要传输的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferReason {
    /// 另一侧不存在
    New,
    /// 内容哈希和 ETag 不一致
    Modified,
    /// 远程 ETag 是分块上传格式，无法和内容哈希比较
    UnverifiableEtag,
}

/// 传输任务引用的记录，决定了传输方向
#[derive(Debug, Clone)]
pub enum TaskRecord {
    Local(LocalFileRecord),
    Remote(RemoteObjectRecord),
}

/// 一次传输任务
#[derive(Debug, Clone)]
pub struct TransferTask {
    pub record: TaskRecord,
    pub reason: TransferReason,
}

impl TransferTask {
    pub fn direction(&self) -> Direction {
        match self.record {
            TaskRecord::Local(_) => Direction::Upload,
            TaskRecord::Remote(_) => Direction::Download,
        }
    }

    /// `/` 开头的规范化路径
    pub fn path(&self) -> String {
        match &self.record {
            TaskRecord::Local(r) => r.remote_path.clone(),
            TaskRecord::Remote(r) => r.remote_path(),
        }
    }

    /// 对象 key，不带前导 `/`
    pub fn key(&self) -> &str {
        match &self.record {
            TaskRecord::Local(r) => r.object_key(),
            TaskRecord::Remote(r) => &r.key,
        }
    }

    pub fn size(&self) -> u64 {
        match &self.record {
            TaskRecord::Local(r) => r.size,
            TaskRecord::Remote(r) => r.size,
        }
    }
}

/// 对比内容哈希和 ETag，相同返回 None
fn classify(content_hash: &str, etag: &str) -> Option<TransferReason> {
    if quote_etag(content_hash) == etag {
        None
    } else if is_multipart_etag(etag) {
        Some(TransferReason::UnverifiableEtag)
    } else {
        Some(TransferReason::Modified)
    }
}

/// 计算需要传输的文件
///
/// 以同步方向的源端索引驱动，结果保持该索引的顺序。
/// 只会新增或覆盖，从不产生删除。
pub fn diff(local: &LocalIndex, remote: &RemoteIndex, direction: Direction) -> Vec<TransferTask> {
    match direction {
        Direction::Upload => local
            .records()
            .iter()
            .filter_map(|record| {
                let reason = match remote.get(&record.remote_path) {
                    None => TransferReason::New,
                    Some(object) => classify(&record.content_hash, &object.etag)?,
                };
                Some(TransferTask {
                    record: TaskRecord::Local(record.clone()),
                    reason,
                })
            })
            .collect(),
        Direction::Download => remote
            .records()
            .iter()
            .filter_map(|object| {
                let reason = match local.get(&object.remote_path()) {
                    None => TransferReason::New,
                    Some(record) => classify(&record.content_hash, &object.etag)?,
                };
                Some(TransferTask {
                    record: TaskRecord::Remote(object.clone()),
                    reason,
                })
            })
            .collect(),
    }
}

/// 差异统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub new_count: usize,
    pub modified_count: usize,
    pub unverifiable_count: usize,
    pub total_bytes: u64,
}

impl DiffSummary {
    pub fn total_files(&self) -> usize {
        self.new_count + self.modified_count + self.unverifiable_count
    }
}

pub fn summarize(tasks: &[TransferTask]) -> DiffSummary {
    let mut summary = DiffSummary::default();

    for task in tasks {
        match task.reason {
            TransferReason::New => summary.new_count += 1,
            TransferReason::Modified => summary.modified_count += 1,
            TransferReason::UnverifiableEtag => summary.unverifiable_count += 1,
        }
        summary.total_bytes += task.size();
    }

    summary
}
