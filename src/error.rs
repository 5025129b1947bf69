//! 同步核心的错误类型

use std::io;
use std::path::PathBuf;

/// 同步核心的 Result 别名
pub type Result<T> = std::result::Result<T, SyncError>;

/// 同步过程中可能出现的错误
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// 配置缺失或非法
    #[error("配置错误: {0}")]
    Config(String),

    /// 元数据目录已存在
    #[error("工作区已初始化: {}", .0.display())]
    AlreadyInitialized(PathBuf),

    /// 本地文件系统错误（读取、stat、创建目录、写入）
    #[error("I/O 错误 {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// 指纹计算失败
    #[error("计算文件指纹失败 {}: {message}", .path.display())]
    Hash { path: PathBuf, message: String },

    /// 拉取远程文件列表失败
    #[error("拉取远程文件列表失败: {0}")]
    RemoteList(String),

    /// 单个对象的上传/下载失败
    #[error("传输失败 {key}: {message}")]
    RemoteTransfer { key: String, message: String },

    /// 某一批次失败，后续批次未执行
    #[error("第 {batch} 批传输失败 ({failed} 个文件失败)，已完成 {transferred} 个: {source}")]
    TransferAborted {
        transferred: usize,
        failed: usize,
        batch: usize,
        #[source]
        source: Box<SyncError>,
    },
}

impl SyncError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn transfer(key: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::RemoteTransfer {
            key: key.into(),
            message: err.to_string(),
        }
    }

    /// 中止前已成功传输的文件数（仅对 `TransferAborted` 有意义）
    pub fn transferred(&self) -> Option<usize> {
        match self {
            Self::TransferAborted { transferred, .. } => Some(*transferred),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_aborted_exposes_count_and_source() {
        let err = SyncError::TransferAborted {
            transferred: 3,
            failed: 1,
            batch: 2,
            source: Box::new(SyncError::transfer("a.txt", "boom")),
        };

        assert_eq!(err.transferred(), Some(3));
        assert!(err.to_string().contains("已完成 3 个"));
        let source = err.source().map(|s| s.to_string()).unwrap_or_default();
        assert!(source.contains("a.txt"));
        assert_eq!(SyncError::Config("x".into()).transferred(), None);
    }
}
