pub mod cos;
pub mod local;

use crate::config::TxConfig;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;

pub use cos::CosStorage;
pub use local::LocalStorage;

// ============ 公共常量 ============

/// 非 IO 操作超时（秒）- stat, list 等
pub const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- read, write 等
pub const IO_TIMEOUT_SECS: u64 = 300;
/// 流式传输的分块大小
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// 对象内容的字节流
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// 存储桶中的一个对象
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// 对象 key，不带前导 `/`
    pub key: String,
    /// 带引号的 ETag
    pub etag: String,
    pub size: u64,
    pub storage_class: Option<String>,
}

/// 对象存储抽象接口
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// 列出存储桶中的全部对象（由实现负责分页）
    async fn list_objects(&self) -> Result<Vec<ObjectInfo>>;

    /// 以字节流的形式读取对象
    async fn get_object(&self, key: &str) -> Result<ByteStream>;

    /// 流式写入对象
    async fn put_object(
        &self,
        key: &str,
        storage_class: Option<&str>,
        body: ByteStream,
        content_length: u64,
    ) -> Result<()>;

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;
}

/// 确保 ETag 带引号，和单次上传时存储端返回的格式一致
pub fn normalize_etag(etag: &str) -> String {
    let trimmed = etag.trim().trim_matches('"');
    format!("\"{}\"", trimmed)
}

/// 根据配置创建存储实例
pub fn create_storage(config: &TxConfig) -> Result<Arc<dyn ObjectStore>> {
    if let Some(dir) = config
        .endpoint
        .as_deref()
        .and_then(|ep| ep.strip_prefix("file://"))
    {
        tracing::info!("使用本地目录作为存储桶: {}", dir);
        return Ok(Arc::new(LocalStorage::new(dir)?) as Arc<dyn ObjectStore>);
    }

    let bucket = config
        .bucket
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("COS storage requires Bucket"))?;
    let secret_id = config
        .secret_id
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("COS storage requires SecretId"))?;
    let secret_key = config
        .secret_key
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("COS storage requires SecretKey"))?;
    let region = config.region.as_deref().unwrap_or("ap-nanjing");

    tracing::info!("初始化 COS 存储: bucket={}, region={}", bucket, region);
    Ok(Arc::new(CosStorage::new(
        bucket,
        region,
        secret_id,
        secret_key,
        config.endpoint.clone(),
        config.storage_class.clone(),
    )?) as Arc<dyn ObjectStore>)
}
