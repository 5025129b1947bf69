use super::{normalize_etag, ByteStream, ObjectInfo, ObjectStore, IO_TIMEOUT_SECS, OP_TIMEOUT_SECS};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use opendal::{layers::TimeoutLayer, services::S3, Metakey, Operator};
use std::time::Duration;
use tracing::{debug, warn};

/// 单次 PUT 上传的上限，超过后 opendal 会改用分块上传
///
/// 分块上传的 ETag 不是内容 MD5，下一次同步无法判断是否一致，
/// 所以这里尽量让文件走单次上传。
pub const SINGLE_PUT_LIMIT: usize = 64 * 1024 * 1024;
/// 下载时每次读取的范围大小
const READ_RANGE_SIZE: u64 = 8 * 1024 * 1024;

/// 构造 operator 所需的连接参数
#[derive(Clone)]
struct CosParams {
    bucket: String,
    region: String,
    secret_id: String,
    secret_key: String,
    endpoint: String,
}

/// 腾讯云 COS（通过 S3 兼容接口访问）
pub struct CosStorage {
    operator: Operator,
    params: CosParams,
    storage_class: Option<String>,
    name: String,
}

impl CosStorage {
    pub fn new(
        bucket: &str,
        region: &str,
        secret_id: &str,
        secret_key: &str,
        endpoint: Option<String>,
        storage_class: Option<String>,
    ) -> Result<Self> {
        let params = CosParams {
            bucket: bucket.to_string(),
            region: region.to_string(),
            secret_id: secret_id.to_string(),
            secret_key: secret_key.to_string(),
            endpoint: endpoint.unwrap_or_else(|| format!("https://cos.{}.myqcloud.com", region)),
        };
        let operator = Self::build_operator(&params, storage_class.as_deref())?;

        Ok(Self {
            operator,
            params,
            storage_class,
            name: format!("cos://{}", bucket),
        })
    }

    fn build_operator(params: &CosParams, storage_class: Option<&str>) -> Result<Operator> {
        let mut builder = S3::default()
            .bucket(&params.bucket)
            .region(&params.region)
            .endpoint(&params.endpoint)
            .access_key_id(&params.secret_id)
            .secret_access_key(&params.secret_key)
            .enable_virtual_host_style();

        if let Some(class) = storage_class {
            builder = builder.default_storage_class(class);
        }

        // 添加超时层
        let operator = Operator::new(builder)
            .context("Failed to build COS operator")?
            .layer(
                TimeoutLayer::default()
                    .with_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
                    .with_io_timeout(Duration::from_secs(IO_TIMEOUT_SECS)),
            )
            .finish();

        Ok(operator)
    }
}

#[async_trait]
impl ObjectStore for CosStorage {
    async fn list_objects(&self) -> Result<Vec<ObjectInfo>> {
        let mut objects = Vec::new();

        // lister 内部会跟随 continuation token 翻页
        let mut lister = self
            .operator
            .lister_with("")
            .recursive(true)
            .metakey(Metakey::ContentLength | Metakey::Etag | Metakey::Mode)
            .await
            .context("Failed to list COS bucket")?;

        while let Some(entry) = lister.try_next().await? {
            let key = entry.path().trim_start_matches('/').to_string();
            let meta = entry.metadata();

            // 跳过根目录和目录占位对象
            if key.is_empty() || key.ends_with('/') || meta.is_dir() {
                continue;
            }

            let Some(etag) = meta.etag() else {
                warn!("对象缺少 ETag，将按需重新传输: {}", key);
                objects.push(ObjectInfo {
                    key,
                    etag: String::new(),
                    size: meta.content_length(),
                    storage_class: None,
                });
                continue;
            };

            objects.push(ObjectInfo {
                key,
                etag: normalize_etag(etag),
                size: meta.content_length(),
                storage_class: None,
            });
        }

        debug!("{} 列出 {} 个对象", self.name, objects.len());
        Ok(objects)
    }

    async fn get_object(&self, key: &str) -> Result<ByteStream> {
        let size = self
            .operator
            .stat(key)
            .await
            .with_context(|| format!("Failed to stat COS object {}", key))?
            .content_length();
        let reader = self
            .operator
            .reader(key)
            .await
            .with_context(|| format!("Failed to open COS object {}", key))?;

        let stream = futures::stream::try_unfold((reader, 0u64), move |(reader, offset)| async move {
            if offset >= size {
                return Ok::<_, anyhow::Error>(None);
            }
            let end = (offset + READ_RANGE_SIZE).min(size);
            let chunk = reader.read(offset..end).await?.to_bytes();
            Ok(Some((chunk, (reader, end))))
        });

        Ok(stream.boxed())
    }

    async fn put_object(
        &self,
        key: &str,
        storage_class: Option<&str>,
        mut body: ByteStream,
        content_length: u64,
    ) -> Result<()> {
        let operator = if storage_class == self.storage_class.as_deref() {
            self.operator.clone()
        } else {
            Self::build_operator(&self.params, storage_class)?
        };

        let mut writer = operator
            .writer_with(key)
            .chunk(SINGLE_PUT_LIMIT)
            .await
            .with_context(|| format!("Failed to start COS upload {}", key))?;

        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    let _ = writer.abort().await;
                    return Err(e);
                }
            };
            written += chunk.len() as u64;
            if let Err(e) = writer.write(chunk).await {
                let _ = writer.abort().await;
                return Err(anyhow::Error::new(e).context(format!("Failed to upload {}", key)));
            }
        }

        if written != content_length {
            let _ = writer.abort().await;
            anyhow::bail!(
                "文件在上传过程中发生变化: {} (预期 {} 字节, 实际 {} 字节)",
                key,
                content_length,
                written
            );
        }

        writer
            .close()
            .await
            .with_context(|| format!("Failed to finish COS upload {}", key))?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_builds_default_endpoint_and_name() {
        let storage = CosStorage::new(
            "demo-1250000000",
            "ap-guangzhou",
            "id",
            "key",
            None,
            Some("STANDARD_IA".into()),
        )
        .unwrap();

        assert_eq!(storage.name(), "cos://demo-1250000000");
        assert_eq!(storage.params.endpoint, "https://cos.ap-guangzhou.myqcloud.com");
    }
}
