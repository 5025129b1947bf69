//! 文件内容指纹
//!
//! 使用 MD5：单次上传的对象，存储端返回的 ETag 就是带引号的内容 MD5。

use crate::error::{Result, SyncError};
use md5::{Digest, Md5};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// 流式读取时的缓冲区大小
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// 流式计算文件内容的 MD5（十六进制小写），不会整体读入内存
pub async fn fingerprint_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .await
        .map_err(|e| SyncError::io(path, e))?;

    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = file
            .read(&mut buffer)
            .await
            .map_err(|e| SyncError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(to_hex(&hasher.finalize()))
}

/// 计算内存数据的 MD5
pub fn hash_bytes(data: &[u8]) -> String {
    to_hex(&Md5::digest(data))
}

/// 按存储端 ETag 的习惯给哈希加上引号
pub fn quote_etag(hash: &str) -> String {
    format!("\"{}\"", hash)
}

/// 分块上传的 ETag 形如 `"<hex>-<parts>"`，无法与内容 MD5 比较
pub fn is_multipart_etag(etag: &str) -> bool {
    etag.trim_matches('"')
        .rsplit_once('-')
        .is_some_and(|(_, parts)| !parts.is_empty() && parts.bytes().all(|b| b.is_ascii_digit()))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_bytes_known_vectors() {
        assert_eq!(hash_bytes(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(hash_bytes(b"hello"), "5d41402abc4b2a76b9719d911017c592");
    }

    #[tokio::test]
    async fn test_fingerprint_file_matches_in_memory_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        // 跨越多个读缓冲区
        let data: Vec<u8> = (0..(READ_BUFFER_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        assert_eq!(fingerprint_file(&path).await.unwrap(), hash_bytes(&data));
    }

    #[tokio::test]
    async fn test_fingerprint_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = fingerprint_file(&dir.path().join("nope")).await.unwrap_err();
        assert!(matches!(err, SyncError::Io { .. }));
    }

    #[test]
    fn test_etag_helpers() {
        assert_eq!(quote_etag("abc"), "\"abc\"");
        assert!(is_multipart_etag("\"9b2cf535f27731c974343645a3985328-3\""));
        assert!(!is_multipart_etag("\"9b2cf535f27731c974343645a3985328\""));
        assert!(!is_multipart_etag("\"abc-\""));
    }
}
