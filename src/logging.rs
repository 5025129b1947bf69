//! 日志模块 - 写入 `.tx/logs/tx.log`，超过大小上限时轮转为 `tx.log.old`

use crate::config::TxConfig;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing_subscriber::fmt::MakeWriter;

/// 日志文件名
pub const LOG_FILE_NAME: &str = "tx.log";

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// 是否写入日志文件
    pub enabled: bool,
    /// 最大日志文件大小（MB）
    pub max_size_mb: u32,
    /// 日志级别: "error", "warn", "info", "debug", "trace"，"off" 表示关闭
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size_mb: 5, // 默认 5MB
            level: "info".to_string(),
        }
    }
}

impl LogConfig {
    /// 从 `LogLevel` 配置项得到日志配置
    pub fn from_config(config: &TxConfig) -> Self {
        let mut log = Self::default();
        if let Some(level) = &config.log_level {
            log.enabled = !level.eq_ignore_ascii_case("off");
            log.level = level.to_lowercase();
        }
        log
    }

    /// 将配置的日志级别转换为 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_lowercase().as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }
}

struct WriterState {
    writer: BufWriter<File>,
    written: u64,
}

/// 带大小限制的日志写入器
#[derive(Clone)]
pub struct SizeRotatingWriter {
    file_path: PathBuf,
    max_size: u64,
    state: Arc<Mutex<WriterState>>,
}

impl SizeRotatingWriter {
    pub fn new(log_dir: &Path, max_size_mb: u32) -> io::Result<Self> {
        Self::with_max_bytes(log_dir, (max_size_mb as u64) * 1024 * 1024)
    }

    pub fn with_max_bytes(log_dir: &Path, max_size: u64) -> io::Result<Self> {
        fs::create_dir_all(log_dir)?;
        let file_path = log_dir.join(LOG_FILE_NAME);

        // 现有文件已超过限制时先轮转
        if fs::metadata(&file_path).is_ok_and(|m| m.len() > max_size) {
            rotate_log(&file_path)?;
        }
        let (writer, written) = open_file(&file_path)?;

        Ok(Self {
            file_path,
            max_size,
            state: Arc::new(Mutex::new(WriterState { writer, written })),
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    fn lock(&self) -> MutexGuard<'_, WriterState> {
        // 写日志时 panic 不应该让之后的日志全部丢失
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn open_file(file_path: &Path) -> io::Result<(BufWriter<File>, u64)> {
    let file = OpenOptions::new().create(true).append(true).open(file_path)?;
    let written = file.metadata()?.len();
    Ok((BufWriter::new(file), written))
}

/// 轮转日志文件: tx.log -> tx.log.old（覆盖旧备份）
fn rotate_log(file_path: &Path) -> io::Result<()> {
    let backup_path = file_path.with_extension("log.old");
    if backup_path.exists() {
        fs::remove_file(&backup_path)?;
    }
    fs::rename(file_path, &backup_path)
}

/// 日志写入器包装
pub struct LogWriter {
    inner: SizeRotatingWriter,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.inner.lock();

        let n = state.writer.write(buf)?;
        state.writer.flush()?;
        state.written += n as u64;

        if state.written > self.inner.max_size {
            rotate_log(&self.inner.file_path)?;
            let (writer, written) = open_file(&self.inner.file_path)?;
            state.writer = writer;
            state.written = written;
        }

        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().writer.flush()
    }
}

impl<'a> MakeWriter<'a> for SizeRotatingWriter {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter { inner: self.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_levels() {
        let config = TxConfig::parse("LogLevel=DEBUG").unwrap();
        let log = LogConfig::from_config(&config);
        assert!(log.enabled);
        assert_eq!(log.tracing_level(), tracing::Level::DEBUG);

        let off = LogConfig::from_config(&TxConfig::parse("LogLevel=off").unwrap());
        assert!(!off.enabled);

        assert_eq!(LogConfig::default().tracing_level(), tracing::Level::INFO);
    }

    #[test]
    fn test_rotates_after_max_size() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SizeRotatingWriter::with_max_bytes(dir.path(), 16).unwrap();

        let mut w = writer.make_writer();
        w.write_all(b"0123456789").unwrap();
        assert!(!dir.path().join("tx.log.old").exists());

        w.write_all(b"abcdefghij").unwrap();
        assert_eq!(
            fs::read(dir.path().join("tx.log.old")).unwrap(),
            b"0123456789abcdefghij"
        );

        writer.make_writer().write_all(b"next").unwrap();
        assert_eq!(fs::read(writer.file_path()).unwrap(), b"next");
    }

    #[test]
    fn test_oversized_file_is_rotated_on_open() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(LOG_FILE_NAME), vec![b'x'; 64]).unwrap();

        let writer = SizeRotatingWriter::with_max_bytes(dir.path(), 32).unwrap();
        assert_eq!(fs::read(writer.file_path()).unwrap().len(), 0);
        assert_eq!(fs::read(dir.path().join("tx.log.old")).unwrap().len(), 64);
    }
}
