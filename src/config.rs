//! 工作区配置 - `.tx/.config` 的读取与改写
//!
//! 配置文件是逐行的 `NAME=value` 文本，`#` 开头的行为注释。

use crate::error::{Result, SyncError};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 元数据目录名称（位于同步根目录下）
pub const META_DIR_NAME: &str = ".tx";
/// 配置文件名称
pub const CONFIG_FILE_NAME: &str = ".config";
/// 改写配置时使用的临时文件后缀
const CONFIG_CACHE_SUFFIX: &str = "_cache";

/// 可识别的配置项
pub const CONFIG_PARAMETERS: [&str; 9] = [
    "SecretId",
    "SecretKey",
    "Bucket",
    "Region",
    "StorageClass",
    "Endpoint",
    "BatchSize",
    "Exclude",
    "LogLevel",
];

/// 默认并发批次大小
pub const DEFAULT_BATCH_SIZE: usize = 4;

/// `tx init` 写入的默认配置
pub const DEFAULT_CONFIG_CONTENT: &str = "# TencentCOS 配置信息
# 密钥 id，必填项
SecretId=
# 密钥 key，必填项
SecretKey=
# 存储桶（含 APPID，如 examplebucket-1250000000），必填项
Bucket=
# 地域，默认南京
Region=ap-nanjing
# 存储类型，默认低频存储
StorageClass=STANDARD_IA
# 自定义 S3 兼容 endpoint，可选；file:///path 表示以本地目录作为存储桶
Endpoint=
# 每批并发传输的文件数
BatchSize=4
# 额外排除的文件/目录名，逗号分隔
Exclude=
# 日志级别: error, warn, info, debug, trace
LogLevel=info
";

/// 解析后的配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TxConfig {
    pub secret_id: Option<String>,
    pub secret_key: Option<String>,
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub storage_class: Option<String>,
    pub endpoint: Option<String>,
    pub batch_size: Option<usize>,
    pub exclude: Vec<String>,
    pub log_level: Option<String>,
}

impl TxConfig {
    /// 从配置文件文本解析
    pub fn parse(content: &str) -> Result<Self> {
        let mut config = TxConfig::default();

        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (name, value) = line.split_once('=').unwrap_or((line, ""));
            let name = name.trim();
            let value = value.trim();
            let non_empty = || (!value.is_empty()).then(|| value.to_string());

            match name {
                "SecretId" => config.secret_id = non_empty(),
                "SecretKey" => config.secret_key = non_empty(),
                "Bucket" => config.bucket = non_empty(),
                "Region" => config.region = non_empty(),
                "StorageClass" => config.storage_class = non_empty(),
                "Endpoint" => config.endpoint = non_empty(),
                "LogLevel" => config.log_level = non_empty(),
                "BatchSize" => {
                    config.batch_size = parse_batch_size(value)
                        .map_err(|e| SyncError::Config(format!("第 {} 行: {}", index + 1, e)))?;
                }
                "Exclude" => {
                    config.exclude = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect();
                }
                other => debug!("忽略未知配置项: {}", other),
            }
        }

        Ok(config)
    }

    /// 校验必填项，缺失时返回包含所有缺失项的错误
    pub fn validate(&self) -> Result<()> {
        // 本地目录充当存储桶时不需要密钥
        if self.is_local_endpoint() {
            return Ok(());
        }

        let mut missing = Vec::new();
        if self.secret_id.is_none() {
            missing.push("SecretId");
        }
        if self.secret_key.is_none() {
            missing.push("SecretKey");
        }
        if self.bucket.is_none() {
            missing.push("Bucket");
        }
        if self.region.is_none() && self.endpoint.is_none() {
            missing.push("Region");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(SyncError::Config(format!(
                "必填配置为空: {}，请使用 tx config <name> <value> 设置",
                missing.join(", ")
            )))
        }
    }

    /// `Endpoint=file:///path` 表示以本地目录作为存储桶
    pub fn is_local_endpoint(&self) -> bool {
        self.endpoint
            .as_deref()
            .is_some_and(|ep| ep.starts_with("file://"))
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE)
    }

    /// 用于 `tx list` 展示，隐藏大部分 SecretKey
    pub fn masked(&self) -> Self {
        let mut shown = self.clone();
        shown.secret_key = self.secret_key.as_ref().map(|key| {
            let visible: String = key.chars().take(4).collect();
            format!("{}****", visible)
        });
        shown
    }
}

/// 同步根目录下的工作区路径
#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn meta_dir(&self) -> PathBuf {
        self.root.join(META_DIR_NAME)
    }

    pub fn config_path(&self) -> PathBuf {
        self.meta_dir().join(CONFIG_FILE_NAME)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.meta_dir().join("logs")
    }

    pub fn is_initialized(&self) -> bool {
        self.meta_dir().exists()
    }

    /// 创建元数据目录和默认配置文件
    pub fn init(&self) -> Result<()> {
        let meta_dir = self.meta_dir();
        if meta_dir.exists() {
            return Err(SyncError::AlreadyInitialized(meta_dir));
        }

        fs::create_dir_all(&meta_dir).map_err(|e| SyncError::io(&meta_dir, e))?;
        let config_path = self.config_path();
        fs::write(&config_path, DEFAULT_CONFIG_CONTENT)
            .map_err(|e| SyncError::io(&config_path, e))?;

        info!("已初始化工作区: {}", meta_dir.display());
        Ok(())
    }

    pub fn read_config(&self) -> Result<TxConfig> {
        read_config(&self.config_path())
    }

    pub fn write_config_value(&self, name: &str, value: &str) -> Result<()> {
        write_config_value(&self.config_path(), name, value)
    }
}

/// 空值表示使用默认批大小
fn parse_batch_size(value: &str) -> std::result::Result<Option<usize>, String> {
    match value {
        "" => Ok(None),
        v => match v.parse::<usize>() {
            Ok(n) if n > 0 => Ok(Some(n)),
            _ => Err(format!("BatchSize 必须是正整数，实际为 '{}'", v)),
        },
    }
}

/// 读取并解析配置文件
pub fn read_config(path: &Path) -> Result<TxConfig> {
    if !path.exists() {
        return Err(SyncError::Config(format!(
            "配置文件不存在: {}，请先执行 tx init",
            path.display()
        )));
    }

    let content = fs::read_to_string(path).map_err(|e| SyncError::io(path, e))?;
    TxConfig::parse(&content)
}

/// 改写单个配置项
///
/// 逐行写入 `<config>_cache`，保留注释和其他行，最后重命名覆盖原文件。
/// 文件中没有该项时追加到末尾。
pub fn write_config_value(path: &Path, name: &str, value: &str) -> Result<()> {
    if !CONFIG_PARAMETERS.contains(&name) {
        return Err(SyncError::Config(format!(
            "未知配置项 '{}'，可用配置项: {}",
            name,
            CONFIG_PARAMETERS.join(", ")
        )));
    }
    if value.contains('\n') || value.contains('\r') {
        return Err(SyncError::Config(format!("配置项 {} 的值不能包含换行", name)));
    }
    if name == "BatchSize" {
        parse_batch_size(value).map_err(SyncError::Config)?;
    }

    let content = fs::read_to_string(path).map_err(|e| SyncError::io(path, e))?;

    let mut cache_name = path.as_os_str().to_os_string();
    cache_name.push(CONFIG_CACHE_SUFFIX);
    let cache_path = PathBuf::from(cache_name);

    let mut replaced = false;
    let mut out = Vec::with_capacity(content.len() + value.len());
    for line in content.lines() {
        let is_target = !line.trim_start().starts_with('#')
            && line
                .split_once('=')
                .map_or(line.trim(), |(key, _)| key.trim())
                == name;

        let written = if is_target {
            writeln!(out, "{}={}", name, value)
        } else {
            writeln!(out, "{}", line)
        };
        written.map_err(|e| SyncError::io(&cache_path, e))?;
        replaced |= is_target;
    }
    if !replaced {
        writeln!(out, "{}={}", name, value).map_err(|e| SyncError::io(&cache_path, e))?;
    }

    fs::write(&cache_path, &out).map_err(|e| SyncError::io(&cache_path, e))?;
    fs::rename(&cache_path, path).map_err(|e| SyncError::io(path, e))?;

    debug!("配置项已更新: {}", name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_content() {
        let config = TxConfig::parse(DEFAULT_CONFIG_CONTENT).unwrap();
        assert_eq!(config.region.as_deref(), Some("ap-nanjing"));
        assert_eq!(config.storage_class.as_deref(), Some("STANDARD_IA"));
        assert_eq!(config.batch_size(), 4);
        assert!(config.secret_id.is_none());
        assert!(config.exclude.is_empty());
    }

    #[test]
    fn test_parse_value_with_equals_sign() {
        let config = TxConfig::parse("SecretKey=abc=def==\nExclude= build, dist ,\n").unwrap();
        assert_eq!(config.secret_key.as_deref(), Some("abc=def=="));
        assert_eq!(config.exclude, vec!["build", "dist"]);
    }

    #[test]
    fn test_parse_rejects_bad_batch_size() {
        assert!(matches!(
            TxConfig::parse("BatchSize=0"),
            Err(SyncError::Config(_))
        ));
        assert!(TxConfig::parse("BatchSize=abc").is_err());
    }

    #[test]
    fn test_validate_lists_missing_fields() {
        let config = TxConfig::parse("SecretId=id\nRegion=ap-guangzhou").unwrap();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("SecretKey"));
        assert!(err.contains("Bucket"));
        assert!(!err.contains("SecretId,"));

        let config = TxConfig::parse("SecretId=a\nSecretKey=b\nBucket=c\nEndpoint=https://s3.local").unwrap();
        assert!(config.validate().is_ok());

        let config = TxConfig::parse("Endpoint=file:///tmp/bucket").unwrap();
        assert!(config.is_local_endpoint());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_masked_hides_secret_key() {
        let config = TxConfig::parse("SecretKey=abcdefgh").unwrap();
        assert_eq!(config.masked().secret_key.as_deref(), Some("abcd****"));
    }

    #[test]
    fn test_init_then_write_value() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());

        ws.init().unwrap();
        assert!(matches!(ws.init(), Err(SyncError::AlreadyInitialized(_))));

        ws.write_config_value("Bucket", "demo-1250000000").unwrap();
        ws.write_config_value("Region", "ap-shanghai").unwrap();

        let content = fs::read_to_string(ws.config_path()).unwrap();
        assert!(content.contains("# 存储桶"));
        assert!(content.contains("Bucket=demo-1250000000\n"));
        assert_eq!(content.matches("Region=").count(), 1);
        assert!(!ws.config_path().with_file_name(".config_cache").exists());

        let config = ws.read_config().unwrap();
        assert_eq!(config.bucket.as_deref(), Some("demo-1250000000"));
        assert_eq!(config.region.as_deref(), Some("ap-shanghai"));
    }

    #[test]
    fn test_write_value_appends_missing_and_rejects_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".config");
        fs::write(&path, "# only a comment\n").unwrap();

        write_config_value(&path, "SecretId", "xyz").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "# only a comment\nSecretId=xyz\n");

        assert!(matches!(
            write_config_value(&path, "Nope", "1"),
            Err(SyncError::Config(_))
        ));
    }

    #[test]
    fn test_write_rejects_bad_batch_size_and_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".config");
        fs::write(&path, "BatchSize=4\n").unwrap();

        for bad in ["x", "0", "-1"] {
            assert!(matches!(
                write_config_value(&path, "BatchSize", bad),
                Err(SyncError::Config(_))
            ));
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), "BatchSize=4\n");
        assert_eq!(read_config(&path).unwrap().batch_size(), 4);

        // 空值恢复默认
        write_config_value(&path, "BatchSize", "").unwrap();
        assert_eq!(read_config(&path).unwrap().batch_size(), DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn test_read_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_config(&dir.path().join("missing")),
            Err(SyncError::Config(_))
        ));
    }
}
