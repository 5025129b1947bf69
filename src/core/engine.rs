use crate::config::{TxConfig, DEFAULT_BATCH_SIZE, META_DIR_NAME};
use crate::core::comparator::{diff, summarize, DiffSummary, Direction, TaskRecord, TransferReason, TransferTask};
use crate::core::materialize::{ensure_parent_dirs, local_target};
use crate::core::remote::{fetch_remote_index, RemoteObjectRecord};
use crate::core::scanner::{LocalFileRecord, LocalIndexer, ScanConfig};
use crate::error::{Result, SyncError};
use crate::storage::{ObjectStore, STREAM_CHUNK_SIZE};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info, warn};

/// 同步配置
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// 每批并发传输的文件数
    pub batch_size: usize,
    /// 扫描配置（排除集合同样作用于远程 key）
    pub scan_config: ScanConfig,
    /// 上传时使用的存储类型
    pub storage_class: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            scan_config: ScanConfig::default(),
            storage_class: None,
        }
    }
}

impl SyncConfig {
    pub fn from_tx_config(config: &TxConfig) -> Self {
        Self {
            batch_size: config.batch_size(),
            scan_config: ScanConfig::default().with_extra_excludes(config.exclude.iter().cloned()),
            storage_class: config.storage_class.clone(),
        }
    }
}

/// 同步阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Scanning,
    Comparing,
    Transferring,
    Completed,
    Failed,
}

/// 同步进度
#[derive(Debug, Clone, Serialize)]
pub struct SyncProgress {
    pub direction: Direction,
    pub phase: SyncPhase,
    /// 当前批次（从 1 开始，传输阶段之前为 0）
    pub batch: usize,
    pub batches: usize,
    pub files_completed: usize,
    pub files_total: usize,
    pub bytes_transferred: u64,
}

/// 同步计划：两侧索引对比后的待传输任务
#[derive(Debug)]
pub struct SyncPlan {
    pub direction: Direction,
    pub local_files: usize,
    pub remote_objects: usize,
    pub tasks: Vec<TransferTask>,
    pub summary: DiffSummary,
}

impl SyncPlan {
    /// 两侧内容一致、无需传输的文件数
    pub fn skipped(&self) -> usize {
        let driving = match self.direction {
            Direction::Upload => self.local_files,
            Direction::Download => self.remote_objects,
        };
        driving.saturating_sub(self.tasks.len())
    }
}

/// 传输执行结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecuteOutcome {
    pub transferred: usize,
    pub bytes_transferred: u64,
    pub batches: usize,
}

/// 同步报告
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub direction: Direction,
    pub local_files: usize,
    pub remote_objects: usize,
    pub planned: usize,
    pub transferred: usize,
    pub skipped: usize,
    pub bytes_transferred: u64,
    pub batches: usize,
    /// 因分块 ETag 无法校验而重新传输的文件数
    pub flagged_multipart: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// 同步引擎
pub struct SyncEngine {
    store: Arc<dyn ObjectStore>,
    root: PathBuf,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn ObjectStore>, root: impl Into<PathBuf>, config: SyncConfig) -> Self {
        Self {
            store,
            root: root.into(),
            config,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 扫描本地、拉取远程列表并对比，不做任何传输
    pub async fn plan(&self, direction: Direction) -> Result<SyncPlan> {
        let local = LocalIndexer::new(self.config.scan_config.clone())
            .build(&self.root)
            .await?;
        let remote = fetch_remote_index(self.store.as_ref(), &self.config.scan_config).await?;

        let tasks = diff(&local, &remote, direction);
        for task in tasks
            .iter()
            .filter(|t| t.reason == TransferReason::UnverifiableEtag)
        {
            warn!("远程对象为分块上传，ETag 无法校验，将重新{}: {}", direction, task.path());
        }

        let summary = summarize(&tasks);
        info!(
            "对比完成 ({}): 本地 {} 个, 远程 {} 个, 需要传输 {} 个 ({} 字节)",
            direction,
            local.len(),
            remote.len(),
            tasks.len(),
            summary.total_bytes
        );

        Ok(SyncPlan {
            direction,
            local_files: local.len(),
            remote_objects: remote.len(),
            tasks,
            summary,
        })
    }

    /// 分批执行传输任务
    ///
    /// 批次之间严格串行，批内并发。某一批出现失败时等该批全部结束后停止，
    /// 后续批次不再执行，已完成的传输不会回滚。
    pub async fn execute(
        &self,
        tasks: &[TransferTask],
        progress: Option<mpsc::Sender<SyncProgress>>,
    ) -> Result<ExecuteOutcome> {
        let batch_size = self.config.batch_size.max(1);
        let batches = tasks.len().div_ceil(batch_size);
        let direction = tasks.first().map_or(Direction::Upload, TransferTask::direction);
        let mut outcome = ExecuteOutcome::default();

        for (index, group) in tasks.chunks(batch_size).enumerate() {
            let batch = index + 1;
            debug!("开始第 {}/{} 批, {} 个文件", batch, batches, group.len());

            let results = join_all(group.iter().map(|task| self.transfer(task))).await;

            let mut failed = 0;
            let mut first_error = None;
            let mut group_bytes = 0;
            for (task, result) in group.iter().zip(results) {
                match result {
                    Ok(bytes) => group_bytes += bytes,
                    Err(e) => {
                        error!("传输失败 {}: {}", task.path(), e);
                        failed += 1;
                        first_error.get_or_insert(e);
                    }
                }
            }

            if let Some(source) = first_error {
                error!(
                    "第 {} 批有 {} 个文件失败，停止同步 (已完成 {} 个)",
                    batch, failed, outcome.transferred
                );
                send_progress(
                    &progress,
                    SyncProgress {
                        direction,
                        phase: SyncPhase::Failed,
                        batch,
                        batches,
                        files_completed: outcome.transferred,
                        files_total: tasks.len(),
                        bytes_transferred: outcome.bytes_transferred,
                    },
                )
                .await;
                return Err(SyncError::TransferAborted {
                    transferred: outcome.transferred,
                    failed,
                    batch,
                    source: Box::new(source),
                });
            }

            outcome.transferred += group.len();
            outcome.bytes_transferred += group_bytes;
            outcome.batches = batch;

            send_progress(
                &progress,
                SyncProgress {
                    direction,
                    phase: SyncPhase::Transferring,
                    batch,
                    batches,
                    files_completed: outcome.transferred,
                    files_total: tasks.len(),
                    bytes_transferred: outcome.bytes_transferred,
                },
            )
            .await;
        }

        Ok(outcome)
    }

    /// 完整的一次同步：计划 + 执行
    pub async fn run(
        &self,
        direction: Direction,
        progress: Option<mpsc::Sender<SyncProgress>>,
    ) -> Result<SyncReport> {
        let started_at = Utc::now();
        let start = Instant::now();
        info!("开始同步 ({}): {} <-> {}", direction, self.root.display(), self.store.name());

        send_progress(&progress, idle_progress(direction, SyncPhase::Scanning)).await;
        let plan = self.plan(direction).await?;
        send_progress(
            &progress,
            SyncProgress {
                files_total: plan.tasks.len(),
                ..idle_progress(direction, SyncPhase::Comparing)
            },
        )
        .await;

        let outcome = self.execute(&plan.tasks, progress.clone()).await?;

        send_progress(
            &progress,
            SyncProgress {
                batch: outcome.batches,
                batches: outcome.batches,
                files_completed: outcome.transferred,
                files_total: plan.tasks.len(),
                bytes_transferred: outcome.bytes_transferred,
                ..idle_progress(direction, SyncPhase::Completed)
            },
        )
        .await;

        let report = SyncReport {
            direction,
            local_files: plan.local_files,
            remote_objects: plan.remote_objects,
            planned: plan.tasks.len(),
            transferred: outcome.transferred,
            skipped: plan.skipped(),
            bytes_transferred: outcome.bytes_transferred,
            batches: outcome.batches,
            flagged_multipart: plan.summary.unverifiable_count,
            started_at,
            finished_at: Utc::now(),
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "同步完成 ({}): 传输 {} 个, 跳过 {} 个, {} 字节, 耗时 {}ms",
            direction, report.transferred, report.skipped, report.bytes_transferred, report.duration_ms
        );
        Ok(report)
    }

    /// 执行单个任务，返回传输的字节数
    async fn transfer(&self, task: &TransferTask) -> Result<u64> {
        match &task.record {
            TaskRecord::Local(record) => self.upload(record).await,
            TaskRecord::Remote(record) => self.download(record).await,
        }
    }

    async fn upload(&self, record: &LocalFileRecord) -> Result<u64> {
        let path = &record.local_path;
        let key = record.object_key();

        let file = fs::File::open(path)
            .await
            .map_err(|e| SyncError::io(path, e))?;
        let length = file
            .metadata()
            .await
            .map_err(|e| SyncError::io(path, e))?
            .len();

        debug!("上传: {} ({} 字节)", record.remote_path, length);
        let body = ReaderStream::with_capacity(file, STREAM_CHUNK_SIZE)
            .map_err(anyhow::Error::from)
            .boxed();

        self.store
            .put_object(key, self.config.storage_class.as_deref(), body, length)
            .await
            .map_err(|e| SyncError::transfer(key, format!("{:#}", e)))?;

        Ok(length)
    }

    async fn download(&self, record: &RemoteObjectRecord) -> Result<u64> {
        let target = local_target(&self.root, &record.remote_path())?;
        ensure_parent_dirs(&target).await?;

        debug!("下载: {} -> {}", record.key, target.display());
        let temp_dir = download_temp_dir(&self.root);
        fs::create_dir_all(&temp_dir)
            .await
            .map_err(|e| SyncError::io(&temp_dir, e))?;
        let temp_path = temp_dir.join(format!("{}.txpart", uuid::Uuid::new_v4().simple()));

        // 失败时删除临时文件，目标路径要么是完整的新内容，要么保持原样
        let guard = scopeguard::guard(temp_path.clone(), |path| {
            let _ = std::fs::remove_file(path);
        });

        let mut body = self
            .store
            .get_object(&record.key)
            .await
            .map_err(|e| SyncError::transfer(&record.key, format!("{:#}", e)))?;

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| SyncError::io(&temp_path, e))?;

        let mut written = 0u64;
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| SyncError::transfer(&record.key, format!("{:#}", e)))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| SyncError::io(&temp_path, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| SyncError::io(&temp_path, e))?;
        drop(file);

        fs::rename(&temp_path, &target)
            .await
            .map_err(|e| SyncError::io(&target, e))?;
        let _ = scopeguard::ScopeGuard::into_inner(guard);

        Ok(written)
    }
}

/// 下载的暂存目录 `.tx/tmp`
///
/// 位于同步根目录内，rename 不跨文件系统；`.tx` 在排除集合中，
/// 被中断的下载留下的文件不会被扫描或上传。
pub fn download_temp_dir(root: &Path) -> PathBuf {
    root.join(META_DIR_NAME).join("tmp")
}

fn idle_progress(direction: Direction, phase: SyncPhase) -> SyncProgress {
    SyncProgress {
        direction,
        phase,
        batch: 0,
        batches: 0,
        files_completed: 0,
        files_total: 0,
        bytes_transferred: 0,
    }
}

/// 发送进度更新
async fn send_progress(tx: &Option<mpsc::Sender<SyncProgress>>, progress: SyncProgress) {
    if let Some(tx) = tx {
        let _ = tx.send(progress).await;
    }
}
