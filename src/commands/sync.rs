use crate::config::Workspace;
use crate::core::{Direction, SyncConfig, SyncEngine, SyncPhase, SyncPlan, SyncProgress, TransferReason};
use crate::error::SyncError;
use crate::storage::create_storage;
use anyhow::Context;
use dialoguer::Confirm;
use tokio::sync::mpsc;
use tracing::info;

/// 同步命令选项
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// 只展示需要传输的文件
    pub dry_run: bool,
    /// 跳过拉取前的确认
    pub yes: bool,
}

/// `tx sync` / `tx sync-remote`
pub async fn sync(workspace: &Workspace, direction: Direction, options: SyncOptions) -> anyhow::Result<()> {
    if !workspace.is_initialized() {
        return Err(SyncError::Config("当前目录未初始化，请先执行 tx init".to_string()).into());
    }

    let config = workspace.read_config()?;
    if let Err(e) = config.validate() {
        println!("必填配置信息为空，请使用 tx -h 来获取帮助信息");
        return Err(e.into());
    }

    let store = create_storage(&config)?;
    let engine = SyncEngine::new(store, workspace.root.clone(), SyncConfig::from_tx_config(&config));

    if options.dry_run {
        let plan = engine.plan(direction).await?;
        print_plan(&plan);
        return Ok(());
    }

    // 拉取可能覆盖本地已修改的文件，需要确认
    if direction == Direction::Download && !options.yes {
        let proceed = Confirm::new()
            .with_prompt("同步远程COS至本地，可能会造成您修改的文件被还原，是否继续?")
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !proceed {
            info!("用户取消拉取");
            return Ok(());
        }
    }

    let (tx, rx) = mpsc::channel(32);
    let printer = tokio::spawn(print_progress(rx));
    let result = engine.run(direction, Some(tx)).await;
    let _ = printer.await;

    match result {
        Ok(report) => {
            match direction {
                Direction::Upload => println!("共同步上传{}个文件", report.transferred),
                Direction::Download => println!("共同步拉取{}个文件", report.transferred),
            }
            if report.flagged_multipart > 0 {
                println!(
                    "其中 {} 个远程对象为分块上传，无法通过 ETag 校验，每次都会重新传输",
                    report.flagged_multipart
                );
            }
            Ok(())
        }
        Err(e) => {
            if let Some(done) = e.transferred() {
                println!("同步中止，已完成 {} 个文件", done);
            }
            Err(e.into())
        }
    }
}

fn print_plan(plan: &SyncPlan) {
    for task in &plan.tasks {
        let tag = match task.reason {
            TransferReason::New => "新增",
            TransferReason::Modified => "修改",
            TransferReason::UnverifiableEtag => "无法校验",
        };
        println!("[{}] {} ({} 字节)", tag, task.path(), task.size());
    }
    println!(
        "需要{} {} 个文件 (新增 {}, 修改 {}, 无法校验 {}), 共 {} 字节, 跳过 {} 个",
        plan.direction,
        plan.summary.total_files(),
        plan.summary.new_count,
        plan.summary.modified_count,
        plan.summary.unverifiable_count,
        plan.summary.total_bytes,
        plan.skipped()
    );
}

async fn print_progress(mut rx: mpsc::Receiver<SyncProgress>) {
    while let Some(progress) = rx.recv().await {
        match progress.phase {
            SyncPhase::Scanning => println!("正在扫描本地文件并拉取远程列表..."),
            SyncPhase::Comparing => println!("需要{} {} 个文件", progress.direction, progress.files_total),
            SyncPhase::Transferring => println!(
                "第 {}/{} 批完成 ({}/{})",
                progress.batch, progress.batches, progress.files_completed, progress.files_total
            ),
            SyncPhase::Completed | SyncPhase::Failed => {}
        }
    }
}
