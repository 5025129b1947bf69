//! 下载前准备本地目标路径

use crate::error::{Result, SyncError};
use std::path::{Component, Path, PathBuf};

/// 把规范化的远程路径（`/dir/a.txt`）映射到同步根目录下
///
/// 拒绝任何可能逃出同步根目录的 key。
pub fn local_target(root: &Path, remote_path: &str) -> Result<PathBuf> {
    let relative = remote_path.trim_start_matches('/');
    let mut target = root.to_path_buf();

    for part in relative.split('/') {
        let mut components = Path::new(part).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) => target.push(name),
            _ => {
                return Err(SyncError::transfer(
                    remote_path,
                    "对象 key 不是合法的相对路径，拒绝写入同步目录之外",
                ))
            }
        }
    }

    Ok(target)
}

/// 确保目标文件的所有上级目录存在，目录已存在时什么也不做
pub async fn ensure_parent_dirs(target: &Path) -> Result<()> {
    let Some(parent) = target.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| SyncError::io(parent, e))
}
