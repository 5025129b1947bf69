use crate::config::Workspace;
use crate::error::SyncError;

/// 初始化工作区
pub fn init_workspace(workspace: &Workspace) -> anyhow::Result<()> {
    match workspace.init() {
        Ok(()) => println!("初始化完成"),
        Err(SyncError::AlreadyInitialized(_)) => println!("请勿重复初始化"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_init_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());

        init_workspace(&ws).unwrap();
        init_workspace(&ws).unwrap();
        assert!(ws.config_path().exists());
    }
}
