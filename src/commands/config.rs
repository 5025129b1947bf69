use crate::config::Workspace;
use anyhow::Context;

/// 以 JSON 展示当前配置（SecretKey 已遮挡）
pub fn list_config(workspace: &Workspace) -> anyhow::Result<()> {
    let config = workspace.read_config()?;
    let json = serde_json::to_string_pretty(&config.masked()).context("Failed to serialize config")?;
    println!("{}", json);
    Ok(())
}

/// 设置单个配置项
pub fn set_config(workspace: &Workspace, name: &str, value: &str) -> anyhow::Result<()> {
    workspace.write_config_value(name, value)?;
    println!("配置成功");
    Ok(())
}
