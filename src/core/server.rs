//! 服务器进程托管 (单一前台子进程，信号只记录不转发)
//!
//! 容器运行时把信号发给整个进程组，服务器自己会收到并负责
//! 体面退出；fbguard 在的时候重启也归它管。这里只做三件事：
//! 启动、等待、如实带出退出码。

use crate::core::settings::Settings;
use crate::error::{FbError, Result};
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

/// 启动服务器并等待退出，返回要交给容器运行时的退出码
pub async fn launch_and_wait(settings: &Settings) -> Result<i32> {
    let program = settings.server_command();
    info!("启动 Firebird 服务器: {}", program);

    let mut child = Command::new(&program)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| {
            FbError::CommandNotFound(format!(
                "{}: {} (请确保命令在 PATH 中或使用完整路径)",
                program, e
            ))
        })?;

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    // child.wait() 取消安全，select 分支被丢弃后下一轮还能继续等
    loop {
        tokio::select! {
            status = child.wait() => {
                let status = status?;
                let code = exit_code(status);
                info!("服务器进程退出，状态码 {}", code);
                return Ok(code);
            }
            _ = sigint.recv() => {
                info!("收到 SIGINT，等待服务器进程退出");
            }
            _ = sigterm.recv() => {
                info!("收到 SIGTERM，等待服务器进程退出");
            }
        }
    }
}

/// 正常退出取退出码，死于信号按 shell 惯例折算成 128+信号值
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}

// ==================== 测试 ====================

#[cfg(test)]
mod server_tests {
    use super::*;
    use crate::core::settings::Layout;
    use std::os::unix::fs::PermissionsExt;
    use std::os::unix::process::ExitStatusExt;
    use tempfile::tempdir;

    #[test]
    fn test_exit_code_mapping() {
        // wait(2) 状态字编码：正常退出的码在高八位
        assert_eq!(exit_code(ExitStatus::from_raw(0)), 0);
        assert_eq!(exit_code(ExitStatus::from_raw(3 << 8)), 3);
        // 低位是致死信号：SIGTERM=15 → 143，SIGKILL=9 → 137
        assert_eq!(exit_code(ExitStatus::from_raw(15)), 143);
        assert_eq!(exit_code(ExitStatus::from_raw(9)), 137);
    }

    fn stub_server_settings(root: &std::path::Path, script: &str) -> Settings {
        let bin_dir = root.join("bin");
        std::fs::create_dir_all(&bin_dir).unwrap();
        let server = bin_dir.join("fbguard");
        std::fs::write(&server, script).unwrap();
        std::fs::set_permissions(&server, std::fs::Permissions::from_mode(0o755)).unwrap();

        Settings {
            layout: Layout {
                conf_path: root.join("firebird.conf"),
                data_dir: root.join("data"),
                state_dir: root.join("state"),
                initdb_dir: root.join("initdb"),
                bin_dir: Some(bin_dir),
                guardian_bin: "fbguard".to_string(),
                server_bin: "fb_smp_server".to_string(),
                isql_bin: "isql".to_string(),
            },
            root_password: None,
            user: None,
            user_password: None,
            database: None,
            page_size: None,
            default_charset: None,
            legacy_auth: false,
            use_guardian: true,
            conf_defaults: vec![],
            conf_env: vec![],
        }
    }

    #[tokio::test]
    async fn test_child_exit_code_propagated() {
        let dir = tempdir().unwrap();
        let settings = stub_server_settings(dir.path(), "#!/bin/sh\nexit 7\n");

        let code = launch_and_wait(&settings).await.unwrap();
        assert_eq!(code, 7);
    }

    #[tokio::test]
    async fn test_missing_server_binary() {
        let dir = tempdir().unwrap();
        let mut settings = stub_server_settings(dir.path(), "#!/bin/sh\nexit 0\n");
        settings.layout.guardian_bin = "no-such-server".to_string();

        let err = launch_and_wait(&settings).await.unwrap_err();
        assert!(matches!(err, FbError::CommandNotFound(_)));
    }
}
