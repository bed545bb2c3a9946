//! 子进程执行器
//!
//! 三种执行方式对应三类外部程序：
//! - run_capture: 管道交互 (isql，SQL 从 stdin 喂入)
//! - run_streamed: 继承标准流 (初始化脚本，输出直接进容器日志)
//! - exec_replace: 进程替换 (透传子命令，本进程让位)

use crate::error::{FbError, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub struct CommandExecutor;

impl CommandExecutor {
    /// 执行命令，从 stdin 喂入内容并捕获输出
    ///
    /// 退出码非零时返回 CommandFailed，stderr 并入错误信息
    pub async fn run_capture(
        program: &str,
        args: &[String],
        stdin: Option<&str>,
    ) -> Result<String> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            FbError::CommandNotFound(format!(
                "{}: {} (请确保命令在 PATH 中或使用完整路径)",
                program, e
            ))
        })?;

        if let Some(input) = stdin {
            // 取走 stdin 句柄，写完立即关闭，否则子进程会一直等 EOF
            if let Some(mut handle) = child.stdin.take() {
                if let Err(e) = handle.write_all(input.as_bytes()).await {
                    // 子进程可能没读完就退出了，留给退出码检查去报告
                    if e.kind() != std::io::ErrorKind::BrokenPipe {
                        return Err(e.into());
                    }
                }
            }
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FbError::CommandFailed(format!(
                "{} 退出码 {}: {}",
                program,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// 执行命令，继承标准流，等待结束
    pub async fn run_streamed(program: &str, args: &[String]) -> Result<()> {
        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| {
                FbError::CommandNotFound(format!(
                    "{}: {} (请确保命令在 PATH 中或使用完整路径)",
                    program, e
                ))
            })?;

        if !status.success() {
            return Err(FbError::CommandFailed(format!(
                "{} 退出码 {}",
                program,
                status.code().unwrap_or(-1)
            )));
        }
        Ok(())
    }

    /// 用目标命令替换当前进程 (unix exec 语义，成功则不返回)
    pub fn exec_replace(command: &[String]) -> Result<()> {
        use std::os::unix::process::CommandExt;

        if command.is_empty() {
            return Err(FbError::CommandFailed("命令不能为空".to_string()));
        }

        let (program, args) = command.split_first().unwrap();
        let err = std::process::Command::new(program).args(args).exec();

        // exec 成功不会返回，走到这里必然失败
        Err(FbError::CommandNotFound(format!("{}: {}", program, err)))
    }

    /// 在指定目录或 PATH 中查找可执行文件
    pub fn find_program(name: &str, bin_dir: Option<&Path>) -> Option<PathBuf> {
        if let Some(dir) = bin_dir {
            let candidate = dir.join(name);
            return candidate.is_file().then_some(candidate);
        }

        let path_var = std::env::var_os("PATH")?;
        for dir in std::env::split_paths(&path_var) {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }
}

// ==================== 测试 ====================
