//! CLI 参数定义

use crate::error::{FbError, Result};
use clap::{Parser, Subcommand};

/// fbentry - Firebird 服务器容器启动器
#[derive(Parser)]
#[command(
    name = "fbentry",
    version = "0.2.0",
    about = "Firebird 服务器容器启动器",
    long_about = "配置并启动容器里的 Firebird 数据库服务器：环境变量驱动的 firebird.conf 编辑、首次启动的 SYSDBA/用户/数据库初始化、前台托管服务器进程并传出退出码"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// 详细输出模式
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 完整启动：配置 + 初始化 + 运行服务器 (默认命令)
    Run {
        /// 跳过初始化阶段
        #[arg(long)]
        skip_provision: bool,
    },

    /// 只应用 firebird.conf 配置编辑
    Configure {
        /// 额外的配置项 (Key=Value，可重复)
        #[arg(short, long)]
        set: Vec<String>,
    },

    /// 只执行初始化阶段 (SYSDBA/用户/数据库/脚本)
    Provision,

    /// 显示解析后的生效配置
    Status {
        /// 输出格式 (env/json)
        #[arg(short, long, default_value = "env")]
        format: String,
    },

    /// 诊断运行环境
    Doctor,

    /// 其余参数一律当作外部命令原地 exec (docker run <镜像> isql ...)
    #[command(external_subcommand)]
    External(Vec<String>),
}

/// 解析 --set Key=Value 参数
pub fn parse_set_args(args: &[String]) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for arg in args {
        match arg.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                pairs.push((key.to_string(), value.to_string()));
            }
            _ => {
                return Err(FbError::Parse(format!("--set 需要 Key=Value 形式: {}", arg)));
            }
        }
    }
    Ok(pairs)
}

// ==================== 测试 ====================

#[cfg(test)]
mod cli_tests {
    use super::*;

    #[test]
    fn test_parse_set_args() {
        let args = vec!["WireCrypt=Enabled".to_string(), "A=b=c".to_string()];
        let pairs = parse_set_args(&args).unwrap();
        assert_eq!(
            pairs,
            vec![
                ("WireCrypt".to_string(), "Enabled".to_string()),
                // 值里允许再出现等号
                ("A".to_string(), "b=c".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_set_args_empty_value() {
        let pairs = parse_set_args(&["Key=".to_string()]).unwrap();
        assert_eq!(pairs, vec![("Key".to_string(), String::new())]);
    }

    #[test]
    fn test_parse_set_args_rejects_malformed() {
        assert!(parse_set_args(&["NoEquals".to_string()]).is_err());
        assert!(parse_set_args(&["=value".to_string()]).is_err());
    }
}
