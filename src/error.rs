//! 错误处理模块 (修复原则：明确抛出异常)

use thiserror::Error;
use std::error::Error;
use std::path::PathBuf;

#[derive(Error, Debug)]
pub enum FbError {
    #[error("文件IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("解析错误: {0}")]
    Parse(String),

    #[error("文件不存在: {0}")]
    FileNotFound(PathBuf),

    #[error("冲突的密钥来源: {0} 与 {1} 同时设置，只能二选一")]
    SecretConflict(String, String),

    #[error("缺少配套变量: 设置了 {0} 但未设置 {1}")]
    MissingCompanion(String, String),

    #[error("无效的取值: {name}={value} ({reason})")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },

    #[error("JSON序列化错误: {0}")]
    Json(#[from] serde_json::Error),

    #[error("默认值文件解析错误: {0}")]
    Toml(#[from] toml::de::Error),

    // === 子进程相关错误 ===
    #[error("命令未找到: {0}")]
    CommandNotFound(String),

    #[error("命令执行失败: {0}")]
    CommandFailed(String),

    #[error("随机数生成失败")]
    Random,
}

/// 详细的错误报告函数 (透明原则)
impl FbError {
    /// 报告错误，支持详细/安静模式
    /// verbose = true: 详细错误链
    /// verbose = false: 关键信息，安静模式
    pub fn report(&self, verbose: bool) {
        if verbose {
            // 详细模式：打印完整错误链
            eprintln!("❌ 错误: {}", self);

            // 如果有源错误，打印级联信息
            // (thiserror 支持自动的 source() 链)
            if let Some(source) = self.source() {
                eprintln!("  └─ 原因: {}", source);
                let mut current = source.source();
                while let Some(next) = current {
                    eprintln!("     └─ {}", next);
                    current = next.source();
                }
            }
        } else {
            // 安静模式：只打印关键信息
            match self {
                FbError::Io(err) => eprintln!("文件错误: {}", err),
                FbError::FileNotFound(path) => eprintln!("文件不存在: {}", path.display()),
                FbError::SecretConflict(a, b) => {
                    eprintln!("密钥来源冲突: {} 与 {} 只能设置一个", a, b)
                }
                FbError::MissingCompanion(set, missing) => {
                    eprintln!("设置了 {} 就必须同时设置 {}", set, missing)
                }
                FbError::CommandNotFound(cmd) => eprintln!("命令未找到: {}", cmd),
                FbError::CommandFailed(msg) => eprintln!("命令执行失败: {}", msg),
                _ => eprintln!("错误: {}", self),
            }
        }
    }
}

/// 简化 Result 类型别名
pub type Result<T> = std::result::Result<T, FbError>;

// ==================== 测试 ====================

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn test_secret_conflict_message() {
        let err = FbError::SecretConflict(
            "FIREBIRD_ROOT_PASSWORD".to_string(),
            "FIREBIRD_ROOT_PASSWORD_FILE".to_string(),
        );
        let msg = err.to_string();
        assert!(msg.contains("FIREBIRD_ROOT_PASSWORD"));
        assert!(msg.contains("FIREBIRD_ROOT_PASSWORD_FILE"));
        assert!(msg.contains("二选一"));
    }

    #[test]
    fn test_invalid_value_message() {
        let err = FbError::InvalidValue {
            name: "FIREBIRD_DATABASE_PAGE_SIZE".to_string(),
            value: "1234".to_string(),
            reason: "必须是 4096/8192/16384/32768".to_string(),
        };
        assert!(err.to_string().contains("FIREBIRD_DATABASE_PAGE_SIZE=1234"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err: FbError = io_err.into();
        assert!(matches!(err, FbError::Io(_)));
        assert!(err.source().is_some());
    }
}
