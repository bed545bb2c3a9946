//! 核心数据结构定义 (表达原则：用数据结构表达逻辑)

use serde::{Deserialize, Serialize};
use std::fmt;

/// firebird.conf 中的一条有效配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfEntry {
    pub key: String,
    pub value: String,
    /// 所在行号 (从 1 开始，诊断重复键时有用)
    pub line: usize,
}

impl ConfEntry {
    pub fn new(key: String, value: String, line: usize) -> Self {
        Self { key, value, line }
    }
}

impl fmt::Display for ConfEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.key, self.value)
    }
}

/// 启动器当前生效配置的快照 (status 命令输出)
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub conf_path: String,
    pub data_dir: String,
    pub state_dir: String,
    pub initdb_dir: String,
    pub server_command: String,
    pub use_guardian: bool,
    pub legacy_auth: bool,
    /// 密码只报告是否设置，绝不输出内容
    pub root_password_set: bool,
    pub user: Option<String>,
    pub user_password_set: bool,
    pub database: Option<String>,
    pub page_size: Option<u32>,
    pub default_charset: Option<String>,
    pub conf_overrides: Vec<ConfEntry>,
}

/// 输出格式类型
#[derive(Debug, Clone, PartialEq)]
pub enum OutputFormat {
    ENV,
    JSON,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::ENV
    }
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" | "j" => OutputFormat::JSON,
            _ => OutputFormat::ENV,
        }
    }
}

/// 解析布尔型环境变量 (宽容原则：接受 docker 世界的常见写法)
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ==================== 测试 ====================

#[cfg(test)]
mod types_tests {
    use super::*;

    #[test]
    fn test_parse_bool_truthy() {
        for s in ["1", "true", "TRUE", "yes", "Yes", "on", " ON "] {
            assert_eq!(parse_bool(s), Some(true), "应当为真: {}", s);
        }
    }

    #[test]
    fn test_parse_bool_falsy() {
        for s in ["0", "false", "False", "no", "NO", "off"] {
            assert_eq!(parse_bool(s), Some(false), "应当为假: {}", s);
        }
    }

    #[test]
    fn test_parse_bool_invalid() {
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
        assert_eq!(parse_bool("2"), None);
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::from("json"), OutputFormat::JSON);
        assert_eq!(OutputFormat::from("J"), OutputFormat::JSON);
        assert_eq!(OutputFormat::from("env"), OutputFormat::ENV);
        assert_eq!(OutputFormat::from("anything"), OutputFormat::ENV);
    }

    #[test]
    fn test_conf_entry_display() {
        let entry = ConfEntry::new("WireCrypt".to_string(), "Enabled".to_string(), 3);
        assert_eq!(entry.to_string(), "WireCrypt = Enabled");
    }
}
