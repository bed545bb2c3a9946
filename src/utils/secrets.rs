//! 密钥来源解析 (安全原则：密钥只在内存中流转)
//!
//! 每个敏感变量 X 都有一个伴生变量 X_FILE：
//! - 只设置 X        → 直接取值
//! - 只设置 X_FILE   → 读取该文件内容，去掉末尾一个换行
//! - 两者同时设置    → 致命错误，来源必须唯一
//! - 都未设置        → None
//!
//! 空字符串视同未设置 (与 shell 的 `[ -z "$VAR" ]` 行为一致)。

use crate::error::{FbError, Result};
use crate::utils::paths;
use std::path::Path;

/// 读取环境变量，空串视为未设置
pub fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// 解析 X / X_FILE 二选一的密钥值
pub fn resolve(name: &str) -> Result<Option<String>> {
    let file_name = format!("{}_FILE", name);
    let inline = env_nonempty(name);
    let from_file = env_nonempty(&file_name);

    match (inline, from_file) {
        (Some(_), Some(_)) => Err(FbError::SecretConflict(name.to_string(), file_name)),
        (Some(value), None) => Ok(Some(value)),
        (None, Some(path)) => read_secret_file(Path::new(&path)),
        (None, None) => Ok(None),
    }
}

/// 从文件读取密钥
fn read_secret_file(path: &Path) -> Result<Option<String>> {
    let raw = paths::read_file(path)?;
    let value = strip_trailing_newline(&raw);
    if value.is_empty() {
        Ok(None)
    } else {
        Ok(Some(value.to_string()))
    }
}

/// 只去掉末尾一个换行 (docker secret 文件通常以换行结尾)
pub(crate) fn strip_trailing_newline(s: &str) -> &str {
    s.strip_suffix("\r\n")
        .or_else(|| s.strip_suffix('\n'))
        .unwrap_or(s)
}

// ==================== 测试 ====================
