//! 启动器默认值文件 (分层原则：内置默认 < 默认值文件 < 环境变量)
//!
//! 路径取 FBENTRY_CONFIG，未设置时用 /etc/fbentry.toml。
//! 文件不存在不算错误，所有字段都可省略：
//!
//! ```toml
//! [paths]
//! conf = "/opt/firebird/firebird.conf"
//! data_dir = "/var/lib/firebird/data"
//!
//! [server]
//! use_guardian = false
//!
//! [database]
//! page_size = 8192
//!
//! [conf]
//! DefaultDbCachePages = "8192"
//! ```

use crate::error::Result;
use crate::utils::paths;
use crate::utils::secrets::env_nonempty;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// 默认值文件的默认位置
pub const DEFAULT_CONFIG_PATH: &str = "/etc/fbentry.toml";
/// 覆盖默认值文件位置的环境变量
pub const CONFIG_PATH_ENV: &str = "FBENTRY_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub paths: PathDefaults,
    pub server: ServerDefaults,
    pub database: DatabaseDefaults,
    /// 写入 firebird.conf 的键值对 (BTreeMap 保证应用顺序稳定)
    pub conf: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathDefaults {
    pub conf: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
    pub initdb_dir: Option<PathBuf>,
    pub bin_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerDefaults {
    pub use_guardian: Option<bool>,
    pub guardian_bin: Option<String>,
    pub server_bin: Option<String>,
    pub isql_bin: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseDefaults {
    pub page_size: Option<u32>,
    pub default_charset: Option<String>,
}

impl Defaults {
    /// 按 FBENTRY_CONFIG 或默认位置加载
    pub fn load() -> Result<Self> {
        let path = env_nonempty(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    /// 从指定路径加载，文件缺失时返回全内置默认
    pub fn load_from(path: &Path) -> Result<Self> {
        if !paths::file_exists(path) {
            tracing::debug!("默认值文件 {} 不存在，使用内置默认", path.display());
            return Ok(Self::default());
        }

        let content = paths::read_file(path)?;
        let defaults: Defaults = toml::from_str(&content)?;
        tracing::debug!("已加载默认值文件 {}", path.display());
        Ok(defaults)
    }
}

// ==================== 测试 ====================
