//! 启动配置解析 (分层原则：内置默认 < 默认值文件 < 环境变量)
//!
//! 所有 FIREBIRD_* 环境变量在这里集中读取和校验，
//! 后续阶段只消费解析好的 Settings，不再碰 std::env。

use crate::config::defaults::Defaults;
use crate::error::{FbError, Result};
use crate::types::{parse_bool, ConfEntry, StatusReport};
use crate::utils::secrets::{self, env_nonempty};
use std::path::{Path, PathBuf};

// ==================== 环境变量名 ====================

pub const ENV_ROOT_PASSWORD: &str = "FIREBIRD_ROOT_PASSWORD";
pub const ENV_USER: &str = "FIREBIRD_USER";
pub const ENV_PASSWORD: &str = "FIREBIRD_PASSWORD";
pub const ENV_DATABASE: &str = "FIREBIRD_DATABASE";
pub const ENV_PAGE_SIZE: &str = "FIREBIRD_DATABASE_PAGE_SIZE";
pub const ENV_DEFAULT_CHARSET: &str = "FIREBIRD_DATABASE_DEFAULT_CHARSET";
pub const ENV_USE_LEGACY_AUTH: &str = "FIREBIRD_USE_LEGACY_AUTH";
pub const ENV_USE_GUARDIAN: &str = "FIREBIRD_USE_GUARDIAN";
pub const ENV_CONF_PATH: &str = "FIREBIRD_CONF";
pub const ENV_DATA_DIR: &str = "FIREBIRD_DATA_DIR";
pub const ENV_STATE_DIR: &str = "FIREBIRD_STATE_DIR";
pub const ENV_INITDB_DIR: &str = "FIREBIRD_INITDB_DIR";
pub const ENV_BIN_DIR: &str = "FIREBIRD_BIN_DIR";
/// 逐项写入 firebird.conf 的变量前缀，前缀后面的部分原样作为键名
pub const ENV_CONF_PREFIX: &str = "FIREBIRD_CONF_";

// ==================== 内置默认值 ====================

const DEFAULT_CONF: &str = "/etc/firebird/firebird.conf";
const DEFAULT_DATA_DIR: &str = "/var/lib/firebird/data";
const DEFAULT_STATE_DIR: &str = "/var/lib/firebird";
const DEFAULT_INITDB_DIR: &str = "/docker-entrypoint-initdb.d";
const DEFAULT_GUARDIAN_BIN: &str = "fbguard";
const DEFAULT_SERVER_BIN: &str = "fb_smp_server";
const DEFAULT_ISQL_BIN: &str = "isql";

/// 首次启动标记文件名 (放在状态目录，随镜像层走，不进数据卷)
const SYSDBA_MARKER: &str = ".fbentry-sysdba-provisioned";
/// 生成的 SYSDBA 密码落盘文件名
const SYSDBA_PASSWORD_FILE: &str = "SYSDBA.password";

/// Firebird 合法的页大小
const PAGE_SIZES: [u32; 4] = [4096, 8192, 16384, 32768];

/// Legacy_Auth 模式写入 firebird.conf 的键值
pub const LEGACY_AUTH_EDITS: [(&str, &str); 4] = [
    ("AuthServer", "Legacy_Auth, Srp"),
    ("AuthClient", "Legacy_Auth, Srp"),
    ("UserManager", "Legacy_UserManager"),
    ("WireCrypt", "Enabled"),
];

// ==================== 安装布局 ====================

/// 文件系统布局：配置文件、目录、二进制名称
#[derive(Debug, Clone)]
pub struct Layout {
    pub conf_path: PathBuf,
    pub data_dir: PathBuf,
    pub state_dir: PathBuf,
    pub initdb_dir: PathBuf,
    /// 未设置时二进制交给 PATH 解析
    pub bin_dir: Option<PathBuf>,
    pub guardian_bin: String,
    pub server_bin: String,
    pub isql_bin: String,
}

impl Layout {
    /// 环境变量 > 默认值文件 > 内置默认
    pub fn resolve(defaults: &Defaults) -> Self {
        let path_of = |env_name: &str, from_file: &Option<PathBuf>, builtin: &str| {
            env_nonempty(env_name)
                .map(PathBuf::from)
                .or_else(|| from_file.clone())
                .unwrap_or_else(|| PathBuf::from(builtin))
        };

        Layout {
            conf_path: path_of(ENV_CONF_PATH, &defaults.paths.conf, DEFAULT_CONF),
            data_dir: path_of(ENV_DATA_DIR, &defaults.paths.data_dir, DEFAULT_DATA_DIR),
            state_dir: path_of(ENV_STATE_DIR, &defaults.paths.state_dir, DEFAULT_STATE_DIR),
            initdb_dir: path_of(ENV_INITDB_DIR, &defaults.paths.initdb_dir, DEFAULT_INITDB_DIR),
            bin_dir: env_nonempty(ENV_BIN_DIR)
                .map(PathBuf::from)
                .or_else(|| defaults.paths.bin_dir.clone()),
            guardian_bin: defaults
                .server
                .guardian_bin
                .clone()
                .unwrap_or_else(|| DEFAULT_GUARDIAN_BIN.to_string()),
            server_bin: defaults
                .server
                .server_bin
                .clone()
                .unwrap_or_else(|| DEFAULT_SERVER_BIN.to_string()),
            isql_bin: defaults
                .server
                .isql_bin
                .clone()
                .unwrap_or_else(|| DEFAULT_ISQL_BIN.to_string()),
        }
    }

    /// 把二进制名解析成执行路径 (有 bin_dir 用它，否则交给 PATH)
    pub fn program(&self, name: &str) -> String {
        match &self.bin_dir {
            Some(dir) => dir.join(name).to_string_lossy().into_owned(),
            None => name.to_string(),
        }
    }

    /// SYSDBA 已初始化的标记文件
    pub fn sysdba_marker(&self) -> PathBuf {
        self.state_dir.join(SYSDBA_MARKER)
    }

    /// 生成密码的落盘位置
    pub fn sysdba_password_file(&self) -> PathBuf {
        self.state_dir.join(SYSDBA_PASSWORD_FILE)
    }

    /// 数据库名到文件路径 (绝对路径原样使用，其余挂到数据目录下)
    pub fn database_path(&self, name: &str) -> PathBuf {
        let p = Path::new(name);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.data_dir.join(name)
        }
    }
}

// ==================== 启动配置 ====================

/// run / configure / provision 共同消费的解析结果
#[derive(Debug, Clone)]
pub struct Settings {
    pub layout: Layout,
    pub root_password: Option<String>,
    pub user: Option<String>,
    pub user_password: Option<String>,
    pub database: Option<String>,
    pub page_size: Option<u32>,
    pub default_charset: Option<String>,
    pub legacy_auth: bool,
    pub use_guardian: bool,
    /// 默认值文件 [conf] 表，已按键名排序
    pub conf_defaults: Vec<(String, String)>,
    /// FIREBIRD_CONF_* 环境覆盖，已按键名排序
    pub conf_env: Vec<(String, String)>,
}

impl Settings {
    /// 加载默认值文件并解析环境
    pub fn resolve() -> Result<Self> {
        let defaults = Defaults::load()?;
        Self::resolve_with(&defaults)
    }

    /// 用调用方提供的默认值解析 (测试入口)
    pub fn resolve_with(defaults: &Defaults) -> Result<Self> {
        let layout = Layout::resolve(defaults);

        let root_password = secrets::resolve(ENV_ROOT_PASSWORD)?;
        let user = secrets::resolve(ENV_USER)?;
        let user_password = secrets::resolve(ENV_PASSWORD)?;

        // 用户与密码必须成对：有用户没密码是致命错误；
        // 有密码没用户只是可疑，警告后忽略
        if user.is_some() && user_password.is_none() {
            return Err(FbError::MissingCompanion(
                ENV_USER.to_string(),
                ENV_PASSWORD.to_string(),
            ));
        }
        let user_password = if user.is_none() && user_password.is_some() {
            tracing::warn!("设置了 {} 但没有 {}，忽略该密码", ENV_PASSWORD, ENV_USER);
            None
        } else {
            user_password
        };

        let database = secrets::resolve(ENV_DATABASE)?;

        let page_size = match env_nonempty(ENV_PAGE_SIZE) {
            Some(raw) => Some(raw.parse::<u32>().map_err(|_| FbError::InvalidValue {
                name: ENV_PAGE_SIZE.to_string(),
                value: raw.clone(),
                reason: "必须是整数".to_string(),
            })?),
            None => defaults.database.page_size,
        };
        if let Some(n) = page_size {
            if !PAGE_SIZES.contains(&n) {
                return Err(FbError::InvalidValue {
                    name: ENV_PAGE_SIZE.to_string(),
                    value: n.to_string(),
                    reason: "必须是 4096/8192/16384/32768".to_string(),
                });
            }
        }

        let default_charset =
            env_nonempty(ENV_DEFAULT_CHARSET).or_else(|| defaults.database.default_charset.clone());
        if let Some(cs) = &default_charset {
            if !is_identifier(cs) {
                return Err(FbError::InvalidValue {
                    name: ENV_DEFAULT_CHARSET.to_string(),
                    value: cs.clone(),
                    reason: "字符集名必须以字母开头，只含字母/数字/下划线".to_string(),
                });
            }
        }

        let legacy_auth = env_bool(ENV_USE_LEGACY_AUTH)?.unwrap_or(false);
        let use_guardian = match env_bool(ENV_USE_GUARDIAN)? {
            Some(b) => b,
            None => defaults.server.use_guardian.unwrap_or(true),
        };

        let conf_defaults: Vec<(String, String)> = defaults
            .conf
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Settings {
            layout,
            root_password,
            user,
            user_password,
            database,
            page_size,
            default_charset,
            legacy_auth,
            use_guardian,
            conf_defaults,
            conf_env: collect_conf_env(),
        })
    }

    /// configure 阶段要应用的全部编辑，按来源优先级排列
    /// (默认值文件 → Legacy_Auth 块 → 环境覆盖，后应用的生效)
    pub fn conf_edits(&self) -> Vec<(String, String)> {
        let mut edits = self.conf_defaults.clone();
        if self.legacy_auth {
            for (k, v) in LEGACY_AUTH_EDITS {
                edits.push((k.to_string(), v.to_string()));
            }
        }
        edits.extend(self.conf_env.iter().cloned());
        edits
    }

    /// 要启动的服务器命令 (守护模式用 fbguard)
    pub fn server_command(&self) -> String {
        if self.use_guardian {
            self.layout.program(&self.layout.guardian_bin)
        } else {
            self.layout.program(&self.layout.server_bin)
        }
    }

    /// status 命令的输出快照，密码只报告是否设置
    pub fn status_report(&self) -> StatusReport {
        StatusReport {
            conf_path: self.layout.conf_path.display().to_string(),
            data_dir: self.layout.data_dir.display().to_string(),
            state_dir: self.layout.state_dir.display().to_string(),
            initdb_dir: self.layout.initdb_dir.display().to_string(),
            server_command: self.server_command(),
            use_guardian: self.use_guardian,
            legacy_auth: self.legacy_auth,
            root_password_set: self.root_password.is_some(),
            user: self.user.clone(),
            user_password_set: self.user_password.is_some(),
            database: self.database.clone(),
            page_size: self.page_size,
            default_charset: self.default_charset.clone(),
            // line 字段在这里表示应用顺序
            conf_overrides: self
                .conf_edits()
                .into_iter()
                .enumerate()
                .map(|(i, (k, v))| ConfEntry::new(k, v, i + 1))
                .collect(),
        }
    }
}

/// 读取布尔环境变量，非法取值是致命错误
fn env_bool(name: &str) -> Result<Option<bool>> {
    match env_nonempty(name) {
        None => Ok(None),
        Some(raw) => match parse_bool(&raw) {
            Some(b) => Ok(Some(b)),
            None => Err(FbError::InvalidValue {
                name: name.to_string(),
                value: raw,
                reason: "布尔值只接受 1/0 true/false yes/no on/off".to_string(),
            }),
        },
    }
}

/// 收集 FIREBIRD_CONF_* 覆盖，按键名排序保证应用顺序确定
pub(crate) fn collect_conf_env() -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = std::env::vars()
        .filter_map(|(name, value)| {
            name.strip_prefix(ENV_CONF_PREFIX)
                .map(|key| (key.to_string(), value))
        })
        .collect();
    pairs.sort();
    pairs
}

/// 标识符：字母开头，后续字母/数字/下划线
fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        _ => false,
    }
}

// ==================== 测试 ====================
