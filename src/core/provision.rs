//! 初始化引擎 (幂等原则：每一步都可以安全重跑)
//!
//! 服务器启动前用嵌入式 isql 直连本地数据库文件完成：
//! 1. 首次启动设置 SYSDBA 密码 (没给就生成一个并落盘)
//! 2. 确保应用用户存在
//! 3. 创建应用数据库 (文件已存在则绝不碰)
//! 4. 本次真正建了库才执行初始化脚本
//!
//! 全部 SQL 都是本地直连，不需要服务器在线，所以这一阶段
//! 安排在服务器进程启动之前。

use crate::core::settings::{Settings, ENV_USER};
use crate::error::{FbError, Result};
use crate::utils::executor::CommandExecutor;
use crate::utils::password;
use crate::utils::paths;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// SYSDBA 和用户操作走安全数据库的别名
const SECURITY_DB: &str = "security.db";

/// 一次初始化的结果汇总
#[derive(Debug, Default)]
pub struct ProvisionReport {
    pub sysdba_provisioned: bool,
    pub sysdba_generated: bool,
    pub user_ensured: Option<String>,
    pub database_created: Option<PathBuf>,
    pub scripts_run: usize,
}

pub struct Provisioner<'a> {
    settings: &'a Settings,
}

impl<'a> Provisioner<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    /// 按固定顺序执行全部步骤
    pub async fn run(&self) -> Result<ProvisionReport> {
        let layout = &self.settings.layout;
        paths::ensure_dir(&layout.data_dir)?;
        paths::ensure_dir(&layout.state_dir)?;

        let mut report = ProvisionReport::default();

        let (provisioned, generated) = self.ensure_sysdba().await?;
        report.sysdba_provisioned = provisioned;
        report.sysdba_generated = generated;

        report.user_ensured = self.ensure_user().await?;

        let created = self.ensure_database().await?;
        if let Some(db_path) = &created {
            report.scripts_run = self.run_init_scripts(db_path).await?;
        }
        report.database_created = created;

        info!(
            "初始化完成: SYSDBA {}，用户 {}，数据库 {}，脚本 {} 个",
            match (report.sysdba_provisioned, report.sysdba_generated) {
                (true, true) => "已设置(生成密码)",
                (true, false) => "已设置",
                _ => "沿用",
            },
            report.user_ensured.as_deref().unwrap_or("无"),
            report
                .database_created
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "无".to_string()),
            report.scripts_run
        );
        Ok(report)
    }

    /// 首次启动设置 SYSDBA 密码，之后的启动看标记文件跳过
    ///
    /// 返回 (本次是否设置了密码, 密码是否为生成的)
    async fn ensure_sysdba(&self) -> Result<(bool, bool)> {
        let layout = &self.settings.layout;
        let marker = layout.sysdba_marker();
        if paths::file_exists(&marker) {
            debug!("标记 {} 已存在，跳过 SYSDBA 初始化", marker.display());
            return Ok((false, false));
        }

        let (pw, generated) = match &self.settings.root_password {
            Some(given) => (given.clone(), false),
            None => {
                let pw_file = layout.sysdba_password_file();
                if paths::file_exists(&pw_file) {
                    // 上次生成了密码但没写完标记，继续用同一个
                    let existing = paths::read_file(&pw_file)?;
                    (existing.trim().to_string(), false)
                } else {
                    let pw = password::generate()?;
                    paths::write_secret_file(&pw_file, &pw)?;
                    info!("未提供 SYSDBA 密码，已生成并写入 {}", pw_file.display());
                    (pw, true)
                }
            }
        };

        let sql = alter_sysdba_sql(&pw);
        self.run_isql(Some(SECURITY_DB), &sql).await?;

        // 内容只是给人看的时间戳，文件存在与否才是判断依据
        let stamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        paths::write_file_safe(&marker, &format!("{}\n", stamp))?;
        info!("SYSDBA 密码已设置");
        Ok((true, generated))
    }

    /// CREATE OR ALTER 保证重复执行无副作用
    async fn ensure_user(&self) -> Result<Option<String>> {
        let Some(user) = &self.settings.user else {
            return Ok(None);
        };
        validate_user_name(user)?;

        // 解析阶段保证了用户存在时密码一定在
        let pw = self.settings.user_password.as_deref().unwrap_or_default();
        let sql = ensure_user_sql(user, pw);
        self.run_isql(Some(SECURITY_DB), &sql).await?;
        info!("用户 {} 已就绪", user);
        Ok(Some(user.clone()))
    }

    /// 数据库文件已存在就绝不动它
    async fn ensure_database(&self) -> Result<Option<PathBuf>> {
        let Some(db) = &self.settings.database else {
            return Ok(None);
        };
        let path = self.settings.layout.database_path(db);
        if path.exists() {
            debug!("数据库 {} 已存在，跳过创建", path.display());
            return Ok(None);
        }

        let owner = match (&self.settings.user, &self.settings.user_password) {
            (Some(u), Some(p)) => Some((u.as_str(), p.as_str())),
            _ => None,
        };
        let sql = create_database_sql(
            &path.to_string_lossy(),
            owner,
            self.settings.page_size,
            self.settings.default_charset.as_deref(),
        );
        self.run_isql(None, &sql).await?;
        info!("数据库 {} 已创建", path.display());
        Ok(Some(path))
    }

    /// 初始化脚本按文件名顺序执行，*.sql 交给 isql，*.sh 交给 sh
    async fn run_init_scripts(&self, database: &Path) -> Result<usize> {
        let dir = &self.settings.layout.initdb_dir;
        if !dir.is_dir() {
            debug!("初始化脚本目录 {} 不存在", dir.display());
            return Ok(0);
        }

        let scripts = collect_init_scripts(dir)?;
        let db_arg = database.to_string_lossy().into_owned();
        let isql = self.settings.layout.program(&self.settings.layout.isql_bin);
        let mut ran = 0;

        for script in scripts {
            match script.extension().and_then(|e| e.to_str()) {
                Some("sql") => {
                    info!("执行 SQL 脚本 {}", script.display());
                    let args = vec![
                        "-b".to_string(),
                        "-q".to_string(),
                        "-i".to_string(),
                        script.to_string_lossy().into_owned(),
                        db_arg.clone(),
                    ];
                    CommandExecutor::run_capture(&isql, &args, None).await?;
                    ran += 1;
                }
                Some("sh") => {
                    info!("执行 shell 脚本 {}", script.display());
                    let args = vec![script.to_string_lossy().into_owned()];
                    CommandExecutor::run_streamed("sh", &args).await?;
                    ran += 1;
                }
                _ => {
                    warn!("跳过不认识的初始化文件 {}", script.display());
                }
            }
        }
        Ok(ran)
    }

    /// 嵌入式 isql：-b 出错即停，-q 安静输出，SQL 走 stdin
    async fn run_isql(&self, database: Option<&str>, sql: &str) -> Result<String> {
        let layout = &self.settings.layout;
        let isql = layout.program(&layout.isql_bin);
        let mut args = vec!["-b".to_string(), "-q".to_string()];
        if let Some(db) = database {
            args.push(db.to_string());
        }
        CommandExecutor::run_capture(&isql, &args, Some(sql)).await
    }
}

// ==================== SQL 生成 ====================

/// 字符串字面量：单引号翻倍转义
fn sql_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// 用户名白名单校验，杜绝拼进 SQL 的注入面
fn validate_user_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let ok = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        }
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(FbError::InvalidValue {
            name: ENV_USER.to_string(),
            value: name.to_string(),
            reason: "用户名必须以字母开头，只含字母/数字/下划线/$".to_string(),
        })
    }
}

fn alter_sysdba_sql(password: &str) -> String {
    format!("ALTER USER SYSDBA SET PASSWORD {};\n", sql_literal(password))
}

fn ensure_user_sql(user: &str, password: &str) -> String {
    format!(
        "CREATE OR ALTER USER {} SET PASSWORD {};\n",
        user,
        sql_literal(password)
    )
}

fn create_database_sql(
    path: &str,
    owner: Option<(&str, &str)>,
    page_size: Option<u32>,
    charset: Option<&str>,
) -> String {
    let mut sql = format!("CREATE DATABASE {}", sql_literal(path));
    if let Some((user, pw)) = owner {
        sql.push_str(&format!(" USER {} PASSWORD {}", user, sql_literal(pw)));
    }
    if let Some(n) = page_size {
        sql.push_str(&format!(" PAGE_SIZE {}", n));
    }
    if let Some(cs) = charset {
        sql.push_str(&format!(" DEFAULT CHARACTER SET {}", cs));
    }
    sql.push_str(";\n");
    sql
}

/// 收集目录里的普通文件，按文件名排序
fn collect_init_scripts(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut scripts: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file())
        .collect();
    scripts.sort();
    Ok(scripts)
}

// ==================== 测试 ====================

#[cfg(test)]
mod provision_tests {
    use super::*;

    mod sql_tests {
        use super::*;

        #[test]
        fn test_sql_literal_escaping() {
            assert_eq!(sql_literal("plain"), "'plain'");
            assert_eq!(sql_literal("o'brien"), "'o''brien'");
            assert_eq!(sql_literal("a''b"), "'a''''b'");
            assert_eq!(sql_literal(""), "''");
        }

        #[test]
        fn test_alter_sysdba_sql() {
            assert_eq!(
                alter_sysdba_sql("masterkey"),
                "ALTER USER SYSDBA SET PASSWORD 'masterkey';\n"
            );
            assert_eq!(
                alter_sysdba_sql("it's"),
                "ALTER USER SYSDBA SET PASSWORD 'it''s';\n"
            );
        }

        #[test]
        fn test_ensure_user_sql() {
            assert_eq!(
                ensure_user_sql("alice", "wonder"),
                "CREATE OR ALTER USER alice SET PASSWORD 'wonder';\n"
            );
        }

        #[test]
        fn test_create_database_sql_minimal() {
            assert_eq!(
                create_database_sql("/data/app.fdb", None, None, None),
                "CREATE DATABASE '/data/app.fdb';\n"
            );
        }

        #[test]
        fn test_create_database_sql_full() {
            let sql = create_database_sql(
                "/data/app.fdb",
                Some(("alice", "wonder")),
                Some(8192),
                Some("UTF8"),
            );
            assert_eq!(
                sql,
                "CREATE DATABASE '/data/app.fdb' USER alice PASSWORD 'wonder' \
                 PAGE_SIZE 8192 DEFAULT CHARACTER SET UTF8;\n"
            );
        }

        #[test]
        fn test_user_name_validation() {
            assert!(validate_user_name("alice").is_ok());
            assert!(validate_user_name("APP_USER$2").is_ok());
            assert!(validate_user_name("").is_err());
            assert!(validate_user_name("2fast").is_err());
            assert!(validate_user_name("bad-name").is_err());
            assert!(validate_user_name("rm '; DROP").is_err());
        }
    }

    mod script_collection_tests {
        use super::*;
        use tempfile::tempdir;

        #[test]
        fn test_sorted_files_only() {
            let dir = tempdir().unwrap();
            std::fs::write(dir.path().join("20-seed.sql"), "").unwrap();
            std::fs::write(dir.path().join("10-schema.sql"), "").unwrap();
            std::fs::create_dir(dir.path().join("subdir")).unwrap();

            let scripts = collect_init_scripts(dir.path()).unwrap();
            let names: Vec<_> = scripts
                .iter()
                .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
                .collect();
            assert_eq!(names, vec!["10-schema.sql", "20-seed.sql"]);
        }
    }

    mod provisioner_tests {
        use super::*;
        use crate::core::settings::Layout;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::tempdir;

        /// 临时目录里搭一套假的 Firebird 安装：isql 桩把参数和 stdin 都记到日志
        fn stub_settings(root: &Path) -> (Settings, PathBuf) {
            let bin_dir = root.join("bin");
            std::fs::create_dir_all(&bin_dir).unwrap();
            let log = root.join("isql.log");

            let script = format!(
                "#!/bin/sh\necho \"ARGS:$@\" >> {log}\ncat >> {log}\nexit 0\n",
                log = log.display()
            );
            let isql = bin_dir.join("isql");
            std::fs::write(&isql, script).unwrap();
            std::fs::set_permissions(&isql, std::fs::Permissions::from_mode(0o755)).unwrap();

            let settings = Settings {
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
                root_password: Some("masterkey".to_string()),
                user: None,
                user_password: None,
                database: None,
                page_size: None,
                default_charset: None,
                legacy_auth: false,
                use_guardian: true,
                conf_defaults: vec![],
                conf_env: vec![],
            };
            (settings, log)
        }

        fn read_log(log: &Path) -> String {
            std::fs::read_to_string(log).unwrap_or_default()
        }

        #[tokio::test]
        async fn test_sysdba_first_boot_then_marker_skips() {
            let dir = tempdir().unwrap();
            let (settings, log) = stub_settings(dir.path());

            let report = Provisioner::new(&settings).run().await.unwrap();
            assert!(report.sysdba_provisioned);
            assert!(!report.sysdba_generated);
            assert!(settings.layout.sysdba_marker().is_file());

            let content = read_log(&log);
            assert!(content.contains("ALTER USER SYSDBA SET PASSWORD 'masterkey'"));
            assert!(content.contains("security.db"));

            // 第二次启动：标记存在，不再跑 ALTER
            let report = Provisioner::new(&settings).run().await.unwrap();
            assert!(!report.sysdba_provisioned);
            assert_eq!(read_log(&log).matches("ALTER USER SYSDBA").count(), 1);
        }

        #[tokio::test]
        async fn test_sysdba_password_generated_and_persisted() {
            let dir = tempdir().unwrap();
            let (mut settings, log) = stub_settings(dir.path());
            settings.root_password = None;

            let report = Provisioner::new(&settings).run().await.unwrap();
            assert!(report.sysdba_provisioned);
            assert!(report.sysdba_generated);

            let pw_file = settings.layout.sysdba_password_file();
            let pw = std::fs::read_to_string(&pw_file).unwrap();
            assert_eq!(pw.trim().len(), 32);
            assert!(read_log(&log).contains(pw.trim()));

            let mode = std::fs::metadata(&pw_file).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        #[tokio::test]
        async fn test_generated_password_reused_after_partial_boot() {
            let dir = tempdir().unwrap();
            let (mut settings, log) = stub_settings(dir.path());
            settings.root_password = None;

            // 模拟上次崩溃：密码文件在，标记没写
            std::fs::create_dir_all(&settings.layout.state_dir).unwrap();
            std::fs::write(settings.layout.sysdba_password_file(), "deadbeef\n").unwrap();

            let report = Provisioner::new(&settings).run().await.unwrap();
            assert!(report.sysdba_provisioned);
            assert!(!report.sysdba_generated);
            assert!(read_log(&log).contains("PASSWORD 'deadbeef'"));
        }

        #[tokio::test]
        async fn test_user_provisioning() {
            let dir = tempdir().unwrap();
            let (mut settings, log) = stub_settings(dir.path());
            settings.user = Some("alice".to_string());
            settings.user_password = Some("wonder".to_string());

            let report = Provisioner::new(&settings).run().await.unwrap();
            assert_eq!(report.user_ensured.as_deref(), Some("alice"));
            assert!(read_log(&log).contains("CREATE OR ALTER USER alice SET PASSWORD 'wonder'"));
        }

        #[tokio::test]
        async fn test_invalid_user_name_is_fatal() {
            let dir = tempdir().unwrap();
            let (mut settings, _) = stub_settings(dir.path());
            settings.user = Some("bad-name".to_string());
            settings.user_password = Some("x".to_string());

            let err = Provisioner::new(&settings).run().await.unwrap_err();
            assert!(matches!(err, FbError::InvalidValue { .. }));
        }

        #[tokio::test]
        async fn test_database_creation_runs_scripts_in_order() {
            let dir = tempdir().unwrap();
            let (mut settings, log) = stub_settings(dir.path());
            settings.database = Some("app.fdb".to_string());
            settings.page_size = Some(8192);

            let initdb = &settings.layout.initdb_dir;
            std::fs::create_dir_all(initdb).unwrap();
            std::fs::write(initdb.join("01-schema.sql"), "CREATE TABLE t (a INT);").unwrap();
            std::fs::write(
                initdb.join("02-after.sh"),
                format!("#!/bin/sh\necho SH:02 >> {}\n", log.display()),
            )
            .unwrap();
            std::fs::write(initdb.join("README.txt"), "不是脚本").unwrap();

            let report = Provisioner::new(&settings).run().await.unwrap();
            assert_eq!(
                report.database_created,
                Some(dir.path().join("data").join("app.fdb"))
            );
            assert_eq!(report.scripts_run, 2);

            let content = read_log(&log);
            assert!(content.contains("CREATE DATABASE"));
            assert!(content.contains("PAGE_SIZE 8192"));
            let sql_pos = content.find("01-schema.sql").unwrap();
            let sh_pos = content.find("SH:02").unwrap();
            assert!(sql_pos < sh_pos, "SQL 脚本应当先于 shell 脚本执行");
        }

        #[tokio::test]
        async fn test_existing_database_skips_creation_and_scripts() {
            let dir = tempdir().unwrap();
            let (mut settings, log) = stub_settings(dir.path());
            settings.database = Some("app.fdb".to_string());

            std::fs::create_dir_all(&settings.layout.data_dir).unwrap();
            std::fs::write(settings.layout.data_dir.join("app.fdb"), "已有数据").unwrap();

            let initdb = &settings.layout.initdb_dir;
            std::fs::create_dir_all(initdb).unwrap();
            std::fs::write(initdb.join("01-schema.sql"), "CREATE TABLE t (a INT);").unwrap();

            let report = Provisioner::new(&settings).run().await.unwrap();
            assert!(report.database_created.is_none());
            assert_eq!(report.scripts_run, 0);
            assert!(!read_log(&log).contains("CREATE DATABASE"));
        }

        #[tokio::test]
        async fn test_failing_script_is_fatal() {
            let dir = tempdir().unwrap();
            let (mut settings, _) = stub_settings(dir.path());
            settings.database = Some("app.fdb".to_string());

            let initdb = &settings.layout.initdb_dir;
            std::fs::create_dir_all(initdb).unwrap();
            std::fs::write(initdb.join("01-broken.sh"), "#!/bin/sh\nexit 1\n").unwrap();

            let err = Provisioner::new(&settings).run().await.unwrap_err();
            assert!(matches!(err, FbError::CommandFailed(_)));
        }
    }
}
