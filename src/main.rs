//! fbentry 主程序入口
//!
//! 设计原则：
//! - 模块化：入口代码简洁，逻辑委托给各模块
//! - 安静模式：默认只输出关键日志，成功静默
//! - 错误处理：详细/安静错误模式，通过 --verbose 切换

mod types;
mod error;
mod utils;
mod config;
mod core;
mod cli;

use std::collections::HashMap;

use clap::Parser;

use crate::core::provision::Provisioner;
use crate::core::server;
use crate::core::settings::{self, Layout, Settings};
use cli::{parse_set_args, Cli, Commands};
use config::defaults::Defaults;
use config::format::conf::{ConfParser, FirebirdConf};
use error::Result;
use types::{parse_bool, OutputFormat};
use utils::executor::CommandExecutor;
use utils::paths::file_exists;
use utils::secrets::env_nonempty;

#[tokio::main]
async fn main() {
    // 解析 CLI 参数
    let cli = Cli::parse();

    // 日志初始化要在一切业务逻辑之前，启动失败也能看到原因
    utils::logger::init(cli.verbose);

    // 不带子命令时等价于 run，容器 ENTRYPOINT 就靠这个默认
    let command = cli.command.unwrap_or(Commands::Run {
        skip_provision: false,
    });

    // 执行命令，统一错误处理
    if let Err(e) = run_command(command, cli.verbose).await {
        e.report(cli.verbose);
        std::process::exit(1);
    }
}

/// 命令分发
async fn run_command(command: Commands, verbose: bool) -> Result<()> {
    match command {
        Commands::Run { skip_provision } => {
            let settings = Settings::resolve()?;

            let applied = apply_configuration(&settings, &[])?;
            if !applied.is_empty() {
                tracing::info!(
                    "已应用 {} 项配置到 {}",
                    applied.len(),
                    settings.layout.conf_path.display()
                );
            }

            if skip_provision {
                tracing::info!("按 --skip-provision 跳过初始化阶段");
            } else {
                Provisioner::new(&settings).run().await?;
            }

            // 前台运行服务器，容器的生死与它绑定
            let code = server::launch_and_wait(&settings).await?;
            std::process::exit(code);
        }

        Commands::Configure { set } => {
            let settings = Settings::resolve()?;
            let extra = parse_set_args(&set)?;
            let applied = apply_configuration(&settings, &extra)?;

            if verbose {
                for (key, value) in &applied {
                    println!("✓ 设置 {} = {}", key, value);
                }
                println!(
                    "✓ 已应用 {} 项配置到 {}",
                    applied.len(),
                    settings.layout.conf_path.display()
                );
            }
        }

        Commands::Provision => {
            let settings = Settings::resolve()?;
            Provisioner::new(&settings).run().await?;
        }

        Commands::Status { format } => {
            let settings = Settings::resolve()?;
            show_status(&settings, OutputFormat::from(format.as_str()))?;
        }

        Commands::Doctor => {
            let issues = diagnose(verbose);
            if issues > 0 {
                std::process::exit(1);
            }
        }

        Commands::External(args) => {
            // exec 成功则永不返回，返回即失败
            CommandExecutor::exec_replace(&args)?;
        }
    }

    Ok(())
}

// ==================== 配置应用 ====================

/// 把全部配置编辑写进 firebird.conf，返回实际提交的键值对
///
/// 编辑来源按优先级从低到高：默认值文件 [conf] 表 → Legacy_Auth
/// 组合 → FIREBIRD_CONF_* 环境变量 → 命令行 --set。后写的覆盖先写的，
/// 因为对同一个键的第二次 set 会改写同一行。
/// (幂等原则：重复执行结果一致，启动脚本可以放心重试)
fn apply_configuration(
    settings: &Settings,
    extra: &[(String, String)],
) -> Result<Vec<(String, String)>> {
    let mut edits = settings.conf_edits();
    edits.extend(extra.iter().cloned());

    // 没有任何编辑就不碰配置文件，发行版默认配置保持原样
    if edits.is_empty() {
        return Ok(edits);
    }

    let mut conf = FirebirdConf::load(&settings.layout.conf_path)?;
    for (key, value) in &edits {
        conf.set(key, value)?;
    }
    conf.save()?;

    Ok(edits)
}

// ==================== 状态展示 ====================

/// 展示解析后的生效配置 (安全原则：密码永远只显示是否设置)
fn show_status(settings: &Settings, format: OutputFormat) -> Result<()> {
    let report = settings.status_report();

    match format {
        OutputFormat::JSON => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::ENV => {
            let onoff = |v: bool| if v { "开" } else { "关" };
            let set_or_not = |v: bool| if v { "已设置" } else { "未设置" };

            println!("配置文件: {}", report.conf_path);
            println!("数据目录: {}", report.data_dir);
            println!("状态目录: {}", report.state_dir);
            println!("初始化脚本目录: {}", report.initdb_dir);
            println!(
                "服务器命令: {} (守护进程: {})",
                report.server_command,
                onoff(report.use_guardian)
            );
            println!("Legacy_Auth: {}", onoff(report.legacy_auth));
            println!("SYSDBA 密码: {}", set_or_not(report.root_password_set));
            match &report.user {
                Some(user) => println!(
                    "应用用户: {} (密码{})",
                    user,
                    set_or_not(report.user_password_set)
                ),
                None => println!("应用用户: 未设置"),
            }
            match &report.database {
                Some(database) => println!("应用数据库: {}", database),
                None => println!("应用数据库: 未设置"),
            }
            if let Some(page_size) = report.page_size {
                println!("页大小: {}", page_size);
            }
            if let Some(charset) = &report.default_charset {
                println!("默认字符集: {}", charset);
            }
            if !report.conf_overrides.is_empty() {
                println!("\nfirebird.conf 覆盖 ({} 项):", report.conf_overrides.len());
                for entry in &report.conf_overrides {
                    println!("  {}", entry);
                }
            }
        }
    }

    Ok(())
}

// ==================== 环境诊断 ====================

/// 诊断启动环境，返回发现的问题数量
///
/// 刻意不走 Settings::resolve：解析失败的环境正是诊断的对象，
/// 这里要把所有问题一次列出来而不是在第一个错误上退出。
fn diagnose(verbose: bool) -> usize {
    println!("🔍 Firebird 启动环境诊断\n");

    let mut issues = 0;

    // 1. 默认值文件 (解析失败也要继续往下查)
    let defaults = match Defaults::load() {
        Ok(defaults) => defaults,
        Err(e) => {
            println!("❌ 默认值文件解析失败: {}", e);
            issues += 1;
            Defaults::default()
        }
    };
    let layout = Layout::resolve(&defaults);

    // 2. firebird.conf 可读性与重复键
    if file_exists(&layout.conf_path) {
        match FirebirdConf::load(&layout.conf_path) {
            Ok(conf) => {
                let entries = conf.entries();
                println!(
                    "✓ 配置文件 {} 可读 [{} 个生效项]",
                    layout.conf_path.display(),
                    entries.len()
                );

                // 服务器只认第一处定义，重复键多半是编辑事故
                let mut seen: HashMap<String, Vec<usize>> = HashMap::new();
                for entry in &entries {
                    seen.entry(entry.key.to_lowercase())
                        .or_default()
                        .push(entry.line);
                }
                let mut duplicated: Vec<_> =
                    seen.into_iter().filter(|(_, lines)| lines.len() > 1).collect();
                duplicated.sort();
                for (key, lines) in duplicated {
                    println!("⚠️  键 {} 定义了 {} 次 (行 {:?})，只有第一处生效", key, lines.len(), lines);
                    issues += 1;
                }
            }
            Err(e) => {
                println!("❌ 配置文件 {} 不可读: {}", layout.conf_path.display(), e);
                issues += 1;
            }
        }
    } else {
        println!("❌ 配置文件 {} 不存在", layout.conf_path.display());
        println!("   解决：检查 FIREBIRD_CONF 或确认服务器软件包已正确安装");
        issues += 1;
    }

    // 3. 目录 (缺失不算问题，启动时会自动创建)
    for (label, dir) in [
        ("数据目录", &layout.data_dir),
        ("状态目录", &layout.state_dir),
        ("初始化脚本目录", &layout.initdb_dir),
    ] {
        if dir.is_dir() {
            println!("✓ {} {} 存在", label, dir.display());
        } else {
            println!("ℹ️  {} {} 不存在 (启动时自动创建)", label, dir.display());
        }
    }

    // 4. 服务器二进制
    for name in [&layout.guardian_bin, &layout.server_bin, &layout.isql_bin] {
        match CommandExecutor::find_program(name, layout.bin_dir.as_deref()) {
            Some(path) => println!("✓ 找到 {} ({})", name, path.display()),
            None => {
                println!("❌ 找不到 {}", name);
                println!("   解决：设置 FIREBIRD_BIN_DIR 或把它加入 PATH");
                issues += 1;
            }
        }
    }

    // 5. 密钥来源冲突与配套变量
    let is_set = |name: &str| {
        env_nonempty(name).is_some() || env_nonempty(&format!("{}_FILE", name)).is_some()
    };
    for name in [
        settings::ENV_ROOT_PASSWORD,
        settings::ENV_USER,
        settings::ENV_PASSWORD,
        settings::ENV_DATABASE,
    ] {
        let file_name = format!("{}_FILE", name);
        if env_nonempty(name).is_some() && env_nonempty(&file_name).is_some() {
            println!("❌ {} 与 {} 同时设置，只能二选一", name, file_name);
            issues += 1;
        }
    }
    if is_set(settings::ENV_USER) && !is_set(settings::ENV_PASSWORD) {
        println!(
            "❌ 设置了 {} 但缺少 {}",
            settings::ENV_USER,
            settings::ENV_PASSWORD
        );
        issues += 1;
    }

    // 6. 布尔开关取值
    for name in [settings::ENV_USE_LEGACY_AUTH, settings::ENV_USE_GUARDIAN] {
        if let Some(raw) = env_nonempty(name) {
            if parse_bool(&raw).is_none() {
                println!("❌ {} 的值 {:?} 不是合法布尔 (1/0 true/false yes/no on/off)", name, raw);
                issues += 1;
            }
        }
    }

    // 7. FIREBIRD_CONF_* 键名
    for (key, _) in settings::collect_conf_env() {
        if !ConfParser::is_valid_key(&key) {
            println!("❌ FIREBIRD_CONF_{} 不是合法的配置键名", key);
            issues += 1;
        }
    }

    // 汇总
    if issues == 0 {
        println!("\n✅ 未发现明显问题");
    } else {
        println!("\n发现 {} 个问题", issues);
        if !verbose {
            println!("提示：使用 --verbose 查看详细错误链");
        }
    }

    issues
}
