//! 日志初始化 (RUST_LOG 显式设置时优先，其次看 verbose 开关)

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 初始化全局日志订阅器，进程内只能调用一次
pub fn init(verbose: bool) {
    let default_directive = if verbose { "fbentry=debug" } else { "fbentry=info" };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}
