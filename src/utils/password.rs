//! 随机密码生成 (首次启动时为 SYSDBA 生成初始密码)

use crate::error::{FbError, Result};
use ring::rand::{SecureRandom, SystemRandom};

/// 生成 32 位十六进制随机密码 (128 位熵)
pub fn generate() -> Result<String> {
    let rng = SystemRandom::new();
    let mut buf = [0u8; 16];
    rng.fill(&mut buf).map_err(|_| FbError::Random)?;
    Ok(hex::encode(buf))
}

// ==================== 测试 ====================
