//! 文件读写工具 (传统原则：常识性接口设计)

use crate::error::{FbError, Result};
use std::path::Path;

/// 检查文件是否存在
pub fn file_exists(path: &Path) -> bool {
    path.exists() && path.is_file()
}

/// 确保目录存在 (幂等操作)
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// 读取文件内容，返回错误时提供详细信息
pub fn read_file(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(FbError::FileNotFound(path.to_path_buf()));
    }
    std::fs::read_to_string(path).map_err(|e| {
        FbError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("读取文件 {} 失败: {}", path.display(), e),
        ))
    })
}

/// 安全写入文件 (使用临时文件 + 原子替换)
pub fn write_file_safe(path: &Path, content: &str) -> Result<()> {
    // 确保父目录存在
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // 写入临时文件
    let temp_path = path.with_extension("tmp");
    std::fs::write(&temp_path, content)?;

    // 原子替换
    std::fs::rename(&temp_path, path)?;

    Ok(())
}

/// 写入密钥文件，权限收紧为仅属主可读写 (0600)
pub fn write_secret_file(path: &Path, content: &str) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    write_file_safe(path, content)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

// ==================== 测试 ====================

#[cfg(test)]
mod paths_tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_and_read_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("firebird.conf");

        write_file_safe(&path, "WireCrypt = Enabled\n").unwrap();
        assert!(file_exists(&path));
        assert_eq!(read_file(&path).unwrap(), "WireCrypt = Enabled\n");
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("c.conf");

        write_file_safe(&path, "x").unwrap();
        assert!(file_exists(&path));
    }

    #[test]
    fn test_write_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.conf");

        write_file_safe(&path, "data").unwrap();
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope.conf");

        let err = read_file(&path).unwrap_err();
        assert!(matches!(err, FbError::FileNotFound(_)));
    }

    #[test]
    fn test_ensure_dir_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state");

        ensure_dir(&path).unwrap();
        ensure_dir(&path).unwrap();
        assert!(path.is_dir());
    }

    #[test]
    fn test_secret_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("SYSDBA.password");

        write_secret_file(&path, "s3cret").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(read_file(&path).unwrap(), "s3cret");
    }
}
