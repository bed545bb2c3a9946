//! firebird.conf 格式处理 (简单原则：透明的文本编辑)
//!
//! firebird.conf 是 `Key = Value` 风格的文本，`#` 开头是注释。
//! 软件包自带的文件几乎全是被注释掉的默认值，所以"设置一个键"
//! 既要能改写现成的赋值行，也要能把注释行解开。除目标行外
//! 逐行原样保留，包里的说明注释在编辑后仍然可读。

use crate::error::{FbError, Result};
use crate::types::ConfEntry;
use crate::utils::paths;
use regex::Regex;
use std::path::{Path, PathBuf};

/// firebird.conf 解析与改写 (纯文本进出，便于测试)
pub struct ConfParser;

impl ConfParser {
    /// 解析出所有生效的配置项
    ///
    /// 规则：
    /// - 忽略空行和以 # 开头的注释行
    /// - 格式：Key = Value，键名两侧空白不敏感
    /// - 其余行跳过 (兼容 include 之类的指令)
    pub fn parse(content: &str) -> Vec<ConfEntry> {
        let line_re = Regex::new(r"^\s*([A-Za-z][A-Za-z0-9_]*)\s*=\s*(.*?)\s*$").unwrap();

        let mut entries = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if let Some(caps) = line_re.captures(line) {
                entries.push(ConfEntry::new(
                    caps[1].to_string(),
                    caps[2].to_string(),
                    idx + 1,
                ));
            }
        }
        entries
    }

    /// 设置一个键，返回改写后的全文
    ///
    /// 匹配第一个 `Key = ...` 或 `#Key = ...` 行 (键名忽略大小写，
    /// 行首允许空白和一个注释号)，整行替换为 `Key = Value`；
    /// 没有匹配行时追加到文件末尾。同样的键值再设置一次是无操作。
    /// 行尾风格 (LF/CRLF) 跟随原文。
    pub fn set_key(content: &str, key: &str, value: &str) -> String {
        let line_re = Regex::new(&format!(r"(?i)^\s*#?\s*{}\s*=", regex::escape(key))).unwrap();
        let assignment = format!("{} = {}", key, value);

        // 按 '\n' 手工切分：lines() 会吞掉行尾的 \r，CRLF 文件会被整体改写
        let mut lines: Vec<String> = content.split('\n').map(String::from).collect();
        let mut replaced = false;
        for line in lines.iter_mut() {
            if line_re.is_match(line) {
                *line = if line.ends_with('\r') {
                    format!("{}\r", assignment)
                } else {
                    assignment.clone()
                };
                replaced = true;
                break;
            }
        }
        if !replaced {
            // 结尾换行在 split 后是一个空尾段，新行插到它前面；
            // 行尾风格跟前一行走
            let ends_with_newline = lines.last().map(|l| l.is_empty()).unwrap_or(false);
            if ends_with_newline {
                let at = lines.len() - 1;
                let crlf = at > 0 && lines[at - 1].ends_with('\r');
                let line = if crlf {
                    format!("{}\r", assignment)
                } else {
                    assignment
                };
                lines.insert(at, line);
            } else {
                lines.push(assignment);
            }
        }
        lines.join("\n")
    }

    /// 键名合法性：字母开头，后续字母/数字/下划线
    pub fn is_valid_key(key: &str) -> bool {
        let mut chars = key.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        }
    }
}

/// 绑定到具体文件的编辑会话 (load → set × N → save)
#[derive(Debug)]
pub struct FirebirdConf {
    path: PathBuf,
    content: String,
}

impl FirebirdConf {
    /// 加载配置文件，文件必须已存在 (软件包负责安装它)
    pub fn load(path: &Path) -> Result<Self> {
        let content = paths::read_file(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            content,
        })
    }

    /// 当前生效的配置项
    pub fn entries(&self) -> Vec<ConfEntry> {
        ConfParser::parse(&self.content)
    }

    /// 设置一个键，返回内容是否发生了变化
    ///
    /// 键名和值都先校验：值必须是单行，换行会把一次赋值写成多行配置。
    pub fn set(&mut self, key: &str, value: &str) -> Result<bool> {
        if !ConfParser::is_valid_key(key) {
            return Err(FbError::InvalidValue {
                name: key.to_string(),
                value: value.to_string(),
                reason: "键名必须以字母开头，只含字母/数字/下划线".to_string(),
            });
        }
        if value.contains('\n') || value.contains('\r') {
            return Err(FbError::InvalidValue {
                name: key.to_string(),
                value: value.to_string(),
                reason: "值不能包含换行符".to_string(),
            });
        }

        let updated = ConfParser::set_key(&self.content, key, value);
        let changed = updated != self.content;
        self.content = updated;
        Ok(changed)
    }

    /// 原子写回
    pub fn save(&self) -> Result<()> {
        paths::write_file_safe(&self.path, &self.content)
    }
}

// ==================== 测试 ====================
