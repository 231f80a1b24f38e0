//! Cookie 本地存储
//!
//! 每个账号一个 `<昵称>.cookies` 文件，内容为 JSON

use crate::error::{Result, SeckillError};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const COOKIE_EXT: &str = "cookies";

/// 持久化的登录凭据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialBlob {
    pub saved_at: DateTime<Local>,
    /// `name=value` 形式的 cookie
    pub cookies: Vec<String>,
}

impl CredentialBlob {
    pub fn new(cookies: Vec<String>) -> Self {
        Self {
            saved_at: Local::now(),
            cookies,
        }
    }
}

/// Cookie 文件存储
pub struct CookieVault {
    folder: PathBuf,
}

impl CookieVault {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    /// 加载目录中第一个 `.cookies` 文件
    ///
    /// 目录不存在或没有文件时返回 `None`
    pub fn load_first(&self) -> Result<Option<(String, CredentialBlob)>> {
        if !self.folder.exists() {
            return Ok(None);
        }
        let entries = std::fs::read_dir(&self.folder)
            .map_err(|e| SeckillError::io(self.folder.display().to_string(), e))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|s| s.to_str()) == Some(COOKIE_EXT))
            .collect();
        files.sort();

        let Some(path) = files.into_iter().next() else {
            return Ok(None);
        };
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let blob = Self::read(&path)?;
        info!("✓ 已加载本地 Cookie: {}", path.display());
        Ok(Some((name, blob)))
    }

    /// 按昵称保存
    pub fn save(&self, name: &str, blob: &CredentialBlob) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.folder)
            .map_err(|e| SeckillError::io(self.folder.display().to_string(), e))?;
        let path = self.path_for(name);
        let content = serde_json::to_string_pretty(blob)?;
        std::fs::write(&path, content).map_err(|e| SeckillError::io(path.display().to_string(), e))?;
        debug!("Cookie 已保存至 {}", path.display());
        Ok(path)
    }

    fn path_for(&self, name: &str) -> PathBuf {
        let safe: String = name
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
            .collect();
        self.folder.join(format!("{}.{}", safe, COOKIE_EXT))
    }

    fn read(path: &Path) -> Result<CredentialBlob> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SeckillError::io(path.display().to_string(), e))?;
        serde_json::from_str(&content)
            .map_err(|e| SeckillError::Decode(format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_folder_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let vault = CookieVault::new(dir.path().join("absent"));
        assert!(vault.load_first().unwrap().is_none());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let vault = CookieVault::new(dir.path());
        let blob = CredentialBlob::new(vec!["thor=abc".to_string(), "pin=jd_user".to_string()]);

        let path = vault.save("jd_user", &blob).unwrap();
        assert!(path.ends_with("jd_user.cookies"));

        let (name, loaded) = vault.load_first().unwrap().unwrap();
        assert_eq!(name, "jd_user");
        assert_eq!(loaded, blob);
    }

    #[test]
    fn ignores_other_files_and_sanitizes_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        let vault = CookieVault::new(dir.path());
        assert!(vault.load_first().unwrap().is_none());

        let path = vault.save("a/b", &CredentialBlob::new(vec![])).unwrap();
        assert!(path.ends_with("a_b.cookies"));
    }

    #[test]
    fn corrupt_file_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x.cookies"), "not json").unwrap();
        let vault = CookieVault::new(dir.path());
        assert!(matches!(vault.load_first(), Err(SeckillError::Decode(_))));
    }
}
