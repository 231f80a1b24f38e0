//! 二维码展示服务 - 业务能力层
//!
//! 只负责"把二维码给人看"：写入图片文件并调用系统看图程序打开

use crate::error::{Result, SeckillError};
use crate::services::auth_session::QrPresenter;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// 写文件并用系统默认程序打开
pub struct FileQrPresenter {
    image_path: PathBuf,
    open_viewer: bool,
}

impl FileQrPresenter {
    pub fn new(image_path: impl Into<PathBuf>) -> Self {
        Self {
            image_path: image_path.into(),
            open_viewer: true,
        }
    }

    /// 只写文件，不打开看图程序
    pub fn without_viewer(mut self) -> Self {
        self.open_viewer = false;
        self
    }

    fn open(&self) {
        let path = self.image_path.to_string_lossy().to_string();
        let mut command = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", "start", "", path.as_str()]);
            c
        } else if cfg!(target_os = "macos") {
            let mut c = Command::new("open");
            c.arg(&path);
            c
        } else {
            let mut c = Command::new("xdg-open");
            c.arg(&path);
            c
        };

        match command.spawn() {
            Ok(child) => {
                reap(child);
            }
            Err(e) => warn!("无法自动打开二维码图片，请手动打开 {}: {}", path, e),
        }
    }
}

/// 在后台线程等待看图程序退出，避免留下僵尸进程
fn reap(mut child: Child) -> JoinHandle<Option<ExitStatus>> {
    std::thread::spawn(move || match child.wait() {
        Ok(status) => {
            debug!("看图程序已退出: {}", status);
            Some(status)
        }
        Err(e) => {
            debug!("等待看图程序退出失败: {}", e);
            None
        }
    })
}

impl QrPresenter for FileQrPresenter {
    fn present(&self, image: &[u8]) -> Result<()> {
        std::fs::write(&self.image_path, image)
            .map_err(|e| SeckillError::io(self.image_path.display().to_string(), e))?;
        info!("二维码已保存至 {}", self.image_path.display());

        if self.open_viewer {
            self.open();
        }
        Ok(())
    }
}
