//! 基础设施层
//!
//! 时钟、停止信号、响应解析、Cookie 存储，不包含任何抢购业务

pub mod clock;
pub mod codec;
pub mod cookie_vault;
pub mod signal;

pub use clock::{Clock, SystemClock};
pub use cookie_vault::{CookieVault, CredentialBlob};
pub use signal::StopSignal;
