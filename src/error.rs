use thiserror::Error;

/// 秒杀流程错误类型
#[derive(Debug, Error)]
pub enum SeckillError {
    /// 无法获取服务器时间（网络不可达或返回格式错误）
    #[error("无法获取京东服务器时间: {0}")]
    ClockUnavailable(String),

    /// 二维码登录失败
    #[error("二维码登录失败: {0}")]
    LoginFailed(String),

    /// 二维码轮询次数耗尽
    #[error("二维码登录超时 (已轮询 {attempts} 次)，请重新扫描登录")]
    LoginTimeout { attempts: u32 },

    /// 登录状态在抢购过程中失效
    #[error("登录状态已失效，需要重新登录")]
    SessionInvalid,

    /// 抢购链接尚未开放
    #[error("抢购链接获取失败: {0}")]
    RouteUnavailable(String),

    /// 无法获取生成订单的基本信息
    #[error("无法获取秒杀初始化信息: {0}")]
    OrderInitUnavailable(String),

    /// 响应解析失败（JSON / JSONP）
    #[error("响应解析失败: {0}")]
    Decode(String),

    /// 网络请求失败
    #[error("请求失败 ({endpoint}): {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// 本地文件读写失败
    #[error("文件操作失败 ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// 配置缺失或格式错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 被外部停止信号中断
    #[error("已取消")]
    Cancelled,
}

// ========== 便捷构造函数 ==========

impl SeckillError {
    /// 创建网络请求失败错误
    pub fn http(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        SeckillError::Http {
            endpoint: endpoint.into(),
            source,
        }
    }

    /// 创建文件操作错误
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        SeckillError::Io {
            path: path.into(),
            source,
        }
    }

    /// 是否应终止当前抢购线程（其余错误均可重试）
    pub fn is_fatal_for_worker(&self) -> bool {
        matches!(self, SeckillError::SessionInvalid | SeckillError::Cancelled)
    }
}

impl From<serde_json::Error> for SeckillError {
    fn from(err: serde_json::Error) -> Self {
        SeckillError::Decode(err.to_string())
    }
}

// ========== Result 类型别名 ==========

/// 秒杀流程结果类型
pub type Result<T> = std::result::Result<T, SeckillError>;
