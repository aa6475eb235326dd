use std::time::Duration;
use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 本地校验错误（不会到达网络）
    #[error("校验错误: {0}")]
    Validation(#[from] ValidationError),
    /// 上传错误
    #[error("上传错误: {0}")]
    Upload(#[from] UploadError),
    /// API 调用错误
    #[error("API错误: {0}")]
    Api(#[from] ApiError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 其他错误
    #[error("错误: {0}")]
    Other(String),
}

/// 本地校验错误
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// 文件类型不在允许列表中
    #[error("{file_name} 不是有效的图片类型 ({content_type})")]
    UnsupportedType {
        file_name: String,
        content_type: String,
    },
    /// 文件超过大小限制
    #[error("{file_name} 超过 {limit_mb}MB 限制")]
    FileTooLarge {
        file_name: String,
        size: u64,
        limit_mb: u64,
    },
    /// 空文件
    #[error("{file_name} 是空文件")]
    EmptyFile { file_name: String },
    /// 日期范围无效
    #[error("开始日期 {start} 不能晚于结束日期 {end}")]
    InvalidDateRange { start: String, end: String },
    /// 批次为空
    #[error("{what} 不能为空")]
    EmptyBatch { what: &'static str },
    /// 存储引用格式错误
    #[error("无效的存储引用: {raw}")]
    InvalidReference { raw: String },
}

/// 上传错误
#[derive(Debug, Error)]
pub enum UploadError {
    /// 单个文件传输失败
    #[error("{file_name} 上传失败: {message}")]
    TransferFailed { file_name: String, message: String },
    /// 断点续传次数耗尽
    #[error("{file_name} 续传失败，已尝试 {attempts} 次")]
    ResumeExhausted { file_name: String, attempts: usize },
    /// 上传任务异常退出
    #[error("{file_name} 上传任务异常退出: {message}")]
    TaskAborted { file_name: String, message: String },
    /// 批次中有文件失败（全有或全无策略）
    #[error("{failed}/{total} 个文件上传失败: {files}")]
    BatchIncomplete {
        failed: usize,
        total: usize,
        files: String,
    },
}

/// API 调用错误
#[derive(Debug, Error)]
pub enum ApiError {
    /// 网络请求失败
    #[error("API请求失败 ({endpoint}): {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    /// API 返回错误响应
    #[error("API返回错误响应 ({endpoint}): status={status}, message={message:?}")]
    BadResponse {
        endpoint: String,
        status: u16,
        message: Option<String>,
    },
    /// 未授权
    #[error("未授权访问: {endpoint}")]
    Unauthorized { endpoint: String },
    /// 请求频率限制
    #[error("API请求频率限制 ({endpoint}), 建议等待: {retry_after:?}秒")]
    RateLimited {
        endpoint: String,
        retry_after: Option<u64>,
    },
    /// JSON 解析失败
    #[error("JSON解析失败 ({endpoint}): {message}")]
    JsonParseFailed { endpoint: String, message: String },
    /// 返回结果数量与请求不一致
    #[error("返回结果数量不一致 ({endpoint}): 期望 {expected}, 实际 {actual}")]
    ResultCountMismatch {
        endpoint: String,
        expected: usize,
        actual: usize,
    },
    /// 无法获取认证令牌
    #[error("无法获取认证令牌")]
    MissingToken,
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: &'static str,
    },
    /// 配置文件读取失败
    #[error("读取配置文件失败 ({path}): {source}")]
    FileReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// 配置值超出允许范围
    #[error("配置项 {field} 的值 {value} 无效: {reason}")]
    InvalidValue {
        field: &'static str,
        value: String,
        reason: &'static str,
    },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建API请求失败错误
    pub fn api_request_failed(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        AppError::Api(ApiError::RequestFailed {
            endpoint: endpoint.into(),
            source,
        })
    }

    /// 创建API错误响应
    pub fn bad_response(endpoint: impl Into<String>, status: u16, message: Option<String>) -> Self {
        AppError::Api(ApiError::BadResponse {
            endpoint: endpoint.into(),
            status,
            message,
        })
    }

    /// 创建文件传输失败错误
    pub fn transfer_failed(file_name: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Upload(UploadError::TransferFailed {
            file_name: file_name.into(),
            message: message.into(),
        })
    }

    /// 是否为可重试的临时错误（网络失败、5xx、频率限制）
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Api(ApiError::RequestFailed { .. }) => true,
            AppError::Api(ApiError::RateLimited { .. }) => true,
            AppError::Api(ApiError::BadResponse { status, .. }) => *status >= 500,
            _ => false,
        }
    }

    /// 是否为频率限制
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AppError::Api(ApiError::RateLimited { .. }))
    }

    /// 服务端建议的等待时间（`Retry-After`）
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AppError::Api(ApiError::RateLimited {
                retry_after: Some(secs),
                ..
            }) => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }

    /// 面向用户的错误信息：优先使用远端返回的信息，否则使用通用提示
    pub fn user_message(&self) -> String {
        match self {
            AppError::Api(ApiError::BadResponse {
                message: Some(message),
                ..
            }) if !message.trim().is_empty() => message.clone(),
            AppError::Api(ApiError::BadResponse { .. }) => "服务暂时不可用，请稍后重试".to_string(),
            AppError::Api(ApiError::RateLimited { .. }) => {
                "请求过于频繁，请稍后再试".to_string()
            }
            AppError::Api(ApiError::Unauthorized { .. }) | AppError::Api(ApiError::MissingToken) => {
                "登录已失效，请重新登录".to_string()
            }
            AppError::Api(ApiError::RequestFailed { .. }) => "网络连接失败，请检查网络".to_string(),
            AppError::Validation(e) => e.to_string(),
            AppError::Upload(e) => e.to_string(),
            AppError::Other(msg) if !msg.trim().is_empty() => msg.clone(),
            _ => "发生未知错误".to_string(),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
