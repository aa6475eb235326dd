use crate::error::{AppResult, ConfigError};
use chrono::Duration;
use serde::Deserialize;
use std::path::Path;

/// 会话窗口上限：一天
pub const MAX_SESSION_WINDOW_SECS: i64 = 24 * 60 * 60;

/// 时区偏移上限（分钟，不含）
const MAX_UTC_OFFSET_MINUTES: i32 = 24 * 60;

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- 后端服务 ---
    pub backend_base_url: String,
    pub auth_token: String,
    pub request_timeout_secs: u64,
    // --- 对象存储 ---
    pub storage_upload_url: String,
    pub storage_public_url: String,
    pub storage_bucket: String,
    /// 单次上传分片大小（字节）
    pub upload_chunk_size: usize,
    /// 分片失败后的最大续传次数
    pub upload_max_resumes: usize,
    /// 单个文件最大字节数
    pub max_file_size_bytes: u64,
    // --- 签名链接缓存 ---
    /// 缓存比服务端声明的有效期提前失效的秒数
    pub signed_url_safety_margin_secs: u64,
    pub resolve_max_attempts: usize,
    pub resolve_initial_backoff_ms: u64,
    pub resolve_max_backoff_ms: u64,
    // --- 报表 ---
    pub report_page_size: usize,
    /// 会话分组时间窗口（秒）
    pub session_window_secs: i64,
    /// 报表日期分组使用的固定时区偏移（分钟）
    pub report_utc_offset_minutes: i32,
    // --- 运行 ---
    /// 待上传照片所在目录
    pub capture_folder: String,
    /// 提交给计数服务的提示词
    pub prompt: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_base_url: "http://localhost:8080".to_string(),
            auth_token: String::new(),
            request_timeout_secs: 30,
            storage_upload_url: "https://storage.googleapis.com".to_string(),
            storage_public_url: "https://storage.googleapis.com".to_string(),
            storage_bucket: "gem-tally-captures".to_string(),
            upload_chunk_size: 256 * 1024,
            upload_max_resumes: 3,
            max_file_size_bytes: 5 * 1024 * 1024,
            signed_url_safety_margin_secs: 10 * 60,
            resolve_max_attempts: 3,
            resolve_initial_backoff_ms: 200,
            resolve_max_backoff_ms: 2000,
            report_page_size: 50,
            session_window_secs: 5 * 60,
            report_utc_offset_minutes: 0,
            capture_folder: "captures".to_string(),
            prompt: String::new(),
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 加载配置：若设置了 `GEM_TALLY_CONFIG` 则先读取 TOML 文件，再应用环境变量覆盖
    pub fn load() -> AppResult<Self> {
        let base = match std::env::var("GEM_TALLY_CONFIG") {
            Ok(path) if !path.trim().is_empty() => Self::from_toml_file(Path::new(&path))?,
            _ => Self::default(),
        };
        base.with_env_overrides()
    }

    /// 只使用默认值 + 环境变量
    pub fn from_env() -> AppResult<Self> {
        Self::default().with_env_overrides()
    }

    /// 从 TOML 文件读取配置，缺省字段使用默认值
    pub fn from_toml_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::TomlParseFailed {
            path: path.display().to_string(),
            source,
        })?;
        Ok(config)
    }

    /// 检查取值范围
    pub fn validate(&self) -> AppResult<()> {
        self.session_window()?;
        if self.report_page_size == 0 {
            return Err(invalid("report_page_size", 0, "每页记录数至少为 1"));
        }
        if self.report_utc_offset_minutes.abs() >= MAX_UTC_OFFSET_MINUTES {
            return Err(invalid(
                "report_utc_offset_minutes",
                self.report_utc_offset_minutes,
                "时区偏移必须在 ±24 小时以内",
            ));
        }
        Ok(())
    }

    /// 会话分组时间窗口，必须在 (0, 一天] 之内
    pub fn session_window(&self) -> AppResult<Duration> {
        let secs = self.session_window_secs;
        if secs <= 0 || secs > MAX_SESSION_WINDOW_SECS {
            return Err(invalid(
                "session_window_secs",
                secs,
                "会话窗口必须大于 0 且不超过一天",
            ));
        }
        Duration::try_seconds(secs)
            .ok_or_else(|| invalid("session_window_secs", secs, "会话窗口超出范围"))
    }

    fn with_env_overrides(self) -> AppResult<Self> {
        let config = Self {
            backend_base_url: env_string("BACKEND_API_URL", self.backend_base_url),
            auth_token: env_string("GEM_TALLY_TOKEN", self.auth_token),
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS", self.request_timeout_secs)?,
            storage_upload_url: env_string("STORAGE_UPLOAD_URL", self.storage_upload_url),
            storage_public_url: env_string("STORAGE_PUBLIC_URL", self.storage_public_url),
            storage_bucket: env_string("STORAGE_BUCKET", self.storage_bucket),
            upload_chunk_size: env_parse("UPLOAD_CHUNK_SIZE", self.upload_chunk_size)?,
            upload_max_resumes: env_parse("UPLOAD_MAX_RESUMES", self.upload_max_resumes)?,
            max_file_size_bytes: env_parse("MAX_FILE_SIZE_BYTES", self.max_file_size_bytes)?,
            signed_url_safety_margin_secs: env_parse(
                "SIGNED_URL_SAFETY_MARGIN_SECS",
                self.signed_url_safety_margin_secs,
            )?,
            resolve_max_attempts: env_parse("RESOLVE_MAX_ATTEMPTS", self.resolve_max_attempts)?,
            resolve_initial_backoff_ms: env_parse(
                "RESOLVE_INITIAL_BACKOFF_MS",
                self.resolve_initial_backoff_ms,
            )?,
            resolve_max_backoff_ms: env_parse("RESOLVE_MAX_BACKOFF_MS", self.resolve_max_backoff_ms)?,
            report_page_size: env_parse("REPORT_PAGE_SIZE", self.report_page_size)?,
            session_window_secs: env_parse("SESSION_WINDOW_SECS", self.session_window_secs)?,
            report_utc_offset_minutes: env_parse(
                "REPORT_UTC_OFFSET_MINUTES",
                self.report_utc_offset_minutes,
            )?,
            capture_folder: env_string("CAPTURE_FOLDER", self.capture_folder),
            prompt: env_string("COUNT_PROMPT", self.prompt),
            verbose_logging: env_parse("VERBOSE_LOGGING", self.verbose_logging)?,
        };
        config.validate()?;
        Ok(config)
    }
}

fn invalid(field: &'static str, value: impl ToString, reason: &'static str) -> crate::error::AppError {
    ConfigError::InvalidValue {
        field,
        value: value.to_string(),
        reason,
    }
    .into()
}

fn env_string(var_name: &str, default: String) -> String {
    std::env::var(var_name).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(var_name: &str, default: T) -> AppResult<T> {
    match std::env::var(var_name) {
        Ok(value) => match value.trim().parse::<T>() {
            Ok(parsed) => Ok(parsed),
            Err(_) => Err(ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: std::any::type_name::<T>(),
            }
            .into()),
        },
        Err(_) => Ok(default),
    }
}
