//! 存储引用、访问链接与关联 ID

use crate::error::ValidationError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;
use uuid::Uuid;

/// `scheme://bucket/path`
static REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-zA-Z][a-zA-Z0-9+.-]*)://([^/]+)/(.+)$").expect("静态正则表达式无效")
});

/// 新建引用使用的协议
pub const STORAGE_SCHEME: &str = "gs";

/// 对象存储中的不透明引用，创建后不可变
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StorageReference(String);

impl StorageReference {
    /// 解析引用字符串
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if REFERENCE_RE.is_match(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(ValidationError::InvalidReference {
                raw: raw.to_string(),
            })
        }
    }

    /// 由存储桶和路径构造 `gs://bucket/path`
    pub fn from_parts(bucket: &str, path: &str) -> Self {
        Self(format!(
            "{}://{}/{}",
            STORAGE_SCHEME,
            bucket,
            path.trim_start_matches('/')
        ))
    }

    /// 判断原始字符串是否需要经过签名解析
    ///
    /// 形如 `scheme://bucket/path` 且协议不是 http(s) 时返回 `Some`。
    pub fn needs_resolution(raw: &str) -> Option<Self> {
        let caps = REFERENCE_RE.captures(raw)?;
        let scheme = caps.get(1)?.as_str().to_ascii_lowercase();
        if scheme == "http" || scheme == "https" {
            None
        } else {
            Some(Self(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn bucket(&self) -> &str {
        self.part(2)
    }

    pub fn path(&self) -> &str {
        self.part(3)
    }

    fn part(&self, index: usize) -> &str {
        REFERENCE_RE
            .captures(&self.0)
            .and_then(|caps| caps.get(index))
            .map(|m| m.as_str())
            .unwrap_or_default()
    }
}

impl TryFrom<String> for StorageReference {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<StorageReference> for String {
    fn from(value: StorageReference) -> Self {
        value.0
    }
}

impl fmt::Display for StorageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 可直接访问的短期链接，从不持久化
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessUrl(String);

impl AccessUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccessUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 签名服务返回的链接及其声明的有效期
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrl {
    pub url: AccessUrl,
    pub expires_in: Duration,
}

/// 关联 ID：上传任务创建时分配，贯穿上传、计数和复核
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// 解析服务端回传的 ID
    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw).ok().map(Self)
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts_and_accessors() {
        let reference = StorageReference::from_parts("captures", "20250102/abc.jpg");
        assert_eq!(reference.as_str(), "gs://captures/20250102/abc.jpg");
        assert_eq!(reference.bucket(), "captures");
        assert_eq!(reference.path(), "20250102/abc.jpg");
    }

    #[test]
    fn test_needs_resolution() {
        assert!(StorageReference::needs_resolution("gs://b/p.jpg").is_some());
        assert!(StorageReference::needs_resolution("https://cdn.example.com/p.jpg").is_none());
        assert!(StorageReference::needs_resolution("gs://bucket-only").is_none());
        assert!(StorageReference::needs_resolution("").is_none());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(StorageReference::parse("not a reference").is_err());
        let json = serde_json::to_string(&StorageReference::from_parts("b", "x.png")).unwrap();
        assert_eq!(json, "\"gs://b/x.png\"");
    }
}
