//! 文件校验
//!
//! 每个文件独立校验：类型白名单、大小上限、非空。被拒绝的文件不影响其它文件。

use crate::error::ValidationError;
use crate::models::UploadFile;
use phf::phf_set;

/// 允许上传的 MIME 类型
static ALLOWED_CONTENT_TYPES: phf::Set<&'static str> = phf_set! {
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
};

/// 默认大小上限 5MB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// 文件校验器
#[derive(Debug, Clone, Copy)]
pub struct FileValidator {
    max_size: u64,
}

impl Default for FileValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FILE_SIZE)
    }
}

impl FileValidator {
    pub fn new(max_size: u64) -> Self {
        Self { max_size }
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// 是否为允许的 MIME 类型（忽略大小写和参数部分）
    pub fn is_allowed_type(content_type: &str) -> bool {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        ALLOWED_CONTENT_TYPES.contains(essence.as_str())
    }

    /// 校验单个文件
    pub fn validate(&self, file: &UploadFile) -> Result<(), ValidationError> {
        if !Self::is_allowed_type(&file.content_type) {
            return Err(ValidationError::UnsupportedType {
                file_name: file.file_name.clone(),
                content_type: file.content_type.clone(),
            });
        }
        if file.size() == 0 {
            return Err(ValidationError::EmptyFile {
                file_name: file.file_name.clone(),
            });
        }
        if file.size() > self.max_size {
            return Err(ValidationError::FileTooLarge {
                file_name: file.file_name.clone(),
                size: file.size(),
                limit_mb: self.max_size.div_ceil(1024 * 1024),
            });
        }
        Ok(())
    }

    /// 拆分为通过校验的文件和拒绝原因，保持输入顺序
    pub fn partition(&self, files: Vec<UploadFile>) -> (Vec<UploadFile>, Vec<ValidationError>) {
        let mut accepted = Vec::with_capacity(files.len());
        let mut rejected = Vec::new();
        for file in files {
            match self.validate(&file) {
                Ok(()) => accepted.push(file),
                Err(e) => rejected.push(e),
            }
        }
        (accepted, rejected)
    }
}
