use crate::models::UploadFile;
use anyhow::{Context, Result};
use phf::phf_map;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 无法从内容识别类型时按扩展名判断
static EXTENSION_TYPES: phf::Map<&'static str, &'static str> = phf_map! {
    "jpg" => "image/jpeg",
    "jpeg" => "image/jpeg",
    "png" => "image/png",
    "gif" => "image/gif",
    "webp" => "image/webp",
    "heic" => "image/heic",
};

/// 识别文件的 MIME 类型：优先按内容，其次按扩展名
pub fn sniff_content_type(file_name: &str, bytes: &[u8]) -> String {
    if let Some(kind) = infer::get(bytes) {
        return kind.mime_type().to_string();
    }

    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .and_then(|ext| EXTENSION_TYPES.get(ext.as_str()).copied())
        .unwrap_or("application/octet-stream")
        .to_string()
}

/// 读取单个照片文件
pub async fn load_capture_file(path: &Path) -> Result<UploadFile> {
    let bytes = fs::read(path)
        .await
        .with_context(|| format!("无法读取照片文件: {}", path.display()))?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let content_type = sniff_content_type(&file_name, &bytes);

    Ok(UploadFile::new(file_name, content_type, bytes))
}

/// 读取文件夹中的所有文件（按文件名排序，子目录忽略）
///
/// 读取失败的文件记录警告后跳过；类型和大小由上传前的校验决定。
pub async fn load_capture_folder(folder_path: &str) -> Result<Vec<UploadFile>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let mut paths = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            paths.push(entry.path());
        }
    }
    paths.sort();

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        match load_capture_file(&path).await {
            Ok(file) => {
                tracing::info!("正在加载: {} ({})", file.file_name, file.content_type);
                files.push(file);
            }
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {}", path.display(), e);
            }
        }
    }

    Ok(files)
}
