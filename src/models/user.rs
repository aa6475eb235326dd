use serde::{Deserialize, Serialize};

/// 已知上传者（用于报表过滤）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownUser {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "displayName")]
    pub display_name: Option<String>,
}

impl KnownUser {
    /// 展示名称：显示名 > 邮箱 > uid
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.uid)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct UserListResponse {
    #[serde(default)]
    pub users: Vec<KnownUser>,
}
