use crate::clients::AuthProvider;
use crate::error::{ApiError, AppResult};
use async_trait::async_trait;

/// 取得非空令牌；提供者返回空白令牌时视为未登录
pub async fn require_token(auth: &dyn AuthProvider) -> AppResult<String> {
    let token = auth.bearer_token().await?;
    if token.trim().is_empty() {
        return Err(ApiError::MissingToken.into());
    }
    Ok(token)
}

/// 使用固定令牌的认证提供者（令牌由配置注入）
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl AuthProvider for StaticTokenProvider {
    async fn bearer_token(&self) -> AppResult<String> {
        if self.token.trim().is_empty() {
            return Err(ApiError::MissingToken.into());
        }
        Ok(self.token.clone())
    }
}
