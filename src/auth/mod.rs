// 认证凭据
//
// 上传核心不负责获取或刷新 token，只在每个请求上附加当前凭据。
// 登录模块刷新 token 后写入 SharedToken，后续请求自动使用新值

use parking_lot::RwLock;
use std::sync::Arc;

/// 访问令牌提供者
pub trait TokenProvider: Send + Sync {
    /// 当前访问令牌，未登录时返回 None
    fn access_token(&self) -> Option<String>;
}

/// 固定令牌
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl TokenProvider for StaticToken {
    fn access_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// 可在运行时更新的共享令牌
#[derive(Debug, Clone, Default)]
pub struct SharedToken {
    inner: Arc<RwLock<Option<String>>>,
}

impl SharedToken {
    pub fn new(token: Option<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(token)),
        }
    }

    /// 保存新令牌（登录或刷新后调用）
    pub fn set(&self, token: impl Into<String>) {
        *self.inner.write() = Some(token.into());
    }

    /// 清除令牌（退出登录）
    pub fn clear(&self) {
        *self.inner.write() = None;
    }
}

impl TokenProvider for SharedToken {
    fn access_token(&self) -> Option<String> {
        self.inner.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_token_updates_are_visible_to_clones() {
        let token = SharedToken::default();
        let provider: Arc<dyn TokenProvider> = Arc::new(token.clone());
        assert_eq!(provider.access_token(), None);

        token.set("abc");
        assert_eq!(provider.access_token().as_deref(), Some("abc"));

        token.clear();
        assert_eq!(provider.access_token(), None);
    }

    #[test]
    fn test_static_token() {
        assert_eq!(StaticToken::new("t").access_token().as_deref(), Some("t"));
    }
}
