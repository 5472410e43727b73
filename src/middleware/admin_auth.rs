//! 管理接口认证中间件
//!
//! 终端生命周期与文件操作边界要求特权调用者，本层实现访问控制：
//! - 常数时间比较管理密钥
//! - 普通用户密钥可通过认证但无特权（403）
//!
//! # 认证规则
//!
//! 1. 如果 admin_key 为空，返回 404 Not Found（禁用特权接口）
//! 2. 请求缺少密钥，返回 401 Unauthorized
//! 3. 密钥匹配 user_key 但非 admin_key，返回 403 Forbidden
//! 4. 密钥无法识别，返回 401 Unauthorized

use axum::{
    body::Body,
    http::{Request, Response, StatusCode},
};
use futures::future::BoxFuture;
use std::{
    sync::Arc,
    task::{Context, Poll},
};
use subtle::ConstantTimeEq;
use tower::{Layer, Service};

use crate::config::AuthConfig;

/// 调用者角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerRole {
    /// 管理员（特权）
    Admin,
    /// 普通用户
    User,
}

/// 常数时间密钥比较
fn key_matches(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// 依据配置识别调用者角色
///
/// WebSocket 升级处理器也复用这段检查（那里密钥走 URL 查询参数）。
pub fn authenticate(config: &AuthConfig, provided: Option<&str>) -> Result<CallerRole, StatusCode> {
    let admin_key = match config.admin_key.as_deref() {
        Some(key) if !key.is_empty() => key,
        // admin_key 未配置时特权接口整体隐藏
        _ => return Err(StatusCode::NOT_FOUND),
    };
    let provided = provided.ok_or(StatusCode::UNAUTHORIZED)?;
    if key_matches(provided, admin_key) {
        return Ok(CallerRole::Admin);
    }
    if let Some(user_key) = config.user_key.as_deref() {
        if !user_key.is_empty() && key_matches(provided, user_key) {
            return Ok(CallerRole::User);
        }
    }
    Err(StatusCode::UNAUTHORIZED)
}

/// 特权接口认证层
#[derive(Clone)]
pub struct AdminAuthLayer {
    config: Arc<AuthConfig>,
}

impl AdminAuthLayer {
    /// 创建新的认证层
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl<S> Layer<S> for AdminAuthLayer {
    type Service = AdminAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AdminAuthService {
            inner,
            config: self.config.clone(),
        }
    }
}

/// 特权接口认证服务
#[derive(Clone)]
pub struct AdminAuthService<S> {
    inner: S,
    config: Arc<AuthConfig>,
}

impl<S> AdminAuthService<S> {
    /// 从请求头中提取密钥
    ///
    /// 支持 `Authorization: Bearer <key>` 或 `X-Api-Key: <key>`。
    fn extract_key(req: &Request<Body>) -> Option<String> {
        if let Some(auth) = req.headers().get("authorization") {
            if let Ok(auth_str) = auth.to_str() {
                if let Some(stripped) = auth_str.strip_prefix("Bearer ") {
                    return Some(stripped.to_string());
                }
            }
        }
        if let Some(key) = req.headers().get("x-api-key") {
            if let Ok(key_str) = key.to_str() {
                return Some(key_str.to_string());
            }
        }
        None
    }
}

impl<S> Service<Request<Body>> for AdminAuthService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let config = self.config.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let provided = Self::extract_key(&req);
            match authenticate(&config, provided.as_deref()) {
                Ok(CallerRole::Admin) => inner.call(req).await,
                Ok(CallerRole::User) => {
                    tracing::warn!("[认证] 普通用户访问特权接口被拒绝");
                    Ok(create_error_response(
                        StatusCode::FORBIDDEN,
                        "No permission",
                    ))
                }
                Err(status) => {
                    if status == StatusCode::UNAUTHORIZED {
                        tracing::warn!("[认证] 密钥缺失或无效");
                    }
                    Ok(create_error_response(status, "Unauthorized"))
                }
            }
        })
    }
}

/// 创建错误响应
fn create_error_response(status: StatusCode, message: &str) -> Response<Body> {
    let body = serde_json::json!({
        "error": {
            "code": status.as_u16(),
            "message": message
        }
    });

    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(admin: Option<&str>, user: Option<&str>) -> AuthConfig {
        AuthConfig {
            admin_key: admin.map(|s| s.to_string()),
            user_key: user.map(|s| s.to_string()),
        }
    }

    #[test]
    fn test_authenticate_admin() {
        let cfg = config(Some("secret"), None);
        assert_eq!(
            authenticate(&cfg, Some("secret")).unwrap(),
            CallerRole::Admin
        );
    }

    #[test]
    fn test_authenticate_user_role() {
        let cfg = config(Some("admin-key"), Some("user-key"));
        assert_eq!(
            authenticate(&cfg, Some("user-key")).unwrap(),
            CallerRole::User
        );
    }

    #[test]
    fn test_authenticate_missing_key() {
        let cfg = config(Some("secret"), None);
        assert_eq!(
            authenticate(&cfg, None).unwrap_err(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_authenticate_wrong_key() {
        let cfg = config(Some("secret"), None);
        assert_eq!(
            authenticate(&cfg, Some("wrong")).unwrap_err(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_authenticate_disabled_without_admin_key() {
        let cfg = config(None, Some("user-key"));
        assert_eq!(
            authenticate(&cfg, Some("user-key")).unwrap_err(),
            StatusCode::NOT_FOUND
        );
    }
}
