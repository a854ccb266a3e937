//! 用户认证：Argon2 密码哈希与 JWT 令牌

use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::{DateTime, Duration, Utc};
use dsr_core::{AdminUnit, DsrError, Result, UnitTree, User, UserRole};
use dsr_database::DatabaseQueries;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::policy::Scope;
use crate::state::AppState;

/// 密码最短长度
pub const MIN_PASSWORD_LEN: usize = 6;

const BAD_CREDENTIALS: &str = "Tên đăng nhập hoặc mật khẩu không chính xác.";

/// 生成 Argon2 密码哈希
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| DsrError::Internal(format!("password hashing failed: {}", e)))
}

/// 校验密码，哈希格式错误视为不匹配
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(e) => {
            warn!("Stored password hash is malformed: {}", e);
            false
        }
    }
}

/// 新密码长度校验
pub fn validate_new_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(DsrError::Validation(format!(
            "Mật khẩu mới phải có ít nhất {} ký tự.",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// JWT Claims
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,      // 用户ID
    pub username: String, // 用户名
    pub role: String,     // 角色
    pub exp: usize,       // 过期时间
    pub iat: usize,       // 签发时间
    pub jti: String,      // JWT ID
}

/// 令牌签发与校验
#[derive(Clone)]
pub struct AuthService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    token_ttl: Duration,
}

impl AuthService {
    pub fn new(jwt_secret: &str, token_ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(jwt_secret.as_bytes()),
            token_ttl: Duration::hours(token_ttl_hours),
        }
    }

    pub fn issue_token(&self, user: &User) -> Result<(String, DateTime<Utc>)> {
        let now = Utc::now();
        let expires_at = now + self.token_ttl;
        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            role: user.role.code().to_string(),
            exp: expires_at.timestamp() as usize,
            iat: now.timestamp() as usize,
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| DsrError::Internal(format!("token encoding failed: {}", e)))?;
        Ok((token, expires_at))
    }

    pub fn verify_token(&self, token: &str) -> std::result::Result<Claims, ApiError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| {
                warn!("Rejected token: {}", e);
                ApiError::unauthorized("Phiên đăng nhập không hợp lệ hoặc đã hết hạn.")
            })
    }
}

/// 已认证的请求上下文
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub scope: Scope,
}

/// 认证中间件：校验令牌，加载用户与区划树并解析数据范围
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> std::result::Result<Response, ApiError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::unauthorized("Vui lòng đăng nhập để truy cập trang này."))?;

    let claims = state.auth.verify_token(token)?;
    let user_id: i64 = claims
        .sub
        .parse()
        .map_err(|_| ApiError::unauthorized("Phiên đăng nhập không hợp lệ hoặc đã hết hạn."))?;

    let queries = DatabaseQueries::new(&state.pool);
    let user = queries
        .get_user(user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Tài khoản không còn tồn tại."))?;
    let tree = Arc::new(UnitTree::new(queries.list_units().await?));
    let scope = Scope::resolve(user.role, user.unit_id, tree)?;

    request.extensions_mut().insert(CurrentUser { user, scope });
    Ok(next.run(request).await)
}

/// 登录请求
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// 登录响应
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserInfo,
}

/// 用户信息（不含密码哈希）
#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub role: UserRole,
    pub unit: Option<AdminUnit>,
}

/// 登录处理器
pub async fn login_handler(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    info!("Login attempt for user: {}", request.username);
    if request.username.trim().is_empty() || request.password.is_empty() {
        return Err(ApiError::unauthorized(BAD_CREDENTIALS));
    }

    let queries = DatabaseQueries::new(&state.pool);
    let user = match queries.get_user_by_username(&request.username).await? {
        Some(user) if verify_password(&request.password, &user.password_hash) => user,
        _ => {
            warn!("Login failed for user: {}", request.username);
            return Err(ApiError::unauthorized(BAD_CREDENTIALS));
        }
    };

    let (token, expires_at) = state.auth.issue_token(&user)?;
    let unit = match user.unit_id {
        Some(id) => queries.get_unit(id).await?,
        None => None,
    };
    info!("User logged in successfully: {}", user.username);

    Ok(Json(LoginResponse {
        token,
        expires_at,
        user: UserInfo {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
            unit,
        },
    }))
}

/// 当前用户信息，单位为数据范围单位
pub async fn me_handler(Extension(current): Extension<CurrentUser>) -> impl IntoResponse {
    Json(json!({
        "id": current.user.id,
        "username": current.user.username,
        "email": current.user.email,
        "role": current.user.role,
        "unit": current.scope.unit(),
    }))
}

/// 修改密码请求
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

impl ChangePasswordRequest {
    fn validate(&self) -> Result<()> {
        validate_new_password(&self.new_password)?;
        if self.new_password != self.confirm_password {
            return Err(DsrError::Validation("Mật khẩu xác nhận không khớp.".to_string()));
        }
        Ok(())
    }
}

pub async fn change_password_handler(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(request): Json<ChangePasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    request.validate()?;
    if !verify_password(&request.current_password, &current.user.password_hash) {
        return Err(DsrError::Validation("Mật khẩu hiện tại không đúng. Vui lòng thử lại.".to_string()).into());
    }

    let hash = hash_password(&request.new_password)?;
    DatabaseQueries::new(&state.pool)
        .update_password(current.user.id, &hash)
        .await?;
    info!("User {} changed password", current.user.username);

    Ok(Json(json!({ "message": "Đổi mật khẩu thành công!" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: 7,
            username: "khuvuc_lx".to_string(),
            email: None,
            password_hash: String::new(),
            role: UserRole::Region,
            unit_id: Some(2),
        }
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("matkhau123").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("matkhau123", &hash));
        assert!(!verify_password("sai", &hash));
        assert!(!verify_password("matkhau123", "not-a-hash"));
    }

    #[test]
    fn test_new_password_rules() {
        assert!(validate_new_password("12345").is_err());
        assert!(validate_new_password("123456").is_ok());

        let request = ChangePasswordRequest {
            current_password: "old".to_string(),
            new_password: "abcdef".to_string(),
            confirm_password: "abcdeg".to_string(),
        };
        assert!(matches!(request.validate(), Err(DsrError::Validation(_))));
    }

    #[test]
    fn test_token_roundtrip() {
        let auth = AuthService::new("a-test-secret-that-is-long-enough-123", 1);
        let (token, expires_at) = auth.issue_token(&user()).unwrap();
        assert!(expires_at > Utc::now());

        let claims = auth.verify_token(&token).unwrap();
        assert_eq!(claims.sub, "7");
        assert_eq!(claims.role, "khuvuc");
    }

    #[test]
    fn test_token_with_other_secret_is_rejected() {
        let issuer = AuthService::new("a-test-secret-that-is-long-enough-123", 1);
        let verifier = AuthService::new("another-secret-that-is-long-enough-456", 1);
        let (token, _) = issuer.issue_token(&user()).unwrap();
        assert!(matches!(verifier.verify_token(&token), Err(ApiError::Unauthorized(_))));
    }
}
