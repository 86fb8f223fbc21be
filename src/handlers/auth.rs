use actix_web::{web, HttpRequest, HttpResponse, ResponseError, Result};
use serde_json::json;

use crate::handlers::get_client_ip;
use crate::models::*;
use crate::services::AuthService;

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "注册成功", body = AuthResponse),
        (status = 400, description = "请求参数错误"),
        (status = 500, description = "服务器内部错误")
    )
)]
pub async fn register(
    auth_service: web::Data<AuthService>,
    request: web::Json<RegisterRequest>,
) -> Result<HttpResponse> {
    match auth_service.register(request.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "登录成功", body = AuthResponse),
        (status = 401, description = "认证失败或尝试次数过多")
    )
)]
pub async fn login(
    auth_service: web::Data<AuthService>,
    req: HttpRequest,
    request: web::Json<LoginRequest>,
) -> Result<HttpResponse> {
    let ip = get_client_ip(&req);
    match auth_service.login(request.into_inner(), ip.as_deref()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    tag = "auth",
    responses(
        (status = 200, description = "刷新令牌成功", body = AuthResponse),
        (status = 401, description = "无效的刷新令牌")
    )
)]
pub async fn refresh(
    auth_service: web::Data<AuthService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    // 刷新令牌放在 Authorization: Bearer 头里
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "));

    let token = match token {
        Some(t) => t,
        None => {
            return Ok(HttpResponse::Unauthorized().json(json!({
                "success": false,
                "error": {
                    "code": "MISSING_TOKEN",
                    "message": "缺少刷新令牌"
                }
            })));
        }
    };

    match auth_service.refresh_token(token).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    responses(
        (status = 200, description = "登出成功")
    )
)]
pub async fn logout() -> Result<HttpResponse> {
    // 无状态JWT，令牌失效由客户端丢弃完成
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "已成功登出"
    })))
}

pub fn auth_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/register", web::post().to(register))
            .route("/login", web::post().to(login))
            .route("/refresh", web::post().to(refresh))
            .route("/logout", web::post().to(logout)),
    );
}
