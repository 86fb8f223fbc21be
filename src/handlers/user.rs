use actix_web::{web, HttpRequest, HttpResponse, ResponseError, Result};
use serde_json::json;

use crate::handlers::get_user_id_from_request;
use crate::models::*;
use crate::services::UserService;

#[utoipa::path(
    get,
    path = "/user/profile",
    tag = "user",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取用户资料成功", body = UserResponse),
        (status = 401, description = "未授权"),
        (status = 404, description = "用户不存在")
    )
)]
pub async fn get_profile(
    user_service: web::Data<UserService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match user_service.get_profile(user_id).await {
        Ok(user) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": user
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/user/profile",
    tag = "user",
    request_body = UpdateProfileRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "更新用户资料成功", body = UserResponse),
        (status = 400, description = "请求参数错误"),
        (status = 401, description = "未授权")
    )
)]
pub async fn update_profile(
    user_service: web::Data<UserService>,
    req: HttpRequest,
    request: web::Json<UpdateProfileRequest>,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match user_service.update_profile(user_id, request.into_inner()).await {
        Ok(user) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": user
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/user/password",
    tag = "user",
    request_body = ChangePasswordRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "修改密码成功"),
        (status = 400, description = "旧密码错误或新密码不合规"),
        (status = 401, description = "未授权")
    )
)]
pub async fn change_password(
    user_service: web::Data<UserService>,
    req: HttpRequest,
    request: web::Json<ChangePasswordRequest>,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match user_service
        .change_password(user_id, request.into_inner())
        .await
    {
        Ok(()) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "message": "密码修改成功"
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn user_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/user")
            .route("/profile", web::get().to(get_profile))
            .route("/profile", web::put().to(update_profile))
            .route("/password", web::put().to(change_password)),
    );
}
