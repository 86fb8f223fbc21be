use actix_web::{web, HttpRequest, HttpResponse, ResponseError, Result};
use serde_json::json;

use crate::handlers::get_user_id_from_request;
use crate::models::*;
use crate::services::MembershipService;

#[utoipa::path(
    get,
    path = "/membership/plans",
    tag = "membership",
    responses(
        (status = 200, description = "获取会员套餐成功", body = Vec<MembershipPlan>)
    )
)]
pub async fn list_plans(
    membership_service: web::Data<MembershipService>,
) -> Result<HttpResponse> {
    match membership_service.list_plans().await {
        Ok(plans) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": plans
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/membership/my",
    tag = "membership",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取我的会员状态成功", body = MembershipResponse),
        (status = 401, description = "未授权")
    )
)]
pub async fn my_membership(
    membership_service: web::Data<MembershipService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match membership_service.get_my_membership(user_id).await {
        Ok(membership) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": membership
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/membership/redeem",
    tag = "membership",
    request_body = RedeemCodeRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "兑换成功", body = MembershipResponse),
        (status = 400, description = "会员码无效或已被使用"),
        (status = 401, description = "未授权")
    )
)]
pub async fn redeem_code(
    membership_service: web::Data<MembershipService>,
    req: HttpRequest,
    request: web::Json<RedeemCodeRequest>,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match membership_service
        .redeem_code(user_id, request.into_inner())
        .await
    {
        Ok(membership) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": membership
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn membership_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/membership")
            .route("/plans", web::get().to(list_plans))
            .route("/my", web::get().to(my_membership))
            .route("/redeem", web::post().to(redeem_code)),
    );
}
