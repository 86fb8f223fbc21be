use actix_web::{web, HttpRequest, HttpResponse, ResponseError, Result};
use serde_json::json;

use crate::handlers::get_user_id_from_request;
use crate::models::*;
use crate::services::DistributionService;

#[utoipa::path(
    post,
    path = "/distribution/apply",
    tag = "distribution",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "申请提交成功", body = DistributorResponse),
        (status = 400, description = "已提交过申请"),
        (status = 401, description = "未授权")
    )
)]
pub async fn apply(
    distribution_service: web::Data<DistributionService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match distribution_service.apply(user_id).await {
        Ok(distributor) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": distributor
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/distribution/my",
    tag = "distribution",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取分销信息成功", body = DistributorResponse),
        (status = 404, description = "还不是分销员")
    )
)]
pub async fn my_distributor(
    distribution_service: web::Data<DistributionService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match distribution_service.get_my_distributor(user_id).await {
        Ok(distributor) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": distributor
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/distribution/stats",
    tag = "distribution",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取分销统计成功", body = DistributorStats),
        (status = 404, description = "还不是分销员")
    )
)]
pub async fn my_stats(
    distribution_service: web::Data<DistributionService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match distribution_service.get_my_stats(user_id).await {
        Ok(stats) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": stats
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/distribution/commissions",
    tag = "distribution",
    params(
        ("page" = Option<u32>, Query, description = "页码"),
        ("per_page" = Option<u32>, Query, description = "每页数量"),
        ("status" = Option<String>, Query, description = "佣金状态筛选")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取佣金明细成功", body = Vec<DistributionOrder>),
        (status = 404, description = "还不是分销员")
    )
)]
pub async fn my_commissions(
    distribution_service: web::Data<DistributionService>,
    req: HttpRequest,
    query: web::Query<CommissionQuery>,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match distribution_service.list_my_commissions(user_id, &query).await {
        Ok(commissions) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": commissions
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/distribution/withdrawals",
    tag = "distribution",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取提现记录成功", body = Vec<CommissionWithdrawal>),
        (status = 404, description = "还不是分销员")
    )
)]
pub async fn my_withdrawals(
    distribution_service: web::Data<DistributionService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match distribution_service.list_my_withdrawals(user_id).await {
        Ok(withdrawals) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": withdrawals
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/distribution/withdrawals",
    tag = "distribution",
    request_body = CreateWithdrawalRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "提现申请提交成功", body = CommissionWithdrawal),
        (status = 400, description = "余额不足或金额非法"),
        (status = 403, description = "分销资格未通过审核")
    )
)]
pub async fn create_withdrawal(
    distribution_service: web::Data<DistributionService>,
    req: HttpRequest,
    request: web::Json<CreateWithdrawalRequest>,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match distribution_service
        .create_withdrawal(user_id, request.into_inner())
        .await
    {
        Ok(withdrawal) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": withdrawal
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn distribution_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/distribution")
            .route("/apply", web::post().to(apply))
            .route("/my", web::get().to(my_distributor))
            .route("/stats", web::get().to(my_stats))
            .route("/commissions", web::get().to(my_commissions))
            .route("/withdrawals", web::get().to(my_withdrawals))
            .route("/withdrawals", web::post().to(create_withdrawal)),
    );
}
