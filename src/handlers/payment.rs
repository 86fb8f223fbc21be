use actix_web::{web, HttpRequest, HttpResponse, ResponseError, Result};
use serde_json::json;

use crate::handlers::get_user_id_from_request;
use crate::models::*;
use crate::services::PaymentService;

#[utoipa::path(
    post,
    path = "/payments",
    tag = "payment",
    request_body = CreatePaymentRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "创建支付成功", body = CreatePaymentResponse),
        (status = 400, description = "订单状态不允许支付"),
        (status = 404, description = "订单不存在")
    )
)]
pub async fn create_payment(
    payment_service: web::Data<PaymentService>,
    req: HttpRequest,
    request: web::Json<CreatePaymentRequest>,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match payment_service
        .create_payment(user_id, request.into_inner())
        .await
    {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/payments/{payment_no}",
    tag = "payment",
    params(
        ("payment_no" = String, Path, description = "支付单号")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取支付单成功", body = PaymentResponse),
        (status = 404, description = "支付单不存在")
    )
)]
pub async fn get_payment(
    payment_service: web::Data<PaymentService>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match payment_service.get_payment(user_id, &path.into_inner()).await {
        Ok(payment) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": payment
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn payment_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/payments")
            .route("", web::post().to(create_payment))
            .route("/{payment_no}", web::get().to(get_payment)),
    );
}
