use actix_web::{web, HttpRequest, HttpResponse, ResponseError, Result};
use serde_json::json;

use crate::handlers::get_user_id_from_request;
use crate::models::*;
use crate::services::OrderService;

#[utoipa::path(
    post,
    path = "/orders",
    tag = "order",
    request_body = CreateOrderRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "下单成功", body = OrderDetailResponse),
        (status = 400, description = "商品不可购买或购物车为空"),
        (status = 401, description = "未授权")
    )
)]
pub async fn create_order(
    order_service: web::Data<OrderService>,
    req: HttpRequest,
    request: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match order_service.create_order(user_id, request.into_inner()).await {
        Ok(order) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": order
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/orders/membership",
    tag = "order",
    request_body = CreateMembershipOrderRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "会员订单创建成功", body = OrderDetailResponse),
        (status = 400, description = "套餐不可购买"),
        (status = 401, description = "未授权")
    )
)]
pub async fn create_membership_order(
    order_service: web::Data<OrderService>,
    req: HttpRequest,
    request: web::Json<CreateMembershipOrderRequest>,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match order_service
        .create_membership_order(user_id, request.plan_id)
        .await
    {
        Ok(order) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": order
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/orders",
    tag = "order",
    params(
        ("page" = Option<u32>, Query, description = "页码"),
        ("per_page" = Option<u32>, Query, description = "每页数量"),
        ("status" = Option<String>, Query, description = "订单状态筛选")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取订单列表成功", body = Vec<OrderResponse>),
        (status = 401, description = "未授权")
    )
)]
pub async fn list_orders(
    order_service: web::Data<OrderService>,
    req: HttpRequest,
    query: web::Query<OrderQuery>,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match order_service.list_orders(user_id, &query).await {
        Ok(orders) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": orders
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/orders/{order_no}",
    tag = "order",
    params(
        ("order_no" = String, Path, description = "订单号")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取订单详情成功", body = OrderDetailResponse),
        (status = 404, description = "订单不存在")
    )
)]
pub async fn get_order(
    order_service: web::Data<OrderService>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match order_service.get_order(user_id, &path.into_inner()).await {
        Ok(order) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": order
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/orders/{order_no}/cancel",
    tag = "order",
    params(
        ("order_no" = String, Path, description = "订单号")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "取消订单成功"),
        (status = 400, description = "订单不是待支付状态"),
        (status = 404, description = "订单不存在")
    )
)]
pub async fn cancel_order(
    order_service: web::Data<OrderService>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match order_service.cancel_order(user_id, &path.into_inner()).await {
        Ok(()) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "message": "订单已取消"
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn order_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/orders")
            .route("", web::post().to(create_order))
            .route("", web::get().to(list_orders))
            .route("/membership", web::post().to(create_membership_order))
            .route("/{order_no}", web::get().to(get_order))
            .route("/{order_no}/cancel", web::post().to(cancel_order)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::OrderService;
    use actix_web::test::TestRequest;
    use actix_web::HttpMessage;
    use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

    async fn setup_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_create_membership_order_handler() {
        let pool = setup_pool().await;
        let user_id = sqlx::query(
            "INSERT INTO users (username, email, password_hash) VALUES ('alice', 'alice@test.local', 'x')",
        )
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();
        let plan_id = sqlx::query(
            "INSERT INTO membership_plans (name, duration_days, price, discount_rate) VALUES ('月卡', 30, 2900, 900)",
        )
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();

        let svc = web::Data::new(OrderService::new(pool.clone(), 30));
        let req = TestRequest::default().to_http_request();
        req.extensions_mut().insert(user_id);

        let resp = create_membership_order(
            svc,
            req,
            web::Json(CreateMembershipOrderRequest { plan_id }),
        )
        .await
        .unwrap();
        assert_eq!(resp.status(), actix_web::http::StatusCode::OK);

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE user_id = ? AND kind = 'membership' AND status = 'pending'",
        )
        .bind(user_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 1);
    }
}
