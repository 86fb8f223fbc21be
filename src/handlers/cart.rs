use actix_web::{web, HttpRequest, HttpResponse, ResponseError, Result};
use serde_json::json;

use crate::handlers::get_user_id_from_request;
use crate::models::*;
use crate::services::CartService;

#[utoipa::path(
    get,
    path = "/cart",
    tag = "cart",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取购物车成功", body = CartResponse),
        (status = 401, description = "未授权")
    )
)]
pub async fn get_cart(
    cart_service: web::Data<CartService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match cart_service.get_cart(user_id).await {
        Ok(cart) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": cart
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/cart/items",
    tag = "cart",
    request_body = AddCartItemRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "加入购物车成功"),
        (status = 400, description = "商品不可购买或数量超限"),
        (status = 401, description = "未授权")
    )
)]
pub async fn add_item(
    cart_service: web::Data<CartService>,
    req: HttpRequest,
    request: web::Json<AddCartItemRequest>,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match cart_service.add_item(user_id, request.into_inner()).await {
        Ok(()) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "message": "已加入购物车"
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/cart/items/{id}",
    tag = "cart",
    request_body = UpdateCartItemRequest,
    params(
        ("id" = i64, Path, description = "购物车条目ID")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "更新数量成功"),
        (status = 404, description = "条目不存在")
    )
)]
pub async fn update_item(
    cart_service: web::Data<CartService>,
    req: HttpRequest,
    path: web::Path<i64>,
    request: web::Json<UpdateCartItemRequest>,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match cart_service
        .update_item(user_id, path.into_inner(), request.into_inner())
        .await
    {
        Ok(()) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "message": "已更新"
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    delete,
    path = "/cart/items/{id}",
    tag = "cart",
    params(
        ("id" = i64, Path, description = "购物车条目ID")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "移除成功"),
        (status = 404, description = "条目不存在")
    )
)]
pub async fn remove_item(
    cart_service: web::Data<CartService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match cart_service.remove_item(user_id, path.into_inner()).await {
        Ok(()) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "message": "已移除"
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    delete,
    path = "/cart",
    tag = "cart",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "清空购物车成功")
    )
)]
pub async fn clear_cart(
    cart_service: web::Data<CartService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match cart_service.clear(user_id).await {
        Ok(()) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "message": "购物车已清空"
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn cart_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/cart")
            .route("", web::get().to(get_cart))
            .route("", web::delete().to(clear_cart))
            .route("/items", web::post().to(add_item))
            .route("/items/{id}", web::put().to(update_item))
            .route("/items/{id}", web::delete().to(remove_item)),
    );
}
