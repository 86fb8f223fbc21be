use actix_web::{web, HttpResponse, ResponseError, Result};
use serde_json::json;

use crate::models::*;
use crate::services::CatalogService;

#[utoipa::path(
    get,
    path = "/catalog/categories",
    tag = "catalog",
    responses(
        (status = 200, description = "获取分类列表成功", body = Vec<Category>)
    )
)]
pub async fn list_categories(
    catalog_service: web::Data<CatalogService>,
) -> Result<HttpResponse> {
    match catalog_service.list_categories().await {
        Ok(categories) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": categories
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/catalog/banners",
    tag = "catalog",
    responses(
        (status = 200, description = "获取轮播图成功", body = Vec<Banner>)
    )
)]
pub async fn list_banners(catalog_service: web::Data<CatalogService>) -> Result<HttpResponse> {
    match catalog_service.list_banners().await {
        Ok(banners) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": banners
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/catalog/products",
    tag = "catalog",
    params(
        ("page" = Option<u32>, Query, description = "页码"),
        ("per_page" = Option<u32>, Query, description = "每页数量"),
        ("category_id" = Option<i64>, Query, description = "分类筛选"),
        ("keyword" = Option<String>, Query, description = "标题关键词")
    ),
    responses(
        (status = 200, description = "获取商品列表成功", body = Vec<Product>)
    )
)]
pub async fn list_products(
    catalog_service: web::Data<CatalogService>,
    query: web::Query<ProductQuery>,
) -> Result<HttpResponse> {
    match catalog_service.list_products(&query).await {
        Ok(products) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": products
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/catalog/products/{id}",
    tag = "catalog",
    params(
        ("id" = i64, Path, description = "商品ID")
    ),
    responses(
        (status = 200, description = "获取商品详情成功", body = Product),
        (status = 404, description = "商品不存在或已下架")
    )
)]
pub async fn get_product(
    catalog_service: web::Data<CatalogService>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    match catalog_service.get_product(path.into_inner()).await {
        Ok(product) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": product
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn catalog_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/catalog")
            .route("/categories", web::get().to(list_categories))
            .route("/banners", web::get().to(list_banners))
            .route("/products", web::get().to(list_products))
            .route("/products/{id}", web::get().to(get_product)),
    );
}
