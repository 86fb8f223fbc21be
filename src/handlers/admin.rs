use actix_web::{web, HttpRequest, HttpResponse, ResponseError, Result};
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::handlers::{get_client_ip, get_user_id_from_request};
use crate::models::admin::modules;
use crate::models::*;
use crate::services::{
    AdminService, CatalogService, ChatService, DistributionService, MembershipService,
    OrderService, SystemService,
};

/// 取当前管理员并校验模块权限
async fn authorize(
    admin_service: &AdminService,
    req: &HttpRequest,
    module: &str,
    level: i64,
) -> AppResult<i64> {
    let admin_id = get_user_id_from_request(req)
        .ok_or_else(|| AppError::AuthError("未登录".to_string()))?;
    admin_service.require_permission(admin_id, module, level).await?;
    Ok(admin_id)
}

macro_rules! guard {
    ($admin_service:expr, $req:expr, $module:expr, $level:expr) => {
        match authorize(&$admin_service, &$req, $module, $level).await {
            Ok(id) => id,
            Err(e) => return Ok(e.error_response()),
        }
    };
}

// ---------- 概览 ----------

#[utoipa::path(
    get,
    path = "/admin/dashboard",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "获取运营概览成功", body = DashboardStats),
        (status = 403, description = "无权限")
    )
)]
pub async fn dashboard(
    admin_service: web::Data<AdminService>,
    system_service: web::Data<SystemService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    guard!(admin_service, req, modules::SYSTEM, LEVEL_READ);

    match system_service.dashboard_stats().await {
        Ok(stats) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": stats
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

// ---------- 用户与角色 ----------

#[utoipa::path(
    get,
    path = "/admin/users",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "获取用户列表成功", body = Vec<UserResponse>),
        (status = 403, description = "无权限")
    )
)]
pub async fn list_users(
    admin_service: web::Data<AdminService>,
    req: HttpRequest,
    query: web::Query<UserQuery>,
) -> Result<HttpResponse> {
    guard!(admin_service, req, modules::SYSTEM, LEVEL_READ);

    match admin_service.list_users(&query).await {
        Ok(users) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": users
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/admin/users/{id}/status",
    tag = "admin",
    request_body = UpdateUserStatusRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "更新用户状态成功"),
        (status = 403, description = "无权限"),
        (status = 404, description = "用户不存在")
    )
)]
pub async fn update_user_status(
    admin_service: web::Data<AdminService>,
    system_service: web::Data<SystemService>,
    req: HttpRequest,
    path: web::Path<i64>,
    request: web::Json<UpdateUserStatusRequest>,
) -> Result<HttpResponse> {
    let admin_id = guard!(admin_service, req, modules::SYSTEM, LEVEL_MANAGE);
    let user_id = path.into_inner();
    let request = request.into_inner();
    let detail = format!("用户{user_id}状态改为{}", request.status);

    match admin_service.update_user_status(user_id, request).await {
        Ok(()) => {
            system_service
                .log_action(
                    admin_id,
                    modules::SYSTEM,
                    "update_user_status",
                    &detail,
                    get_client_ip(&req).as_deref(),
                )
                .await;
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "message": "已更新"
            })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/admin/users/role",
    tag = "admin",
    request_body = AssignRoleRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "分配角色成功"),
        (status = 403, description = "无权限"),
        (status = 404, description = "用户或角色不存在")
    )
)]
pub async fn assign_role(
    admin_service: web::Data<AdminService>,
    system_service: web::Data<SystemService>,
    req: HttpRequest,
    request: web::Json<AssignRoleRequest>,
) -> Result<HttpResponse> {
    let admin_id = guard!(admin_service, req, modules::SYSTEM, LEVEL_MANAGE);
    let request = request.into_inner();
    let detail = format!("用户{}角色设为{:?}", request.user_id, request.role_id);

    match admin_service.assign_role(request).await {
        Ok(()) => {
            system_service
                .log_action(
                    admin_id,
                    modules::SYSTEM,
                    "assign_role",
                    &detail,
                    get_client_ip(&req).as_deref(),
                )
                .await;
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "message": "已分配"
            })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/admin/roles",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "获取角色列表成功", body = Vec<RoleResponse>),
        (status = 403, description = "无权限")
    )
)]
pub async fn list_roles(
    admin_service: web::Data<AdminService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    guard!(admin_service, req, modules::SYSTEM, LEVEL_READ);

    match admin_service.list_roles().await {
        Ok(roles) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": roles
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/admin/roles",
    tag = "admin",
    request_body = CreateRoleRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "创建角色成功", body = RoleResponse),
        (status = 403, description = "无权限")
    )
)]
pub async fn create_role(
    admin_service: web::Data<AdminService>,
    system_service: web::Data<SystemService>,
    req: HttpRequest,
    request: web::Json<CreateRoleRequest>,
) -> Result<HttpResponse> {
    let admin_id = guard!(admin_service, req, modules::SYSTEM, LEVEL_MANAGE);

    match admin_service.create_role(request.into_inner()).await {
        Ok(role) => {
            system_service
                .log_action(
                    admin_id,
                    modules::SYSTEM,
                    "create_role",
                    &format!("创建角色{}", role.name),
                    get_client_ip(&req).as_deref(),
                )
                .await;
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "data": role
            })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/admin/roles/{id}",
    tag = "admin",
    request_body = UpdateRoleRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "更新角色成功", body = RoleResponse),
        (status = 403, description = "无权限"),
        (status = 404, description = "角色不存在")
    )
)]
pub async fn update_role(
    admin_service: web::Data<AdminService>,
    system_service: web::Data<SystemService>,
    req: HttpRequest,
    path: web::Path<i64>,
    request: web::Json<UpdateRoleRequest>,
) -> Result<HttpResponse> {
    let admin_id = guard!(admin_service, req, modules::SYSTEM, LEVEL_MANAGE);
    let role_id = path.into_inner();

    match admin_service.update_role(role_id, request.into_inner()).await {
        Ok(role) => {
            system_service
                .log_action(
                    admin_id,
                    modules::SYSTEM,
                    "update_role",
                    &format!("更新角色{role_id}"),
                    get_client_ip(&req).as_deref(),
                )
                .await;
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "data": role
            })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    delete,
    path = "/admin/roles/{id}",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "删除角色成功"),
        (status = 400, description = "角色仍被使用"),
        (status = 403, description = "无权限")
    )
)]
pub async fn delete_role(
    admin_service: web::Data<AdminService>,
    system_service: web::Data<SystemService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let admin_id = guard!(admin_service, req, modules::SYSTEM, LEVEL_MANAGE);
    let role_id = path.into_inner();

    match admin_service.delete_role(role_id).await {
        Ok(()) => {
            system_service
                .log_action(
                    admin_id,
                    modules::SYSTEM,
                    "delete_role",
                    &format!("删除角色{role_id}"),
                    get_client_ip(&req).as_deref(),
                )
                .await;
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "message": "已删除"
            })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

// ---------- 商品管理 ----------

#[utoipa::path(
    get,
    path = "/admin/products",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "获取商品列表成功", body = Vec<Product>),
        (status = 403, description = "无权限")
    )
)]
pub async fn admin_list_products(
    admin_service: web::Data<AdminService>,
    catalog_service: web::Data<CatalogService>,
    req: HttpRequest,
    query: web::Query<ProductQuery>,
) -> Result<HttpResponse> {
    guard!(admin_service, req, modules::CATALOG, LEVEL_READ);

    match catalog_service.admin_list_products(&query).await {
        Ok(products) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": products
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/admin/products",
    tag = "admin",
    request_body = CreateProductRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "创建商品成功", body = Product),
        (status = 403, description = "无权限")
    )
)]
pub async fn create_product(
    admin_service: web::Data<AdminService>,
    catalog_service: web::Data<CatalogService>,
    system_service: web::Data<SystemService>,
    req: HttpRequest,
    request: web::Json<CreateProductRequest>,
) -> Result<HttpResponse> {
    let admin_id = guard!(admin_service, req, modules::CATALOG, LEVEL_MANAGE);

    match catalog_service.create_product(request.into_inner()).await {
        Ok(product) => {
            system_service
                .log_action(
                    admin_id,
                    modules::CATALOG,
                    "create_product",
                    &format!("创建商品{}({})", product.title, product.id),
                    get_client_ip(&req).as_deref(),
                )
                .await;
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "data": product
            })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/admin/products/{id}",
    tag = "admin",
    request_body = UpdateProductRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "更新商品成功", body = Product),
        (status = 403, description = "无权限"),
        (status = 404, description = "商品不存在")
    )
)]
pub async fn update_product(
    admin_service: web::Data<AdminService>,
    catalog_service: web::Data<CatalogService>,
    system_service: web::Data<SystemService>,
    req: HttpRequest,
    path: web::Path<i64>,
    request: web::Json<UpdateProductRequest>,
) -> Result<HttpResponse> {
    let admin_id = guard!(admin_service, req, modules::CATALOG, LEVEL_MANAGE);
    let product_id = path.into_inner();

    match catalog_service.update_product(product_id, request.into_inner()).await {
        Ok(product) => {
            system_service
                .log_action(
                    admin_id,
                    modules::CATALOG,
                    "update_product",
                    &format!("更新商品{product_id}"),
                    get_client_ip(&req).as_deref(),
                )
                .await;
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "data": product
            })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    delete,
    path = "/admin/products/{id}",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "删除商品成功"),
        (status = 403, description = "无权限"),
        (status = 404, description = "商品不存在")
    )
)]
pub async fn delete_product(
    admin_service: web::Data<AdminService>,
    catalog_service: web::Data<CatalogService>,
    system_service: web::Data<SystemService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let admin_id = guard!(admin_service, req, modules::CATALOG, LEVEL_MANAGE);
    let product_id = path.into_inner();

    match catalog_service.delete_product(product_id).await {
        Ok(()) => {
            system_service
                .log_action(
                    admin_id,
                    modules::CATALOG,
                    "delete_product",
                    &format!("删除商品{product_id}"),
                    get_client_ip(&req).as_deref(),
                )
                .await;
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "message": "已删除"
            })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/admin/categories",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "获取分类列表成功", body = Vec<Category>),
        (status = 403, description = "无权限")
    )
)]
pub async fn admin_list_categories(
    admin_service: web::Data<AdminService>,
    catalog_service: web::Data<CatalogService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    guard!(admin_service, req, modules::CATALOG, LEVEL_READ);

    match catalog_service.admin_list_categories().await {
        Ok(categories) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": categories
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/admin/categories",
    tag = "admin",
    request_body = CreateCategoryRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "创建分类成功", body = Category),
        (status = 403, description = "无权限")
    )
)]
pub async fn create_category(
    admin_service: web::Data<AdminService>,
    catalog_service: web::Data<CatalogService>,
    system_service: web::Data<SystemService>,
    req: HttpRequest,
    request: web::Json<CreateCategoryRequest>,
) -> Result<HttpResponse> {
    let admin_id = guard!(admin_service, req, modules::CATALOG, LEVEL_MANAGE);

    match catalog_service.create_category(request.into_inner()).await {
        Ok(category) => {
            system_service
                .log_action(
                    admin_id,
                    modules::CATALOG,
                    "create_category",
                    &format!("创建分类{}", category.name),
                    get_client_ip(&req).as_deref(),
                )
                .await;
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "data": category
            })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/admin/categories/{id}",
    tag = "admin",
    request_body = UpdateCategoryRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "更新分类成功", body = Category),
        (status = 403, description = "无权限"),
        (status = 404, description = "分类不存在")
    )
)]
pub async fn update_category(
    admin_service: web::Data<AdminService>,
    catalog_service: web::Data<CatalogService>,
    system_service: web::Data<SystemService>,
    req: HttpRequest,
    path: web::Path<i64>,
    request: web::Json<UpdateCategoryRequest>,
) -> Result<HttpResponse> {
    let admin_id = guard!(admin_service, req, modules::CATALOG, LEVEL_MANAGE);
    let category_id = path.into_inner();

    match catalog_service.update_category(category_id, request.into_inner()).await {
        Ok(category) => {
            system_service
                .log_action(
                    admin_id,
                    modules::CATALOG,
                    "update_category",
                    &format!("更新分类{category_id}"),
                    get_client_ip(&req).as_deref(),
                )
                .await;
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "data": category
            })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    delete,
    path = "/admin/categories/{id}",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "删除分类成功"),
        (status = 403, description = "无权限"),
        (status = 404, description = "分类不存在")
    )
)]
pub async fn delete_category(
    admin_service: web::Data<AdminService>,
    catalog_service: web::Data<CatalogService>,
    system_service: web::Data<SystemService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let admin_id = guard!(admin_service, req, modules::CATALOG, LEVEL_MANAGE);
    let category_id = path.into_inner();

    match catalog_service.delete_category(category_id).await {
        Ok(()) => {
            system_service
                .log_action(
                    admin_id,
                    modules::CATALOG,
                    "delete_category",
                    &format!("删除分类{category_id}"),
                    get_client_ip(&req).as_deref(),
                )
                .await;
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "message": "已删除"
            })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/admin/banners",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "获取轮播图列表成功", body = Vec<Banner>),
        (status = 403, description = "无权限")
    )
)]
pub async fn admin_list_banners(
    admin_service: web::Data<AdminService>,
    catalog_service: web::Data<CatalogService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    guard!(admin_service, req, modules::CATALOG, LEVEL_READ);

    match catalog_service.admin_list_banners().await {
        Ok(banners) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": banners
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/admin/banners",
    tag = "admin",
    request_body = CreateBannerRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "创建轮播图成功", body = Banner),
        (status = 403, description = "无权限")
    )
)]
pub async fn create_banner(
    admin_service: web::Data<AdminService>,
    catalog_service: web::Data<CatalogService>,
    system_service: web::Data<SystemService>,
    req: HttpRequest,
    request: web::Json<CreateBannerRequest>,
) -> Result<HttpResponse> {
    let admin_id = guard!(admin_service, req, modules::CATALOG, LEVEL_MANAGE);

    match catalog_service.create_banner(request.into_inner()).await {
        Ok(banner) => {
            system_service
                .log_action(
                    admin_id,
                    modules::CATALOG,
                    "create_banner",
                    &format!("创建轮播图{}", banner.id),
                    get_client_ip(&req).as_deref(),
                )
                .await;
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "data": banner
            })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/admin/banners/{id}",
    tag = "admin",
    request_body = UpdateBannerRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "更新轮播图成功", body = Banner),
        (status = 403, description = "无权限"),
        (status = 404, description = "轮播图不存在")
    )
)]
pub async fn update_banner(
    admin_service: web::Data<AdminService>,
    catalog_service: web::Data<CatalogService>,
    system_service: web::Data<SystemService>,
    req: HttpRequest,
    path: web::Path<i64>,
    request: web::Json<UpdateBannerRequest>,
) -> Result<HttpResponse> {
    let admin_id = guard!(admin_service, req, modules::CATALOG, LEVEL_MANAGE);
    let banner_id = path.into_inner();

    match catalog_service.update_banner(banner_id, request.into_inner()).await {
        Ok(banner) => {
            system_service
                .log_action(
                    admin_id,
                    modules::CATALOG,
                    "update_banner",
                    &format!("更新轮播图{banner_id}"),
                    get_client_ip(&req).as_deref(),
                )
                .await;
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "data": banner
            })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    delete,
    path = "/admin/banners/{id}",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "删除轮播图成功"),
        (status = 403, description = "无权限"),
        (status = 404, description = "轮播图不存在")
    )
)]
pub async fn delete_banner(
    admin_service: web::Data<AdminService>,
    catalog_service: web::Data<CatalogService>,
    system_service: web::Data<SystemService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let admin_id = guard!(admin_service, req, modules::CATALOG, LEVEL_MANAGE);
    let banner_id = path.into_inner();

    match catalog_service.delete_banner(banner_id).await {
        Ok(()) => {
            system_service
                .log_action(
                    admin_id,
                    modules::CATALOG,
                    "delete_banner",
                    &format!("删除轮播图{banner_id}"),
                    get_client_ip(&req).as_deref(),
                )
                .await;
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "message": "已删除"
            })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

// ---------- 订单管理 ----------

#[utoipa::path(
    get,
    path = "/admin/orders",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "获取订单列表成功", body = Vec<Order>),
        (status = 403, description = "无权限")
    )
)]
pub async fn admin_list_orders(
    admin_service: web::Data<AdminService>,
    order_service: web::Data<OrderService>,
    req: HttpRequest,
    query: web::Query<OrderQuery>,
) -> Result<HttpResponse> {
    guard!(admin_service, req, modules::ORDER, LEVEL_READ);

    match order_service.admin_list_orders(&query).await {
        Ok(orders) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": orders
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

// ---------- 会员管理 ----------

#[utoipa::path(
    get,
    path = "/admin/membership/plans",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "获取套餐列表成功", body = Vec<MembershipPlan>),
        (status = 403, description = "无权限")
    )
)]
pub async fn admin_list_plans(
    admin_service: web::Data<AdminService>,
    membership_service: web::Data<MembershipService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    guard!(admin_service, req, modules::MEMBERSHIP, LEVEL_READ);

    match membership_service.admin_list_plans().await {
        Ok(plans) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": plans
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/admin/membership/plans",
    tag = "admin",
    request_body = CreatePlanRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "创建套餐成功", body = MembershipPlan),
        (status = 403, description = "无权限")
    )
)]
pub async fn create_plan(
    admin_service: web::Data<AdminService>,
    membership_service: web::Data<MembershipService>,
    system_service: web::Data<SystemService>,
    req: HttpRequest,
    request: web::Json<CreatePlanRequest>,
) -> Result<HttpResponse> {
    let admin_id = guard!(admin_service, req, modules::MEMBERSHIP, LEVEL_MANAGE);

    match membership_service.create_plan(request.into_inner()).await {
        Ok(plan) => {
            system_service
                .log_action(
                    admin_id,
                    modules::MEMBERSHIP,
                    "create_plan",
                    &format!("创建套餐{}", plan.name),
                    get_client_ip(&req).as_deref(),
                )
                .await;
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "data": plan
            })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/admin/membership/plans/{id}",
    tag = "admin",
    request_body = UpdatePlanRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "更新套餐成功", body = MembershipPlan),
        (status = 403, description = "无权限"),
        (status = 404, description = "套餐不存在")
    )
)]
pub async fn update_plan(
    admin_service: web::Data<AdminService>,
    membership_service: web::Data<MembershipService>,
    system_service: web::Data<SystemService>,
    req: HttpRequest,
    path: web::Path<i64>,
    request: web::Json<UpdatePlanRequest>,
) -> Result<HttpResponse> {
    let admin_id = guard!(admin_service, req, modules::MEMBERSHIP, LEVEL_MANAGE);
    let plan_id = path.into_inner();

    match membership_service.update_plan(plan_id, request.into_inner()).await {
        Ok(plan) => {
            system_service
                .log_action(
                    admin_id,
                    modules::MEMBERSHIP,
                    "update_plan",
                    &format!("更新套餐{plan_id}"),
                    get_client_ip(&req).as_deref(),
                )
                .await;
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "data": plan
            })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/admin/membership/codes",
    tag = "admin",
    request_body = GenerateCodesRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "生成会员码成功", body = GenerateCodesResponse),
        (status = 403, description = "无权限")
    )
)]
pub async fn generate_codes(
    admin_service: web::Data<AdminService>,
    membership_service: web::Data<MembershipService>,
    system_service: web::Data<SystemService>,
    req: HttpRequest,
    request: web::Json<GenerateCodesRequest>,
) -> Result<HttpResponse> {
    let admin_id = guard!(admin_service, req, modules::MEMBERSHIP, LEVEL_MANAGE);

    match membership_service.generate_codes(request.into_inner()).await {
        Ok(response) => {
            system_service
                .log_action(
                    admin_id,
                    modules::MEMBERSHIP,
                    "generate_codes",
                    &format!("批次{}生成{}个会员码", response.batch_no, response.codes.len()),
                    get_client_ip(&req).as_deref(),
                )
                .await;
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "data": response
            })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/admin/membership/codes",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "获取会员码列表成功", body = Vec<MembershipCode>),
        (status = 403, description = "无权限")
    )
)]
pub async fn list_codes(
    admin_service: web::Data<AdminService>,
    membership_service: web::Data<MembershipService>,
    req: HttpRequest,
    query: web::Query<MembershipCodeQuery>,
) -> Result<HttpResponse> {
    guard!(admin_service, req, modules::MEMBERSHIP, LEVEL_READ);

    match membership_service.list_codes(&query).await {
        Ok(codes) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": codes
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/admin/membership/codes/{id}/disable",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "作废会员码成功"),
        (status = 400, description = "会员码已被使用"),
        (status = 403, description = "无权限")
    )
)]
pub async fn disable_code(
    admin_service: web::Data<AdminService>,
    membership_service: web::Data<MembershipService>,
    system_service: web::Data<SystemService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let admin_id = guard!(admin_service, req, modules::MEMBERSHIP, LEVEL_MANAGE);
    let code_id = path.into_inner();

    match membership_service.disable_code(code_id).await {
        Ok(()) => {
            system_service
                .log_action(
                    admin_id,
                    modules::MEMBERSHIP,
                    "disable_code",
                    &format!("作废会员码{code_id}"),
                    get_client_ip(&req).as_deref(),
                )
                .await;
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "message": "已作废"
            })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

// ---------- 分销管理 ----------

#[derive(Debug, Deserialize)]
pub struct DistributorListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<DistributorStatus>,
}

#[utoipa::path(
    get,
    path = "/admin/distributors",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "获取分销员列表成功", body = Vec<Distributor>),
        (status = 403, description = "无权限")
    )
)]
pub async fn list_distributors(
    admin_service: web::Data<AdminService>,
    distribution_service: web::Data<DistributionService>,
    req: HttpRequest,
    query: web::Query<DistributorListQuery>,
) -> Result<HttpResponse> {
    guard!(admin_service, req, modules::DISTRIBUTION, LEVEL_READ);

    match distribution_service
        .admin_list_distributors(query.page, query.per_page, query.status.clone())
        .await
    {
        Ok(distributors) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": distributors
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/admin/distributors/{id}",
    tag = "admin",
    request_body = UpdateDistributorRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "更新分销员成功", body = Distributor),
        (status = 403, description = "无权限"),
        (status = 404, description = "分销员不存在")
    )
)]
pub async fn update_distributor(
    admin_service: web::Data<AdminService>,
    distribution_service: web::Data<DistributionService>,
    system_service: web::Data<SystemService>,
    req: HttpRequest,
    path: web::Path<i64>,
    request: web::Json<UpdateDistributorRequest>,
) -> Result<HttpResponse> {
    let admin_id = guard!(admin_service, req, modules::DISTRIBUTION, LEVEL_MANAGE);
    let distributor_id = path.into_inner();

    match distribution_service
        .admin_update_distributor(distributor_id, request.into_inner())
        .await
    {
        Ok(distributor) => {
            system_service
                .log_action(
                    admin_id,
                    modules::DISTRIBUTION,
                    "update_distributor",
                    &format!("更新分销员{distributor_id}"),
                    get_client_ip(&req).as_deref(),
                )
                .await;
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "data": distributor
            })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

#[derive(Debug, Deserialize)]
pub struct WithdrawalListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<WithdrawalStatus>,
}

#[utoipa::path(
    get,
    path = "/admin/withdrawals",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "获取提现申请列表成功", body = Vec<CommissionWithdrawal>),
        (status = 403, description = "无权限")
    )
)]
pub async fn list_withdrawals(
    admin_service: web::Data<AdminService>,
    distribution_service: web::Data<DistributionService>,
    req: HttpRequest,
    query: web::Query<WithdrawalListQuery>,
) -> Result<HttpResponse> {
    guard!(admin_service, req, modules::DISTRIBUTION, LEVEL_READ);

    match distribution_service
        .admin_list_withdrawals(query.page, query.per_page, query.status.clone())
        .await
    {
        Ok(withdrawals) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": withdrawals
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/admin/withdrawals/{id}/review",
    tag = "admin",
    request_body = ReviewWithdrawalRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "审核提现成功", body = CommissionWithdrawal),
        (status = 400, description = "提现已处理或余额不足"),
        (status = 403, description = "无权限")
    )
)]
pub async fn review_withdrawal(
    admin_service: web::Data<AdminService>,
    distribution_service: web::Data<DistributionService>,
    system_service: web::Data<SystemService>,
    req: HttpRequest,
    path: web::Path<i64>,
    request: web::Json<ReviewWithdrawalRequest>,
) -> Result<HttpResponse> {
    let admin_id = guard!(admin_service, req, modules::DISTRIBUTION, LEVEL_MANAGE);
    let withdrawal_id = path.into_inner();
    let request = request.into_inner();
    let action_detail = format!(
        "提现{withdrawal_id}审核{}",
        if request.approve { "通过" } else { "驳回" }
    );

    match distribution_service
        .review_withdrawal(withdrawal_id, admin_id, request)
        .await
    {
        Ok(withdrawal) => {
            system_service
                .log_action(
                    admin_id,
                    modules::DISTRIBUTION,
                    "review_withdrawal",
                    &action_detail,
                    get_client_ip(&req).as_deref(),
                )
                .await;
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "data": withdrawal
            })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

// ---------- 系统 ----------

#[utoipa::path(
    get,
    path = "/admin/alerts",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "获取安全告警列表成功", body = Vec<SecurityAlert>),
        (status = 403, description = "无权限")
    )
)]
pub async fn list_alerts(
    admin_service: web::Data<AdminService>,
    system_service: web::Data<SystemService>,
    req: HttpRequest,
    query: web::Query<AlertQuery>,
) -> Result<HttpResponse> {
    guard!(admin_service, req, modules::SYSTEM, LEVEL_READ);

    match system_service.list_alerts(&query).await {
        Ok(alerts) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": alerts
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/admin/alerts/{id}/resolve",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "标记告警已处理"),
        (status = 403, description = "无权限"),
        (status = 404, description = "告警不存在或已处理")
    )
)]
pub async fn resolve_alert(
    admin_service: web::Data<AdminService>,
    system_service: web::Data<SystemService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let admin_id = guard!(admin_service, req, modules::SYSTEM, LEVEL_MANAGE);
    let alert_id = path.into_inner();

    match system_service.resolve_alert(alert_id, admin_id).await {
        Ok(()) => {
            system_service
                .log_action(
                    admin_id,
                    modules::SYSTEM,
                    "resolve_alert",
                    &format!("处理告警{alert_id}"),
                    get_client_ip(&req).as_deref(),
                )
                .await;
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "message": "已处理"
            })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/admin/logs",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "获取操作日志成功", body = Vec<SystemLog>),
        (status = 403, description = "无权限")
    )
)]
pub async fn list_logs(
    admin_service: web::Data<AdminService>,
    system_service: web::Data<SystemService>,
    req: HttpRequest,
    query: web::Query<SystemLogQuery>,
) -> Result<HttpResponse> {
    guard!(admin_service, req, modules::SYSTEM, LEVEL_READ);

    match system_service.list_logs(&query).await {
        Ok(logs) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": logs
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/admin/configs",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "获取系统配置成功", body = Vec<SystemConfig>),
        (status = 403, description = "无权限")
    )
)]
pub async fn list_configs(
    admin_service: web::Data<AdminService>,
    system_service: web::Data<SystemService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    guard!(admin_service, req, modules::SYSTEM, LEVEL_READ);

    match system_service.list_configs().await {
        Ok(configs) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": configs
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/admin/configs",
    tag = "admin",
    request_body = UpsertConfigRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "写入配置成功", body = SystemConfig),
        (status = 403, description = "无权限")
    )
)]
pub async fn upsert_config(
    admin_service: web::Data<AdminService>,
    system_service: web::Data<SystemService>,
    req: HttpRequest,
    request: web::Json<UpsertConfigRequest>,
) -> Result<HttpResponse> {
    let admin_id = guard!(admin_service, req, modules::SYSTEM, LEVEL_MANAGE);

    match system_service.upsert_config(request.into_inner()).await {
        Ok(config) => {
            system_service
                .log_action(
                    admin_id,
                    modules::SYSTEM,
                    "upsert_config",
                    &format!("写入配置{}", config.config_key),
                    get_client_ip(&req).as_deref(),
                )
                .await;
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "data": config
            })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

// ---------- 客服 ----------

#[derive(Debug, Deserialize)]
pub struct SessionListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<SessionStatus>,
}

#[utoipa::path(
    get,
    path = "/admin/chat/sessions",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "获取会话列表成功", body = Vec<ChatSession>),
        (status = 403, description = "无权限")
    )
)]
pub async fn list_sessions(
    admin_service: web::Data<AdminService>,
    chat_service: web::Data<ChatService>,
    req: HttpRequest,
    query: web::Query<SessionListQuery>,
) -> Result<HttpResponse> {
    guard!(admin_service, req, modules::CHAT, LEVEL_READ);

    match chat_service
        .admin_list_sessions(query.page, query.per_page, query.status.clone())
        .await
    {
        Ok(sessions) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": sessions
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/admin/chat/sessions/{id}/messages",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "拉取会话消息成功", body = Vec<ChatMessage>),
        (status = 403, description = "无权限"),
        (status = 404, description = "会话不存在")
    )
)]
pub async fn admin_poll_messages(
    admin_service: web::Data<AdminService>,
    chat_service: web::Data<ChatService>,
    req: HttpRequest,
    path: web::Path<i64>,
    query: web::Query<MessageQuery>,
) -> Result<HttpResponse> {
    guard!(admin_service, req, modules::CHAT, LEVEL_READ);

    match chat_service.admin_poll(path.into_inner(), &query).await {
        Ok(messages) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": messages
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/admin/chat/sessions/{id}/messages",
    tag = "admin",
    request_body = SendMessageRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "回复成功", body = ChatMessage),
        (status = 400, description = "会话已关闭"),
        (status = 403, description = "无权限")
    )
)]
pub async fn admin_reply(
    admin_service: web::Data<AdminService>,
    chat_service: web::Data<ChatService>,
    req: HttpRequest,
    path: web::Path<i64>,
    request: web::Json<SendMessageRequest>,
) -> Result<HttpResponse> {
    let admin_id = guard!(admin_service, req, modules::CHAT, LEVEL_MANAGE);

    match chat_service
        .admin_reply(admin_id, path.into_inner(), request.into_inner())
        .await
    {
        Ok(message) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": message
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/admin/chat/sessions/{id}/close",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "关闭会话成功"),
        (status = 403, description = "无权限"),
        (status = 404, description = "会话不存在或已关闭")
    )
)]
pub async fn close_session(
    admin_service: web::Data<AdminService>,
    chat_service: web::Data<ChatService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    guard!(admin_service, req, modules::CHAT, LEVEL_MANAGE);

    match chat_service.close_session(path.into_inner()).await {
        Ok(()) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "message": "会话已关闭"
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn admin_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .route("/dashboard", web::get().to(dashboard))
            .route("/users", web::get().to(list_users))
            .route("/users/{id}/status", web::put().to(update_user_status))
            .route("/users/role", web::post().to(assign_role))
            .route("/roles", web::get().to(list_roles))
            .route("/roles", web::post().to(create_role))
            .route("/roles/{id}", web::put().to(update_role))
            .route("/roles/{id}", web::delete().to(delete_role))
            .route("/products", web::get().to(admin_list_products))
            .route("/products", web::post().to(create_product))
            .route("/products/{id}", web::put().to(update_product))
            .route("/products/{id}", web::delete().to(delete_product))
            .route("/categories", web::get().to(admin_list_categories))
            .route("/categories", web::post().to(create_category))
            .route("/categories/{id}", web::put().to(update_category))
            .route("/categories/{id}", web::delete().to(delete_category))
            .route("/banners", web::get().to(admin_list_banners))
            .route("/banners", web::post().to(create_banner))
            .route("/banners/{id}", web::put().to(update_banner))
            .route("/banners/{id}", web::delete().to(delete_banner))
            .route("/orders", web::get().to(admin_list_orders))
            .route("/membership/plans", web::get().to(admin_list_plans))
            .route("/membership/plans", web::post().to(create_plan))
            .route("/membership/plans/{id}", web::put().to(update_plan))
            .route("/membership/codes", web::post().to(generate_codes))
            .route("/membership/codes", web::get().to(list_codes))
            .route("/membership/codes/{id}/disable", web::put().to(disable_code))
            .route("/distributors", web::get().to(list_distributors))
            .route("/distributors/{id}", web::put().to(update_distributor))
            .route("/withdrawals", web::get().to(list_withdrawals))
            .route("/withdrawals/{id}/review", web::post().to(review_withdrawal))
            .route("/alerts", web::get().to(list_alerts))
            .route("/alerts/{id}/resolve", web::post().to(resolve_alert))
            .route("/logs", web::get().to(list_logs))
            .route("/configs", web::get().to(list_configs))
            .route("/configs", web::put().to(upsert_config))
            .route("/chat/sessions", web::get().to(list_sessions))
            .route("/chat/sessions/{id}/messages", web::get().to(admin_poll_messages))
            .route("/chat/sessions/{id}/messages", web::post().to(admin_reply))
            .route("/chat/sessions/{id}/close", web::post().to(close_session)),
    );
}
