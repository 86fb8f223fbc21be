use actix_web::web;
use utoipa::OpenApi;
use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;
use crate::models::*;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            )
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::refresh,
        handlers::auth::logout,
        handlers::user::get_profile,
        handlers::user::update_profile,
        handlers::user::change_password,
        handlers::catalog::list_categories,
        handlers::catalog::list_banners,
        handlers::catalog::list_products,
        handlers::catalog::get_product,
        handlers::cart::get_cart,
        handlers::cart::add_item,
        handlers::cart::update_item,
        handlers::cart::remove_item,
        handlers::cart::clear_cart,
        handlers::order::create_order,
        handlers::order::create_membership_order,
        handlers::order::list_orders,
        handlers::order::get_order,
        handlers::order::cancel_order,
        handlers::payment::create_payment,
        handlers::payment::get_payment,
        handlers::membership::list_plans,
        handlers::membership::my_membership,
        handlers::membership::redeem_code,
        handlers::distribution::apply,
        handlers::distribution::my_distributor,
        handlers::distribution::my_stats,
        handlers::distribution::my_commissions,
        handlers::distribution::my_withdrawals,
        handlers::distribution::create_withdrawal,
        handlers::chat::open_session,
        handlers::chat::send_message,
        handlers::chat::poll_messages,
        handlers::chat::unread_count,
        handlers::admin::dashboard,
        handlers::admin::list_users,
        handlers::admin::update_user_status,
        handlers::admin::assign_role,
        handlers::admin::list_roles,
        handlers::admin::create_role,
        handlers::admin::update_role,
        handlers::admin::delete_role,
        handlers::admin::admin_list_products,
        handlers::admin::create_product,
        handlers::admin::update_product,
        handlers::admin::delete_product,
        handlers::admin::admin_list_categories,
        handlers::admin::create_category,
        handlers::admin::update_category,
        handlers::admin::delete_category,
        handlers::admin::admin_list_banners,
        handlers::admin::create_banner,
        handlers::admin::update_banner,
        handlers::admin::delete_banner,
        handlers::admin::admin_list_orders,
        handlers::admin::admin_list_plans,
        handlers::admin::create_plan,
        handlers::admin::update_plan,
        handlers::admin::generate_codes,
        handlers::admin::list_codes,
        handlers::admin::disable_code,
        handlers::admin::list_distributors,
        handlers::admin::update_distributor,
        handlers::admin::list_withdrawals,
        handlers::admin::review_withdrawal,
        handlers::admin::list_alerts,
        handlers::admin::resolve_alert,
        handlers::admin::list_logs,
        handlers::admin::list_configs,
        handlers::admin::upsert_config,
        handlers::admin::list_sessions,
        handlers::admin::admin_poll_messages,
        handlers::admin::admin_reply,
        handlers::admin::close_session,
    ),
    components(
        schemas(
            ApiError,
            UserStatus,
            RegisterRequest,
            LoginRequest,
            UpdateProfileRequest,
            ChangePasswordRequest,
            UserQuery,
            UpdateUserStatusRequest,
            UserResponse,
            AuthResponse,
            ProductKind,
            ShelfStatus,
            EnabledStatus,
            Category,
            Product,
            Banner,
            CreateProductRequest,
            UpdateProductRequest,
            CreateCategoryRequest,
            UpdateCategoryRequest,
            CreateBannerRequest,
            UpdateBannerRequest,
            CartItemDetail,
            AddCartItemRequest,
            UpdateCartItemRequest,
            CartResponse,
            OrderKind,
            OrderStatus,
            Order,
            OrderItem,
            OrderItemInput,
            CreateOrderRequest,
            OrderResponse,
            OrderDetailResponse,
            PaymentProvider,
            PaymentStatus,
            CreatePaymentRequest,
            CreatePaymentResponse,
            PaymentResponse,
            MembershipPlan,
            MembershipStatus,
            MembershipCodeStatus,
            MembershipCode,
            CreateMembershipOrderRequest,
            RedeemCodeRequest,
            MembershipResponse,
            CreatePlanRequest,
            UpdatePlanRequest,
            GenerateCodesRequest,
            GenerateCodesResponse,
            DistributorStatus,
            Distributor,
            CommissionStatus,
            DistributionOrder,
            WithdrawalStatus,
            CommissionWithdrawal,
            DistributorResponse,
            DistributorStats,
            CreateWithdrawalRequest,
            ReviewWithdrawalRequest,
            UpdateDistributorRequest,
            AdminRole,
            RolePermission,
            PermissionItem,
            CreateRoleRequest,
            UpdateRoleRequest,
            RoleResponse,
            AssignRoleRequest,
            AlertLevel,
            SecurityAlert,
            SystemLog,
            SystemConfig,
            UpsertConfigRequest,
            DashboardStats,
            SessionStatus,
            SenderRole,
            ChatSession,
            ChatMessage,
            SendMessageRequest,
            UnreadCountResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "注册登录与令牌"),
        (name = "user", description = "用户资料"),
        (name = "catalog", description = "内容商品目录"),
        (name = "cart", description = "购物车"),
        (name = "order", description = "订单"),
        (name = "payment", description = "支付"),
        (name = "membership", description = "会员"),
        (name = "distribution", description = "分销"),
        (name = "chat", description = "在线客服"),
        (name = "admin", description = "后台管理"),
    ),
    info(
        title = "Zhike Backend API",
        version = "1.0.0",
        description = "知识内容电商平台 REST API 文档",
    ),
    servers(
        (url = "/api/v1", description = "Local server")
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
    .route(
        "/swagger-ui",
        web::get().to(|| async {
            actix_web::HttpResponse::Found()
                .append_header(("Location", "/swagger-ui/"))
                .finish()
        }),
    );
}
