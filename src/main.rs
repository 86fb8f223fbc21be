use actix_web::{middleware::Logger, web, App, HttpServer};
use chrono::Local;
use env_logger::{Env, Target};
use std::io::Write; // env_logger 自定义格式化

use zhike_backend::{
    config::Config,
    database::{create_pool, run_migrations},
    external::{AlipayService, PaypalService, WechatPayService},
    handlers,
    middlewares::{create_cors, AuthMiddleware},
    services::*,
    swagger::swagger_config,
    tasks,
    utils::JwtService,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            let level = record.level().as_str().to_ascii_lowercase();
            let msg_json = serde_json::to_string(&format!("{}", record.args()))
                .unwrap_or_else(|_| "\"<invalid utf8>\"".to_string());
            writeln!(
                buf,
                "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"message\":{},\"target\":\"{}\"}}",
                ts,
                level,
                msg_json,
                record.target(),
            )
        })
        .target(Target::Stdout)
        .init();

    // 加载配置
    let config = Config::from_toml().expect("Failed to load configuration file");

    // 创建数据库连接池
    let pool = create_pool(&config.database)
        .await
        .expect("Failed to create database connection pool");

    // 运行数据库迁移
    run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    // 创建JWT服务
    let jwt_service = JwtService::new(
        &config.jwt.secret,
        config.jwt.access_token_expires_in,
        config.jwt.refresh_token_expires_in,
    );

    // 支付渠道
    let alipay_service = AlipayService::new(config.alipay.clone());
    let wechat_service = WechatPayService::new(config.wechat.clone());
    let paypal_service = PaypalService::new(config.paypal.clone());

    // 业务服务
    let system_service = SystemService::new(pool.clone());
    let auth_service = AuthService::new(pool.clone(), jwt_service.clone(), system_service.clone());
    let user_service = UserService::new(pool.clone());
    let catalog_service = CatalogService::new(pool.clone());
    let cart_service = CartService::new(pool.clone());
    let order_service = OrderService::new(pool.clone(), config.payment.order_expire_minutes);
    let membership_service = MembershipService::new(pool.clone());
    let distribution_service =
        DistributionService::new(pool.clone(), config.payment.commission_hold_days);
    let payment_service = PaymentService::new(
        pool.clone(),
        alipay_service,
        wechat_service,
        paypal_service,
        config.payment.clone(),
        system_service.clone(),
    );
    let admin_service = AdminService::new(pool.clone(), system_service.clone());
    let chat_service = ChatService::new(pool.clone());

    // 后台定时任务
    tasks::spawn_all(
        order_service.clone(),
        distribution_service.clone(),
        membership_service.clone(),
    );

    // 启动HTTP服务器
    log::info!(
        "Starting HTTP server at {}:{}",
        config.server.host,
        config.server.port
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(create_cors())
            .wrap(AuthMiddleware::new(jwt_service.clone()))
            .app_data(web::Data::new(auth_service.clone()))
            .app_data(web::Data::new(user_service.clone()))
            .app_data(web::Data::new(catalog_service.clone()))
            .app_data(web::Data::new(cart_service.clone()))
            .app_data(web::Data::new(order_service.clone()))
            .app_data(web::Data::new(payment_service.clone()))
            .app_data(web::Data::new(membership_service.clone()))
            .app_data(web::Data::new(distribution_service.clone()))
            .app_data(web::Data::new(admin_service.clone()))
            .app_data(web::Data::new(system_service.clone()))
            .app_data(web::Data::new(chat_service.clone()))
            .configure(swagger_config)
            .configure(handlers::webhook_config)
            .service(
                web::scope("/api/v1")
                    .configure(handlers::auth_config)
                    .configure(handlers::user_config)
                    .configure(handlers::catalog_config)
                    .configure(handlers::cart_config)
                    .configure(handlers::order_config)
                    .configure(handlers::payment_config)
                    .configure(handlers::membership_config)
                    .configure(handlers::distribution_config)
                    .configure(handlers::chat_config)
                    .configure(handlers::admin_config),
            )
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await
}
