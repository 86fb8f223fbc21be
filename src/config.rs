use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
    #[serde(default)]
    pub alipay: AlipayConfig,
    #[serde(default)]
    pub wechat: WechatPayConfig,
    #[serde(default)]
    pub paypal: PaypalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub access_token_expires_in: i64,  // 秒
    pub refresh_token_expires_in: i64, // 秒
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    /// 允许使用 mock 支付渠道（仅限开发/测试环境）
    #[serde(default)]
    pub mock_enabled: bool,
    /// mock 回调签名密钥
    #[serde(default)]
    pub mock_secret: String,
    /// 待支付订单过期时间（分钟）
    #[serde(default = "default_order_expire_minutes")]
    pub order_expire_minutes: i64,
    /// 分佣结算等待天数（退款保护期）
    #[serde(default = "default_commission_hold_days")]
    pub commission_hold_days: i64,
}

fn default_order_expire_minutes() -> i64 {
    30
}

fn default_commission_hold_days() -> i64 {
    7
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            mock_enabled: false,
            mock_secret: String::new(),
            order_expire_minutes: default_order_expire_minutes(),
            commission_hold_days: default_commission_hold_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AlipayConfig {
    pub gateway: String,
    pub partner_id: String,
    pub md5_key: String,
    pub notify_url: String,
    pub return_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WechatPayConfig {
    pub app_id: String,
    pub mch_id: String,
    pub api_key: String,
    pub notify_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PaypalConfig {
    pub base_url: String,
    pub client_id: String,
    pub secret: String,
    pub return_url: String,
    pub cancel_url: String,
}

impl Config {
    pub fn from_toml() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        // 尝试读取配置文件，如果不存在则完全依赖环境变量
        let config_result = std::fs::read_to_string(&config_path);

        let mut config: Config = match config_result {
            Ok(config_str) => {
                // 有配置文件：先解析再用环境变量覆盖
                toml::from_str(&config_str).map_err(|e| format!("解析配置文件失败: {e}"))?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // 无配置文件：使用环境变量与默认值构建
                fn get_env(name: &str) -> Option<String> {
                    env::var(name).ok()
                }
                fn get_env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
                    env::var(name)
                        .ok()
                        .and_then(|v| v.parse::<T>().ok())
                        .unwrap_or(default)
                }

                // 数据库 URL 在无配置文件时必须提供
                let database_url = get_env("DATABASE_URL")
                    .ok_or("缺少 DATABASE_URL 环境变量，且未找到配置文件 config.toml")?;

                Config {
                    server: ServerConfig {
                        host: get_env("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                        port: get_env_parse("SERVER_PORT", 8080u16),
                    },
                    database: DatabaseConfig {
                        url: database_url,
                        max_connections: get_env_parse("DB_MAX_CONNECTIONS", 10u32),
                    },
                    jwt: JwtConfig {
                        secret: get_env("JWT_SECRET")
                            .unwrap_or_else(|| "change-me-in-production".to_string()),
                        access_token_expires_in: get_env_parse("JWT_ACCESS_EXPIRES_IN", 7200i64),
                        refresh_token_expires_in: get_env_parse(
                            "JWT_REFRESH_EXPIRES_IN",
                            2_592_000i64,
                        ),
                    },
                    payment: PaymentConfig {
                        mock_enabled: get_env_parse("PAYMENT_MOCK_ENABLED", false),
                        mock_secret: get_env("PAYMENT_MOCK_SECRET").unwrap_or_default(),
                        order_expire_minutes: get_env_parse(
                            "ORDER_EXPIRE_MINUTES",
                            default_order_expire_minutes(),
                        ),
                        commission_hold_days: get_env_parse(
                            "COMMISSION_HOLD_DAYS",
                            default_commission_hold_days(),
                        ),
                    },
                    alipay: AlipayConfig {
                        gateway: get_env("ALIPAY_GATEWAY")
                            .unwrap_or_else(|| "https://mapi.alipay.com/gateway.do".to_string()),
                        partner_id: get_env("ALIPAY_PARTNER_ID").unwrap_or_default(),
                        md5_key: get_env("ALIPAY_MD5_KEY").unwrap_or_default(),
                        notify_url: get_env("ALIPAY_NOTIFY_URL").unwrap_or_default(),
                        return_url: get_env("ALIPAY_RETURN_URL").unwrap_or_default(),
                    },
                    wechat: WechatPayConfig {
                        app_id: get_env("WECHAT_APP_ID").unwrap_or_default(),
                        mch_id: get_env("WECHAT_MCH_ID").unwrap_or_default(),
                        api_key: get_env("WECHAT_API_KEY").unwrap_or_default(),
                        notify_url: get_env("WECHAT_NOTIFY_URL").unwrap_or_default(),
                    },
                    paypal: PaypalConfig {
                        base_url: get_env("PAYPAL_BASE_URL")
                            .unwrap_or_else(|| "https://api-m.sandbox.paypal.com".to_string()),
                        client_id: get_env("PAYPAL_CLIENT_ID").unwrap_or_default(),
                        secret: get_env("PAYPAL_SECRET").unwrap_or_default(),
                        return_url: get_env("PAYPAL_RETURN_URL").unwrap_or_default(),
                        cancel_url: get_env("PAYPAL_CANCEL_URL").unwrap_or_default(),
                    },
                }
            }
            Err(e) => {
                return Err(format!("无法读取配置文件 {config_path}: {e}").into());
            }
        };

        // 环境变量覆盖（即便文件存在时也覆盖）
        if let Ok(v) = env::var("SERVER_HOST") {
            config.server.host = v;
        }
        if let Ok(v) = env::var("SERVER_PORT") {
            if let Ok(p) = v.parse() {
                config.server.port = p;
            }
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            config.database.url = v;
        }
        if let Ok(v) = env::var("DB_MAX_CONNECTIONS") {
            if let Ok(mc) = v.parse() {
                config.database.max_connections = mc;
            }
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            config.jwt.secret = v;
        }
        if let Ok(v) = env::var("JWT_ACCESS_EXPIRES_IN") {
            if let Ok(n) = v.parse() {
                config.jwt.access_token_expires_in = n;
            }
        }
        if let Ok(v) = env::var("JWT_REFRESH_EXPIRES_IN") {
            if let Ok(n) = v.parse() {
                config.jwt.refresh_token_expires_in = n;
            }
        }
        if let Ok(v) = env::var("PAYMENT_MOCK_ENABLED") {
            if let Ok(b) = v.parse() {
                config.payment.mock_enabled = b;
            }
        }
        if let Ok(v) = env::var("PAYMENT_MOCK_SECRET") {
            config.payment.mock_secret = v;
        }
        if let Ok(v) = env::var("ORDER_EXPIRE_MINUTES") {
            if let Ok(n) = v.parse() {
                config.payment.order_expire_minutes = n;
            }
        }
        if let Ok(v) = env::var("COMMISSION_HOLD_DAYS") {
            if let Ok(n) = v.parse() {
                config.payment.commission_hold_days = n;
            }
        }
        if let Ok(v) = env::var("ALIPAY_GATEWAY") {
            config.alipay.gateway = v;
        }
        if let Ok(v) = env::var("ALIPAY_PARTNER_ID") {
            config.alipay.partner_id = v;
        }
        if let Ok(v) = env::var("ALIPAY_MD5_KEY") {
            config.alipay.md5_key = v;
        }
        if let Ok(v) = env::var("ALIPAY_NOTIFY_URL") {
            config.alipay.notify_url = v;
        }
        if let Ok(v) = env::var("ALIPAY_RETURN_URL") {
            config.alipay.return_url = v;
        }
        if let Ok(v) = env::var("WECHAT_APP_ID") {
            config.wechat.app_id = v;
        }
        if let Ok(v) = env::var("WECHAT_MCH_ID") {
            config.wechat.mch_id = v;
        }
        if let Ok(v) = env::var("WECHAT_API_KEY") {
            config.wechat.api_key = v;
        }
        if let Ok(v) = env::var("WECHAT_NOTIFY_URL") {
            config.wechat.notify_url = v;
        }
        if let Ok(v) = env::var("PAYPAL_BASE_URL") {
            config.paypal.base_url = v;
        }
        if let Ok(v) = env::var("PAYPAL_CLIENT_ID") {
            config.paypal.client_id = v;
        }
        if let Ok(v) = env::var("PAYPAL_SECRET") {
            config.paypal.secret = v;
        }
        if let Ok(v) = env::var("PAYPAL_RETURN_URL") {
            config.paypal.return_url = v;
        }
        if let Ok(v) = env::var("PAYPAL_CANCEL_URL") {
            config.paypal.cancel_url = v;
        }

        Ok(config)
    }
}
