use std::{env, str::FromStr, time::Duration};

use crate::services::inventory_service::ClaimStrategyKind;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub claim_strategy: ClaimStrategyKind,
    pub gateway: GatewayConfig,
    pub maintenance: MaintenanceConfig,
    pub tx: TxPolicy,
}

/// Merchant credentials and endpoints of the payment gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub submit_url: String,
    pub merchant_id: String,
    pub secret_key: String,
    pub pay_type: String,
    pub notify_url: String,
    pub return_url: String,
}

#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    pub order_ttl: Duration,
    pub order_retention: Duration,
    pub expire_interval: Duration,
    pub cleanup_interval: Duration,
    pub retry_interval: Duration,
    pub retry_max_attempts: i32,
    pub retry_min_gap: Duration,
    pub batch_size: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            order_ttl: Duration::from_secs(15 * 60),
            order_retention: Duration::from_secs(7 * 24 * 3600),
            expire_interval: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(3600),
            retry_interval: Duration::from_secs(120),
            retry_max_attempts: 5,
            retry_min_gap: Duration::from_secs(300),
            batch_size: 100,
        }
    }
}

/// Bounds applied to every service-level transaction.
#[derive(Debug, Clone, Copy)]
pub struct TxPolicy {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for TxPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5000),
            max_attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_or("APP_PORT", 3000);
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET is not set"))?;

        let claim_strategy = match env::var("CLAIM_STRATEGY") {
            Ok(raw) => raw.parse().map_err(|e: String| anyhow::anyhow!(e))?,
            Err(_) => ClaimStrategyKind::Auto,
        };

        let gateway = GatewayConfig {
            submit_url: env::var("GATEWAY_URL")
                .unwrap_or_else(|_| "https://pay.example.com/submit.php".to_string()),
            merchant_id: env::var("GATEWAY_PID").unwrap_or_else(|_| "1000".to_string()),
            secret_key: env::var("GATEWAY_KEY")
                .map_err(|_| anyhow::anyhow!("GATEWAY_KEY is not set"))?,
            pay_type: env::var("GATEWAY_PAY_TYPE").unwrap_or_else(|_| "alipay".to_string()),
            notify_url: env::var("NOTIFY_URL")
                .unwrap_or_else(|_| format!("http://{host}:{port}/api/payments/notify")),
            return_url: env::var("RETURN_URL").unwrap_or_else(|_| format!("http://{host}:{port}/")),
        };

        let defaults = MaintenanceConfig::default();
        let maintenance = MaintenanceConfig {
            order_ttl: secs_or("ORDER_TTL_SECS", defaults.order_ttl),
            order_retention: secs_or("ORDER_RETENTION_SECS", defaults.order_retention),
            expire_interval: secs_or("EXPIRE_INTERVAL_SECS", defaults.expire_interval),
            cleanup_interval: secs_or("CLEANUP_INTERVAL_SECS", defaults.cleanup_interval),
            retry_interval: secs_or("RETRY_INTERVAL_SECS", defaults.retry_interval),
            retry_max_attempts: parse_or("RETRY_MAX_ATTEMPTS", defaults.retry_max_attempts),
            retry_min_gap: secs_or("RETRY_MIN_GAP_SECS", defaults.retry_min_gap),
            batch_size: parse_or("SWEEP_BATCH_SIZE", defaults.batch_size),
        };

        let tx_defaults = TxPolicy::default();
        let tx = TxPolicy {
            timeout: Duration::from_millis(parse_or("TX_TIMEOUT_MS", 5000)),
            max_attempts: parse_or("TX_MAX_ATTEMPTS", tx_defaults.max_attempts).max(1),
            backoff: tx_defaults.backoff,
        };

        Ok(Self {
            database_url,
            host,
            port,
            jwt_secret,
            claim_strategy,
            gateway,
            maintenance,
            tx,
        })
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn secs_or(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maintenance_defaults_are_sane() {
        let cfg = MaintenanceConfig::default();
        assert!(cfg.order_ttl < cfg.order_retention);
        assert!(cfg.retry_max_attempts > 0);
        assert_eq!(cfg.batch_size, 100);
    }

    #[test]
    fn missing_env_falls_back_to_default() {
        assert_eq!(parse_or("CODE_SHOP_TEST_UNSET_KEY", 42u16), 42);
        assert_eq!(
            secs_or("CODE_SHOP_TEST_UNSET_KEY", Duration::from_secs(7)),
            Duration::from_secs(7)
        );
    }
}
