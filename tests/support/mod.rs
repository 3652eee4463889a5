#![allow(dead_code)]

use std::time::Duration;

use code_shop::{
    config::{AppConfig, GatewayConfig, MaintenanceConfig, TxPolicy},
    db::{create_orm_conn, now, run_migrations},
    entity::{
        orders::{Column as OrderCol, Entity as Orders, Model as OrderModel},
        products::ActiveModel as ProductActive,
        recharge_cards::{ActiveModel as CardActive, Model as CardModel},
        sea_orm_active_enums::BalanceKind,
        users::{Entity as Users, Model as UserModel},
    },
    events::{self, EventStream},
    gateway::{self, Params, TRADE_SUCCESS},
    middleware::auth::{AuthUser, ROLE_USER},
    services::{
        inventory_service::{self, ClaimStrategyKind},
        ledger_service::{BalanceAdjustment, adjust_balance},
        recharge_service::new_card_code,
        user_service,
    },
    state::AppState,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, prelude::DateTimeWithTimeZone,
    sea_query::Expr,
};
use tempfile::TempDir;
use tokio::sync::Mutex;
use uuid::Uuid;

pub const GATEWAY_KEY: &str = "test-merchant-key";
pub const JWT_SECRET: &str = "test-jwt-secret";

// Parallel tests share one Postgres database; only the first runs migrations.
static PG_MIGRATED: Mutex<bool> = Mutex::const_new(false);

pub struct TestApp {
    pub state: AppState,
    pub events: EventStream,
    // Removed on drop; keep the app alive while the pool is in use.
    store: Option<TempDir>,
}

impl TestApp {
    pub fn drain_events(&mut self) -> Vec<&'static str> {
        let mut kinds = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            kinds.push(event.kind());
        }
        kinds
    }
}

pub fn test_config(database_url: &str) -> AppConfig {
    AppConfig {
        database_url: database_url.to_string(),
        host: "127.0.0.1".into(),
        port: 0,
        jwt_secret: JWT_SECRET.into(),
        claim_strategy: ClaimStrategyKind::Auto,
        gateway: GatewayConfig {
            submit_url: "https://pay.example.com/submit.php".into(),
            merchant_id: "1000".into(),
            secret_key: GATEWAY_KEY.into(),
            pay_type: "alipay".into(),
            notify_url: "http://127.0.0.1/api/payments/notify".into(),
            return_url: "http://127.0.0.1/".into(),
        },
        maintenance: MaintenanceConfig {
            retry_max_attempts: 2,
            ..MaintenanceConfig::default()
        },
        tx: TxPolicy {
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            backoff: Duration::from_millis(5),
        },
    }
}

/// Fresh in-memory SQLite store with the schema applied.
pub async fn sqlite_app() -> anyhow::Result<TestApp> {
    build_app(test_config("sqlite::memory:")).await
}

/// SQLite database file under a temp dir, served by a normal multi-connection pool.
///
/// Writers race for the file lock, so busy errors surface and the retry
/// policy gets more attempts than the in-memory store needs.
pub async fn sqlite_file_app() -> anyhow::Result<TestApp> {
    let dir = tempfile::tempdir()?;
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("shop.db").display());
    let mut config = test_config(&url);
    config.tx = TxPolicy {
        timeout: Duration::from_secs(30),
        max_attempts: 25,
        backoff: Duration::from_millis(2),
    };
    let mut app = build_app(config).await?;
    app.store = Some(dir);
    Ok(app)
}

/// Shared Postgres store from `TEST_DATABASE_URL`, or `None` when it is unset.
pub async fn postgres_app() -> anyhow::Result<Option<TestApp>> {
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("Skipping Postgres test: set TEST_DATABASE_URL to run it.");
        return Ok(None);
    };
    Ok(Some(build_app(test_config(&url)).await?))
}

pub async fn build_app(config: AppConfig) -> anyhow::Result<TestApp> {
    let orm = create_orm_conn(&config.database_url).await?;
    if config.database_url.starts_with("sqlite") {
        run_migrations(&orm).await?;
    } else {
        let mut migrated = PG_MIGRATED.lock().await;
        if !*migrated {
            run_migrations(&orm).await?;
            *migrated = true;
        }
    }

    let (bus, stream) = events::channel();
    Ok(TestApp {
        state: AppState::new(orm, &config, bus),
        events: stream,
        store: None,
    })
}

/// A user holding `balance`, funded through the ledger so replays stay consistent.
pub async fn create_user(state: &AppState, balance: i64) -> anyhow::Result<UserModel> {
    let external_id = format!("tg-{}", Uuid::new_v4().simple());
    let user = user_service::ensure_user(&state.orm, &external_id, None).await?;
    if balance > 0 {
        adjust_balance(
            &state.orm,
            BalanceAdjustment::new(user.id, balance, BalanceKind::TopUp, "opening balance"),
        )
        .await?;
    }
    Ok(Users::find_by_id(user.id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| anyhow::anyhow!("user vanished"))?)
}

pub fn auth(user: &UserModel) -> AuthUser {
    AuthUser {
        user_id: user.id,
        role: ROLE_USER.into(),
    }
}

pub async fn balance_of(state: &AppState, user_id: Uuid) -> anyhow::Result<i64> {
    Ok(Users::find_by_id(user_id)
        .one(&state.orm)
        .await?
        .map(|u| u.balance)
        .ok_or_else(|| anyhow::anyhow!("user not found"))?)
}

/// An active product priced at `price` with `stock` unique codes.
pub async fn product_with_codes(state: &AppState, price: i64, stock: usize) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    ProductActive {
        id: Set(id),
        name: Set(format!("Gift card {}", &id.simple().to_string()[..6])),
        description: Set(None),
        price: Set(price),
        active: Set(true),
        created_at: Set(now()),
    }
    .insert(&state.orm)
    .await?;

    let codes: Vec<String> = (0..stock).map(|n| format!("CODE-{}-{n}", id.simple())).collect();
    inventory_service::import_codes(&state.orm, id, &codes).await?;
    Ok(id)
}

/// Insert a card directly, bypassing the generator's validation.
pub async fn insert_card(
    state: &AppState,
    amount: i64,
    max_uses: i32,
    max_uses_per_user: i32,
    expires_at: Option<DateTimeWithTimeZone>,
) -> anyhow::Result<CardModel> {
    Ok(CardActive {
        id: Set(Uuid::new_v4()),
        code: Set(new_card_code("TEST")),
        amount: Set(amount),
        max_uses: Set(max_uses),
        max_uses_per_user: Set(max_uses_per_user),
        used_count: Set(0),
        expires_at: Set(expires_at),
        created_at: Set(now()),
    }
    .insert(&state.orm)
    .await?)
}

pub async fn reload_order(state: &AppState, order_id: Uuid) -> anyhow::Result<OrderModel> {
    Ok(Orders::find_by_id(order_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| anyhow::anyhow!("order {order_id} not found"))?)
}

pub async fn backdate_order(
    state: &AppState,
    order_id: Uuid,
    created_at: DateTimeWithTimeZone,
) -> anyhow::Result<()> {
    Orders::update_many()
        .col_expr(OrderCol::CreatedAt, Expr::value(created_at))
        .filter(OrderCol::Id.eq(order_id))
        .exec(&state.orm)
        .await?;
    Ok(())
}

/// Gateway notification for `order`, signed with the test merchant key.
pub fn callback_for(order: &OrderModel, money: &str, status: &str) -> Params {
    let mut params = Params::new();
    params.insert("pid".into(), "1000".into());
    params.insert("type".into(), "alipay".into());
    params.insert("out_trade_no".into(), order.correlation_id.clone());
    params.insert("trade_no".into(), format!("T{}", Uuid::new_v4().simple()));
    params.insert("money".into(), money.to_string());
    params.insert("trade_status".into(), status.to_string());
    let signature = gateway::sign(&params, GATEWAY_KEY);
    params.insert("sign".into(), signature);
    params.insert("sign_type".into(), "MD5".into());
    params
}

pub fn paid_callback(order: &OrderModel) -> Params {
    callback_for(order, &gateway::format_amount(order.payable), TRADE_SUCCESS)
}
