use chrono::Duration;
use code_shop::{
    config::AppConfig,
    db::{create_orm_conn, now, run_migrations},
    dto::cards::GenerateCardsRequest,
    entity::{
        products::{ActiveModel as ProductActive, Column as ProdCol, Entity as Products},
    },
    middleware::auth::{ROLE_ADMIN, issue_token},
    services::{inventory_service, recharge_service, user_service},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    Set,
};
use uuid::Uuid;

const DEMO_PRODUCTS: [(&str, &str, i64); 3] = [
    ("Steam Wallet 10", "Steam wallet code worth 10", 1000),
    ("Netflix 1 Month", "One month standard plan", 1290),
    ("Game Pass 3 Months", "Xbox Game Pass Ultimate", 4490),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url).await?;
    // Ensure migrations are applied.
    run_migrations(&orm).await?;

    let admin_id = ensure_admin(&orm, "bot-admin").await?;
    let user = user_service::ensure_user(&orm, "demo-user", Some("en")).await?;

    for (name, description, price) in DEMO_PRODUCTS {
        let product_id = ensure_product(&orm, name, description, price).await?;
        let codes: Vec<String> = (1..=5)
            .map(|n| format!("{}-{n:03}", name.to_uppercase().replace(' ', "-")))
            .collect();
        let stocked = inventory_service::available_stock(&orm, product_id).await?;
        if stocked == 0 {
            inventory_service::import_codes(&orm, product_id, &codes).await?;
        }
    }

    let cards = recharge_service::generate_cards(
        &orm,
        &GenerateCardsRequest {
            prefix: "DEMO".into(),
            count: 3,
            amount: 500,
            max_uses: 3,
            max_uses_per_user: 1,
            expires_at: None,
        },
    )
    .await?;

    let ttl = Duration::days(30);
    let admin_token = issue_token(&config.jwt_secret, admin_id, ROLE_ADMIN, ttl)?;
    let user_token = issue_token(&config.jwt_secret, user.id, &user.role, ttl)?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {}", user.id);
    println!("Admin token: {admin_token}");
    println!("User token: {user_token}");
    for card in cards {
        println!("Recharge card: {} ({} minor units, {} uses)", card.code, card.amount, card.max_uses);
    }
    Ok(())
}

async fn ensure_admin(orm: &DatabaseConnection, external_id: &str) -> anyhow::Result<Uuid> {
    let user = user_service::ensure_user(orm, external_id, None).await?;
    if user.role == ROLE_ADMIN {
        return Ok(user.id);
    }
    let id = user.id;
    let mut active = user.into_active_model();
    active.role = Set(ROLE_ADMIN.to_string());
    active.update(orm).await?;
    Ok(id)
}

async fn ensure_product(
    orm: &DatabaseConnection,
    name: &str,
    description: &str,
    price: i64,
) -> anyhow::Result<Uuid> {
    if let Some(existing) = Products::find().filter(ProdCol::Name.eq(name)).one(orm).await? {
        return Ok(existing.id);
    }
    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        description: Set(Some(description.to_string())),
        price: Set(price),
        active: Set(true),
        created_at: Set(now()),
    }
    .insert(orm)
    .await?;
    Ok(product.id)
}
