use code_shop::{config::AppConfig, db::create_orm_conn, migration::Migrator};
use sea_orm_migration::MigratorTrait;

/// `migrate [up|down [n]|status|fresh]`, defaulting to `up`.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    let orm = create_orm_conn(&config.database_url).await?;

    let mut args = std::env::args().skip(1);
    match args.next().as_deref().unwrap_or("up") {
        "up" => {
            Migrator::up(&orm, None).await?;
            println!("Migrations applied");
        }
        "down" => {
            let steps = args.next().map(|n| n.parse::<u32>()).transpose()?.unwrap_or(1);
            Migrator::down(&orm, Some(steps)).await?;
            println!("Rolled back {steps} migration(s)");
        }
        "status" => Migrator::status(&orm).await?,
        "fresh" => {
            Migrator::fresh(&orm).await?;
            println!("Schema dropped and re-created");
        }
        other => anyhow::bail!("unknown command {other:?}, expected up|down [n]|status|fresh"),
    }
    Ok(())
}
