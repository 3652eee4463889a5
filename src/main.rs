use std::net::{IpAddr, SocketAddr};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use code_shop::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    events::{self, LogNotifier},
    routes,
    state::AppState,
    tasks::BackgroundTasks,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,code_shop=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;

    let (bus, stream) = events::channel();
    let state = AppState::new(orm, &config, bus);

    let mut tasks = BackgroundTasks::new();
    tasks.spawn_dispatcher(stream, LogNotifier);
    tasks.spawn_maintenance(&state);

    let app = routes::app(state);

    let addr = SocketAddr::from((config.host.parse::<IpAddr>()?, config.port));
    tracing::info!("listening on {}", addr);

    let shutdown = tasks.shutdown_token();
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => tracing::info!("ctrl-c received"),
                _ = shutdown.cancelled() => {}
            }
        })
        .await?;

    tasks.shutdown().await;
    Ok(())
}
