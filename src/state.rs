use std::sync::Arc;

use sea_orm::ConnectionTrait;

use crate::{
    config::{AppConfig, GatewayConfig, MaintenanceConfig, TxPolicy},
    db::OrmConn,
    events::EventBus,
    services::inventory_service::ClaimEngine,
};

#[derive(Clone)]
pub struct AppState {
    pub orm: OrmConn,
    pub claims: ClaimEngine,
    pub events: EventBus,
    pub gateway: Arc<GatewayConfig>,
    pub maintenance: Arc<MaintenanceConfig>,
    pub tx: TxPolicy,
    pub jwt_secret: Arc<str>,
}

impl AppState {
    pub fn new(orm: OrmConn, config: &AppConfig, events: EventBus) -> Self {
        let claims = ClaimEngine::select(config.claim_strategy, orm.get_database_backend());
        Self {
            orm,
            claims,
            events,
            gateway: Arc::new(config.gateway.clone()),
            maintenance: Arc::new(config.maintenance.clone()),
            tx: config.tx,
            jwt_secret: Arc::from(config.jwt_secret.as_str()),
        }
    }
}
