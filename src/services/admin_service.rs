use uuid::Uuid;

use crate::{
    audit,
    dto::{
        balance::LedgerReport,
        cards::{CardList, GenerateCardsRequest},
        products::{ImportCodesRequest, ImportCodesResult},
    },
    error::AppResult,
    middleware::auth::{AuthUser, ensure_admin},
    response::{ApiResponse, Meta},
    services::{inventory_service, ledger_service, recharge_service},
    state::AppState,
};

pub async fn import_codes(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: ImportCodesRequest,
) -> AppResult<ApiResponse<ImportCodesResult>> {
    ensure_admin(user)?;
    let imported = inventory_service::import_codes(&state.orm, product_id, &payload.codes).await?;
    let available = inventory_service::available_stock(&state.orm, product_id).await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        audit::CODES_IMPORTED,
        Some("codes"),
        serde_json::json!({ "product_id": product_id, "imported": imported }),
    )
    .await;

    Ok(ApiResponse::success(
        "Codes imported",
        ImportCodesResult {
            product_id,
            imported,
            available,
        },
        Some(Meta::empty()),
    ))
}

pub async fn generate_cards(
    state: &AppState,
    user: &AuthUser,
    payload: GenerateCardsRequest,
) -> AppResult<ApiResponse<CardList>> {
    ensure_admin(user)?;
    let cards = recharge_service::generate_cards(&state.orm, &payload).await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        audit::CARDS_GENERATED,
        Some("recharge_cards"),
        serde_json::json!({
            "count": cards.len(),
            "amount": payload.amount,
            "max_uses": payload.max_uses,
            "max_uses_per_user": payload.max_uses_per_user,
        }),
    )
    .await;

    let meta = Meta::batch(cards.len());
    Ok(ApiResponse::success(
        "Cards generated",
        CardList {
            items: cards.into_iter().map(Into::into).collect(),
        },
        Some(meta),
    ))
}

pub async fn ledger_check(
    state: &AppState,
    user: &AuthUser,
    user_id: Uuid,
) -> AppResult<ApiResponse<LedgerReport>> {
    ensure_admin(user)?;
    let report = ledger_service::verify_ledger(&state.orm, user_id).await?;
    Ok(ApiResponse::success("Ledger check", report, Some(Meta::empty())))
}
