mod support;

use std::time::Duration;

use chrono::Duration as ChronoDuration;
use code_shop::{
    config::TxPolicy,
    db::{now, with_retry},
    entity::{
        balance_transactions::{Column as LedgerCol, Entity as Ledger},
        recharge_card_usages::{Column as UsageCol, Entity as Usages},
        recharge_cards::{Entity as Cards, Model as CardModel},
        sea_orm_active_enums::OrderStatus,
    },
    error::AppError,
    services::{
        ledger_service::verify_ledger, maintenance_service::expire_pending_orders,
        order_service::place_product_order, recharge_service::redeem_card,
    },
    state::AppState,
};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter,
    TransactionTrait,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use support::{
    backdate_order, balance_of, create_user, insert_card, product_with_codes, reload_order,
    sqlite_file_app,
};

/// Take the database write lock from another pooled connection until rolled back.
async fn hold_write_lock(state: &AppState) -> anyhow::Result<DatabaseTransaction> {
    let blocker = state.orm.begin().await?;
    blocker
        .execute_unprepared("UPDATE products SET active = active")
        .await?;
    Ok(blocker)
}

async fn ledger_rows(state: &AppState, user_id: Uuid) -> anyhow::Result<u64> {
    Ok(Ledger::find()
        .filter(LedgerCol::UserId.eq(user_id))
        .count(&state.orm)
        .await?)
}

async fn reload_card(state: &AppState, card_id: Uuid) -> anyhow::Result<CardModel> {
    Ok(Cards::find_by_id(card_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| anyhow::anyhow!("card {card_id} not found"))?)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_expiry_sweep_leaves_order_untouched() -> anyhow::Result<()> {
    let mut app = sqlite_file_app().await?;
    let state = app.state.clone();
    let user = create_user(&state, 400).await?;
    let product_id = product_with_codes(&state, 1_000, 1).await?;

    let order = place_product_order(&state.orm, &state.claims, user.id, product_id, true)
        .await?
        .order;
    assert_eq!(order.balance_used, 400);
    backdate_order(&state, order.id, now() - ChronoDuration::hours(2)).await?;
    let entries = ledger_rows(&state, user.id).await?;

    let blocker = hold_write_lock(&state).await?;
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
    });
    let finished = tokio::select! {
        _ = token.cancelled() => None,
        swept = expire_pending_orders(&state, now()) => Some(swept),
    };
    assert!(finished.is_none(), "sweep ran against a locked store: {finished:?}");
    blocker.rollback().await?;

    assert_eq!(reload_order(&state, order.id).await?.status, OrderStatus::Pending);
    assert_eq!(balance_of(&state, user.id).await?, 0);
    assert_eq!(ledger_rows(&state, user.id).await?, entries);
    assert!(verify_ledger(&state.orm, user.id).await?.consistent);
    assert!(app.drain_events().is_empty());

    // The next sweep applies the transition and the refund together.
    assert_eq!(expire_pending_orders(&state, now()).await?, 1);
    assert_eq!(reload_order(&state, order.id).await?.status, OrderStatus::Expired);
    assert_eq!(balance_of(&state, user.id).await?, 400);
    assert_eq!(ledger_rows(&state, user.id).await?, entries + 1);
    assert!(verify_ledger(&state.orm, user.id).await?.consistent);
    assert_eq!(app.drain_events(), vec!["order_expired"]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn timed_out_redemption_changes_nothing() -> anyhow::Result<()> {
    let app = sqlite_file_app().await?;
    let state = app.state.clone();
    let user = create_user(&state, 0).await?;
    let card = insert_card(&state, 300, 2, 1, None).await?;

    let deadline = TxPolicy {
        timeout: Duration::from_millis(200),
        max_attempts: 1,
        backoff: Duration::from_millis(1),
    };
    let blocker = hold_write_lock(&state).await?;
    let result = with_retry(&deadline, "redeem_card", || {
        redeem_card(&state.orm, &card.code, user.id)
    })
    .await;
    assert!(matches!(result, Err(AppError::Timeout)), "{result:?}");
    blocker.rollback().await?;

    assert_eq!(reload_card(&state, card.id).await?.used_count, 0);
    let usages = Usages::find()
        .filter(UsageCol::CardId.eq(card.id))
        .count(&state.orm)
        .await?;
    assert_eq!(usages, 0);
    assert_eq!(balance_of(&state, user.id).await?, 0);
    assert_eq!(ledger_rows(&state, user.id).await?, 0);
    assert!(verify_ledger(&state.orm, user.id).await?.consistent);

    let redemption = with_retry(&state.tx, "redeem_card", || {
        redeem_card(&state.orm, &card.code, user.id)
    })
    .await?;
    assert_eq!(redemption.entry.balance_after, 300);
    assert_eq!(reload_card(&state, card.id).await?.used_count, 1);
    assert_eq!(ledger_rows(&state, user.id).await?, 1);
    Ok(())
}
