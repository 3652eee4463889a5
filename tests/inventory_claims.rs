mod support;

use std::collections::HashSet;

use code_shop::{
    db::with_retry,
    entity::codes::{Column as CodeCol, Entity as Codes},
    error::AppError,
    services::{
        inventory_service::{
            ClaimEngine, CodeClaimer, ConditionalUpdateClaimer, SkipLockedClaimer, available_stock,
            import_codes,
        },
        order_service::place_product_order,
    },
    state::AppState,
};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use uuid::Uuid;

use support::{create_user, postgres_app, product_with_codes, sqlite_app, sqlite_file_app};

const STOCK: usize = 5;
const BUYERS: usize = 20;

/// `BUYERS` pending orders race for `STOCK` codes through `engine`.
async fn concurrent_claims_sell_each_code_once(state: AppState, engine: ClaimEngine) -> anyhow::Result<()> {
    let product_id = product_with_codes(&state, 100, STOCK).await?;

    let mut orders = Vec::with_capacity(BUYERS);
    for _ in 0..BUYERS {
        let user = create_user(&state, 0).await?;
        let placed = place_product_order(&state.orm, &state.claims, user.id, product_id, false).await?;
        orders.push(placed.order.id);
    }

    let handles: Vec<_> = orders
        .iter()
        .map(|&order_id| {
            let state = state.clone();
            tokio::spawn(async move {
                with_retry(&state.tx, "claim_code", || {
                    engine.claim_one(&state.orm, product_id, order_id)
                })
                .await
            })
        })
        .collect();

    let mut won = Vec::new();
    let mut no_stock = 0;
    for handle in handles {
        match handle.await? {
            Ok(code) => won.push(code),
            Err(AppError::NoStock) => no_stock += 1,
            Err(other) => anyhow::bail!("unexpected claim error: {other}"),
        }
    }

    assert_eq!(won.len(), STOCK);
    assert_eq!(no_stock, BUYERS - STOCK);

    let payloads: HashSet<_> = won.iter().map(|c| c.payload.clone()).collect();
    let owners: HashSet<_> = won.iter().filter_map(|c| c.order_id).collect();
    assert_eq!(payloads.len(), STOCK, "a code was handed out twice");
    assert_eq!(owners.len(), STOCK, "an order received two codes");
    assert!(won.iter().all(|c| c.sold && c.sold_at.is_some()));

    let sold = Codes::find()
        .filter(CodeCol::ProductId.eq(product_id))
        .filter(CodeCol::Sold.eq(true))
        .count(&state.orm)
        .await?;
    assert_eq!(sold, STOCK as u64);
    assert_eq!(available_stock(&state.orm, product_id).await?, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn conditional_update_claims_on_sqlite() -> anyhow::Result<()> {
    let app = sqlite_app().await?;
    assert_eq!(app.state.claims.name(), "conditional_update");
    let engine = app.state.claims;
    concurrent_claims_sell_each_code_once(app.state, engine).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn conditional_update_claims_on_sqlite_file() -> anyhow::Result<()> {
    let app = sqlite_file_app().await?;
    let engine = app.state.claims;
    concurrent_claims_sell_each_code_once(app.state.clone(), engine).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn skip_locked_claims_on_postgres() -> anyhow::Result<()> {
    let Some(app) = postgres_app().await? else {
        return Ok(());
    };
    assert_eq!(app.state.claims.name(), "skip_locked");
    concurrent_claims_sell_each_code_once(app.state, ClaimEngine::SkipLocked(SkipLockedClaimer)).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn conditional_update_claims_on_postgres() -> anyhow::Result<()> {
    let Some(app) = postgres_app().await? else {
        return Ok(());
    };
    concurrent_claims_sell_each_code_once(
        app.state,
        ClaimEngine::ConditionalUpdate(ConditionalUpdateClaimer),
    )
    .await
}

#[tokio::test]
async fn empty_pool_reports_no_stock() -> anyhow::Result<()> {
    let app = sqlite_app().await?;
    let state = &app.state;
    let product_id = product_with_codes(state, 100, 1).await?;
    let user = create_user(state, 0).await?;

    let first = place_product_order(&state.orm, &state.claims, user.id, product_id, false).await?;
    let second = place_product_order(&state.orm, &state.claims, user.id, product_id, false).await?;

    let code = state.claims.claim_one(&state.orm, product_id, first.order.id).await?;
    assert_eq!(code.order_id, Some(first.order.id));

    let err = state
        .claims
        .claim_one(&state.orm, product_id, second.order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NoStock));
    Ok(())
}

#[tokio::test]
async fn import_skips_blank_lines_and_unknown_products() -> anyhow::Result<()> {
    let app = sqlite_app().await?;
    let state = &app.state;
    let product_id = product_with_codes(state, 100, 0).await?;

    let lines = vec!["  AAA-1 ".to_string(), String::new(), "   ".into(), "BBB-2".into()];
    assert_eq!(import_codes(&state.orm, product_id, &lines).await?, 2);
    assert_eq!(available_stock(&state.orm, product_id).await?, 2);

    let stored = Codes::find()
        .filter(CodeCol::ProductId.eq(product_id))
        .all(&state.orm)
        .await?;
    assert!(stored.iter().any(|c| c.payload == "AAA-1"));

    let err = import_codes(&state.orm, Uuid::new_v4(), &lines).await.unwrap_err();
    assert!(matches!(err, AppError::ProductNotFound));
    Ok(())
}

#[tokio::test]
async fn ordering_an_empty_product_is_refused() -> anyhow::Result<()> {
    let app = sqlite_app().await?;
    let state = &app.state;
    let product_id = product_with_codes(state, 100, 0).await?;
    let user = create_user(state, 500).await?;

    let err = place_product_order(&state.orm, &state.claims, user.id, product_id, true)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NoStock));
    assert_eq!(support::balance_of(state, user.id).await?, 500);
    Ok(())
}
