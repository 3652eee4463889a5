use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set,
    TransactionTrait, prelude::DateTimeWithTimeZone,
};
use sea_orm::sea_query::{Expr, OnConflict};
use uuid::Uuid;

use crate::{
    audit,
    db::{lock_for_update, now, with_retry},
    dto::cards::{GenerateCardsRequest, RedeemCardRequest, RedeemResult},
    entity::{
        balance_transactions::Model as LedgerModel,
        recharge_card_usages::{
            ActiveModel as UsageActive, Column as UsageCol, Entity as RechargeCardUsages,
        },
        recharge_cards::{
            ActiveModel as CardActive, Column as CardCol, Entity as RechargeCards,
            Model as CardModel,
        },
        sea_orm_active_enums::BalanceKind,
    },
    error::{AppError, AppResult},
    events::CommerceEvent,
    middleware::auth::AuthUser,
    response::{ApiResponse, Meta},
    services::ledger_service::{BalanceAdjustment, adjust_balance},
    state::AppState,
};

const MAX_CARDS_PER_BATCH: u32 = 1000;

#[derive(Debug, Clone)]
pub struct Redemption {
    pub card: CardModel,
    pub entry: LedgerModel,
}

pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// `PREFIX-XXXX-XXXX-XXXX-XXXX` with upper-case hex groups.
pub fn new_card_code(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string().to_uppercase();
    // Index 12 is the fixed UUIDv4 version nibble.
    format!(
        "{}-{}-{}-{}-{}",
        normalize_code(prefix),
        &hex[0..4],
        &hex[4..8],
        &hex[8..12],
        &hex[13..17]
    )
}

/// A card stays redeemable up to and including the instant it expires.
pub fn is_expired(card: &CardModel, at: DateTimeWithTimeZone) -> bool {
    card.expires_at.is_some_and(|expires| expires < at)
}

fn exhausted(card: &CardModel) -> AppError {
    if card.max_uses == 1 {
        AppError::CardAlreadyUsed
    } else {
        AppError::CardMaxUsesReached
    }
}

/// Redeem a card for `user_id` and credit its face amount in one transaction.
///
/// Every check runs before any counter moves; both counters are bumped with
/// guarded updates, so the caps hold even where rows cannot be locked.
pub async fn redeem_card<C>(conn: &C, raw_code: &str, user_id: Uuid) -> AppResult<Redemption>
where
    C: ConnectionTrait + TransactionTrait,
{
    let code = normalize_code(raw_code);
    if code.is_empty() {
        return Err(AppError::CardNotFound);
    }

    let txn = conn.begin().await?;
    let backend = txn.get_database_backend();

    let card = lock_for_update(RechargeCards::find().filter(CardCol::Code.eq(code.as_str())), backend)
        .one(&txn)
        .await?
        .ok_or(AppError::CardNotFound)?;

    let at = now();
    if is_expired(&card, at) {
        return Err(AppError::CardExpired);
    }
    if card.used_count >= card.max_uses {
        return Err(exhausted(&card));
    }

    RechargeCardUsages::insert(UsageActive {
        id: Set(Uuid::new_v4()),
        card_id: Set(card.id),
        user_id: Set(user_id),
        use_count: Set(0),
        last_used_at: Set(at),
    })
    .on_conflict(
        OnConflict::columns([UsageCol::CardId, UsageCol::UserId])
            .do_nothing()
            .to_owned(),
    )
    .exec_without_returning(&txn)
    .await?;

    let usage = lock_for_update(
        RechargeCardUsages::find()
            .filter(UsageCol::CardId.eq(card.id))
            .filter(UsageCol::UserId.eq(user_id)),
        backend,
    )
    .one(&txn)
    .await?
    .ok_or_else(|| AppError::OrmError(DbErr::RecordNotFound("recharge card usage".into())))?;

    if usage.use_count >= card.max_uses_per_user {
        return Err(AppError::CardMaxUsesPerUserReached);
    }

    let bumped = RechargeCards::update_many()
        .col_expr(CardCol::UsedCount, Expr::col(CardCol::UsedCount).add(1))
        .filter(CardCol::Id.eq(card.id))
        .filter(Expr::col(CardCol::UsedCount).lt(Expr::col(CardCol::MaxUses)))
        .exec(&txn)
        .await?;
    if bumped.rows_affected == 0 {
        return Err(exhausted(&card));
    }

    let bumped = RechargeCardUsages::update_many()
        .col_expr(UsageCol::UseCount, Expr::col(UsageCol::UseCount).add(1))
        .col_expr(UsageCol::LastUsedAt, Expr::value(at))
        .filter(UsageCol::Id.eq(usage.id))
        .filter(UsageCol::UseCount.lt(card.max_uses_per_user))
        .exec(&txn)
        .await?;
    if bumped.rows_affected == 0 {
        return Err(AppError::CardMaxUsesPerUserReached);
    }

    let entry = adjust_balance(
        &txn,
        BalanceAdjustment::new(
            user_id,
            card.amount,
            BalanceKind::TopUp,
            format!("recharge card {code}"),
        )
        .for_card(card.id),
    )
    .await?;

    txn.commit().await?;

    tracing::info!(%user_id, card_id = %card.id, amount = card.amount, "recharge card redeemed");
    Ok(Redemption { card, entry })
}

pub async fn redeem(
    state: &AppState,
    user: &AuthUser,
    payload: RedeemCardRequest,
) -> AppResult<ApiResponse<RedeemResult>> {
    let redemption = with_retry(&state.tx, "redeem_card", || {
        redeem_card(&state.orm, &payload.code, user.user_id)
    })
    .await
    .inspect_err(|err| {
        if err.is_business_rule() {
            tracing::info!(user_id = %user.user_id, code = err.code(), "card redemption refused");
        }
    })?;

    let Redemption { card, entry } = redemption;
    state.events.publish(CommerceEvent::CardRedeemed {
        user_id: user.user_id,
        card_code: card.code.clone(),
        amount: entry.amount,
        balance: entry.balance_after,
    });
    audit::record(
        &state.orm,
        Some(user.user_id),
        audit::CARD_REDEEMED,
        Some("recharge_cards"),
        serde_json::json!({ "card_id": card.id, "amount": entry.amount }),
    )
    .await;

    Ok(ApiResponse::success(
        "Card redeemed",
        RedeemResult {
            card_id: card.id,
            amount: entry.amount,
            balance: entry.balance_after,
        },
        Some(Meta::empty()),
    ))
}

pub async fn generate_cards<C>(conn: &C, request: &GenerateCardsRequest) -> AppResult<Vec<CardModel>>
where
    C: ConnectionTrait + TransactionTrait,
{
    let prefix = normalize_code(&request.prefix);
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::BadRequest("prefix must be non-empty and alphanumeric".into()));
    }
    if request.count == 0 || request.count > MAX_CARDS_PER_BATCH {
        return Err(AppError::BadRequest(format!(
            "count must be between 1 and {MAX_CARDS_PER_BATCH}"
        )));
    }
    if request.amount <= 0 {
        return Err(AppError::BadRequest("amount must be positive".into()));
    }
    if request.max_uses < 1 || request.max_uses_per_user < 1 {
        return Err(AppError::BadRequest("use limits must be at least 1".into()));
    }
    if request.expires_at.is_some_and(|at| at <= Utc::now()) {
        return Err(AppError::BadRequest("expires_at must be in the future".into()));
    }

    let txn = conn.begin().await?;
    let created_at = now();
    let mut cards = Vec::with_capacity(request.count as usize);
    for _ in 0..request.count {
        let card = CardActive {
            id: Set(Uuid::new_v4()),
            code: Set(new_card_code(&prefix)),
            amount: Set(request.amount),
            max_uses: Set(request.max_uses),
            max_uses_per_user: Set(request.max_uses_per_user),
            used_count: Set(0),
            expires_at: Set(request.expires_at.map(|at| at.fixed_offset())),
            created_at: Set(created_at),
        }
        .insert(&txn)
        .await?;
        cards.push(card);
    }
    txn.commit().await?;

    tracing::info!(prefix, count = cards.len(), amount = request.amount, "recharge cards generated");
    Ok(cards)
}
