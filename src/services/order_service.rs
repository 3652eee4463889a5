use chrono::Utc;
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use sea_orm::sea_query::Expr;
use uuid::Uuid;

use crate::{
    db::{lock_for_update, now, with_retry},
    dto::orders::{CreateOrderRequest, OrderCreated, OrderList, TopUpRequest},
    entity::{
        codes::{Column as CodeCol, Entity as Codes, Model as CodeModel},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        products::{Entity as Products, Model as ProductModel},
        sea_orm_active_enums::{BalanceKind, OrderStatus},
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    events::CommerceEvent,
    gateway,
    middleware::auth::AuthUser,
    models::Order,
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::{
        inventory_service::{ClaimEngine, CodeClaimer, available_stock},
        ledger_service::{BalanceAdjustment, adjust_balance},
    },
    state::AppState,
};

/// `CS` + UTC timestamp + 12 hex chars, sent to the gateway as `out_trade_no`.
pub fn new_correlation_id() -> String {
    let entropy = Uuid::new_v4().simple().to_string();
    format!("CS{}{}", Utc::now().format("%Y%m%d%H%M%S"), &entropy[..12])
}

/// Compare-and-set on the order status. Returns whether this caller moved it.
pub async fn transition<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    from: OrderStatus,
    to: OrderStatus,
) -> AppResult<bool> {
    if !from.can_transition_to(to) {
        return Err(AppError::Internal(anyhow::anyhow!(
            "illegal order transition {from:?} -> {to:?}"
        )));
    }

    let at = now();
    let mut update = Orders::update_many()
        .col_expr(OrderCol::Status, Expr::value(to))
        .col_expr(OrderCol::UpdatedAt, Expr::value(at));
    if to == OrderStatus::Delivered {
        update = update.col_expr(OrderCol::DeliveredAt, Expr::value(at));
    }

    let result = update
        .filter(OrderCol::Id.eq(order_id))
        .filter(OrderCol::Status.eq(from))
        .exec(conn)
        .await?;
    Ok(result.rows_affected == 1)
}

/// `pending -> paid`, recording the gateway trade reference when there is one.
pub async fn mark_paid<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    trade_ref: Option<&str>,
) -> AppResult<bool> {
    let at = now();
    let result = Orders::update_many()
        .col_expr(OrderCol::Status, Expr::value(OrderStatus::Paid))
        .col_expr(OrderCol::TradeRef, Expr::value(trade_ref.map(str::to_string)))
        .col_expr(OrderCol::PaidAt, Expr::value(at))
        .col_expr(OrderCol::UpdatedAt, Expr::value(at))
        .filter(OrderCol::Id.eq(order_id))
        .filter(OrderCol::Status.eq(OrderStatus::Pending))
        .exec(conn)
        .await?;
    Ok(result.rows_affected == 1)
}

async fn move_to<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    from: OrderStatus,
    to: OrderStatus,
) -> AppResult<()> {
    if transition(conn, order_id, from, to).await? {
        Ok(())
    } else {
        Err(AppError::OrmError(DbErr::RecordNotUpdated))
    }
}

pub(crate) async fn load_order<C: ConnectionTrait>(conn: &C, order_id: Uuid) -> AppResult<OrderModel> {
    Orders::find_by_id(order_id)
        .one(conn)
        .await?
        .ok_or(AppError::OrderNotFound)
}

pub(crate) async fn lock_order<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> AppResult<Option<OrderModel>> {
    let backend = conn.get_database_backend();
    Ok(lock_for_update(Orders::find_by_id(order_id), backend)
        .one(conn)
        .await?)
}

#[derive(Debug, Clone)]
pub struct Delivery {
    pub status: OrderStatus,
    pub code: Option<CodeModel>,
}

enum Delivered {
    Code(CodeModel),
    Credit { amount: i64, balance: i64 },
}

/// Deliver a paid order inside a savepoint of `conn`.
///
/// `from` is the status the order currently holds (`paid` or
/// `failed_delivery`). No stock moves it to `paid_no_stock`; any other failure
/// rolls back only the savepoint and leaves it in `failed_delivery` for the
/// retry sweep. Payment capture always survives.
pub async fn deliver<C>(
    conn: &C,
    claims: &ClaimEngine,
    order: &OrderModel,
    from: OrderStatus,
    events: &mut Vec<CommerceEvent>,
) -> AppResult<Delivery>
where
    C: ConnectionTrait + TransactionTrait,
{
    let product = match order.product_id {
        Some(product_id) => Some(
            Products::find_by_id(product_id)
                .one(conn)
                .await?
                .ok_or(AppError::ProductNotFound)?,
        ),
        None => None,
    };

    let step = conn.begin().await?;
    let outcome = delivery_step(&step, claims, order, product.as_ref(), from).await;
    match outcome {
        Ok(delivered) => {
            step.commit().await?;
            let code = match delivered {
                Delivered::Code(code) => {
                    events.push(CommerceEvent::OrderDelivered {
                        order_id: order.id,
                        user_id: order.user_id,
                        product_name: product.map(|p| p.name).unwrap_or_default(),
                        payload: code.payload.clone(),
                    });
                    Some(code)
                }
                Delivered::Credit { amount, balance } => {
                    events.push(CommerceEvent::BalanceCredited {
                        user_id: order.user_id,
                        order_id: Some(order.id),
                        amount,
                        balance,
                    });
                    None
                }
            };
            tracing::info!(order_id = %order.id, "order delivered");
            Ok(Delivery {
                status: OrderStatus::Delivered,
                code,
            })
        }
        Err(AppError::NoStock) => {
            step.rollback().await?;
            move_to(conn, order.id, from, OrderStatus::PaidNoStock).await?;
            events.push(CommerceEvent::OrderNoStock {
                order_id: order.id,
                user_id: order.user_id,
                product_name: product.map(|p| p.name).unwrap_or_default(),
            });
            tracing::warn!(order_id = %order.id, "paid order has no stock to deliver");
            Ok(Delivery {
                status: OrderStatus::PaidNoStock,
                code: None,
            })
        }
        Err(err) => {
            step.rollback().await?;
            tracing::warn!(order_id = %order.id, error = %err, "delivery failed, will retry");
            if from != OrderStatus::FailedDelivery {
                move_to(conn, order.id, from, OrderStatus::FailedDelivery).await?;
            }
            Ok(Delivery {
                status: OrderStatus::FailedDelivery,
                code: None,
            })
        }
    }
}

async fn delivery_step<C>(
    step: &C,
    claims: &ClaimEngine,
    order: &OrderModel,
    product: Option<&ProductModel>,
    from: OrderStatus,
) -> AppResult<Delivered>
where
    C: ConnectionTrait + TransactionTrait,
{
    let delivered = match product {
        Some(product) => {
            let linked = Codes::find()
                .filter(CodeCol::OrderId.eq(order.id))
                .one(step)
                .await?;
            let code = match linked {
                Some(code) => code,
                None => claims.claim_one(step, product.id, order.id).await?,
            };
            Delivered::Code(code)
        }
        None => {
            let entry = adjust_balance(
                step,
                BalanceAdjustment::new(
                    order.user_id,
                    order.amount,
                    BalanceKind::TopUp,
                    format!("top-up {}", order.correlation_id),
                )
                .for_order(order.id),
            )
            .await?;
            Delivered::Credit {
                amount: entry.amount,
                balance: entry.balance_after,
            }
        }
    };

    move_to(step, order.id, from, OrderStatus::Delivered).await?;
    Ok(delivered)
}

#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order: OrderModel,
    pub subject: String,
    pub code: Option<CodeModel>,
    pub events: Vec<CommerceEvent>,
}

fn new_order(
    user_id: Uuid,
    product_id: Option<Uuid>,
    amount: i64,
    balance_used: i64,
) -> OrderActive {
    let at = now();
    OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        product_id: Set(product_id),
        amount: Set(amount),
        balance_used: Set(balance_used),
        payable: Set(amount - balance_used),
        correlation_id: Set(new_correlation_id()),
        trade_ref: Set(None),
        status: Set(OrderStatus::Pending),
        retry_count: Set(0),
        last_retry_at: Set(None),
        created_at: Set(at),
        paid_at: Set(None),
        delivered_at: Set(None),
        updated_at: Set(at),
    }
}

/// Create a product order, optionally settling part or all of it from the
/// user's balance. A fully covered order is paid and delivered before commit.
pub async fn place_product_order<C>(
    conn: &C,
    claims: &ClaimEngine,
    user_id: Uuid,
    product_id: Uuid,
    use_balance: bool,
) -> AppResult<PlacedOrder>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = conn.begin().await?;
    let backend = txn.get_database_backend();

    let product = Products::find_by_id(product_id)
        .one(&txn)
        .await?
        .filter(|p| p.active)
        .ok_or(AppError::ProductNotFound)?;
    if available_stock(&txn, product.id).await? == 0 {
        return Err(AppError::NoStock);
    }

    let user = lock_for_update(Users::find_by_id(user_id), backend)
        .one(&txn)
        .await?
        .ok_or(AppError::UserNotFound)?;

    let used = if use_balance {
        user.balance.min(product.price).max(0)
    } else {
        0
    };

    let order = new_order(user.id, Some(product.id), product.price, used)
        .insert(&txn)
        .await?;

    if used > 0 {
        adjust_balance(
            &txn,
            BalanceAdjustment::new(
                user.id,
                -used,
                BalanceKind::Purchase,
                format!("{} ({})", product.name, order.correlation_id),
            )
            .for_order(order.id),
        )
        .await?;
    }

    let mut events = Vec::new();
    let mut code = None;
    let order = if order.payable == 0 {
        if !mark_paid(&txn, order.id, None).await? {
            return Err(AppError::OrmError(DbErr::RecordNotUpdated));
        }
        let paid = load_order(&txn, order.id).await?;
        code = deliver(&txn, claims, &paid, OrderStatus::Paid, &mut events)
            .await?
            .code;
        load_order(&txn, order.id).await?
    } else {
        order
    };

    txn.commit().await?;

    tracing::info!(
        order_id = %order.id,
        %user_id,
        product_id = %product.id,
        balance_used = order.balance_used,
        payable = order.payable,
        status = ?order.status,
        "order created"
    );
    Ok(PlacedOrder {
        order,
        subject: product.name,
        code,
        events,
    })
}

/// Create a gateway-funded balance top-up.
pub async fn place_topup_order<C>(conn: &C, user_id: Uuid, amount: i64) -> AppResult<PlacedOrder>
where
    C: ConnectionTrait,
{
    if amount <= 0 {
        return Err(AppError::BadRequest("top-up amount must be positive".into()));
    }
    Users::find_by_id(user_id)
        .one(conn)
        .await?
        .ok_or(AppError::UserNotFound)?;

    let order = new_order(user_id, None, amount, 0).insert(conn).await?;
    tracing::info!(order_id = %order.id, %user_id, amount, "top-up order created");
    Ok(PlacedOrder {
        order,
        subject: "Balance top-up".into(),
        code: None,
        events: Vec::new(),
    })
}

fn created_response(state: &AppState, placed: PlacedOrder) -> ApiResponse<OrderCreated> {
    let PlacedOrder {
        order,
        subject,
        code,
        events,
    } = placed;
    state.events.publish_all(events);

    let payment_url = (order.status == OrderStatus::Pending && order.payable > 0).then(|| {
        gateway::payment_url(&state.gateway, &order.correlation_id, &subject, order.payable)
    });

    ApiResponse::success(
        "Order created",
        OrderCreated {
            order: Order::from(order),
            payment_url,
            code: code.map(|c| c.payload),
        },
        Some(Meta::empty()),
    )
}

pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<OrderCreated>> {
    let placed = with_retry(&state.tx, "create_order", || {
        place_product_order(
            &state.orm,
            &state.claims,
            user.user_id,
            payload.product_id,
            payload.use_balance,
        )
    })
    .await?;
    Ok(created_response(state, placed))
}

pub async fn create_topup(
    state: &AppState,
    user: &AuthUser,
    payload: TopUpRequest,
) -> AppResult<ApiResponse<OrderCreated>> {
    let placed = with_retry(&state.tx, "create_topup", || {
        place_topup_order(&state.orm, user.user_id, payload.amount)
    })
    .await?;
    Ok(created_response(state, placed))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
) -> AppResult<ApiResponse<Order>> {
    let order = Orders::find_by_id(order_id)
        .filter(OrderCol::UserId.eq(user.user_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::OrderNotFound)?;
    Ok(ApiResponse::success("OK", order.into(), Some(Meta::empty())))
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        let status = OrderStatus::try_from_value(status)
            .map_err(|_| AppError::BadRequest(format!("unknown order status {status:?}")))?;
        condition = condition.add(OrderCol::Status.eq(status));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Order::from)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Ok",
        OrderList { items: orders },
        Some(meta),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_ids_are_prefixed_and_unique() {
        let a = new_correlation_id();
        let b = new_correlation_id();
        assert!(a.starts_with("CS"));
        assert_eq!(a.len(), 2 + 14 + 12);
        assert!(a[2..16].chars().all(|c| c.is_ascii_digit()));
        assert_ne!(a, b);
    }
}
