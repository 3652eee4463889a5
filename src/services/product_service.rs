use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use uuid::Uuid;

use crate::{
    dto::products::ProductList,
    entity::{
        codes::{Column as CodeCol, Entity as Codes},
        products::{Column as ProdCol, Entity as Products, Model as ProductModel},
    },
    error::AppResult,
    models::Product,
    response::{ApiResponse, Meta},
    state::AppState,
};

/// Unsold code counts per product, in one grouped query.
pub async fn stock_by_product<C: ConnectionTrait>(conn: &C) -> AppResult<HashMap<Uuid, u64>> {
    let rows: Vec<(Uuid, i64)> = Codes::find()
        .select_only()
        .column(CodeCol::ProductId)
        .column_as(CodeCol::Id.count(), "available")
        .filter(CodeCol::Sold.eq(false))
        .group_by(CodeCol::ProductId)
        .into_tuple()
        .all(conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(product_id, n)| (product_id, n.max(0) as u64))
        .collect())
}

pub async fn list_products(state: &AppState) -> AppResult<ApiResponse<ProductList>> {
    let products = Products::find()
        .filter(ProdCol::Active.eq(true))
        .order_by_asc(ProdCol::Name)
        .all(&state.orm)
        .await?;
    let stock = stock_by_product(&state.orm).await?;

    let items: Vec<Product> = products
        .into_iter()
        .map(|model| {
            let available = stock.get(&model.id).copied().unwrap_or(0);
            product_from_entity(model, available)
        })
        .collect();

    let total = items.len() as i64;
    Ok(ApiResponse::success(
        "Products",
        ProductList { items },
        Some(Meta::new(1, total, total)),
    ))
}

fn product_from_entity(model: ProductModel, available: u64) -> Product {
    Product {
        id: model.id,
        name: model.name,
        description: model.description,
        price: model.price,
        active: model.active,
        available,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
