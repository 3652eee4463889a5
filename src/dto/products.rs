use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Product;

#[derive(Serialize, ToSchema)]
#[serde(transparent)]
pub struct ProductList {
    #[schema(value_type = Vec<Product>)]
    pub items: Vec<Product>,
}

/// One code payload per entry; blank entries are skipped.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ImportCodesRequest {
    pub codes: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ImportCodesResult {
    pub product_id: uuid::Uuid,
    pub imported: u64,
    pub available: u64,
}
