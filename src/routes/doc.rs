use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        balance::{BalanceView, LedgerList, LedgerReport},
        cards::{CardList, GenerateCardsRequest, RedeemCardRequest, RedeemResult},
        orders::{CreateOrderRequest, OrderCreated, OrderList, TopUpRequest},
        products::{ImportCodesRequest, ImportCodesResult, ProductList},
        users::{EnsureUserRequest, UserSession},
    },
    entity::sea_orm_active_enums::{BalanceKind, OrderStatus},
    models::{BalanceTransaction, Order, Product, RechargeCard, User},
    response::{ApiResponse, ErrorBody, Meta},
    routes::{admin, balance, cards, health, orders, params, payments, products, users},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        health::readiness,
        payments::notify_get,
        payments::notify_post,
        products::list_products,
        orders::list_orders,
        orders::create_order,
        orders::create_topup,
        orders::get_order,
        balance::get_balance,
        balance::list_transactions,
        cards::redeem_card,
        users::ensure_user,
        admin::import_codes,
        admin::generate_cards,
        admin::ledger_check
    ),
    components(
        schemas(
            User,
            Product,
            Order,
            OrderStatus,
            BalanceKind,
            BalanceTransaction,
            RechargeCard,
            ProductList,
            OrderList,
            OrderCreated,
            CreateOrderRequest,
            TopUpRequest,
            BalanceView,
            LedgerList,
            LedgerReport,
            RedeemCardRequest,
            RedeemResult,
            GenerateCardsRequest,
            CardList,
            ImportCodesRequest,
            ImportCodesResult,
            EnsureUserRequest,
            UserSession,
            params::Pagination,
            params::OrderListQuery,
            Meta,
            ErrorBody,
            health::HealthData,
            health::ReadinessData,
            ApiResponse<ProductList>,
            ApiResponse<OrderCreated>,
            ApiResponse<OrderList>,
            ApiResponse<Order>,
            ApiResponse<BalanceView>,
            ApiResponse<LedgerList>,
            ApiResponse<RedeemResult>,
            ApiResponse<UserSession>,
            ApiResponse<CardList>,
            ApiResponse<ImportCodesResult>,
            ApiResponse<LedgerReport>,
            ApiResponse<ErrorBody>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Payments", description = "Payment gateway callback"),
        (name = "Products", description = "Product catalog"),
        (name = "Orders", description = "Order endpoints"),
        (name = "Balance", description = "Balance and ledger"),
        (name = "Cards", description = "Recharge cards"),
        (name = "Users", description = "User provisioning"),
        (name = "Admin", description = "Admin endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
