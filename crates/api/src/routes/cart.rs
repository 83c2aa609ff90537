//! Cart endpoints. The cart is selected by the [`Owner`] extractor.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use checkout::{CartView, CheckoutError, Notifier};
use domain::{CartOwner, ProductId};
use order_store::Store;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;
use crate::identity::Owner;

// -- Request types --

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i64,
}

// -- Response types --

#[derive(Serialize)]
pub struct CartResponse {
    pub owner: String,
    pub lines: Vec<CartLineResponse>,
    pub total_cents: i64,
    pub total_quantity: u64,
}

#[derive(Serialize)]
pub struct CartLineResponse {
    pub product_id: String,
    pub product_name: String,
    pub unit_price_cents: i64,
    pub quantity: u32,
    pub subtotal_cents: i64,
}

impl CartResponse {
    fn new(owner: CartOwner, view: CartView) -> Result<Self, ApiError> {
        let lines = view
            .lines
            .iter()
            .map(|line| {
                Ok(CartLineResponse {
                    product_id: line.product_id.to_string(),
                    product_name: line.product_name.clone(),
                    unit_price_cents: line.unit_price.cents(),
                    quantity: line.quantity,
                    subtotal_cents: line.subtotal().map_err(CheckoutError::from)?.cents(),
                })
            })
            .collect::<Result<Vec<_>, ApiError>>()?;

        Ok(Self {
            owner: owner.to_string(),
            lines,
            total_cents: view.total_amount.cents(),
            total_quantity: view.total_quantity,
        })
    }
}

// -- Handlers --

/// GET /cart: current contents of the caller's cart.
#[tracing::instrument(skip(state))]
pub async fn view<S: Store + Clone + 'static, N: Notifier>(
    State(state): State<Arc<AppState<S, N>>>,
    Owner(owner): Owner,
) -> Result<Json<CartResponse>, ApiError> {
    let view = state.carts.view(owner).await?;
    Ok(Json(CartResponse::new(owner, view)?))
}

/// POST /cart/items: add units of a product, merging with an existing line.
#[tracing::instrument(skip(state, req))]
pub async fn add_item<S: Store + Clone + 'static, N: Notifier>(
    State(state): State<Arc<AppState<S, N>>>,
    Owner(owner): Owner,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let product_id = parse_product_id(&req.product_id)?;
    let view = state
        .carts
        .add_item(owner, &product_id, req.quantity)
        .await?;
    Ok(Json(CartResponse::new(owner, view)?))
}

/// PUT /cart/items/:product_id: set a line's quantity; zero or less removes it.
#[tracing::instrument(skip(state, req))]
pub async fn update_item<S: Store + Clone + 'static, N: Notifier>(
    State(state): State<Arc<AppState<S, N>>>,
    Owner(owner): Owner,
    Path(product_id): Path<String>,
    Json(req): Json<UpdateQuantityRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let product_id = parse_product_id(&product_id)?;
    let view = state
        .carts
        .update_quantity(owner, &product_id, req.quantity)
        .await?;
    Ok(Json(CartResponse::new(owner, view)?))
}

/// DELETE /cart/items/:product_id: drop a line.
#[tracing::instrument(skip(state))]
pub async fn remove_item<S: Store + Clone + 'static, N: Notifier>(
    State(state): State<Arc<AppState<S, N>>>,
    Owner(owner): Owner,
    Path(product_id): Path<String>,
) -> Result<Json<CartResponse>, ApiError> {
    let product_id = parse_product_id(&product_id)?;
    let view = state.carts.remove_item(owner, &product_id).await?;
    Ok(Json(CartResponse::new(owner, view)?))
}

/// DELETE /cart: empty the cart.
#[tracing::instrument(skip(state))]
pub async fn clear<S: Store + Clone + 'static, N: Notifier>(
    State(state): State<Arc<AppState<S, N>>>,
    Owner(owner): Owner,
) -> Result<StatusCode, ApiError> {
    state.carts.clear(owner).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn parse_product_id(raw: &str) -> Result<ProductId, ApiError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest("product_id must not be empty".to_string()));
    }
    Ok(ProductId::new(trimmed))
}
