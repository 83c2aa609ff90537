//! Order lookup.

use std::str::FromStr;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use checkout::Notifier;
use common::OrderId;
use domain::{Order, ShippingDetails};
use order_store::Store;
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;
use crate::identity::Owner;

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub user_id: Option<String>,
    pub status: String,
    pub created_at: String,
    pub total_cents: i64,
    pub shipping: ShippingDetails,
    pub lines: Vec<OrderLineResponse>,
}

#[derive(Serialize)]
pub struct OrderLineResponse {
    pub product_id: String,
    pub product_name: String,
    pub description: String,
    pub unit_price_cents: i64,
    pub quantity: u32,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id().to_string(),
            user_id: order.user_id().map(|id| id.to_string()),
            status: order.status().to_string(),
            created_at: order.created_at().to_rfc3339(),
            total_cents: order.total_amount().cents(),
            lines: order
                .lines()
                .iter()
                .map(|line| OrderLineResponse {
                    product_id: line.product_id.to_string(),
                    product_name: line.product_name.clone(),
                    description: line.description.clone(),
                    unit_price_cents: line.unit_price.cents(),
                    quantity: line.quantity,
                })
                .collect(),
            shipping: order.shipping().clone(),
        }
    }
}

/// GET /orders/:id: load a committed order by ID.
///
/// An order is only visible to the user who placed it; guest orders only to
/// guests. Anyone else gets the same 404 as for a missing order.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static, N: Notifier>(
    State(state): State<Arc<AppState<S, N>>>,
    Owner(owner): Owner,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = OrderId::from_str(&id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid order id: {e}")))?;
    let not_found = || ApiError::NotFound(format!("Order {id} not found"));

    let order = state.store.get_order(order_id).await?.ok_or_else(not_found)?;
    if order.user_id() != owner.user_id() {
        tracing::debug!(%order_id, "order requested by another owner");
        return Err(not_found());
    }
    Ok(Json(order.into()))
}
