//! Checkout endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use checkout::Notifier;
use domain::{OrderStatus, ShippingDetails};
use order_store::Store;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;
use crate::identity::Owner;

#[derive(Deserialize)]
pub struct CheckoutRequest {
    pub recipient_name: String,
    pub email: String,
    pub street: String,
    pub city: String,
    #[serde(default)]
    pub postal_code: String,
    pub country: String,
}

impl CheckoutRequest {
    fn into_shipping(self) -> Result<ShippingDetails, ApiError> {
        for (field, value) in [
            ("recipient_name", &self.recipient_name),
            ("email", &self.email),
            ("street", &self.street),
            ("city", &self.city),
            ("country", &self.country),
        ] {
            if value.trim().is_empty() {
                return Err(ApiError::BadRequest(format!("{field} must not be empty")));
            }
        }
        if !self.email.contains('@') {
            return Err(ApiError::BadRequest(format!(
                "Invalid email: {}",
                self.email
            )));
        }

        Ok(ShippingDetails::new(
            self.recipient_name.trim(),
            self.email.trim(),
            self.street.trim(),
            self.city.trim(),
            self.postal_code.trim(),
            self.country.trim(),
        ))
    }
}

#[derive(Serialize)]
pub struct OrderPlacedResponse {
    pub order_id: String,
    pub status: String,
}

/// POST /checkout: convert the caller's cart into an order.
#[tracing::instrument(skip(state, req))]
pub async fn place_order<S: Store + Clone + 'static, N: Notifier>(
    State(state): State<Arc<AppState<S, N>>>,
    Owner(owner): Owner,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<OrderPlacedResponse>), ApiError> {
    let shipping = req.into_shipping()?;
    let order_id = state.checkout.place_order(owner, shipping).await?;

    let response = OrderPlacedResponse {
        order_id: order_id.to_string(),
        status: OrderStatus::default().to_string(),
    };
    Ok((StatusCode::CREATED, Json(response)))
}
