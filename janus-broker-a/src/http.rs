//! Synchronous HTTP dispatch for broker A, run on a worker pool via
//! `tokio::task::spawn_blocking` so the blocking SDK never touches an async
//! runtime thread (§4.6, §5 "dispatched to the broker-A worker pool").

use crate::error::BrokerAError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct PlaceOrderRequest {
    pub client_order_id: String,
    pub symbol: String,
    pub side: String,
    pub order_type: String,
    pub qty: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<Decimal>,
    pub tif: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrderResponse {
    pub order_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenOrderResponse {
    pub order_id: String,
    pub client_order_id: String,
    pub symbol: String,
    pub side: String,
    pub order_type: String,
    pub qty: Decimal,
    pub filled_qty: Decimal,
    #[serde(default)]
    pub limit_price: Option<Decimal>,
    #[serde(default)]
    pub stop_price: Option<Decimal>,
    pub tif: String,
    pub order_status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PositionResponse {
    pub symbol: String,
    pub qty: Decimal,
    pub avg_price: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountResponse {
    pub currency: String,
    pub net_liquidation: Decimal,
    pub available_funds: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContractQueryRequest {
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractResponse {
    pub ticker: String,
    #[serde(default)]
    pub description: String,
}

/// Thin synchronous client; every public method blocks the calling thread
/// and is meant to be invoked only from inside `spawn_blocking`.
#[derive(Debug, Clone)]
pub struct HttpDispatch {
    client: reqwest::blocking::Client,
    base_url: Arc<str>,
    api_key: Arc<str>,
}

impl HttpDispatch {
    pub fn new(base_url: String, api_key: String) -> Result<Self, BrokerAError> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(BrokerAError::Http)?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth(&self, builder: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        builder.bearer_auth(&*self.api_key)
    }

    pub fn place_order(&self, request: &PlaceOrderRequest) -> Result<PlaceOrderResponse, BrokerAError> {
        let response = self
            .auth(self.client.post(self.url("/orders")))
            .json(request)
            .send()
            .map_err(BrokerAError::Http)?;
        decode(response)
    }

    pub fn cancel_order(&self, order_id: &str) -> Result<(), BrokerAError> {
        let response = self
            .auth(self.client.delete(self.url(&format!("/orders/{order_id}"))))
            .send()
            .map_err(BrokerAError::Http)?;
        ensure_success(response)?;
        Ok(())
    }

    pub fn query_open_orders(&self) -> Result<Vec<OpenOrderResponse>, BrokerAError> {
        let response = self
            .auth(self.client.get(self.url("/orders")))
            .send()
            .map_err(BrokerAError::Http)?;
        decode(response)
    }

    pub fn query_positions(&self) -> Result<Vec<PositionResponse>, BrokerAError> {
        let response = self
            .auth(self.client.get(self.url("/positions")))
            .send()
            .map_err(BrokerAError::Http)?;
        decode(response)
    }

    pub fn query_account(&self) -> Result<AccountResponse, BrokerAError> {
        let response = self
            .auth(self.client.get(self.url("/account")))
            .send()
            .map_err(BrokerAError::Http)?;
        decode(response)
    }

    pub fn query_contract_details(
        &self,
        request: &ContractQueryRequest,
    ) -> Result<Vec<ContractResponse>, BrokerAError> {
        let response = self
            .auth(self.client.get(self.url("/contracts")))
            .query(request)
            .send()
            .map_err(BrokerAError::Http)?;
        decode(response)
    }
}

fn ensure_success(response: reqwest::blocking::Response) -> Result<reqwest::blocking::Response, BrokerAError> {
    match response.status() {
        status if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN => {
            Err(BrokerAError::AuthError(format!("status {status}")))
        }
        status if status == reqwest::StatusCode::TOO_MANY_REQUESTS => {
            Err(BrokerAError::ConnectionLimitExceeded)
        }
        status if status.is_success() => Ok(response),
        status => Err(BrokerAError::BadResponse(format!("unexpected status {status}"))),
    }
}

fn decode<T: serde::de::DeserializeOwned>(response: reqwest::blocking::Response) -> Result<T, BrokerAError> {
    let response = ensure_success(response)?;
    response.json::<T>().map_err(BrokerAError::Http)
}
