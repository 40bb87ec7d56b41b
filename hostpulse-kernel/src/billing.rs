/**
 * BILLING WRAPPER - WHMCS API client
 *
 * ROLE:
 * Thin typed layer over the single WHMCS entry point: every call is a
 * form-encoded POST carrying `action`, the API credentials and
 * `responsetype=json`, answered by `{result, message?, ...}`.
 *
 * ERROR CONVENTION:
 * Reads and orders return `Result<_, BillingError>`. `update_client`,
 * `delete_client` and `close_client` answer `bool` and only log failures;
 * callers of those never see the upstream message.
 */

use crate::config::BillingConf;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("billing request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("billing API answered HTTP {0}")]
    HttpStatus(u16),
    #[error("billing API error: {0}")]
    Upstream(String),
    #[error("unexpected billing response: {0}")]
    Shape(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_id: u64,
    pub product_id: u64,
    pub payment_method: String,
    #[serde(default)]
    pub billing_cycle: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: u64,
    pub invoice_id: Option<u64>,
}

#[derive(Clone)]
pub struct BillingClient {
    client: reqwest::Client,
    api_url: String,
    identifier: String,
    secret: String,
}

impl BillingClient {
    pub fn new(cfg: &BillingConf, timeout: Duration) -> Result<Self, BillingError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: cfg.api_url.clone(),
            identifier: cfg.identifier.clone(),
            secret: cfg.secret.clone(),
        })
    }

    /// Raw call. Fails unless the body says `result: success`.
    pub async fn call(&self, action: &str, params: &[(&str, String)]) -> Result<Value, BillingError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("action", action),
            ("identifier", self.identifier.as_str()),
            ("secret", self.secret.as_str()),
            ("responsetype", "json"),
        ];
        form.extend(params.iter().map(|(k, v)| (*k, v.as_str())));

        debug!("billing call {}", action);
        let response = self.client.post(&self.api_url).form(&form).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BillingError::HttpStatus(status.as_u16()));
        }
        let body: Value = response.json().await?;
        match body.get("result").and_then(Value::as_str) {
            Some("success") => Ok(body),
            _ => Err(BillingError::Upstream(
                body.get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            )),
        }
    }

    pub async fn get_client_details(&self, client_id: u64) -> Result<Value, BillingError> {
        let body = self
            .call("GetClientsDetails", &[("clientid", client_id.to_string()), ("stats", "true".into())])
            .await?;
        body.get("client")
            .cloned()
            .ok_or_else(|| BillingError::Shape("missing client".into()))
    }

    pub async fn get_products(&self) -> Result<Vec<Value>, BillingError> {
        let body = self.call("GetProducts", &[]).await?;
        Ok(product_list(&body))
    }

    pub async fn get_client_products(&self, client_id: u64) -> Result<Vec<Value>, BillingError> {
        let body = self
            .call("GetClientsProducts", &[("clientid", client_id.to_string())])
            .await?;
        Ok(product_list(&body))
    }

    pub async fn add_order(&self, order: &OrderRequest) -> Result<OrderResult, BillingError> {
        let mut params = vec![
            ("clientid", order.client_id.to_string()),
            ("pid[0]", order.product_id.to_string()),
            ("paymentmethod", order.payment_method.clone()),
        ];
        if let Some(cycle) = &order.billing_cycle {
            params.push(("billingcycle[0]", cycle.clone()));
        }
        if let Some(domain) = &order.domain {
            params.push(("domain[0]", domain.clone()));
        }
        let body = self.call("AddOrder", &params).await?;
        let order_id = id_field(&body, "orderid").ok_or_else(|| BillingError::Shape("missing orderid".into()))?;
        Ok(OrderResult {
            order_id,
            invoice_id: id_field(&body, "invoiceid"),
        })
    }

    pub async fn update_client(&self, client_id: u64, fields: &BTreeMap<String, String>) -> bool {
        let mut params = vec![("clientid", client_id.to_string())];
        params.extend(fields.iter().map(|(k, v)| (k.as_str(), v.clone())));
        self.call_flag("UpdateClient", &params).await
    }

    pub async fn delete_client(&self, client_id: u64) -> bool {
        self.call_flag("DeleteClient", &[("clientid", client_id.to_string())]).await
    }

    pub async fn close_client(&self, client_id: u64) -> bool {
        self.call_flag("CloseClient", &[("clientid", client_id.to_string())]).await
    }

    async fn call_flag(&self, action: &str, params: &[(&str, String)]) -> bool {
        match self.call(action, params).await {
            Ok(_) => true,
            Err(e) => {
                warn!("{} failed: {}", action, e);
                false
            }
        }
    }
}

/// WHMCS nests lists as `{products: {product: [...]}}`, with `""` when empty.
fn product_list(body: &Value) -> Vec<Value> {
    body.pointer("/products/product")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Ids come back as numbers or numeric strings depending on the action.
fn id_field(body: &Value, key: &str) -> Option<u64> {
    match body.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
