//! HTTP client for the Alfred payment gateway.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};

use super::{CreateTransactionRequest, GatewayTransaction, GatewayTransactionStatus, PaymentGateway};
use crate::config::GatewayConfig;
use crate::error::AppError;

/// Alfred gateway client.
///
/// Every call is bounded by the configured timeout; a timeout or transport
/// error surfaces as `AppError::Gateway` and means "status unknown this
/// round" to the reconciliation paths.
pub struct AlfredClient {
    http: reqwest::Client,
    base_url: String,
}

impl AlfredClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, AppError> {
        let mut headers = HeaderMap::new();
        let mut api_key = HeaderValue::from_str(&config.api_key)
            .map_err(|_| AppError::Internal("Invalid gateway API key".to_string()))?;
        api_key.set_sensitive(true);
        headers.insert("x-api-key", api_key);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build gateway client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl PaymentGateway for AlfredClient {
    async fn create_transaction(
        &self,
        request: &CreateTransactionRequest,
    ) -> Result<GatewayTransaction, AppError> {
        let response = self
            .http
            .post(self.url("/v1/transactions"))
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("createTransaction failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Gateway(format!(
                "createTransaction returned HTTP {}",
                response.status()
            )));
        }

        response
            .json::<GatewayTransaction>()
            .await
            .map_err(|e| AppError::Gateway(format!("createTransaction bad response: {}", e)))
    }

    async fn get_transaction_status(
        &self,
        transaction_id: &str,
    ) -> Result<GatewayTransactionStatus, AppError> {
        let response = self
            .http
            .get(self.url(&format!("/v1/transactions/{}/status", transaction_id)))
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("getTransactionStatus failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Gateway(format!(
                "getTransactionStatus returned HTTP {}",
                response.status()
            )));
        }

        response
            .json::<GatewayTransactionStatus>()
            .await
            .map_err(|e| AppError::Gateway(format!("getTransactionStatus bad response: {}", e)))
    }
}
