//! Hosted payment gateway client.
//!
//! Deposits are paid on SSLCommerz's hosted page. We open a session for a
//! transaction reference, the customer pays there, and the gateway posts the
//! result back to our callback endpoints. A success callback is only trusted
//! after the validation API confirms it.

use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

use crate::config::SslCommerzConfig;
use crate::domain::value_objects::Money;
use crate::{Result, ShopError};

const SANDBOX_URL: &str = "https://sandbox.sslcommerz.com";
const LIVE_URL: &str = "https://securepay.sslcommerz.com";

#[derive(Clone, Debug)]
pub struct SessionRequest {
    pub tran_id: String,
    pub amount: Money,
    pub currency: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub customer_address: String,
    pub success_url: String,
    pub fail_url: String,
    pub cancel_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentSession {
    pub payment_url: String,
}

/// What the gateway says about a completed payment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedPayment {
    pub tran_id: String,
    pub amount: Decimal,
    pub valid: bool,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(&self, request: &SessionRequest) -> Result<PaymentSession>;
    async fn validate(&self, val_id: &str) -> Result<ValidatedPayment>;
}

pub struct SslCommerzGateway {
    http: reqwest::Client,
    base_url: String,
    store_id: String,
    store_password: SecretString,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    status: String,
    #[serde(rename = "GatewayPageURL")]
    gateway_page_url: Option<String>,
    failedreason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ValidationResponse {
    status: String,
    tran_id: Option<String>,
    amount: Option<String>,
}

impl SslCommerzGateway {
    pub fn new(config: &SslCommerzConfig) -> Result<Self> {
        let base_url = if config.sandbox { SANDBOX_URL } else { LIVE_URL };
        Self::with_base_url(config, base_url)
    }

    pub fn with_base_url(config: &SslCommerzConfig, base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ShopError::Internal(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            store_id: config.store_id.clone(),
            store_password: config.store_password.clone(),
        })
    }
}

#[async_trait]
impl PaymentGateway for SslCommerzGateway {
    async fn create_session(&self, request: &SessionRequest) -> Result<PaymentSession> {
        let amount = request.amount.to_string();
        let form = [
            ("store_id", self.store_id.as_str()),
            ("store_passwd", self.store_password.expose_secret()),
            ("total_amount", amount.as_str()),
            ("currency", request.currency.as_str()),
            ("tran_id", request.tran_id.as_str()),
            ("success_url", request.success_url.as_str()),
            ("fail_url", request.fail_url.as_str()),
            ("cancel_url", request.cancel_url.as_str()),
            ("cus_name", request.customer_name.as_str()),
            ("cus_email", request.customer_email.as_str()),
            ("cus_phone", request.customer_phone.as_str()),
            ("cus_add1", request.customer_address.as_str()),
            ("cus_city", "Dhaka"),
            ("cus_country", "Bangladesh"),
            ("shipping_method", "NO"),
            ("num_of_item", "1"),
            ("product_name", "Wallet deposit"),
            ("product_category", "General"),
            ("product_profile", "general"),
        ];
        let response: SessionResponse = self
            .http
            .post(format!("{}/gwprocess/v4/api.php", self.base_url))
            .form(&form)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ShopError::Gateway(e.to_string()))?
            .json()
            .await
            .map_err(|e| ShopError::Gateway(format!("unreadable session response: {e}")))?;

        match (response.status.as_str(), response.gateway_page_url) {
            ("SUCCESS", Some(payment_url)) if !payment_url.is_empty() => Ok(PaymentSession { payment_url }),
            _ => Err(ShopError::Gateway(
                response.failedreason.unwrap_or_else(|| "Payment initiation failed".into()),
            )),
        }
    }

    async fn validate(&self, val_id: &str) -> Result<ValidatedPayment> {
        let response: ValidationResponse = self
            .http
            .get(format!("{}/validator/api/validationserverAPI.php", self.base_url))
            .query(&[
                ("val_id", val_id),
                ("store_id", self.store_id.as_str()),
                ("store_passwd", self.store_password.expose_secret()),
                ("format", "json"),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ShopError::Gateway(e.to_string()))?
            .json()
            .await
            .map_err(|e| ShopError::Gateway(format!("unreadable validation response: {e}")))?;
        Ok(parse_validation(response))
    }
}

fn parse_validation(response: ValidationResponse) -> ValidatedPayment {
    let amount = response.amount.as_deref().and_then(|a| Decimal::from_str(a.trim()).ok());
    let valid = matches!(response.status.as_str(), "VALID" | "VALIDATED") && amount.is_some();
    ValidatedPayment {
        tran_id: response.tran_id.unwrap_or_default(),
        amount: amount.unwrap_or_default(),
        valid,
    }
}

/// Used when no gateway credentials are configured; every call fails.
pub struct UnconfiguredGateway;

#[async_trait]
impl PaymentGateway for UnconfiguredGateway {
    async fn create_session(&self, _request: &SessionRequest) -> Result<PaymentSession> {
        Err(ShopError::Gateway("Payment gateway is not configured".into()))
    }

    async fn validate(&self, _val_id: &str) -> Result<ValidatedPayment> {
        Err(ShopError::Gateway("Payment gateway is not configured".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: &str, amount: Option<&str>) -> ValidationResponse {
        ValidationResponse {
            status: status.into(),
            tran_id: Some("dep_1".into()),
            amount: amount.map(String::from),
        }
    }

    #[test]
    fn test_validation_statuses() {
        let ok = parse_validation(response("VALID", Some("250.00")));
        assert!(ok.valid);
        assert_eq!(ok.amount, Decimal::new(25000, 2));
        assert!(parse_validation(response("VALIDATED", Some("1"))).valid);
        assert!(!parse_validation(response("INVALID_TRANSACTION", Some("250.00"))).valid);
        assert!(!parse_validation(response("VALID", Some("abc"))).valid);
    }

    #[test]
    fn test_session_response_shape() {
        let body = r#"{"status":"SUCCESS","GatewayPageURL":"https://pay.example/s/1","sessionkey":"k"}"#;
        let parsed: SessionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.gateway_page_url.as_deref(), Some("https://pay.example/s/1"));
    }

    #[tokio::test]
    async fn test_unconfigured_gateway_fails() {
        assert!(matches!(UnconfiguredGateway.validate("v").await, Err(ShopError::Gateway(_))));
    }
}
