//! Pix Gateway Integration
//!
//! The payment processor is an opaque external collaborator: we create
//! a charge, we ask for its settlement state, nothing else. The HTTP
//! implementation speaks the processor's payments API directly; the
//! mock scripts settlement sequences for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

use crate::charge::{Charge, ChargeRequest, PaymentStatus};
use crate::error::{PaymentError, Result};

/// Gateway client trait
#[async_trait]
pub trait PixGateway: Send + Sync {
    /// Create a Pix charge. Failure here is fatal to the flow and
    /// leaves no local state behind.
    async fn create_charge(&self, request: &ChargeRequest) -> Result<Charge>;

    /// Current settlement state of a charge. Callers decide whether an
    /// error is transient (the poller retries) or maps to pending (the
    /// proxy endpoint).
    async fn charge_status(&self, charge_id: &str) -> Result<PaymentStatus>;
}

/// Gateway configuration
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Processor API base URL
    pub base_url: String,

    /// Bearer token for the processor API
    pub access_token: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            access_token: access_token.into(),
            timeout_secs: 30,
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let access_token = std::env::var("PIX_ACCESS_TOKEN")
            .map_err(|_| PaymentError::Config("PIX_ACCESS_TOKEN not set".into()))?;
        let base_url = std::env::var("PIX_GATEWAY_URL")
            .unwrap_or_else(|_| "https://api.mercadopago.com".into());
        Ok(Self::new(base_url, access_token))
    }
}

/// Charge body in the processor's wire format. Amounts go out as JSON
/// numbers, which is what the processor expects.
#[derive(Serialize)]
struct WireCharge<'a> {
    #[serde(with = "rust_decimal::serde::float")]
    transaction_amount: Decimal,
    description: &'a str,
    payment_method_id: &'static str,
    payer: WirePayer<'a>,
}

#[derive(Serialize)]
struct WirePayer<'a> {
    email: &'a str,
}

/// HTTP implementation of [`PixGateway`]
pub struct HttpPixGateway {
    client: Client,
    config: GatewayConfig,
}

impl HttpPixGateway {
    pub fn new(config: GatewayConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(GatewayConfig::from_env()?))
    }

    fn payments_url(&self) -> String {
        format!(
            "{}/v1/payments",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl PixGateway for HttpPixGateway {
    async fn create_charge(&self, request: &ChargeRequest) -> Result<Charge> {
        let body = WireCharge {
            transaction_amount: request.amount,
            description: &request.description,
            payment_method_id: "pix",
            payer: WirePayer {
                email: &request.payer_email,
            },
        };

        let response = self
            .client
            .post(self.payments_url())
            .bearer_auth(&self.config.access_token)
            .header("X-Idempotency-Key", uuid::Uuid::new_v4().to_string())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let payload: Value = response.json().await?;

        if !status.is_success() {
            return Err(PaymentError::Gateway(gateway_message(&payload)));
        }

        parse_charge(&payload)
    }

    async fn charge_status(&self, charge_id: &str) -> Result<PaymentStatus> {
        let response = self
            .client
            .get(format!("{}/{charge_id}", self.payments_url()))
            .bearer_auth(&self.config.access_token)
            .send()
            .await?;

        let status = response.status();
        let payload: Value = response.json().await?;

        if !status.is_success() {
            return Err(PaymentError::Gateway(gateway_message(&payload)));
        }

        Ok(payload
            .get("status")
            .and_then(Value::as_str)
            .map_or(PaymentStatus::Pending, PaymentStatus::parse))
    }
}

/// Reshape the processor's charge payload into a [`Charge`]. Missing
/// QR fields mean the charge is unusable and count as a failure.
fn parse_charge(payload: &Value) -> Result<Charge> {
    let id = match payload.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(PaymentError::MalformedCharge("missing charge id".into())),
    };

    let transaction = payload
        .pointer("/point_of_interaction/transaction_data")
        .ok_or_else(|| PaymentError::MalformedCharge("missing transaction data".into()))?;

    let qr_code = transaction
        .get("qr_code")
        .and_then(Value::as_str)
        .ok_or_else(|| PaymentError::MalformedCharge("missing qr_code".into()))?;
    let qr_code_base64 = transaction
        .get("qr_code_base64")
        .and_then(Value::as_str)
        .ok_or_else(|| PaymentError::MalformedCharge("missing qr_code_base64".into()))?;

    let status = payload
        .get("status")
        .and_then(Value::as_str)
        .map_or(PaymentStatus::Pending, PaymentStatus::parse);

    Ok(Charge {
        id,
        qr_code: qr_code.to_string(),
        qr_code_base64: qr_code_base64.to_string(),
        status,
    })
}

/// Error message from a gateway payload, with a generic fallback.
fn gateway_message(payload: &Value) -> String {
    for key in ["message", "error"] {
        if let Some(msg) = payload.get(key).and_then(Value::as_str) {
            if !msg.is_empty() {
                return msg.to_string();
            }
        }
    }
    "charge generation failed".to_string()
}

/// One scripted poll answer for the mock gateway.
enum StatusStep {
    Status(PaymentStatus),
    Fail,
}

/// Mock gateway with scripted settlement sequences.
///
/// Once the script runs out, every further poll answers with the
/// configured final status (pending by default).
pub struct MockPixGateway {
    charge_error: Option<String>,
    script: Mutex<VecDeque<StatusStep>>,
    final_status: PaymentStatus,
    status_calls: AtomicUsize,
}

impl Default for MockPixGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPixGateway {
    pub fn new() -> Self {
        Self {
            charge_error: None,
            script: Mutex::new(VecDeque::new()),
            final_status: PaymentStatus::Pending,
            status_calls: AtomicUsize::new(0),
        }
    }

    /// Answer `pending` for `ticks` polls, then `approved` forever.
    pub fn approving_after(ticks: usize) -> Self {
        let mut gateway = Self::new();
        for _ in 0..ticks {
            gateway
                .script
                .get_mut()
                .unwrap()
                .push_back(StatusStep::Status(PaymentStatus::Pending));
        }
        gateway.final_status = PaymentStatus::Approved;
        gateway
    }

    /// Reject charge creation with the given gateway message.
    pub fn failing_charge(message: impl Into<String>) -> Self {
        let mut gateway = Self::new();
        gateway.charge_error = Some(message.into());
        gateway
    }

    /// Append a scripted poll answer.
    pub fn push_status(&self, status: PaymentStatus) {
        self.script
            .lock()
            .unwrap()
            .push_back(StatusStep::Status(status));
    }

    /// Append a scripted poll failure.
    pub fn push_failure(&self) {
        self.script.lock().unwrap().push_back(StatusStep::Fail);
    }

    /// How many times the settlement state was polled.
    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PixGateway for MockPixGateway {
    async fn create_charge(&self, request: &ChargeRequest) -> Result<Charge> {
        if let Some(ref message) = self.charge_error {
            return Err(PaymentError::Gateway(message.clone()));
        }
        Ok(Charge {
            id: format!("charge-{}", uuid::Uuid::new_v4().simple()),
            qr_code: format!("pix-payload-{}", request.amount),
            qr_code_base64: "aVZCT1J3MEtHZ28=".into(),
            status: PaymentStatus::Pending,
        })
    }

    async fn charge_status(&self, _charge_id: &str) -> Result<PaymentStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(StatusStep::Status(status)) => Ok(status),
            Some(StatusStep::Fail) => Err(PaymentError::Gateway("gateway timeout".into())),
            None => Ok(self.final_status.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_charge_reshapes_gateway_payload() {
        let payload = json!({
            "id": 1234567890_u64,
            "status": "pending",
            "point_of_interaction": {
                "transaction_data": {
                    "qr_code": "00020126pix",
                    "qr_code_base64": "aGVsbG8="
                }
            }
        });
        let charge = parse_charge(&payload).unwrap();
        assert_eq!(charge.id, "1234567890");
        assert_eq!(charge.qr_code, "00020126pix");
        assert_eq!(charge.status, PaymentStatus::Pending);
    }

    #[test]
    fn test_parse_charge_rejects_missing_qr_fields() {
        let payload = json!({ "id": 1, "status": "pending" });
        let err = parse_charge(&payload).unwrap_err();
        assert!(matches!(err, PaymentError::MalformedCharge(_)));
    }

    #[test]
    fn test_gateway_message_prefers_payload_message() {
        assert_eq!(gateway_message(&json!({"message": "invalid token"})), "invalid token");
        assert_eq!(gateway_message(&json!({"error": "x"})), "x");
        assert_eq!(gateway_message(&json!({})), "charge generation failed");
    }

    #[tokio::test]
    async fn test_mock_script_then_final_status() {
        let gateway = MockPixGateway::approving_after(2);
        assert_eq!(gateway.charge_status("c").await.unwrap(), PaymentStatus::Pending);
        assert_eq!(gateway.charge_status("c").await.unwrap(), PaymentStatus::Pending);
        assert_eq!(gateway.charge_status("c").await.unwrap(), PaymentStatus::Approved);
        assert_eq!(gateway.charge_status("c").await.unwrap(), PaymentStatus::Approved);
        assert_eq!(gateway.status_calls(), 4);
    }
}
