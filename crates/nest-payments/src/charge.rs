//! Plans, Prices and Charges
//!
//! The fixed two-plan price table and the shapes exchanged with the
//! payment gateway. Amounts are `Decimal` in currency-agnostic units.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Paid access window for a plain signup, in days.
pub const SIGNUP_WINDOW_DAYS: i64 = 30;

/// Paid access window when a referral code was supplied, in days.
pub const REFERRED_SIGNUP_WINDOW_DAYS: i64 = 35;

/// Extension granted to a referrer per referred signup, in days.
pub const REFERRAL_BONUS_DAYS: i64 = 5;

/// Subscription plans
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Monthly,
    Lifetime,
}

impl Plan {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Lifetime => "lifetime",
        }
    }

    /// Parse from user input, defaulting to the cheaper plan.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "lifetime" => Self::Lifetime,
            _ => Self::Monthly,
        }
    }

    pub fn is_lifetime(self) -> bool {
        matches!(self, Self::Lifetime)
    }

    /// Get pricing for this plan
    pub fn pricing(self) -> PlanPricing {
        match self {
            Self::Monthly => PlanPricing {
                name: "Monthly".into(),
                description: "Harmony Nest monthly access".into(),
                amount: dec!(2.75),
            },
            Self::Lifetime => PlanPricing {
                name: "Lifetime".into(),
                description: "Harmony Nest lifetime access".into(),
                amount: dec!(11.45),
            },
        }
    }
}

/// Pricing information
#[derive(Clone, Debug)]
pub struct PlanPricing {
    pub name: String,
    pub description: String,
    pub amount: Decimal,
}

/// Request to create a Pix charge at the gateway
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChargeRequest {
    /// Payer email forwarded to the gateway
    pub payer_email: String,

    /// Amount in currency-agnostic units
    pub amount: Decimal,

    /// Human-readable charge description
    pub description: String,
}

impl ChargeRequest {
    /// Build the charge for a plan at its fixed price.
    pub fn for_plan(payer_email: impl Into<String>, plan: Plan) -> Self {
        let pricing = plan.pricing();
        Self {
            payer_email: payer_email.into(),
            amount: pricing.amount,
            description: pricing.description,
        }
    }
}

/// A gateway-side charge. Transient: lives only for the duration of
/// the activation flow and is never persisted locally.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Charge {
    /// Opaque gateway id
    pub id: String,

    /// Copyable Pix payload
    pub qr_code: String,

    /// Scannable QR image, base64 PNG
    pub qr_code_base64: String,

    /// Settlement state at creation time
    pub status: PaymentStatus,
}

/// Settlement state of a charge
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Other(String),
}

impl PaymentStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => Self::Pending,
            "approved" => Self::Approved,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Other(s) => s,
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

impl From<String> for PaymentStatus {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<PaymentStatus> for String {
    fn from(status: PaymentStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_table() {
        assert_eq!(Plan::Monthly.pricing().amount, dec!(2.75));
        assert_eq!(Plan::Lifetime.pricing().amount, dec!(11.45));
        assert!(Plan::Monthly.pricing().amount < Plan::Lifetime.pricing().amount);
    }

    #[test]
    fn test_plan_parsing_defaults_to_monthly() {
        assert_eq!(Plan::from_str("LIFETIME"), Plan::Lifetime);
        assert_eq!(Plan::from_str("monthly"), Plan::Monthly);
        assert_eq!(Plan::from_str("garbage"), Plan::Monthly);
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(PaymentStatus::parse("approved"), PaymentStatus::Approved);
        assert_eq!(PaymentStatus::parse("pending"), PaymentStatus::Pending);
        assert_eq!(
            PaymentStatus::parse("cancelled"),
            PaymentStatus::Other("cancelled".into())
        );
    }

    #[test]
    fn test_charge_request_for_plan() {
        let request = ChargeRequest::for_plan("a@x.com", Plan::Lifetime);
        assert_eq!(request.amount, dec!(11.45));
        assert_eq!(request.payer_email, "a@x.com");
    }
}
