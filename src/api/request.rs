use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Geolocation, TransactionContext, UserId};

/// Exclusive upper bound on amounts, the range of a NUMERIC(20, 4) column.
const AMOUNT_LIMIT: i64 = 10_000_000_000_000_000;

/// Reasons a syntactically valid request is rejected.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RequestError {
    #[error("userId is required")]
    MissingUser,

    #[error("amount must be positive")]
    NonPositiveAmount,

    #[error("amount exceeds the supported range")]
    AmountOutOfRange,

    #[error("geolocation must be a finite lat/lon within WGS84 bounds")]
    InvalidGeolocation,

    #[error("currency must be a 3-letter code")]
    InvalidCurrency,
}

/// Request to score a payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRequest {
    pub user_id: String,

    /// Accepts a JSON number or a decimal string
    pub amount: Decimal,

    pub currency: String,

    #[serde(default)]
    pub ip_address: Option<String>,

    #[serde(default)]
    pub device_fingerprint: Option<String>,

    #[serde(default)]
    pub geolocation: Option<Geolocation>,

    #[serde(default)]
    pub service_request_id: Option<String>,

    #[serde(default)]
    pub partner_id: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Opaque caller metadata, stored with the payment intent
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl EvaluationRequest {
    /// Validate and convert into an evaluation context.
    pub fn into_context(self) -> Result<TransactionContext, RequestError> {
        let user_id = self.user_id.trim();
        if user_id.is_empty() {
            return Err(RequestError::MissingUser);
        }
        if self.amount <= Decimal::ZERO {
            return Err(RequestError::NonPositiveAmount);
        }
        if self.amount.round_dp(4) >= Decimal::from(AMOUNT_LIMIT) {
            return Err(RequestError::AmountOutOfRange);
        }
        if self.geolocation.as_ref().is_some_and(|g| !g.is_valid()) {
            return Err(RequestError::InvalidGeolocation);
        }
        let currency = self.currency.trim();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(RequestError::InvalidCurrency);
        }

        let mut ctx = TransactionContext::new(UserId::new(user_id), self.amount, currency);
        ctx.ip_address = non_empty(self.ip_address);
        ctx.device_fingerprint = non_empty(self.device_fingerprint);
        ctx.geolocation = self.geolocation;
        ctx.service_request_id = self.service_request_id;
        ctx.partner_id = self.partner_id;
        ctx.description = self.description;
        ctx.request_metadata = self.metadata;

        Ok(ctx)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserialization() {
        let json = r#"{
            "userId": "U123",
            "amount": 1250.50,
            "currency": "usd",
            "ipAddress": "203.0.113.7",
            "deviceFingerprint": "fp-abc",
            "geolocation": {"lat": 40.7128, "lon": -74.006, "country": "US"},
            "serviceRequestId": "SR-1",
            "metadata": {"channel": "web"}
        }"#;

        let req: EvaluationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.user_id, "U123");
        assert_eq!(req.amount, Decimal::new(125050, 2));

        let ctx = req.into_context().unwrap();
        assert_eq!(ctx.currency, "USD");
        assert_eq!(ctx.origin_id(), Some("203.0.113.7"));
        assert!(ctx.geo_point().is_some());
        assert_eq!(ctx.request_metadata["channel"], "web");
    }

    #[test]
    fn test_amount_as_string() {
        let json = r#"{"userId": "U1", "amount": "99.99", "currency": "EUR"}"#;

        let req: EvaluationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.amount, Decimal::new(9999, 2));
    }

    #[test]
    fn test_validation() {
        let req = |user: &str, amount: i64, currency: &str| EvaluationRequest {
            user_id: user.to_string(),
            amount: Decimal::new(amount, 0),
            currency: currency.to_string(),
            ip_address: None,
            device_fingerprint: None,
            geolocation: None,
            service_request_id: None,
            partner_id: None,
            description: None,
            metadata: serde_json::Value::Null,
        };

        assert_eq!(req(" ", 10, "USD").into_context().unwrap_err(), RequestError::MissingUser);
        assert_eq!(req("U1", 0, "USD").into_context().unwrap_err(), RequestError::NonPositiveAmount);
        assert_eq!(req("U1", 10, "US").into_context().unwrap_err(), RequestError::InvalidCurrency);
        assert!(req("U1", 10, "gbp").into_context().is_ok());
    }

    #[test]
    fn test_amount_range() {
        let parse = |amount: &str| {
            serde_json::from_value::<EvaluationRequest>(serde_json::json!({
                "userId": "U1",
                "amount": amount,
                "currency": "USD",
            }))
            .unwrap()
            .into_context()
        };

        assert!(parse("9999999999999999.9999").is_ok());
        assert_eq!(parse("10000000000000000").unwrap_err(), RequestError::AmountOutOfRange);
        assert_eq!(
            parse("9999999999999999.99999").unwrap_err(),
            RequestError::AmountOutOfRange
        );
        assert_eq!(
            parse("79228162514264337593543950335").unwrap_err(),
            RequestError::AmountOutOfRange
        );
    }

    #[test]
    fn test_invalid_geolocation_rejected() {
        for (lat, lon) in [(123.0, 10.0), (40.0, 500.0), (-90.5, 0.0)] {
            let req: EvaluationRequest = serde_json::from_value(serde_json::json!({
                "userId": "U1",
                "amount": 10,
                "currency": "USD",
                "geolocation": {"lat": lat, "lon": lon},
            }))
            .unwrap();
            assert_eq!(req.into_context().unwrap_err(), RequestError::InvalidGeolocation);
        }
    }

    #[test]
    fn test_blank_optional_fields_dropped() {
        let json = r#"{"userId": "U1", "amount": 5, "currency": "USD", "ipAddress": "", "deviceFingerprint": "  "}"#;

        let ctx = serde_json::from_str::<EvaluationRequest>(json)
            .unwrap()
            .into_context()
            .unwrap();

        assert!(ctx.ip_address.is_none());
        assert!(ctx.device_fingerprint.is_none());
    }
}
