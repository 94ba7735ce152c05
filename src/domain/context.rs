use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geo::GeoPoint;

/// Unique user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Claimed location of the transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geolocation {
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

impl Geolocation {
    pub fn new(lat: f64, lon: f64) -> Self {
        Geolocation {
            lat,
            lon,
            country: None,
            city: None,
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }

    /// Coordinates are finite and within WGS84 bounds.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Everything known about one transaction attempt.
///
/// Immutable for the duration of an evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionContext {
    pub user_id: UserId,

    pub amount: Decimal,

    /// ISO 4217 code, uppercased
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

    /// Free-form request metadata carried into the audit record
    #[serde(default)]
    pub request_metadata: serde_json::Value,
}

impl TransactionContext {
    /// Create a minimal context with only the required fields.
    pub fn new(user_id: UserId, amount: Decimal, currency: impl Into<String>) -> Self {
        TransactionContext {
            user_id,
            amount,
            currency: currency.into().to_uppercase(),
            ip_address: None,
            device_fingerprint: None,
            geolocation: None,
            service_request_id: None,
            partner_id: None,
            description: None,
            request_metadata: serde_json::Value::Null,
        }
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn with_device(mut self, fingerprint: impl Into<String>) -> Self {
        self.device_fingerprint = Some(fingerprint.into());
        self
    }

    pub fn with_geolocation(mut self, geo: Geolocation) -> Self {
        self.geolocation = Some(geo);
        self
    }

    /// Origin identifier used for distinct-origin velocity counting.
    ///
    /// Prefers the IP address, falling back to the device fingerprint.
    pub fn origin_id(&self) -> Option<&str> {
        self.ip_address
            .as_deref()
            .or(self.device_fingerprint.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// Usable coordinates, if the request carried valid ones.
    pub fn geo_point(&self) -> Option<GeoPoint> {
        self.geolocation
            .as_ref()
            .filter(|g| g.is_valid())
            .map(Geolocation::point)
    }
}
