// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Domain types shared by the store, the activities, and the workflow.

use std::fmt;
use std::time::Duration;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::BillingError;

/// Currency of a bill. Amounts are always expressed in minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    /// United States dollar.
    USD,
    /// Georgian lari.
    GEL,
}

impl Currency {
    /// Returns the ISO-style code for this currency.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::GEL => "GEL",
        }
    }

    /// Parse a currency code, accepting lowercase input.
    pub fn parse(s: &str) -> Result<Self, BillingError> {
        match s.to_uppercase().as_str() {
            "USD" => Ok(Self::USD),
            "GEL" => Ok(Self::GEL),
            _ => Err(BillingError::ValidationError {
                field: "currency".to_string(),
                message: format!("invalid currency: {}", s),
            }),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillStatus {
    /// The bill is accruing line items.
    Open,
    /// The bill is finalized; no further mutation is accepted.
    Closed,
}

impl BillStatus {
    /// Returns the persisted string form of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }

    /// Parse a bill status, accepting lowercase input.
    pub fn parse(s: &str) -> Result<Self, BillingError> {
        match s.to_uppercase().as_str() {
            "OPEN" => Ok(Self::Open),
            "CLOSED" => Ok(Self::Closed),
            _ => Err(BillingError::ValidationError {
                field: "status".to_string(),
                message: format!("invalid status: {}", s),
            }),
        }
    }
}

impl fmt::Display for BillStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineItemStatus {
    /// The line item counts towards the bill total.
    Active,
    /// The line item was reversed.
    Voided,
}

impl LineItemStatus {
    /// Returns the persisted string form of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Voided => "VOIDED",
        }
    }
}

impl fmt::Display for LineItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Billing policy kind for a bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyType {
    /// Ad-hoc line items accrued over the billing period.
    UsageBased,
    /// Fixed recurring fee minted on an interval.
    Subscription,
}

impl PolicyType {
    /// Returns the persisted string form of this policy type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UsageBased => "USAGE_BASED",
            Self::Subscription => "SUBSCRIPTION",
        }
    }

    /// Parse a policy type string.
    pub fn parse(s: &str) -> Result<Self, BillingError> {
        match s {
            "USAGE_BASED" => Ok(Self::UsageBased),
            "SUBSCRIPTION" => Ok(Self::Subscription),
            _ => Err(BillingError::UnsupportedPolicyType {
                policy_type: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interval wire format: a duration string such as `"30s"`, `"5m"`, or `"1h30m"`.
///
/// Serialized as the string form so recurring configuration survives the
/// `metadata` JSON column round-trip unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalSpec(pub Duration);

impl IntervalSpec {
    /// The underlying duration.
    pub fn as_duration(&self) -> Duration {
        self.0
    }

    /// True if the interval is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Parse a duration string made of `<integer><unit>` segments.
    ///
    /// Supported units: `ms`, `s`, `m`, `h`. Segments accumulate, so
    /// `"1h30m"` parses to ninety minutes.
    pub fn parse(s: &str) -> Result<Self, String> {
        if s.is_empty() {
            return Err("duration must not be empty".to_string());
        }
        let mut total = Duration::ZERO;
        let mut rest = s;
        while !rest.is_empty() {
            let digits_end = rest
                .find(|c: char| !c.is_ascii_digit())
                .ok_or_else(|| format!("invalid duration: {}", s))?;
            if digits_end == 0 {
                return Err(format!("invalid duration: {}", s));
            }
            let value: u64 = rest[..digits_end]
                .parse()
                .map_err(|_| format!("invalid duration: {}", s))?;
            let unit_end = rest[digits_end..]
                .find(|c: char| c.is_ascii_digit())
                .map(|i| digits_end + i)
                .unwrap_or(rest.len());
            let unit = &rest[digits_end..unit_end];
            let segment = match unit {
                "ms" => Duration::from_millis(value),
                "s" => Duration::from_secs(value),
                "m" => Duration::from_secs(value * 60),
                "h" => Duration::from_secs(value * 3600),
                _ => return Err(format!("invalid duration unit '{}' in: {}", unit, s)),
            };
            total += segment;
            rest = &rest[unit_end..];
        }
        Ok(Self(total))
    }
}

impl fmt::Display for IntervalSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = self.0.as_millis();
        if millis == 0 {
            return f.write_str("0s");
        }
        let mut secs = self.0.as_secs();
        let sub_millis = self.0.subsec_millis();
        let hours = secs / 3600;
        secs %= 3600;
        let minutes = secs / 60;
        secs %= 60;
        if hours > 0 {
            write!(f, "{}h", hours)?;
        }
        if minutes > 0 {
            write!(f, "{}m", minutes)?;
        }
        if secs > 0 {
            write!(f, "{}s", secs)?;
        }
        if sub_millis > 0 {
            write!(f, "{}ms", sub_millis)?;
        }
        Ok(())
    }
}

impl Serialize for IntervalSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for IntervalSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(D::Error::custom)
    }
}

/// Recurring fee configuration for subscription bills.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurring {
    /// Fee amount in minor units. Must be positive.
    pub amount: i64,
    /// Interval between recurring charges. Must be non-zero.
    pub interval: IntervalSpec,
    /// Human-readable description attached to each recurring line item.
    #[serde(default)]
    pub description: String,
}

/// JSON blob stored in the bills `metadata` column.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BillMetadata {
    /// Recurring fee configuration, present only for subscription bills.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring: Option<Recurring>,
    /// Final total, written when the bill is closed.
    #[serde(default)]
    pub total_amount: i64,
}

/// JSON blob stored in the line_items `metadata` column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemMetadata {
    /// Human-readable description of the charge.
    #[serde(default)]
    pub description: String,
}

/// Format an amount in minor units as a string with two decimal places.
pub fn format_amount(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}
