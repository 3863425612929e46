//! Price list items

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One entry of the merged price list
///
/// A price of `None` means "not offered" in that market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub market_hash_name: String,
    pub currency: String,
    pub min_price_tradable: Option<Decimal>,
    pub min_price_non_tradable: Option<Decimal>,
}

impl Item {
    /// Item known only from the tradable listing
    pub fn tradable(market_hash_name: impl Into<String>, currency: impl Into<String>, price: Option<Decimal>) -> Self {
        Self {
            market_hash_name: market_hash_name.into(),
            currency: currency.into(),
            min_price_tradable: price,
            min_price_non_tradable: None,
        }
    }

    /// Item known only from the non-tradable listing
    pub fn non_tradable(market_hash_name: impl Into<String>, currency: impl Into<String>, price: Option<Decimal>) -> Self {
        Self {
            market_hash_name: market_hash_name.into(),
            currency: currency.into(),
            min_price_tradable: None,
            min_price_non_tradable: price,
        }
    }
}

/// Upstream Skinport `/items` record (only the fields we consume)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkinportItem {
    pub market_hash_name: String,
    pub currency: String,
    /// Lowest listing price; null when nothing is listed
    #[serde(default, deserialize_with = "deserialize_optional_price")]
    pub min_price: Option<Decimal>,
    #[serde(default)]
    pub quantity: u64,
}

/// Deserialize an optional price that can be number, string or null
fn deserialize_optional_price<'de, D>(deserializer: D) -> std::result::Result<Option<Decimal>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let value: Option<JsonValue> = Option::deserialize(deserializer)?;
    let raw = match value {
        Some(JsonValue::Number(n)) => n.to_string(),
        Some(JsonValue::String(s)) => s,
        Some(JsonValue::Null) | None => return Ok(None),
        _ => return Err(D::Error::custom("expected number, string or null for price")),
    };
    raw.parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(&raw))
        .map(Some)
        .map_err(|e| D::Error::custom(format!("invalid decimal: {}", e)))
}
