//! Cache key derivation for weather snapshots.

use sha2::{Digest, Sha256};

use crate::model::Unit;

/// Namespace shared by every cached weather entry; used for bulk purges.
pub const WEATHER_CACHE_PREFIX: &str = "wiw_weather_data_";

/// Deterministic cache key for `(city, unit)`. City matching is case-insensitive.
pub fn cache_key(city: &str, unit: Unit) -> String {
    let material = format!("{}_{}", city.to_lowercase(), unit.as_str());
    let digest = Sha256::digest(material.as_bytes());
    format!("{WEATHER_CACHE_PREFIX}{}", hex::encode(digest))
}
