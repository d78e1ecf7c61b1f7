//! Keyed config store with scope fallback.
//!
//! Lookup order is `vendor:{vendor_id}` then `global`; the first hit wins.
//! A short-TTL in-process cache absorbs per-request reads but is never
//! authoritative: expired entries always go back to the store.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};

use sieve_core::defaults::CONFIG_CACHE_TTL_SECS;
use sieve_core::{Error, Result};

struct CacheEntry {
    value: Option<f64>,
    fetched_at: Instant,
}

/// PostgreSQL config store, scoped to one tenant.
pub struct PgConfigStore {
    pool: PgPool,
    tenant_id: String,
    ttl: Duration,
    cache: Mutex<HashMap<(String, String), CacheEntry>>,
}

impl PgConfigStore {
    pub fn new(pool: PgPool, tenant_id: String) -> Self {
        Self {
            pool,
            tenant_id,
            ttl: Duration::from_secs(CONFIG_CACHE_TTL_SECS),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a numeric tunable with vendor-then-global scope fallback,
    /// returning `default` when neither scope has the key.
    pub async fn get_f64(&self, key: &str, vendor_id: Option<&str>, default: f64) -> Result<f64> {
        if let Some(vendor_id) = vendor_id {
            let scope = format!("vendor:{vendor_id}");
            if let Some(value) = self.get_scoped(&scope, key).await? {
                return Ok(value);
            }
        }
        Ok(self.get_scoped("global", key).await?.unwrap_or(default))
    }

    async fn get_scoped(&self, scope: &str, key: &str) -> Result<Option<f64>> {
        let cache_key = (scope.to_string(), key.to_string());
        if let Some(entry) = self
            .cache
            .lock()
            .expect("config cache lock")
            .get(&cache_key)
        {
            if entry.fetched_at.elapsed() < self.ttl {
                return Ok(entry.value);
            }
        }

        let row = sqlx::query(
            r#"
            SELECT value FROM configs
            WHERE tenant_id = $1 AND scope = $2 AND key = $3
            "#,
        )
        .bind(&self.tenant_id)
        .bind(scope)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        let value = row.and_then(|r| parse_numeric(&r.get::<JsonValue, _>("value")));

        self.cache.lock().expect("config cache lock").insert(
            cache_key,
            CacheEntry {
                value,
                fetched_at: Instant::now(),
            },
        );

        Ok(value)
    }
}

/// Accept a bare number, a numeric string, or `{"value": <number>}`.
fn parse_numeric(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.parse().ok(),
        JsonValue::Object(map) => map.get("value").and_then(parse_numeric),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_numeric_shapes() {
        assert_eq!(parse_numeric(&json!(85)), Some(85.0));
        assert_eq!(parse_numeric(&json!(85.5)), Some(85.5));
        assert_eq!(parse_numeric(&json!("42.5")), Some(42.5));
        assert_eq!(parse_numeric(&json!({"value": 70})), Some(70.0));
        assert_eq!(parse_numeric(&json!({"value": "70"})), Some(70.0));
        assert_eq!(parse_numeric(&json!(null)), None);
        assert_eq!(parse_numeric(&json!({"other": 1})), None);
        assert_eq!(parse_numeric(&json!("not a number")), None);
    }
}
