//! Normalization for invoice ingestion.
//!
//! Every function here is a pure, deterministic transformation of its
//! input; identical inputs produce identical outputs across processes and
//! machines. [`NORMALIZER_VERSION`] is recorded on each snapshot so stored
//! derived fields stay attributable to the code that produced them.

use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

/// Version tag recorded with each snapshot.
pub const NORMALIZER_VERSION: &str = "v1";

/// Invoice-number prefixes dropped during normalization, longest first.
const INVNUM_PREFIXES: [&str; 3] = ["INVOICE", "INV", "BILL"];

/// Normalize an invoice number for comparison.
///
/// Uppercases, strips spaces/hyphens/underscores/slashes, removes a leading
/// `INVOICE`/`INV`/`BILL` prefix and leading zeros. An empty result yields
/// the literal `"0"`.
pub fn invoice_number_norm(value: &str) -> String {
    let mut s: String = value
        .trim()
        .to_uppercase()
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '_' | '/'))
        .collect();

    for prefix in INVNUM_PREFIXES {
        if let Some(rest) = s.strip_prefix(prefix) {
            s = rest.to_string();
            break;
        }
    }

    let s = s.trim_start_matches('0');
    if s.is_empty() {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// Normalize free-text descriptions for similarity comparison: lowercase,
/// non-alphanumerics become spaces, whitespace runs collapse.
pub fn desc_norm(value: &str) -> String {
    let lowered = value.to_lowercase();
    let replaced: String = lowered
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Masked last-four display form of an account string.
pub fn mask_account_last4(account: Option<&str>) -> Option<String> {
    let account = account?;
    if account.is_empty() {
        return None;
    }
    let digits: Vec<char> = account.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Some("****".to_string());
    }
    let tail: String = digits[digits.len().saturating_sub(4)..].iter().collect();
    Some(format!("****{tail}"))
}

/// One-way hash of the raw account string for comparison without retention.
pub fn hash_account(account: Option<&str>) -> Option<String> {
    let account = account?;
    if account.is_empty() {
        return None;
    }
    Some(sha256_hex(account.as_bytes()))
}

/// Lower-cased concatenation of vendor name, PO number, terms, and each
/// line's SKU and description, for the text index.
pub fn text_blob(invoice: &crate::models::InvoiceIn) -> String {
    let mut parts: Vec<&str> = vec![
        invoice.vendor_name.as_str(),
        invoice.po_number.as_deref().unwrap_or(""),
        invoice.terms.as_deref().unwrap_or(""),
    ];
    for line in &invoice.line_items {
        parts.push(line.sku.as_deref().unwrap_or(""));
        parts.push(line.desc.as_str());
    }
    parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Stable content hash over the canonicalized payload serialization.
pub fn payload_hash(payload: &JsonValue) -> String {
    let mut canonical = String::new();
    write_canonical(payload, &mut canonical);
    sha256_hex(canonical.as_bytes())
}

/// Serialize a JSON value with object keys in sorted order so the byte
/// stream is independent of map iteration order.
fn write_canonical(value: &JsonValue, out: &mut String) {
    match value {
        JsonValue::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).expect("string serializes"));
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        JsonValue::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_invnum_norm_examples() {
        assert_eq!(invoice_number_norm(" inv-000123 "), "123");
        assert_eq!(invoice_number_norm("invoice-001A"), "1A");
        assert_eq!(invoice_number_norm("BILL/0042"), "42");
        assert_eq!(invoice_number_norm(""), "0");
        assert_eq!(invoice_number_norm("000"), "0");
        assert_eq!(invoice_number_norm("INV"), "0");
    }

    #[test]
    fn test_invnum_norm_idempotent() {
        for s in [" inv-000123 ", "invoice-001A", "", "A-9 9", "00INV7"] {
            let once = invoice_number_norm(s);
            assert_eq!(invoice_number_norm(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn test_invnum_norm_prefix_longest_wins() {
        // INVOICE must strip as a whole, not as INV + "OICE"
        assert_eq!(invoice_number_norm("INVOICE9"), "9");
        assert_eq!(invoice_number_norm("INV9"), "9");
    }

    #[test]
    fn test_desc_norm() {
        assert_eq!(desc_norm("Printer Ink, Black!!!"), "printer ink black");
        assert_eq!(desc_norm("  A4   Paper  "), "a4 paper");
        assert_eq!(desc_norm(""), "");
    }

    #[test]
    fn test_mask_account_last4() {
        assert_eq!(
            mask_account_last4(Some("DE89 3704 0044 0532 0130 00")),
            Some("****3000".to_string())
        );
        assert_eq!(mask_account_last4(Some("12")), Some("****12".to_string()));
        assert_eq!(mask_account_last4(Some("no-digits")), Some("****".to_string()));
        assert_eq!(mask_account_last4(Some("")), None);
        assert_eq!(mask_account_last4(None), None);
    }

    #[test]
    fn test_hash_account_deterministic() {
        let a = hash_account(Some("DE89370400440532013000")).unwrap();
        let b = hash_account(Some("DE89370400440532013000")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(hash_account(None).is_none());
        assert!(hash_account(Some("")).is_none());
    }

    #[test]
    fn test_payload_hash_key_order_independent() {
        let a = json!({"b": 1, "a": {"y": [1, 2], "x": null}});
        let b = json!({"a": {"x": null, "y": [1, 2]}, "b": 1});
        assert_eq!(payload_hash(&a), payload_hash(&b));
    }

    #[test]
    fn test_payload_hash_value_sensitive() {
        let a = json!({"total": "100.00"});
        let b = json!({"total": "100.01"});
        assert_ne!(payload_hash(&a), payload_hash(&b));
    }
}
