//! HMAC-SHA256-with-passphrase signing (spec §4.A regime 2), grounded on the venue that maps
//! the reference exchange's native symbols (`ETH_USDC_PERP`) to its own dash-separated swap
//! form (`ETH-USDC-SWAP`) and back.

mod adapter;
pub use adapter::CoastalAdapter;

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub struct SignedHeaders {
    pub key: String,
    pub signature_hex: String,
    pub timestamp_iso8601: String,
    pub passphrase: String,
}

/// Signs requests for the HMAC-SHA256-with-passphrase regime. The canonical preimage is
/// `<iso8601_ts><METHOD><request_path_with_sorted_query><body>`, where `body` is the compact
/// JSON form (empty string when there is none).
#[derive(Clone)]
pub struct CoastalSigner {
    api_key: String,
    api_secret: String,
    passphrase: String,
}

impl CoastalSigner {
    pub fn new(api_key: String, api_secret: String, passphrase: String) -> Self {
        Self { api_key, api_secret, passphrase }
    }

    pub fn canonical_preimage(
        &self,
        timestamp_iso8601: &str,
        method: &str,
        path_with_sorted_query: &str,
        compact_body: &str,
    ) -> String {
        format!("{timestamp_iso8601}{method}{path_with_sorted_query}{compact_body}")
    }

    pub fn sign(&self, method: &str, path_with_sorted_query: &str, compact_body: &str) -> SignedHeaders {
        let timestamp_iso8601 = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let preimage = self.canonical_preimage(&timestamp_iso8601, method, path_with_sorted_query, compact_body);

        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC accepts a key of any length");
        mac.update(preimage.as_bytes());
        let signature_hex = hex::encode(mac.finalize().into_bytes());

        SignedHeaders {
            key: self.api_key.clone(),
            signature_hex,
            timestamp_iso8601,
            passphrase: self.passphrase.clone(),
        }
    }
}

/// Canonicalises `BASE_QUOTE_PERP` (and friends) to this venue's `BASE-QUOTE-SWAP` form and
/// back, per spec §4.A Symbol translation — identical in spirit to the original venue client's
/// `_map_symbol`/`_unmap_symbol` pair.
pub fn map_symbol(symbol: &str) -> String {
    if symbol.is_empty() {
        return symbol.to_string();
    }
    if symbol.contains('-') && (symbol.ends_with("-SWAP") || symbol.ends_with("-SPOT")) {
        return symbol.to_string();
    }

    let mapped = symbol.replace('_', "-");
    if let Some(stripped) = mapped.strip_suffix("-PERP") {
        format!("{stripped}-SWAP")
    } else if !mapped.ends_with("-SWAP") && !mapped.ends_with("-SPOT") {
        format!("{mapped}-SWAP")
    } else {
        mapped
    }
}

pub fn unmap_symbol(symbol: &str) -> String {
    if symbol.is_empty() {
        return symbol.to_string();
    }
    if symbol.ends_with("-SWAP") {
        symbol.replacen("-SWAP", "_PERP", 1).replace('-', "_")
    } else {
        symbol.replace('-', "_")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_symbol_matches_venue_convention() {
        assert_eq!(map_symbol("ETH_USDC_PERP"), "ETH-USDC-SWAP");
        assert_eq!(map_symbol("ETH-USDC-SWAP"), "ETH-USDC-SWAP");
        assert_eq!(map_symbol("ETH"), "ETH-SWAP");
    }

    #[test]
    fn unmap_symbol_is_inverse_for_swap() {
        assert_eq!(unmap_symbol("ETH-USDC-SWAP"), "ETH_USDC_PERP");
    }

    #[test]
    fn map_then_unmap_is_idempotent_on_native_form() {
        let once = map_symbol("ETH_USDC_PERP");
        let twice = map_symbol(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn signature_changes_with_body() {
        let signer = CoastalSigner::new("key".into(), "secret".into(), "pass".into());
        let a = signer.sign("GET", "/api/v1/orders?symbol=ETH-USDC-SWAP", "");
        let b = signer.sign("GET", "/api/v1/orders?symbol=ETH-USDC-SWAP", "{\"x\":1}");
        assert_ne!(a.signature_hex, b.signature_hex);
    }
}
