//! EdDSA-over-sorted-params signing (spec §4.A regime 1), grounded on the Ed25519
//! account-key scheme used by the reference exchange's REST API.

mod adapter;
pub use adapter::EdgeAdapter;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use ed25519_dalek::{Signature, Signer, SigningKey};
use itertools::Itertools;
use std::collections::BTreeMap;

/// Signable parameter value. Booleans are lower-cased in the signature string per the venue's
/// convention; `None` values are omitted entirely before sorting.
#[derive(Debug, Clone)]
pub enum ParamValue {
    Bool(bool),
    Text(String),
}

impl ParamValue {
    fn as_signable(&self) -> String {
        match self {
            ParamValue::Bool(value) => value.to_string(),
            ParamValue::Text(value) => value.clone(),
        }
    }
}

/// Signs requests for the EdDSA-over-sorted-params regime: build the canonical string
/// `instruction=<verb>&<sorted kv>&timestamp=<ms>&window=<ms>`, sign with the account's
/// Ed25519 key, and emit the headers the venue expects.
#[derive(Clone)]
pub struct EdgeSigner {
    signing_key: SigningKey,
    window_ms: u64,
}

pub struct SignedHeaders {
    pub public_key_b64: String,
    pub signature_b64: String,
    pub timestamp_ms: i64,
    pub window_ms: u64,
}

impl EdgeSigner {
    pub fn new(signing_key: SigningKey, window_ms: u64) -> Self {
        Self { signing_key, window_ms }
    }

    /// Build the canonical signable string for a single instruction invocation.
    pub fn canonical_string(
        &self,
        instruction: &str,
        params: &BTreeMap<String, ParamValue>,
        timestamp_ms: i64,
    ) -> String {
        let query = params
            .iter()
            .map(|(key, value)| format!("{key}={}", value.as_signable()))
            .join("&");

        let mut sign_str = format!("instruction={instruction}");
        if !query.is_empty() {
            sign_str.push('&');
            sign_str.push_str(&query);
        }
        sign_str.push_str(&format!("&timestamp={timestamp_ms}&window={}", self.window_ms));
        sign_str
    }

    pub fn sign(&self, instruction: &str, params: &BTreeMap<String, ParamValue>) -> SignedHeaders {
        let timestamp_ms = Utc::now().timestamp_millis();
        let preimage = self.canonical_string(instruction, params, timestamp_ms);
        let signature: Signature = self.signing_key.sign(preimage.as_bytes());

        SignedHeaders {
            public_key_b64: STANDARD.encode(self.signing_key.verifying_key().as_bytes()),
            signature_b64: STANDARD.encode(signature.to_bytes()),
            timestamp_ms,
            window_ms: self.window_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use ed25519_dalek::ed25519::signature::rand_core::OsRng;

    #[test]
    fn canonical_string_sorts_params_and_lowercases_bools() {
        let signer = EdgeSigner::new(SigningKey::generate(&mut OsRng), 5_000);
        let mut params = BTreeMap::new();
        params.insert("symbol".to_string(), ParamValue::Text("ETH_USDC_PERP".to_string()));
        params.insert("reduceOnly".to_string(), ParamValue::Bool(true));

        let preimage = signer.canonical_string("orderExecute", &params, 1_700_000_000_000);
        assert_eq!(
            preimage,
            "instruction=orderExecute&reduceOnly=true&symbol=ETH_USDC_PERP&timestamp=1700000000000&window=5000"
        );
    }

    #[test]
    fn signature_is_deterministic_for_same_preimage() {
        let key = SigningKey::generate(&mut OsRng);
        let signer = EdgeSigner::new(key, 5_000);
        let params = BTreeMap::new();

        let a = signer.sign("accountQuery", &params);
        // Ed25519 signatures are deterministic for a given key+message.
        let preimage_a = signer.canonical_string("accountQuery", &params, a.timestamp_ms);
        let resigned = signer.signing_key.sign(preimage_a.as_bytes());
        assert_eq!(base64::engine::general_purpose::STANDARD.encode(resigned.to_bytes()), a.signature_b64);
    }
}
