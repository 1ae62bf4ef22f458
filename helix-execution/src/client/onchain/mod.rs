//! EIP-712 typed-data signing over an `action + nonce` envelope (spec §4.A regime 3), grounded
//! on the on-chain perpetuals venue's signing scheme: `msgpack`-encode the action, append an
//! 8-byte big-endian nonce and a 1-byte vault flag, `keccak` the result to get a
//! `connectionId`, then sign the typed-data struct `Agent{source, connectionId}`.
//!
//! Field order matters in both the action object and any nested sub-objects: msgpack encodes
//! maps in insertion order, and a reordered field changes the hash. Callers must build the
//! action as an explicitly ordered sequence of `(key, value)` pairs, not a `HashMap`.

mod adapter;
pub use adapter::OnchainAdapter;

use alloy::{
    primitives::{keccak256, Address, B256},
    signers::{local::PrivateKeySigner, Signer},
    sol,
    sol_types::{eip712_domain, SolStruct},
};
use serde::{Serialize, Serializer};
use serde_json::Value;

sol! {
    #[derive(Serialize)]
    struct Agent {
        string source;
        bytes32 connectionId;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RsvSignature {
    pub r: B256,
    pub s: B256,
    pub v: u8,
}

/// Ordered action field, preserving msgpack encoding order (see module docs).
pub type ActionField = (String, Value);

/// Serialises as a msgpack map whose entries are emitted in exactly the given order, since
/// `serde_json::Value`'s own `Map` is alphabetically-ordered and would silently break the
/// `connectionId` hash.
struct OrderedAction<'a>(&'a [ActionField]);

impl Serialize for OrderedAction<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Signs requests for the EIP-712-typed-data-over-action+nonce regime.
pub struct OnchainSigner {
    signer: PrivateKeySigner,
    is_mainnet: bool,
}

impl OnchainSigner {
    pub fn new(signer: PrivateKeySigner, is_mainnet: bool) -> Self {
        Self { signer, is_mainnet }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// `connectionId = keccak(msgpack(action) + nonce(8 bytes BE) + vault_flag(1 byte))`.
    pub fn connection_id(&self, action: &[ActionField], nonce: u64, has_vault: bool) -> B256 {
        let mut bytes = rmp_serde::to_vec(&OrderedAction(action))
            .expect("OrderedAction serialisation cannot fail");
        bytes.extend_from_slice(&nonce.to_be_bytes());
        bytes.push(if has_vault { 1 } else { 0 });

        keccak256(bytes)
    }

    /// Source discriminator required by the Agent typed-data struct: `"a"` on mainnet,
    /// `"b"` on testnet.
    fn source(&self) -> &'static str {
        if self.is_mainnet { "a" } else { "b" }
    }

    pub async fn sign_action(
        &self,
        action: &[ActionField],
        nonce: u64,
        has_vault: bool,
    ) -> Result<RsvSignature, alloy::signers::Error> {
        let connection_id = self.connection_id(action, nonce, has_vault);

        let agent = Agent {
            source: self.source().to_string(),
            connectionId: connection_id,
        };

        let domain = eip712_domain! {
            name: "Exchange",
            version: "1",
            chain_id: 1337,
            verifying_contract: Address::ZERO,
        };

        let hash = agent.eip712_signing_hash(&domain);
        let signature = self.signer.sign_hash(&hash).await?;

        Ok(RsvSignature {
            r: signature.r().into(),
            s: signature.s().into(),
            v: signature.v() as u8,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_changes_with_field_order() {
        let signer = OnchainSigner::new(PrivateKeySigner::random(), true);

        let ordered_a = vec![
            ("type".to_string(), Value::String("order".into())),
            ("orders".to_string(), Value::Array(vec![])),
        ];
        let ordered_b = vec![
            ("orders".to_string(), Value::Array(vec![])),
            ("type".to_string(), Value::String("order".into())),
        ];

        let id_a = signer.connection_id(&ordered_a, 1, false);
        let id_b = signer.connection_id(&ordered_b, 1, false);
        assert_ne!(id_a, id_b, "msgpack map order must affect the connectionId hash");
    }

    #[test]
    fn connection_id_changes_with_vault_flag() {
        let signer = OnchainSigner::new(PrivateKeySigner::random(), true);
        let action = vec![("type".to_string(), Value::String("order".into()))];

        let without_vault = signer.connection_id(&action, 42, false);
        let with_vault = signer.connection_id(&action, 42, true);
        assert_ne!(without_vault, with_vault);
    }

    #[tokio::test]
    async fn source_is_a_on_mainnet_and_b_on_testnet() {
        let mainnet = OnchainSigner::new(PrivateKeySigner::random(), true);
        let testnet = OnchainSigner::new(PrivateKeySigner::random(), false);
        assert_eq!(mainnet.source(), "a");
        assert_eq!(testnet.source(), "b");
    }
}
