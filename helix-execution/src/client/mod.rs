/// EdDSA-over-sorted-params signing regime.
pub mod edge;

/// HMAC-SHA256-with-passphrase signing regime.
pub mod coastal;

/// EIP-712 typed-data-over-action+nonce signing regime.
pub mod onchain;
