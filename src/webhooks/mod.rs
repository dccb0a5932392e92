/// Inbound webhook authentication shared by the payment gateway adapters
pub mod signature;

pub use signature::{hmac_sha256_hex, verify_hmac_hex, SignatureVerifier};
