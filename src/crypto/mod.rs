//! Identity-based content encryption and session-key management.
//!
//! Covers the encryption gateway used to supporter-gate content (one
//! encryption identity per creator profile), a deterministic local gateway
//! with HKDF-derived AES-256-GCM envelopes plus a capability registry, and
//! the process-local session-key cache with TTL expiry and
//! single-retry-on-expiry decrypt semantics.

pub mod gateway;
pub mod session;
pub mod signer;

pub use gateway::{CapabilityRef, EncryptionGateway, GatewayError, GatewayResult, LocalGateway};
pub use session::{SessionKey, SessionKeyCache, SessionKeyIssuer, SigningIssuer};
pub use signer::LocalSigner;
