/// Session module
///
/// Token decoding, validation, the expiry broadcast and the process-wide
/// session context.

mod claims;
mod context;
mod expiry;
mod model;
mod validator;

pub use claims::decode_claims;
pub use claims::TokenClaims;
pub use claims::TokenDecodeError;
pub use context::AuthState;
pub use context::InitPhase;
pub use context::SessionContext;
pub use context::SessionListeners;
pub use expiry::ExpiryBroadcast;
pub use expiry::ExpirySubscription;
pub use expiry::TokenExpired;
pub use model::Admin;
pub use model::Session;
pub use model::SessionPayload;
pub use validator::InvalidReason;
pub use validator::SessionValidator;
pub use validator::Validation;
