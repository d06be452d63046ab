/// Bearer-token authentication (HMAC-SHA256 signed claims).
pub mod auth;
/// Server configuration loading.
pub mod config;
/// Structured logging initialization.
pub mod logging;
/// Network stack: HTTP/SSE endpoints on a Tokio-based server.
pub mod network;
/// In-process event broker: Broker, Subscription, Event.
pub mod sse;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Token issuing and verification.
pub use auth::{AuthError, TokenClaims, TokenManager};
/// Server settings loaded from the environment.
pub use config::Settings;
/// Network server and per-IP rate limiting.
pub use network::{server, RateLimitConfig, RateLimiter};
/// Broker API.
pub use sse::{stream_events, Broker, Event, Mailbox, Subscription};
