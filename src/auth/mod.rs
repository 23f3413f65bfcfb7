// Authentication module
// Username/password login with lockout, per-IP rate limiting, short-lived
// access tokens, and rotating refresh tokens

pub mod clock;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod password;
pub mod rate_limit;
pub mod repository;
pub mod service;
pub mod token;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::AuthError;
pub use handlers::{login_handler, logout_handler, me_handler, refresh_handler};
pub use middleware::{AuthenticatedUser, ClientIp, ForwardedForPolicy};
pub use models::{CleanupReport, LoginRequest, RefreshRequest, Tokens, User};
pub use rate_limit::{FixedWindowRateLimiter, LoginRateLimiter, SlidingWindowRateLimiter};
pub use repository::{MemoryAuthRepository, PgAuthRepository};
pub use service::{AuthPolicy, AuthService, AuthStores};
