/// Tower middleware module
///
/// Tower-based layers for:
/// - API throttling
/// - Login throttling
/// - Authentication and permission gates
/// - Request timeouts
pub mod tower_auth;
pub mod tower_gate;
pub mod tower_login_throttle;
pub mod tower_rate_limiter;
pub mod tower_timeout_handler;

pub use tower_auth::{AuthLayer, AuthService};
pub use tower_gate::{GateLayer, GateService};
pub use tower_login_throttle::{LoginThrottleLayer, LoginThrottleService};
pub use tower_rate_limiter::{ApiThrottleLayer, ApiThrottleService};
pub use tower_timeout_handler::{TimeoutLayer, TimeoutService};
