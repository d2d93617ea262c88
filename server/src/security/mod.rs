pub mod login_throttle;
pub mod rate_limiter;

pub use self::login_throttle::{LOGIN_SWEEP_INTERVAL, LoginThrottle};
pub use self::rate_limiter::{API_SWEEP_INTERVAL, ApiThrottle};
