pub mod json_error;
pub mod jwt;
pub mod login;
pub mod server_config;
pub mod session;

pub use self::json_error::ErrorResponse;
pub use self::jwt::Claims;
pub use self::login::{AuthStatusResponse, LoginData, LoginResponse};
pub use self::session::{RevokeSessionRequest, SessionListResponse, SessionResponse};
