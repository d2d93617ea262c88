pub mod cookie;
pub mod middleware;
pub mod permissions;
pub mod token;

pub use self::cookie::{CookieService, SameSite};
pub use self::middleware::{AuthContext, Authenticator, Gate, TokenSource, extract_token};
pub use self::token::{IssuedToken, TokenError, TokenService, TokenSubject};
