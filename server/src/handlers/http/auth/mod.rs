pub mod login;
pub mod logout;
pub mod sessions;
pub mod verify;

pub use login::handle_login;
pub use logout::handle_logout;
pub use sessions::{handle_list_sessions, handle_revoke_session};
pub use verify::handle_verify;
