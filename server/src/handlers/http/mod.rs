pub mod auth;
pub mod health;
pub mod routes;
pub mod utils;

pub use routes::Router;
