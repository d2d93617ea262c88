use std::net::SocketAddr;

use hyper::Request;
use hyper::header::{self, HeaderValue};

use crate::ApiResponse;

/// Peer address stored in the request extensions by the accept loop.
pub fn peer_addr<B>(req: &Request<B>) -> Option<SocketAddr> {
    req.extensions().get::<SocketAddr>().copied()
}

pub fn with_cookie(mut response: ApiResponse, cookie: HeaderValue) -> ApiResponse {
    response.headers_mut().append(header::SET_COOKIE, cookie);
    response
}

/// `Cache-Control: no-store` for responses carrying credentials or session data.
pub fn no_store(mut response: ApiResponse) -> ApiResponse {
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}
