use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use hyper::Request;
use tower::{Layer, Service};

use crate::ApiResponse;
use crate::errors::{ApiError, ErrorCatalog};
use crate::security::ApiThrottle;

/// Tower layer for the fixed-window API throttle
///
/// Keyed on the peer address the accept loop stores in request extensions.
#[derive(Clone)]
pub struct ApiThrottleLayer {
    throttle: ApiThrottle,
    catalog: Arc<ErrorCatalog>,
}

impl ApiThrottleLayer {
    pub fn new(throttle: ApiThrottle, catalog: Arc<ErrorCatalog>) -> Self {
        Self { throttle, catalog }
    }
}

impl<S> Layer<S> for ApiThrottleLayer {
    type Service = ApiThrottleService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ApiThrottleService {
            inner,
            throttle: self.throttle.clone(),
            catalog: self.catalog.clone(),
        }
    }
}

#[derive(Clone)]
pub struct ApiThrottleService<S> {
    inner: S,
    throttle: ApiThrottle,
    catalog: Arc<ErrorCatalog>,
}

impl<S, ReqBody> Service<Request<ReqBody>> for ApiThrottleService<S>
where
    S: Service<Request<ReqBody>, Response = ApiResponse> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let client_ip = req.extensions().get::<SocketAddr>().map(|addr| addr.ip());

        let throttle = self.throttle.clone();
        let catalog = self.catalog.clone();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            if let Some(ip) = client_ip {
                if let Err(retry_after) = throttle.check(ip).await {
                    tracing::warn!(address = %ip, retry_after, "API rate limit exceeded");
                    return Ok(catalog.render(&ApiError::rate_limited(retry_after)));
                }
            }

            inner.call(req).await
        })
    }
}
