use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use hyper::{Request, StatusCode};
use tower::{Layer, Service};

use crate::ApiResponse;
use crate::errors::{ApiError, ErrorCatalog};
use crate::security::LoginThrottle;

/// Tower layer wrapping the auth route group in the login throttle
///
/// Blocked addresses are turned away before the handler runs. Afterwards the
/// response status feeds the counter: 401/403 count as a failure, 200 clears
/// it.
#[derive(Clone)]
pub struct LoginThrottleLayer {
    throttle: LoginThrottle,
    catalog: Arc<ErrorCatalog>,
}

impl LoginThrottleLayer {
    pub fn new(throttle: LoginThrottle, catalog: Arc<ErrorCatalog>) -> Self {
        Self { throttle, catalog }
    }
}

impl<S> Layer<S> for LoginThrottleLayer {
    type Service = LoginThrottleService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoginThrottleService {
            inner,
            throttle: self.throttle.clone(),
            catalog: self.catalog.clone(),
        }
    }
}

#[derive(Clone)]
pub struct LoginThrottleService<S> {
    inner: S,
    throttle: LoginThrottle,
    catalog: Arc<ErrorCatalog>,
}

impl<S, ReqBody> Service<Request<ReqBody>> for LoginThrottleService<S>
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
            let Some(ip) = client_ip else {
                return inner.call(req).await;
            };

            let (blocked, retry_after) = throttle.is_blocked(ip).await;
            if blocked {
                tracing::warn!(address = %ip, retry_after, "Blocked address attempted authentication");
                return Ok(catalog.render(&ApiError::rate_limited(retry_after)));
            }

            let response = inner.call(req).await?;

            match response.status() {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => throttle.record_failure(ip).await,
                StatusCode::OK => throttle.reset_failures(ip).await,
                _ => {}
            }

            Ok(response)
        })
    }
}
