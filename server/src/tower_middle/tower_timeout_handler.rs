use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use hyper::Request;
use tokio::time;
use tower::{Layer, Service};

use crate::ApiResponse;
use crate::errors::{ErrorCatalog, ErrorCode};

/// Tower layer for request timeouts
///
/// If the inner service does not respond within the configured
/// duration, a `REQUEST_TIMEOUT` rejection is returned.
#[derive(Clone)]
pub struct TimeoutLayer {
    duration: Duration,
    catalog: Arc<ErrorCatalog>,
}

impl TimeoutLayer {
    pub fn new(duration: Duration, catalog: Arc<ErrorCatalog>) -> Self {
        Self { duration, catalog }
    }
}

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService {
            inner,
            duration: self.duration,
            catalog: self.catalog.clone(),
        }
    }
}

/// The actual timeout service
#[derive(Clone)]
pub struct TimeoutService<S> {
    inner: S,
    duration: Duration,
    catalog: Arc<ErrorCatalog>,
}

impl<S, ReqBody> Service<Request<ReqBody>> for TimeoutService<S>
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
        let duration = self.duration;
        let catalog = self.catalog.clone();
        let path = req.uri().path().to_string();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            match time::timeout(duration, inner.call(req)).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(path = %path, "Request timed out after {:?}", duration);
                    Ok(catalog.render(&ErrorCode::RequestTimeout.into()))
                }
            }
        })
    }
}
