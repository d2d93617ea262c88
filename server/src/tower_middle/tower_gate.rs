use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use hyper::Request;
use tower::{Layer, Service};

use crate::ApiResponse;
use crate::auth::{AuthContext, Gate};
use crate::errors::ErrorCatalog;

/// Tower layer enforcing a permission or role [`Gate`] on the identity left
/// by [`AuthLayer`](super::AuthLayer).
#[derive(Clone)]
pub struct GateLayer {
    gate: Arc<Gate>,
    catalog: Arc<ErrorCatalog>,
}

impl GateLayer {
    pub fn new(gate: Gate, catalog: Arc<ErrorCatalog>) -> Self {
        Self {
            gate: Arc::new(gate),
            catalog,
        }
    }
}

impl<S> Layer<S> for GateLayer {
    type Service = GateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GateService {
            inner,
            gate: self.gate.clone(),
            catalog: self.catalog.clone(),
        }
    }
}

#[derive(Clone)]
pub struct GateService<S> {
    inner: S,
    gate: Arc<Gate>,
    catalog: Arc<ErrorCatalog>,
}

impl<S, ReqBody> Service<Request<ReqBody>> for GateService<S>
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
        // Predicates are pure, so the decision is made before boxing.
        let verdict = self.gate.check(req.extensions().get::<AuthContext>());

        let catalog = self.catalog.clone();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            match verdict {
                Ok(()) => inner.call(req).await,
                Err(rejection) => Ok(catalog.render(&rejection)),
            }
        })
    }
}
