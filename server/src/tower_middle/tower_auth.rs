use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use hyper::Request;
use tower::{Layer, Service};

use crate::ApiResponse;
use crate::auth::Authenticator;
use crate::errors::ErrorCatalog;

/// Tower layer that authenticates the request and stores the resulting
/// [`AuthContext`](crate::auth::AuthContext) in its extensions.
#[derive(Clone)]
pub struct AuthLayer {
    authenticator: Authenticator,
    catalog: Arc<ErrorCatalog>,
}

impl AuthLayer {
    pub fn new(authenticator: Authenticator, catalog: Arc<ErrorCatalog>) -> Self {
        Self {
            authenticator,
            catalog,
        }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            authenticator: self.authenticator.clone(),
            catalog: self.catalog.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    authenticator: Authenticator,
    catalog: Arc<ErrorCatalog>,
}

impl<S, ReqBody> Service<Request<ReqBody>> for AuthService<S>
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

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let authenticator = self.authenticator.clone();
        let catalog = self.catalog.clone();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            match authenticator.authenticate(req.headers()).await {
                Ok(identity) => {
                    req.extensions_mut().insert(identity);
                    inner.call(req).await
                }
                Err(rejection) => {
                    tracing::warn!(
                        method = %req.method(),
                        path = %req.uri().path(),
                        code = %rejection.code,
                        "Authentication rejected"
                    );
                    Ok(catalog.render(&rejection))
                }
            }
        })
    }
}
