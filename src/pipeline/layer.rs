//! Tower wrapping of the [`Gatekeeper`] around a downstream service.
//!
//! The wrapped service's error type is [`Terminated`]. Hyper closes the
//! connection without writing a response when a service fails, which is
//! exactly the terminate outcome. Because of that the layer must be the
//! outermost one: `Router::layer` only accepts infallible services, so apply
//! it with `GatekeeperLayer::layer(router)` or a `ServiceBuilder`.

use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service, ServiceExt};

use crate::pipeline::decision::{Decision, TerminateReason, Terminated};
use crate::pipeline::gatekeeper::Gatekeeper;

#[derive(Clone)]
pub struct GatekeeperLayer {
    gatekeeper: Arc<Gatekeeper>,
}

impl GatekeeperLayer {
    pub fn new(gatekeeper: Arc<Gatekeeper>) -> Self {
        Self { gatekeeper }
    }
}

impl<S> Layer<S> for GatekeeperLayer {
    type Service = GatekeeperService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GatekeeperService {
            inner,
            gatekeeper: self.gatekeeper.clone(),
        }
    }
}

#[derive(Clone)]
pub struct GatekeeperService<S> {
    inner: S,
    gatekeeper: Arc<Gatekeeper>,
}

impl<S> Service<Request> for GatekeeperService<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Terminated;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(|never| match never {})
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let not_ready = self.inner.clone();
        let ready = std::mem::replace(&mut self.inner, not_ready);
        let gatekeeper = self.gatekeeper.clone();

        Box::pin(async move {
            // A panicking stage must not turn into admission.
            let decision = AssertUnwindSafe(gatekeeper.evaluate(req))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    tracing::error!("Admission pipeline panicked");
                    Decision::Terminate(TerminateReason::Internal)
                });

            match decision {
                Decision::Admit(req) => match ready.oneshot(req).await {
                    Ok(response) => Ok(response),
                    Err(never) => match never {},
                },
                Decision::Reject(status) => Ok(status.into_response()),
                Decision::Terminate(reason) => Err(Terminated { reason }),
            }
        })
    }
}
