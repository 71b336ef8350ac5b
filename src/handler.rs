//! Handler trait and type erasure.
//!
//! # How composed chains are stored
//!
//! Every route ends up as one [`HandlerFunc`]: an `Arc` around a closure
//! taking the per-request [`Context`] and returning a boxed future. Middleware
//! wrap a `HandlerFunc` in another `HandlerFunc`, so a whole chain has the
//! same type as a single handler and the router stores them uniformly.
//!
//! ```text
//! async fn hello(ctx: Context) -> Response { … }     ← user writes this
//!        ↓ handler_fn(hello)
//! Arc::new(move |ctx| Box::pin(async { … }))        ← HandlerFunc
//!        ↓ layer.wrap(ctx, next)                    ← once per layer, at startup
//! Arc::new(move |ctx| { …; next(ctx) })             ← still a HandlerFunc
//!        ↓ router.on(method, path, chain)
//! chain(ctx)  at request time                       ← one virtual call per layer
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::response::{IntoResponse, Response};

// ── Types ─────────────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future that resolves to a [`Response`].
///
/// `Pin<Box<…>>` is required because the async runtime must be able to poll
/// the future in-place. `Send + 'static` let tokio move the future across
/// threads.
pub type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// A type-erased request handler shared across concurrent requests.
///
/// Cloning is one atomic increment. The composed chain for a route is built
/// once at startup and then only ever cloned.
pub type HandlerFunc = Arc<dyn Fn(Context) -> BoxFuture + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every function usable as a raw handler.
///
/// You never implement this yourself. It is automatically satisfied for any
/// `async fn` with the signature:
///
/// ```text
/// async fn name(ctx: Context) -> impl IntoResponse
/// ```
///
/// The trait is **sealed**: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_handler_func(self) -> HandlerFunc;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_handler_func(self) -> HandlerFunc {
        Arc::new(move |ctx: Context| -> BoxFuture {
            let fut = (self)(ctx);
            Box::pin(async move { fut.await.into_response() })
        })
    }
}

/// Erases a handler function.
pub fn handler_fn(handler: impl Handler) -> HandlerFunc {
    handler.into_handler_func()
}

/// A future that is already done.
pub(crate) fn ready(response: Response) -> BoxFuture {
    Box::pin(std::future::ready(response))
}

#[cfg(test)]
mod tests {
    use http::{Method, StatusCode};

    use super::*;
    use crate::inject::Injector;
    use crate::request::Request;

    async fn echo_path(ctx: Context) -> String {
        ctx.request().path().to_owned()
    }

    fn ctx(uri: &str) -> Context {
        Context::new(Request::builder(Method::GET, uri).build(), Arc::new(Injector::new()))
    }

    #[tokio::test]
    async fn async_fn_becomes_handler_func() {
        let handler = handler_fn(echo_path);
        let res = handler(ctx("/a/b")).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.text_body(), "/a/b");
    }

    #[tokio::test]
    async fn closures_returning_statuses_work_too() {
        let handler = handler_fn(|_ctx: Context| async { StatusCode::NO_CONTENT });
        assert_eq!(handler(ctx("/")).await.status_code(), StatusCode::NO_CONTENT);
    }
}
