//! Panic recovery.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use http::StatusCode;
use tracing::error;

use super::{MethodLayer, Middleware, MiddlewareContext, Slot};
use crate::context::Context;
use crate::handler::{BoxFuture, HandlerFunc};
use crate::response::Response;

/// Global middleware that converts a panic anywhere below it into a `500`
/// whose body is the panic message.
///
/// Register it first so it wraps every other global middleware.
#[derive(Clone, Debug, Default)]
pub struct Recovery;

impl Recovery {
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for Recovery {
    fn name(&self) -> &str {
        "Recovery"
    }

    fn slot(&self) -> Slot {
        Slot::Global
    }

    fn as_layer(&self) -> Option<&dyn MethodLayer> {
        Some(self)
    }
}

impl MethodLayer for Recovery {
    fn clone_layer(&self) -> Box<dyn MethodLayer> {
        Box::new(self.clone())
    }

    fn wrap(self: Arc<Self>, _ctx: &MiddlewareContext<'_>, next: HandlerFunc) -> HandlerFunc {
        Arc::new(move |ctx: Context| -> BoxFuture {
            let next = Arc::clone(&next);
            let method = ctx.request().method().clone();
            let path = ctx.request().path().to_owned();
            Box::pin(async move {
                // `next(ctx)` runs inside the guarded future so a panic while
                // building the future is caught as well.
                match AssertUnwindSafe(async move { next(ctx).await }).catch_unwind().await {
                    Ok(response) => response,
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        error!(%method, %path, "panic recovered: {message}");
                        Response::builder()
                            .status(StatusCode::INTERNAL_SERVER_ERROR)
                            .text(message)
                    }
                }
            })
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        String::new()
    }
}
