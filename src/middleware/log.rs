//! Request logging.

use std::sync::Arc;

use tracing::info;

use super::{MethodLayer, Middleware, MiddlewareContext, Slot};
use crate::context::Context;
use crate::error::Error;
use crate::handler::{BoxFuture, HandlerFunc};

/// Logs one `info` event per request: status, latency, client address,
/// method, path and request body size.
///
/// `@Log real_ip_header=CF-Connecting-IP` takes the client address from
/// that header when present (a CDN or proxy in front of the server).
#[derive(Clone, Debug)]
pub struct Log {
    slot: Slot,
    real_ip_header: Option<String>,
}

impl Log {
    pub fn new(slot: Slot) -> Self {
        Self { slot, real_ip_header: None }
    }
}

impl Middleware for Log {
    fn name(&self) -> &str {
        "Log"
    }

    fn slot(&self) -> Slot {
        self.slot
    }

    fn as_layer(&self) -> Option<&dyn MethodLayer> {
        Some(self)
    }
}

impl MethodLayer for Log {
    fn clone_layer(&self) -> Box<dyn MethodLayer> {
        Box::new(Self::new(self.slot))
    }

    /// A malformed parameter just disables the header lookup.
    fn configure(&mut self, ctx: &MiddlewareContext<'_>) -> Result<(), Error> {
        self.real_ip_header = ctx.query_value("real_ip_header").filter(|h| !h.is_empty());
        Ok(())
    }

    fn wrap(self: Arc<Self>, ctx: &MiddlewareContext<'_>, next: HandlerFunc) -> HandlerFunc {
        let target = format!("{}.{}", ctx.controller, ctx.method);
        Arc::new(move |ctx: Context| -> BoxFuture {
            let req = ctx.request();
            let client = self
                .real_ip_header
                .as_deref()
                .and_then(|h| req.header(h))
                .map(str::to_owned)
                .or_else(|| req.remote_addr().map(|a| a.ip().to_string()))
                .unwrap_or_default();
            let method = req.method().clone();
            let path = req.uri().to_string();
            let body_size = req.body().len();
            let target = target.clone();
            let next = Arc::clone(&next);

            Box::pin(async move {
                let started = std::time::Instant::now();
                let response = next(ctx).await;
                info!(
                    status = response.status_code().as_u16(),
                    latency = ?started.elapsed(),
                    %client,
                    %method,
                    %path,
                    body_size,
                    %target,
                    "request"
                );
                response
            })
        })
    }
}
