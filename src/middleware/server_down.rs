//! Maintenance switch.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use http::StatusCode;
use tracing::warn;

use super::{MethodLayer, Middleware, MiddlewareContext, RouteSource, Slot};
use crate::context::Context;
use crate::error::Error;
use crate::handler::{HandlerFunc, ready};
use crate::method::RouteMethod;
use crate::response::Response;
use crate::route::RouteItem;

/// Global middleware that can take the server out of service at runtime.
///
/// It contributes a hidden `PATCH /serverDown/{key}` route; calling it with
/// the configured key flips the switch. While down, every other route
/// answers `503 Service Unavailable`.
///
/// Clones share the switch, so the toggle route and every composed chain
/// see the same state.
#[derive(Clone, Debug)]
pub struct ServerDown {
    key: Arc<str>,
    down: Arc<AtomicBool>,
}

impl ServerDown {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: Arc::from(key.into().trim()),
            down: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_down(&self) -> bool {
        self.down.load(Ordering::Acquire)
    }
}

impl Middleware for ServerDown {
    fn name(&self) -> &str {
        "ServerDown"
    }

    fn slot(&self) -> Slot {
        Slot::Global
    }

    fn as_layer(&self) -> Option<&dyn MethodLayer> {
        Some(self)
    }

    fn as_route_source(&self) -> Option<&dyn RouteSource> {
        Some(self)
    }
}

impl MethodLayer for ServerDown {
    fn clone_layer(&self) -> Box<dyn MethodLayer> {
        Box::new(self.clone())
    }

    fn wrap(self: Arc<Self>, _ctx: &MiddlewareContext<'_>, next: HandlerFunc) -> HandlerFunc {
        Arc::new(move |ctx: Context| {
            if self.is_down() {
                return ready(
                    Response::builder()
                        .status(StatusCode::SERVICE_UNAVAILABLE)
                        .text("server is under maintenance"),
                );
            }
            next(ctx)
        })
    }
}

impl RouteSource for ServerDown {
    fn routes(&self, _ctx: &MiddlewareContext<'_>) -> Result<Vec<RouteItem>, Error> {
        if self.key.is_empty() {
            return Err(Error::middleware_param("ServerDown", "empty key"));
        }
        let key = Arc::clone(&self.key);
        let down = Arc::clone(&self.down);
        let toggle: HandlerFunc = Arc::new(move |ctx: Context| {
            if ctx.request().param("key").map(str::trim) == Some(&*key) {
                let was = down.fetch_xor(true, Ordering::AcqRel);
                warn!(down = !was, "server down switch toggled");
            }
            ready(Response::text("ok"))
        });
        Ok(vec![
            RouteItem::new(RouteMethod::Patch, "/serverDown/{key}", toggle)
                .hidden()
                .owner("ServerDown"),
        ])
    }
}
