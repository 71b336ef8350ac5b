//! Kubernetes health-check routes.
//!
//! Kubernetes asks two questions. [`Health`] answers them.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the pod serve traffic? Failure → pulled from load-balancer. |
//!
//! Both routes are mounted at the server root regardless of `basePath`, and
//! are not wrapped by any middleware chain: a pod in maintenance mode is
//! still alive.

use std::sync::Arc;

use super::{Middleware, MiddlewareContext, RouteSource, Slot};
use crate::context::Context;
use crate::error::Error;
use crate::handler::{HandlerFunc, ready};
use crate::method::RouteMethod;
use crate::response::Response;
use crate::route::RouteItem;

/// Global route source serving `GET /healthz` and `GET /readyz`.
#[derive(Clone, Debug)]
pub struct Health {
    liveness: String,
    readiness: String,
}

impl Default for Health {
    fn default() -> Self {
        Self { liveness: "/healthz".to_owned(), readiness: "/readyz".to_owned() }
    }
}

impl Health {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves the probes on other paths.
    pub fn paths(liveness: impl Into<String>, readiness: impl Into<String>) -> Self {
        Self { liveness: liveness.into(), readiness: readiness.into() }
    }
}

impl Middleware for Health {
    fn name(&self) -> &str {
        "Health"
    }

    fn slot(&self) -> Slot {
        Slot::Global
    }

    fn as_route_source(&self) -> Option<&dyn RouteSource> {
        Some(self)
    }
}

impl RouteSource for Health {
    fn routes(&self, _ctx: &MiddlewareContext<'_>) -> Result<Vec<RouteItem>, Error> {
        // Always 200 "ok": if the process can answer HTTP at all, it is alive.
        let liveness: HandlerFunc = Arc::new(|_: Context| ready(Response::text("ok")));
        let readiness: HandlerFunc = Arc::new(|_: Context| ready(Response::text("ready")));
        Ok(vec![
            RouteItem::new(RouteMethod::Get, self.liveness.clone(), liveness)
                .owner("Health")
                .override_base_path(),
            RouteItem::new(RouteMethod::Get, self.readiness.clone(), readiness)
                .owner("Health")
                .override_base_path(),
        ])
    }
}
