//! Middleware layer.
//!
//! A middleware is a prototype registered once in the
//! [`MiddlewareRegistry`]. It declares *where* it applies ([`Slot`]) and,
//! through optional capabilities, *what* it can do:
//!
//! - [`MethodLayer`]: wrap a route's handler. The prototype is cloned for
//!   each composition, the clone is configured from the annotation
//!   parameter, then frozen and asked to wrap the next handler.
//! - [`RouteSource`]: contribute extra routes (health probes, toggles).
//!
//! Within a composed chain the order is fixed, outermost first:
//!
//! ```text
//! Global  →  Controller  →  Method  →  business method
//! ```
//!
//! Built-in middleware:
//! - [`Recovery`]: turns panics into `500`
//! - [`ServerDown`]: maintenance switch
//! - [`BasicAuth`]: HTTP basic authentication
//! - [`Log`]: one event per request
//! - [`Health`]: Kubernetes probes
//! - [`ResponseRewriter`]: wraps every `200` in a `{Code, Message, Data}` envelope

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::attribute::{AttributeType, DeclKind, Vocabulary};
use crate::error::Error;
use crate::handler::HandlerFunc;
use crate::inject::Injector;
use crate::route::RouteItem;

mod basic_auth;
mod health;
mod log;
mod recovery;
pub mod registry;
mod response_rewriter;
mod server_down;

pub use basic_auth::{AuthUser, BasicAuth};
pub use health::Health;
pub use log::Log;
pub use recovery::Recovery;
pub use registry::MiddlewareRegistry;
pub use response_rewriter::ResponseRewriter;
pub use server_down::ServerDown;

// ── Slot ──────────────────────────────────────────────────────────────────────

/// The scope a middleware applies at.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Slot {
    /// Every route, no annotation needed, cannot be ignored.
    Global,
    /// Routes of controllers annotated with the middleware's attribute.
    Controller,
    /// Methods annotated with the middleware's attribute.
    Method,
}

// ── Capabilities ──────────────────────────────────────────────────────────────

/// A registered middleware prototype.
pub trait Middleware: Send + Sync + 'static {
    /// Stable identifier; the registry key for global middleware.
    fn name(&self) -> &str;

    /// Annotation that activates the middleware, without the `@`.
    fn attribute(&self) -> &str {
        self.name()
    }

    fn slot(&self) -> Slot;

    /// Teaches the classifier this middleware's annotation. Runs once, when
    /// the middleware is registered.
    fn register(&self, vocabulary: &mut Vocabulary) {
        let kind = match self.slot() {
            Slot::Global => return,
            Slot::Controller => DeclKind::Controller,
            Slot::Method => DeclKind::Method,
        };
        vocabulary.add(kind, self.attribute(), AttributeType::Middleware);
    }

    fn as_layer(&self) -> Option<&dyn MethodLayer> {
        None
    }

    fn as_route_source(&self) -> Option<&dyn RouteSource> {
        None
    }
}

/// Wraps handlers.
pub trait MethodLayer: Send + Sync + 'static {
    /// A fresh copy for one composition. The prototype is never configured.
    fn clone_layer(&self) -> Box<dyn MethodLayer>;

    /// Reads the annotation parameter. Errors abort startup.
    fn configure(&mut self, _ctx: &MiddlewareContext<'_>) -> Result<(), Error> {
        Ok(())
    }

    /// Returns a handler that runs this layer and then, unless it answers
    /// by itself, `next`.
    fn wrap(self: Arc<Self>, ctx: &MiddlewareContext<'_>, next: HandlerFunc) -> HandlerFunc;

    /// Used instead of [`wrap`](MethodLayer::wrap) when the method carries
    /// `@Ignore <attribute>`. Skips the layer entirely unless overridden.
    fn wrap_ignored(self: Arc<Self>, _ctx: &MiddlewareContext<'_>, next: HandlerFunc) -> HandlerFunc {
        next
    }
}

/// Contributes routes, once per controller or once globally.
pub trait RouteSource: Send + Sync + 'static {
    fn routes(&self, ctx: &MiddlewareContext<'_>) -> Result<Vec<RouteItem>, Error>;
}

// ── MiddlewareContext ─────────────────────────────────────────────────────────

/// Composition-time view of one (controller, method, slot) step.
///
/// Lives only while a route is being composed; what a layer needs at request
/// time it must capture in the handler it returns.
pub struct MiddlewareContext<'a> {
    pub controller: &'a str,
    /// Empty while configuring controller and global layers; set for every
    /// `wrap`.
    pub method: &'a str,
    pub slot: Slot,
    /// Raw annotation value, e.g. `realm=api&admin=secret`.
    pub param: &'a str,
    pub injector: &'a Injector,
    /// The method carries `@Ignore` for this middleware.
    pub ignored: bool,
    values: HashMap<Slot, Arc<dyn Any + Send + Sync>>,
}

impl<'a> MiddlewareContext<'a> {
    pub fn new(controller: &'a str, slot: Slot, injector: &'a Injector) -> Self {
        Self {
            controller,
            method: "",
            slot,
            param: "",
            injector,
            ignored: false,
            values: HashMap::new(),
        }
    }

    pub fn method(mut self, method: &'a str) -> Self {
        self.method = method;
        self
    }

    pub fn param(mut self, param: &'a str) -> Self {
        self.param = param;
        self
    }

    pub fn ignored(mut self, ignored: bool) -> Self {
        self.ignored = ignored;
        self
    }

    /// Attaches a value for the given scope: the registrar stores the
    /// controller instance under [`Slot::Controller`] and the method's
    /// metadata under [`Slot::Method`].
    pub fn with_value<T: Send + Sync + 'static>(mut self, slot: Slot, value: T) -> Self {
        self.values.insert(slot, Arc::new(value));
        self
    }

    pub(crate) fn with_shared(mut self, slot: Slot, value: Arc<dyn Any + Send + Sync>) -> Self {
        self.values.insert(slot, value);
        self
    }

    pub fn value<T: Send + Sync + 'static>(&self, slot: Slot) -> Option<&T> {
        self.values.get(&slot)?.downcast_ref()
    }

    /// The parameter parsed as a query string, pairs in order.
    pub fn query(&self) -> Result<Vec<(String, String)>, serde_urlencoded::de::Error> {
        serde_urlencoded::from_str(self.param.trim())
    }

    /// First value for `key`, if the parameter parses and contains it.
    pub fn query_value(&self, key: &str) -> Option<String> {
        self.query()
            .ok()?
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_parses_the_param() {
        let injector = Injector::new();
        let ctx = MiddlewareContext::new("Users", Slot::Method, &injector)
            .param("real_ip_header=CF-Connecting-IP&x=1");
        assert_eq!(ctx.query_value("real_ip_header").as_deref(), Some("CF-Connecting-IP"));
        assert_eq!(ctx.query().unwrap().len(), 2);
        assert_eq!(ctx.query_value("missing"), None);
    }

    #[test]
    fn values_are_keyed_by_slot() {
        let injector = Injector::new();
        let ctx = MiddlewareContext::new("Users", Slot::Method, &injector)
            .with_value(Slot::Controller, 7_u8)
            .with_value(Slot::Method, "List");
        assert_eq!(ctx.value::<u8>(Slot::Controller), Some(&7));
        assert_eq!(ctx.value::<&str>(Slot::Method), Some(&"List"));
        assert_eq!(ctx.value::<u8>(Slot::Method), None);
    }
}
