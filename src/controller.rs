//! Controllers and their business methods.
//!
//! The analyzer knows a controller's methods by name; the running program
//! knows them as Rust functions. A [`Controller`] bridges the two by filling
//! a [`MethodTable`] that maps each routed method name to a callable whose
//! arguments are resolved from the per-request injector:
//!
//! ```rust
//! use std::sync::Arc;
//! use sigil::{Controller, MethodTable};
//! use sigil::bind::Bound;
//!
//! struct HelloController;
//!
//! impl HelloController {
//!     async fn hello(self: Arc<Self>, name: Bound<String>) -> String {
//!         format!("Hello {}", name.0)
//!     }
//! }
//!
//! impl Controller for HelloController {
//!     const NAME: &'static str = "demo.HelloController";
//!
//!     fn methods(table: &mut MethodTable) {
//!         table.method("Hello", Self::hello);
//!     }
//! }
//! ```
//!
//! The controller itself is mapped into the root injector as `Arc<Self>`, so
//! `self: Arc<Self>` receivers resolve like any other dependency.

use std::future::Future;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{error, warn};

use crate::bind::{BindFn, ParamSpec};
use crate::context::Context;
use crate::handler::{BoxFuture, HandlerFunc, ready};
use crate::inject::{InjectError, Injector, Invocable, MethodParams};
use crate::response::{IntoResponse, Response};

/// A live controller instance.
pub trait Controller: Send + Sync + Sized + 'static {
    /// Metadata key of the struct: `package.Name`, or the bare name.
    const NAME: &'static str;

    /// Runs once against the root injector before the controller is frozen.
    fn init(&mut self, _injector: &Injector) -> Result<(), InjectError> {
        Ok(())
    }

    /// Registers every routable method.
    fn methods(table: &mut MethodTable);
}

// ── Endpoints ─────────────────────────────────────────────────────────────────

/// A business method: an async function whose arguments come from the
/// injector and whose output implements [`IntoResponse`].
pub trait Endpoint<Args>: Send + Sync + 'static {
    /// Binders for the arguments read from the request, in argument order.
    fn binders() -> Vec<BindFn>;

    fn call(&self, injector: &Injector) -> Result<BoxFuture, InjectError>;
}

impl<F, Args, Fut> Endpoint<Args> for F
where
    F: Invocable<Args, Output = Fut>,
    Args: MethodParams,
    Fut: Future + Send + 'static,
    Fut::Output: IntoResponse,
{
    fn binders() -> Vec<BindFn> {
        Args::binders()
    }

    fn call(&self, injector: &Injector) -> Result<BoxFuture, InjectError> {
        let fut = self.invoke(injector)?;
        Ok(Box::pin(async move { fut.await.into_response() }))
    }
}

type CallFn = Arc<dyn Fn(&Injector) -> Result<BoxFuture, InjectError> + Send + Sync>;

/// One erased business method.
#[derive(Clone)]
pub struct MethodEntry {
    name: String,
    binders: Vec<BindFn>,
    call: CallFn,
}

impl MethodEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of arguments bound from the request.
    pub fn bound_params(&self) -> usize {
        self.binders.len()
    }

    /// The innermost handler of a route: binds parameters, then calls the
    /// method.
    ///
    /// `specs` pairs with the bound arguments in order. A binding failure
    /// answers `400`; an unresolvable dependency answers `500`.
    pub fn handler(&self, specs: Vec<ParamSpec>) -> HandlerFunc {
        let bindings: Arc<[(ParamSpec, BindFn)]> = self
            .binders
            .iter()
            .enumerate()
            .map(|(i, bind)| {
                let spec = specs
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| ParamSpec::new(format!("arg{i}"), i, None));
                (spec, *bind)
            })
            .collect();
        let call = Arc::clone(&self.call);
        let method = self.name.clone();

        Arc::new(move |mut ctx: Context| {
            for (spec, bind) in bindings.iter() {
                if let Err(err) = bind(spec, &ctx.request, &mut ctx.injector) {
                    warn!(method = %method, param = %spec.name, "bind failed: {err}");
                    return ready(err.into_response());
                }
            }
            match call(&ctx.injector) {
                Ok(fut) => fut,
                Err(err) => {
                    error!(method = %method, "cannot invoke: {err}");
                    ready(Response::builder()
                        .status(http::StatusCode::INTERNAL_SERVER_ERROR)
                        .text(err.to_string()))
                }
            }
        })
    }
}

/// Name → business method, in registration order.
#[derive(Clone, Default)]
pub struct MethodTable {
    entries: IndexMap<String, MethodEntry>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `f` under the analyzer's method name. A second registration
    /// under the same name replaces the first.
    pub fn method<Args, F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Endpoint<Args>,
    {
        let f = Arc::new(f);
        let call: CallFn = Arc::new(move |injector: &Injector| f.call(injector));
        self.entries.insert(name.to_owned(), MethodEntry {
            name: name.to_owned(),
            binders: F::binders(),
            call,
        });
        self
    }

    pub fn get(&self, name: &str) -> Option<&MethodEntry> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use http::{Method, StatusCode};
    use serde::Deserialize;

    use super::*;
    use crate::bind::{Bound, ParamSource};
    use crate::request::Request;

    #[derive(Clone, Deserialize)]
    struct Greeting {
        name: String,
    }

    struct Greeter;

    impl Greeter {
        async fn greet(self: Arc<Self>, who: Bound<Greeting>) -> String {
            format!("hi {}", who.name)
        }
    }

    fn root() -> Arc<Injector> {
        let mut injector = Injector::new();
        injector.map(Arc::new(Greeter));
        Arc::new(injector)
    }

    fn table() -> MethodTable {
        let mut table = MethodTable::new();
        table.method("Greet", Greeter::greet);
        table
    }

    #[test]
    fn only_request_arguments_have_binders() {
        assert_eq!(table().get("Greet").unwrap().bound_params(), 1);
    }

    #[tokio::test]
    async fn handler_binds_then_calls() {
        let handler = table().get("Greet").unwrap().handler(vec![
            ParamSpec::new("who", 0, Some(ParamSource::Query)),
        ]);
        let req = Request::builder(Method::GET, "/greet?name=ada").build();
        let res = handler(Context::new(req, root())).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.text_body(), "hi ada");
    }

    #[tokio::test]
    async fn bind_failure_is_bad_request() {
        let handler = table().get("Greet").unwrap().handler(vec![]);
        let req = Request::builder(Method::GET, "/greet").build();
        let res = handler(Context::new(req, root())).await;
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_dependency_is_server_error() {
        let handler = table().get("Greet").unwrap().handler(vec![]);
        let req = Request::builder(Method::GET, "/greet?name=ada").build();
        let res = handler(Context::new(req, Arc::new(Injector::new()))).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
