//! Per-request state passed down a composed chain.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::inject::{InjectError, Injector, Invocable};
use crate::request::Request;

/// The request plus a child [`Injector`] scoped to it.
///
/// Middleware receive the context by value, may add request-scoped values,
/// and hand it on to the next handler. The injector's parent is the
/// application's root injector; the [`Request`] itself is always mapped.
pub struct Context {
    pub(crate) request: Request,
    pub(crate) injector: Injector,
    keys: HashMap<String, Arc<dyn Any + Send + Sync>>,
    started: Instant,
}

impl Context {
    pub fn new(request: Request, root: Arc<Injector>) -> Self {
        let mut injector = Injector::child(root);
        injector.map(request.clone());
        Self {
            request,
            injector,
            keys: HashMap::new(),
            started: Instant::now(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn injector(&self) -> &Injector {
        &self.injector
    }

    /// Makes `value` injectable for the rest of this request.
    pub fn map<T>(&mut self, value: T) -> &mut Self
    where
        T: Clone + Send + Sync + 'static,
    {
        self.injector.map(value);
        self
    }

    pub fn resolve<T: Clone + 'static>(&self) -> Result<T, InjectError> {
        self.injector.resolve()
    }

    pub fn invoke<Args, F: Invocable<Args>>(&self, f: &F) -> Result<F::Output, InjectError> {
        self.injector.invoke(f)
    }

    /// Stores a string-keyed value, replacing any previous one.
    pub fn set<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, value: T) {
        self.keys.insert(key.into(), Arc::new(value));
    }

    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<&T> {
        self.keys.get(key)?.downcast_ref()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use http::Method;

    use super::*;

    fn ctx() -> Context {
        let mut root = Injector::new();
        root.map(Arc::new(String::from("root service")));
        Context::new(Request::builder(Method::GET, "/x?y=1").build(), Arc::new(root))
    }

    #[test]
    fn request_is_injectable() {
        let ctx = ctx();
        let req: Request = ctx.resolve().unwrap();
        assert_eq!(req.query(), "y=1");
    }

    #[test]
    fn request_scope_falls_back_to_root() {
        let mut ctx = ctx();
        ctx.map(7_u32);
        assert_eq!(ctx.resolve::<u32>().unwrap(), 7);
        let service: Arc<String> = ctx.resolve().unwrap();
        assert_eq!(service.as_str(), "root service");
    }

    #[test]
    fn keyed_values_are_typed() {
        let mut ctx = ctx();
        ctx.set("user", String::from("ada"));
        assert_eq!(ctx.get::<String>("user").map(String::as_str), Some("ada"));
        assert_eq!(ctx.get::<u32>("user"), None);
        assert_eq!(ctx.get::<String>("missing"), None);
    }
}
