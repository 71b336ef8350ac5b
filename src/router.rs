//! Radix-tree request router.
//!
//! One tree per HTTP verb plus one tree for routes registered on every verb.
//! O(path-length) lookup. The router only maps method + path to a composed
//! [`HandlerFunc`]; all layering happens before a handler gets here.

use std::collections::HashMap;
use std::sync::Arc;

use matchit::Router as MatchitRouter;

use crate::error::Error;
use crate::handler::HandlerFunc;
use crate::method::RouteMethod;

/// The application router. Built by [`App`](crate::App) and frozen into a
/// [`Service`](crate::Service).
#[derive(Default)]
pub struct Router {
    routes: HashMap<http::Method, MatchitRouter<HandlerFunc>>,
    any: MatchitRouter<HandlerFunc>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for a verb + path pair.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them.
    /// Conflicting or malformed paths are an [`Error::InvalidRoute`].
    pub fn on(&mut self, method: RouteMethod, path: &str, handler: HandlerFunc) -> Result<(), Error> {
        let tree = match method.to_http() {
            Some(verb) => self.routes.entry(verb).or_default(),
            None => &mut self.any,
        };
        tree.insert(path, handler).map_err(|e| Error::InvalidRoute {
            path: path.to_owned(),
            reason: e.to_string(),
        })
    }

    /// Verb-specific routes win over `ANY` routes on the same path.
    pub(crate) fn lookup(
        &self,
        method: &http::Method,
        path: &str,
    ) -> Option<(HandlerFunc, HashMap<String, String>)> {
        let matched = self
            .routes
            .get(method)
            .and_then(|tree| tree.at(path).ok())
            .or_else(|| self.any.at(path).ok())?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::handler::ready;
    use crate::response::Response;

    fn text(body: &'static str) -> HandlerFunc {
        Arc::new(move |_: Context| ready(Response::text(body)))
    }

    #[test]
    fn lookup_extracts_params() {
        let mut router = Router::new();
        router.on(RouteMethod::Get, "/users/{id}", text("user")).unwrap();
        let (_, params) = router.lookup(&http::Method::GET, "/users/42").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("42"));
        assert!(router.lookup(&http::Method::POST, "/users/42").is_none());
    }

    #[test]
    fn any_matches_every_verb() {
        let mut router = Router::new();
        router.on(RouteMethod::Any, "/ws", text("ws")).unwrap();
        assert!(router.lookup(&http::Method::GET, "/ws").is_some());
        assert!(router.lookup(&http::Method::DELETE, "/ws").is_some());
    }

    #[test]
    fn duplicate_route_is_an_error() {
        let mut router = Router::new();
        router.on(RouteMethod::Get, "/a", text("a")).unwrap();
        let err = router.on(RouteMethod::Get, "/a", text("b")).unwrap_err();
        assert!(matches!(err, Error::InvalidRoute { .. }));
    }
}
