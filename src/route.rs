//! Route records and the printable route table.

use tracing::info;

use crate::handler::HandlerFunc;
use crate::method::RouteMethod;

// ── RouteItem ─────────────────────────────────────────────────────────────────

/// A route contributed by a middleware, registered once at startup.
///
/// Paths are relative to the owning controller's base path (or the server
/// base path for global middleware) unless
/// [`override_base_path`](RouteItem::override_base_path) is set.
#[derive(Clone)]
pub struct RouteItem {
    pub method: RouteMethod,
    pub path: String,
    /// Registered but never listed in the route table.
    pub hidden: bool,
    pub handler: Option<HandlerFunc>,
    /// Name of the middleware that contributed the route.
    pub owner: String,
    pub override_base_path: bool,
}

impl RouteItem {
    pub fn new(method: RouteMethod, path: impl Into<String>, handler: HandlerFunc) -> Self {
        Self {
            method,
            path: path.into(),
            hidden: false,
            handler: Some(handler),
            owner: String::new(),
            override_base_path: false,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn override_base_path(mut self) -> Self {
        self.override_base_path = true;
        self
    }

    /// Items without a handler or a path are skipped.
    pub fn is_empty(&self) -> bool {
        self.handler.is_none() || self.path.is_empty()
    }
}

// ── join_route ────────────────────────────────────────────────────────────────

/// Joins a base path and a route path with exactly one `/` between them.
///
/// With `override_base` the path is used as given. An empty or `/` path maps
/// to the base itself, without a trailing slash.
///
/// ```rust
/// use sigil::route::join_route;
///
/// assert_eq!(join_route("/api/", "/users", false), "/api/users");
/// assert_eq!(join_route("/api/", "/", false), "/api");
/// assert_eq!(join_route("/", "", false), "/");
/// assert_eq!(join_route("/api", "/healthz", true), "/healthz");
/// ```
pub fn join_route(base: &str, path: &str, override_base: bool) -> String {
    if override_base {
        return path.to_owned();
    }
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    match (base.is_empty(), path.is_empty()) {
        (true, true) => "/".to_owned(),
        (_, true) => ensure_leading_slash(base),
        (true, false) => format!("/{path}"),
        (false, false) => format!("{}/{path}", ensure_leading_slash(base)),
    }
}

fn ensure_leading_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    }
}

// ── Route table ───────────────────────────────────────────────────────────────

/// One listed route.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RouteEntry {
    /// Controller name, or `Global` for global middleware routes.
    pub group: String,
    pub method: RouteMethod,
    pub path: String,
    /// `Controller.Method` for business routes, `Middleware.H` otherwise.
    pub target: String,
    /// Middleware annotations in effect, e.g. `@BasicAuth,@Log`.
    pub signature: String,
}

/// Every non-hidden route in registration order.
#[derive(Clone, Debug, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn add(&mut self, entry: RouteEntry) {
        info!(
            controller = %entry.group,
            method = %entry.method,
            path = %entry.path,
            target = %entry.target,
            signature = %entry.signature,
            "route"
        );
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, method: RouteMethod, path: &str) -> Option<&RouteEntry> {
        self.entries.iter().find(|e| e.method == method && e.path == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_uses_exactly_one_slash() {
        assert_eq!(join_route("/api", "users", false), "/api/users");
        assert_eq!(join_route("/api/", "/users/", false), "/api/users/");
        assert_eq!(join_route("api", "users", false), "/api/users");
    }

    #[test]
    fn empty_path_is_the_base() {
        assert_eq!(join_route("/api/v1/", "", false), "/api/v1");
        assert_eq!(join_route("/api/v1", "/", false), "/api/v1");
        assert_eq!(join_route("/", "/", false), "/");
    }

    #[test]
    fn root_base_keeps_path() {
        assert_eq!(join_route("/", "/hello", false), "/hello");
        assert_eq!(join_route("", "hello", false), "/hello");
    }

    #[test]
    fn override_ignores_base() {
        assert_eq!(join_route("/api", "/readyz", true), "/readyz");
    }
}
