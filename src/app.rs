//! Route registration.
//!
//! [`App`] fuses the analyzer's metadata with live controllers:
//!
//! 1. the first registration runs the global bootstrap once: global
//!    middleware are configured and their routes registered;
//! 2. each controller struct is found in the metadata, its base path and
//!    controller-scope middleware resolved;
//! 3. each routed method is paired with its HTTP-method attributes (the
//!    N-th `@GET`/`@POST`/… with its own path), composed once and
//!    registered for every pair.
//!
//! [`App::into_service`] freezes everything into a [`Service`], the
//! request dispatcher the server runs.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use http::header::{HeaderName, HeaderValue};
use http::StatusCode;
use tracing::{debug, warn};

use crate::attribute::{AttributeType, Classifier, DeclKind, Vocabulary, find, of_kind};
use crate::bind::{ParamSource, ParamSpec};
use crate::compose::{self, Composer, GlobalLayer, Step};
use crate::config::ServerOptions;
use crate::context::Context;
use crate::controller::{Controller, MethodTable};
use crate::error::Error;
use crate::inject::Injector;
use crate::meta::{Metadata, MethodMeta, StructMeta};
use crate::method::RouteMethod;
use crate::middleware::{Middleware, MiddlewareContext, MiddlewareRegistry, Slot};
use crate::request::Request;
use crate::response::Response;
use crate::route::{RouteEntry, RouteItem, RouteTable, join_route};
use crate::router::Router;

/// Route registrar. Build one, register middleware and controllers, then
/// call [`into_service`](App::into_service) or hand it to
/// [`Server::serve`](crate::Server::serve).
pub struct App {
    options: Arc<ServerOptions>,
    metadata: Metadata,
    classifier: Classifier,
    middleware: MiddlewareRegistry,
    injector: Injector,
    router: Router,
    routes: RouteTable,
    /// `Some` once the global bootstrap ran.
    globals: Option<Vec<GlobalLayer>>,
}

impl Default for App {
    fn default() -> Self {
        Self::new(ServerOptions::default())
    }
}

impl App {
    /// The options are mapped into the injector as `Arc<ServerOptions>`.
    pub fn new(options: ServerOptions) -> Self {
        let options = Arc::new(options);
        let mut injector = Injector::new();
        injector.map(Arc::clone(&options));
        Self {
            options,
            metadata: Metadata::default(),
            classifier: Classifier::default(),
            middleware: MiddlewareRegistry::new(),
            injector,
            router: Router::new(),
            routes: RouteTable::default(),
            globals: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Reads the metadata file named by the options.
    pub fn load_metadata(self) -> Result<Self, Error> {
        let metadata = Metadata::load(&self.options.metadata_file)?;
        Ok(self.with_metadata(metadata))
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Registers a middleware prototype and teaches the classifier its
    /// annotation.
    ///
    /// Register every middleware before the first controller: attributes are
    /// classified once, and global middleware are frozen by the first
    /// registration.
    pub fn use_middleware<M: Middleware>(&mut self, middleware: M) -> &mut Self {
        if self.globals.is_some() && middleware.slot() == Slot::Global {
            warn!(name = middleware.name(), "global middleware registered after the first controller, it will not wrap earlier routes");
        }
        self.middleware.register(middleware, self.classifier.vocabulary_mut());
        self
    }

    pub fn vocabulary_mut(&mut self) -> &mut Vocabulary {
        self.classifier.vocabulary_mut()
    }

    pub fn map<T: Clone + Send + Sync + 'static>(&mut self, value: T) -> &mut Self {
        self.injector.map(value);
        self
    }

    pub fn map_to<I: ?Sized + Send + Sync + 'static>(&mut self, value: Arc<I>) -> &mut Self {
        self.injector.map_to(value);
        self
    }

    pub fn injector(&self) -> &Injector {
        &self.injector
    }

    pub fn injector_mut(&mut self) -> &mut Injector {
        &mut self.injector
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    // ── Global bootstrap ──────────────────────────────────────────────────────

    fn bootstrap_globals(&mut self) -> Result<(), Error> {
        if self.globals.is_some() {
            return Ok(());
        }

        let layers = compose::global_layers(&self.middleware, &self.injector)?;

        let mut items = Vec::new();
        let mut failed = None;
        self.middleware.for_each_global(|mw| {
            let Some(source) = mw.as_route_source() else {
                return false;
            };
            let ctx = MiddlewareContext::new("Global", Slot::Global, &self.injector);
            match source.routes(&ctx) {
                Ok(routes) => {
                    items.extend(routes);
                    false
                }
                Err(err) => {
                    failed = Some(err);
                    true
                }
            }
        });
        if let Some(err) = failed {
            return Err(err);
        }

        for item in items {
            register_item(&mut self.router, &mut self.routes, &self.options.base_path, "Global", item)?;
        }
        debug!(layers = layers.len(), "global middleware ready");
        self.globals = Some(layers);
        Ok(())
    }

    // ── Controllers ───────────────────────────────────────────────────────────

    /// Initializes `controller`, maps it into the injector as `Arc<C>` and
    /// registers every routed method.
    pub fn register_controller<C: Controller>(&mut self, mut controller: C) -> Result<&mut Self, Error> {
        controller.init(&self.injector)?;
        let controller = Arc::new(controller);
        self.injector.map(Arc::clone(&controller));

        self.bootstrap_globals()?;

        let meta: StructMeta = self
            .metadata
            .find_struct(C::NAME)
            .cloned()
            .ok_or_else(|| Error::UnknownController(C::NAME.to_owned()))?;
        let attrs = self
            .classifier
            .classify(DeclKind::Controller, &meta.key(), &meta.docs, &meta.name);
        if !is_controller(&attrs, &meta.name) {
            return Err(Error::NotAController(meta.name.clone()));
        }

        let route = find(&attrs, "ROUTE").map(|a| a.value.as_str()).unwrap_or("");
        let base = join_route(&self.options.base_path, route, false);

        let globals = self.globals.as_deref().unwrap_or_default();
        let composer = Composer::new(&self.middleware, &self.injector, globals)
            .with_controller(Arc::clone(&controller) as Arc<dyn Any + Send + Sync>);
        let layers = composer.controller_layers(&meta.name, &attrs)?;

        // Routes contributed by controller-scope middleware.
        for attr in of_kind(&attrs, AttributeType::Middleware) {
            let Some(source) = self
                .middleware
                .lookup(Slot::Controller, &attr.name)
                .and_then(|mw| mw.as_route_source())
            else {
                continue;
            };
            let ctx = MiddlewareContext::new(&meta.name, Slot::Controller, &self.injector).param(&attr.value);
            for item in source.routes(&ctx)? {
                register_item(&mut self.router, &mut self.routes, &base, &meta.name, item)?;
            }
        }

        let mut table = MethodTable::new();
        C::methods(&mut table);

        for method in meta.methods.iter().filter(|m| !m.private) {
            let method_attrs = self
                .classifier
                .classify(DeclKind::Method, &meta.method_key(method), &method.docs, &method.name);
            let pairs: Vec<(&str, &str)> = of_kind(&method_attrs, AttributeType::HttpMethod)
                .map(|a| (a.name.as_str(), a.value.as_str()))
                .collect();
            if pairs.is_empty() {
                continue;
            }

            let entry = table.get(&method.name).ok_or_else(|| Error::UnboundMethod {
                controller: meta.name.clone(),
                method: method.name.clone(),
            })?;
            let specs = param_specs(&self.classifier, &meta, method)?;
            if !method.params.is_empty() && specs.len() != entry.bound_params() {
                return Err(Error::SignatureMismatch {
                    controller: meta.name.clone(),
                    method: method.name.clone(),
                    declared: specs.len(),
                    bound: entry.bound_params(),
                });
            }

            let step = Step {
                controller: &meta.name,
                method: &method.name,
                attributes: &method_attrs,
                meta: Some(method),
            };
            let composed = composer.compose(&step, &layers, entry.handler(specs))?;
            let mut signature = composed.signature;
            if method.inherited {
                signature.push("@inherit".to_owned());
            }
            let signature = signature.join(",");

            for (verb, path) in pairs {
                let full = join_route(&base, path, false);
                let verb: RouteMethod = verb.parse().map_err(|_| Error::UnsupportedMethod {
                    method: verb.to_owned(),
                    path: full.clone(),
                })?;
                self.router.on(verb, &full, Arc::clone(&composed.handler))?;
                self.routes.add(RouteEntry {
                    group: meta.name.clone(),
                    method: verb,
                    path: full,
                    target: format!("{}.{}", meta.name, method.name),
                    signature: signature.clone(),
                });
            }
        }

        Ok(self)
    }

    /// Freezes the app. Runs the global bootstrap if no controller did.
    pub fn into_service(mut self) -> Result<Service, Error> {
        self.bootstrap_globals()?;
        Ok(Service {
            router: Arc::new(self.router),
            injector: Arc::new(self.injector),
            options: self.options,
        })
    }
}

fn is_controller(attrs: &[crate::attribute::Attribute], name: &str) -> bool {
    find(attrs, "CONTROLLER").is_some() || find(attrs, "CTL").is_some() || name.ends_with("Controller")
}

/// Specs for the parameters bound from the request, in declaration order.
/// `@Service` parameters come from the injector and are not listed.
fn param_specs(
    classifier: &Classifier,
    owner: &StructMeta,
    method: &MethodMeta,
) -> Result<Vec<ParamSpec>, Error> {
    let mut params: Vec<_> = method.params.iter().collect();
    params.sort_by_key(|p| p.index);

    let mut specs = Vec::with_capacity(params.len());
    for param in params {
        let attrs = classifier.classify(
            DeclKind::Param,
            &owner.param_key(method, param),
            &param.docs,
            &param.name,
        );
        let source = match of_kind(&attrs, AttributeType::Param).last() {
            Some(attr) => ParamSource::from_attribute(&attr.name).map_err(|source_name| {
                Error::UnsupportedParamSource {
                    method: format!("{}.{}", owner.name, method.name),
                    param: param.name.clone(),
                    source_name,
                }
            })?,
            None => None,
        };
        if source == Some(ParamSource::Service) {
            continue;
        }
        specs.push(ParamSpec::new(param.name.clone(), param.index, source));
    }
    Ok(specs)
}

fn register_item(
    router: &mut Router,
    routes: &mut RouteTable,
    base: &str,
    group: &str,
    item: RouteItem,
) -> Result<(), Error> {
    if item.is_empty() {
        return Ok(());
    }
    let path = join_route(base, &item.path, item.override_base_path);
    let Some(handler) = item.handler else {
        return Ok(());
    };
    router.on(item.method, &path, handler)?;
    if !item.hidden {
        routes.add(RouteEntry {
            group: group.to_owned(),
            method: item.method,
            path,
            target: format!("{}.H", item.owner),
            signature: String::new(),
        });
    }
    Ok(())
}

// ── Service ───────────────────────────────────────────────────────────────────

/// The frozen application: routes one request to its composed chain.
///
/// Cheap to clone. Usable without a socket, which is how the tests drive it.
#[derive(Clone)]
pub struct Service {
    router: Arc<Router>,
    injector: Arc<Injector>,
    options: Arc<ServerOptions>,
}

impl Service {
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    pub fn injector(&self) -> &Arc<Injector> {
        &self.injector
    }

    /// Dispatches one request. Unknown routes answer `404`.
    pub async fn handle(&self, mut req: Request) -> Response {
        let started = Instant::now();
        let mut response = match self.router.lookup(req.method(), req.path()) {
            Some((handler, params)) => {
                req.set_params(params);
                handler(Context::new(req, Arc::clone(&self.injector))).await
            }
            None => Response::status(StatusCode::NOT_FOUND),
        };

        let headers = response.headers_mut();
        if let Ok(name) = HeaderValue::from_str(&self.options.name) {
            headers.entry(http::header::SERVER).or_insert(name);
        }
        if self.options.show_request_time_header {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(self.options.request_time_header.as_bytes()),
                // ASCII milliseconds; `Duration`'s Debug form may contain `µs`.
                HeaderValue::from_str(&format!("{:.3}ms", started.elapsed().as_secs_f64() * 1e3)),
            ) {
                headers.insert(name, value);
            }
        }
        response
    }
}
