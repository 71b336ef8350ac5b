//! Middleware chain composition, driven through a frozen `Service`.

use std::sync::Arc;

use http::{Method, StatusCode};
use parking_lot::Mutex;
use sigil::inject::Inject;
use sigil::meta::{MethodMeta, StructMeta};
use sigil::middleware::{MethodLayer, Middleware, MiddlewareContext, Slot};
use sigil::{App, Context, Controller, HandlerFunc, Metadata, MethodTable, Request, Service};

type Trail = Arc<Mutex<Vec<String>>>;

/// Appends its name (or its annotation parameter, when given) to a shared
/// trail, then calls the next handler.
#[derive(Clone)]
struct Record {
    name: &'static str,
    slot: Slot,
    label: String,
    trail: Trail,
}

impl Record {
    fn new(name: &'static str, slot: Slot, trail: &Trail) -> Self {
        Self { name, slot, label: name.to_owned(), trail: Arc::clone(trail) }
    }
}

impl Middleware for Record {
    fn name(&self) -> &str {
        self.name
    }

    fn slot(&self) -> Slot {
        self.slot
    }

    fn as_layer(&self) -> Option<&dyn MethodLayer> {
        Some(self)
    }
}

#[derive(Clone, Debug)]
struct Label(String);

impl MethodLayer for Record {
    fn clone_layer(&self) -> Box<dyn MethodLayer> {
        Box::new(self.clone())
    }

    fn configure(&mut self, ctx: &MiddlewareContext<'_>) -> Result<(), sigil::Error> {
        if !ctx.param.is_empty() {
            self.label = ctx.param.trim().to_owned();
        }
        Ok(())
    }

    fn wrap(self: Arc<Self>, _ctx: &MiddlewareContext<'_>, next: HandlerFunc) -> HandlerFunc {
        Arc::new(move |mut ctx: Context| {
            self.trail.lock().push(self.label.clone());
            ctx.map(Label(self.label.clone()));
            next(ctx)
        })
    }
}

struct OrderController {
    trail: Trail,
}

impl OrderController {
    async fn list(self: Arc<Self>) -> &'static str {
        self.trail.lock().push("Business".to_owned());
        "orders"
    }

    async fn quiet(self: Arc<Self>) -> &'static str {
        self.trail.lock().push("Business".to_owned());
        "quiet"
    }

    async fn labelled(self: Arc<Self>, label: Inject<Label>) -> String {
        label.0.0.clone()
    }
}

impl Controller for OrderController {
    const NAME: &'static str = "shop.OrderController";

    fn methods(table: &mut MethodTable) {
        table
            .method("List", Self::list)
            .method("Quiet", Self::quiet)
            .method("First", Self::labelled)
            .method("Second", Self::labelled);
    }
}

fn metadata() -> Metadata {
    let mut metadata = Metadata::default();
    metadata.push(
        StructMeta::new("shop", "OrderController")
            .doc("@Controller")
            .doc("@Route /orders")
            .doc("@Audit")
            .method(MethodMeta::new("List").doc("@GET /").doc("@Span"))
            .method(MethodMeta::new("Quiet").doc("@GET /quiet").doc("@Span").doc("@Ignore Audit, span"))
            .method(MethodMeta::new("First").doc("@GET /first").doc("@Stamp first"))
            .method(MethodMeta::new("Second").doc("@GET /second").doc("@Stamp second")),
    );
    metadata
}

fn service(trail: &Trail) -> Service {
    let mut app = App::default().with_metadata(metadata());
    app.use_middleware(Record::new("Outer", Slot::Global, trail))
        .use_middleware(Record::new("Inner", Slot::Global, trail))
        .use_middleware(Record::new("Audit", Slot::Controller, trail))
        .use_middleware(Record::new("Span", Slot::Method, trail))
        .use_middleware(Record::new("Stamp", Slot::Method, trail));
    app.register_controller(OrderController { trail: Arc::clone(trail) })
        .unwrap();
    app.into_service().unwrap()
}

fn get(uri: &str) -> Request {
    Request::builder(Method::GET, uri).build()
}

#[tokio::test]
async fn layers_run_global_then_controller_then_method() {
    let trail = Trail::default();
    let service = service(&trail);

    let res = service.handle(get("/orders")).await;

    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.text_body(), "orders");
    assert_eq!(*trail.lock(), ["Outer", "Inner", "Audit", "Span", "Business"]);
}

#[tokio::test]
async fn ignore_skips_the_controller_layer_only() {
    let trail = Trail::default();
    let service = service(&trail);

    let res = service.handle(get("/orders/quiet")).await;

    assert_eq!(res.text_body(), "quiet");
    // `@Ignore` names controller middleware; method layers still run.
    assert_eq!(*trail.lock(), ["Outer", "Inner", "Span", "Business"]);
}

#[tokio::test]
async fn each_method_gets_its_own_configured_clone() {
    let trail = Trail::default();
    let service = service(&trail);

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..64 {
        let service = service.clone();
        let (path, expected) = if i % 2 == 0 { ("/orders/first", "first") } else { ("/orders/second", "second") };
        tasks.spawn(async move {
            let res = service.handle(get(path)).await;
            assert_eq!(res.status_code(), StatusCode::OK);
            assert_eq!(res.text_body(), expected);
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap();
    }
}

/// Controller-scope layer that tells the handler which method it wraps.
#[derive(Clone)]
struct Scope;

#[derive(Clone, Debug)]
struct MethodName(String);

impl Middleware for Scope {
    fn name(&self) -> &str {
        "Scope"
    }

    fn slot(&self) -> Slot {
        Slot::Controller
    }

    fn as_layer(&self) -> Option<&dyn MethodLayer> {
        Some(self)
    }
}

impl MethodLayer for Scope {
    fn clone_layer(&self) -> Box<dyn MethodLayer> {
        Box::new(self.clone())
    }

    fn wrap(self: Arc<Self>, ctx: &MiddlewareContext<'_>, next: HandlerFunc) -> HandlerFunc {
        let method = ctx.method.to_owned();
        Arc::new(move |mut ctx: Context| {
            ctx.map(MethodName(method.clone()));
            next(ctx)
        })
    }
}

struct InvoiceController;

impl InvoiceController {
    async fn name(self: Arc<Self>, method: Inject<MethodName>) -> String {
        method.0.0.clone()
    }
}

impl Controller for InvoiceController {
    const NAME: &'static str = "shop.InvoiceController";

    fn methods(table: &mut MethodTable) {
        table.method("Draft", Self::name).method("Paid", Self::name);
    }
}

#[tokio::test]
async fn controller_layer_sees_only_its_own_method() {
    let mut metadata = Metadata::default();
    metadata.push(
        StructMeta::new("shop", "InvoiceController")
            .doc("@Controller")
            .doc("@Route /invoices")
            .doc("@Scope")
            .method(MethodMeta::new("Draft").doc("@GET /draft"))
            .method(MethodMeta::new("Paid").doc("@GET /paid")),
    );
    let mut app = App::default().with_metadata(metadata);
    app.use_middleware(Scope);
    app.register_controller(InvoiceController).unwrap();
    let service = app.into_service().unwrap();

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..64 {
        let service = service.clone();
        let (path, expected) = if i % 2 == 0 { ("/invoices/draft", "Draft") } else { ("/invoices/paid", "Paid") };
        tasks.spawn(async move {
            let res = service.handle(get(path)).await;
            assert_eq!(res.status_code(), StatusCode::OK);
            assert_eq!(res.text_body(), expected);
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap();
    }
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let trail = Trail::default();
    let service = service(&trail);

    let res = service.handle(get("/nowhere")).await;

    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    assert!(trail.lock().is_empty());
}

#[tokio::test]
async fn route_table_lists_signatures() {
    let trail = Trail::default();
    let mut app = App::default().with_metadata(metadata());
    app.use_middleware(Record::new("Audit", Slot::Controller, &trail))
        .use_middleware(Record::new("Span", Slot::Method, &trail))
        .use_middleware(Record::new("Stamp", Slot::Method, &trail));
    app.register_controller(OrderController { trail: Arc::clone(&trail) })
        .unwrap();

    let routes = app.routes();
    assert_eq!(routes.len(), 4);
    let list = routes.find(sigil::RouteMethod::Get, "/orders").unwrap();
    assert_eq!(list.target, "OrderController.List");
    assert_eq!(list.signature, "@AUDIT,@SPAN");
    let quiet = routes.find(sigil::RouteMethod::Get, "/orders/quiet").unwrap();
    assert_eq!(quiet.signature, "@SPAN");
}
