//! # sigil
//!
//! An annotation-driven HTTP framework.
//!
//! Routes are not written in code. An analyzer reads the doc comments of
//! controller structs and their methods and emits metadata; sigil turns that
//! metadata into a running server:
//!
//! ```text
//! /// @Controller
//! /// @Route /api
//! /// @BasicAuth realm=api&admin=secret
//! struct UserController;
//!
//! /// @GET  /users/{id}
//! /// @POST /users/{id}/touch
//! /// @Log
//! fn get(…)
//! ```
//!
//! The pieces, bottom-up:
//!
//! - [`attribute`]: classifies `@Name value` doc lines
//! - [`inject`]: type-keyed dependency injection with parent fallback
//! - [`middleware`]: pluggable layers at global, controller and method scope
//! - [`compose`]: folds the layers around each business method, once
//! - [`App`]: pairs metadata with live controllers and registers routes
//! - [`Server`]: hyper, tokio and graceful shutdown
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use sigil::bind::Bound;
//! use sigil::middleware::{Log, Recovery, Slot};
//! use sigil::{App, Controller, MethodTable, Server, ServerOptions};
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
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sigil::Error> {
//!     let options = ServerOptions::load("app.yaml")?;
//!     let mut app = App::new(options.clone()).load_metadata()?;
//!     app.use_middleware(Recovery::new())
//!         .use_middleware(Log::new(Slot::Method));
//!     app.register_controller(HelloController)?;
//!
//!     Server::from_options(&options)?.serve(app).await
//! }
//! ```

mod app;
mod context;
mod controller;
mod error;
mod handler;
mod method;
mod request;
mod response;
mod router;
mod server;

pub mod attribute;
pub mod bind;
pub mod compose;
pub mod config;
pub mod inject;
pub mod meta;
pub mod middleware;
pub mod route;

pub use app::{App, Service};
pub use config::ServerOptions;
pub use context::Context;
pub use controller::{Controller, Endpoint, MethodEntry, MethodTable};
pub use error::Error;
pub use handler::{BoxFuture, Handler, HandlerFunc, handler_fn};
pub use inject::Injector;
pub use meta::Metadata;
pub use method::{RouteMethod, UnsupportedMethod};
pub use request::{Request, RequestBuilder};
pub use response::{ContentType, IntoResponse, Json, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
