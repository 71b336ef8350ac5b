//! Minimal sigil example: one annotated controller behind the built-in
//! middleware.
//!
//! Run with:
//!   cargo run --example hello
//!
//! Try:
//!   curl 'http://localhost:2024/api/hello?name=ada'
//!   curl -u alice:secret http://localhost:2024/api/hello/me
//!   curl http://localhost:2024/healthz
//!   curl -X PATCH http://localhost:2024/api/serverDown/maintenance

use std::sync::Arc;

use sigil::bind::Bound;
use sigil::middleware::{AuthUser, BasicAuth, Health, Log, Recovery, ServerDown, Slot};
use sigil::{App, Controller, Metadata, MethodTable, Server, ServerOptions};

// What the analyzer would emit for:
//
//   // @Controller
//   // @Route /hello
//   struct HelloController;
//
//   // Hello says hello.
//   // @GET /
//   // @Log
//   fn Hello(/* @Query */ name: String)
//
//   // @GET /me
//   // @BasicAuth realm=demo&alice=secret
//   fn Me(user: AuthUser)
const METADATA: &str = r#"{
  "structs": [{
    "package": "demo",
    "name": "HelloController",
    "docs": ["@Controller", "@Route /hello"],
    "methods": [
      {
        "name": "Hello",
        "docs": ["Hello says hello.", "@GET /", "@Log"],
        "params": [{ "name": "name", "index": 0, "type": "string", "docs": ["@Query"] }]
      },
      {
        "name": "Me",
        "docs": ["@GET /me", "@BasicAuth realm=demo&alice=secret"]
      }
    ]
  }]
}"#;

struct HelloController {
    greeting: String,
}

impl HelloController {
    async fn hello(self: Arc<Self>, name: Bound<String>) -> String {
        format!("{} {}", self.greeting, *name)
    }

    async fn me(self: Arc<Self>, user: AuthUser) -> String {
        format!("you are {}", user.0)
    }
}

impl Controller for HelloController {
    const NAME: &'static str = "demo.HelloController";

    fn methods(table: &mut MethodTable) {
        table.method("Hello", Self::hello).method("Me", Self::me);
    }
}

#[tokio::main]
async fn main() -> Result<(), sigil::Error> {
    tracing_subscriber::fmt::init();

    let options = ServerOptions {
        base_path: "/api".to_owned(),
        ..ServerOptions::default()
    }
    .with_env()?;

    let mut app = App::new(options.clone()).with_metadata(Metadata::from_json(METADATA)?);
    app.use_middleware(Recovery::new())
        .use_middleware(ServerDown::new("maintenance"))
        .use_middleware(Health::new())
        .use_middleware(Log::new(Slot::Method))
        .use_middleware(BasicAuth::new(Slot::Method));
    app.register_controller(HelloController { greeting: "Hello".to_owned() })?;

    Server::from_options(&options)?.serve(app).await
}
