//! Uniform JSON envelope for successful responses.

use std::sync::Arc;

use http::StatusCode;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;

use super::{MethodLayer, Middleware, MiddlewareContext, Slot};
use crate::context::Context;
use crate::handler::{BoxFuture, HandlerFunc};
use crate::response::Response;

/// Global middleware that rewrites every `200` into
///
/// ```json
/// { "Code": 200, "Message": "ok", "Data": … }
/// ```
///
/// `Data` is the parsed body when the handler answered JSON, the body text
/// otherwise, and `[]` for an empty body. Other statuses pass through.
#[derive(Clone, Debug, Default)]
pub struct ResponseRewriter;

impl ResponseRewriter {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Envelope {
    code: u16,
    message: String,
    data: Value,
}

impl Middleware for ResponseRewriter {
    fn name(&self) -> &str {
        "ResponseRewriter"
    }

    fn slot(&self) -> Slot {
        Slot::Global
    }

    fn as_layer(&self) -> Option<&dyn MethodLayer> {
        Some(self)
    }
}

impl MethodLayer for ResponseRewriter {
    fn clone_layer(&self) -> Box<dyn MethodLayer> {
        Box::new(self.clone())
    }

    fn wrap(self: Arc<Self>, _ctx: &MiddlewareContext<'_>, next: HandlerFunc) -> HandlerFunc {
        Arc::new(move |ctx: Context| -> BoxFuture {
            let response = next(ctx);
            Box::pin(async move { rewrite(response.await) })
        })
    }
}

fn rewrite(response: Response) -> Response {
    if response.status_code() != StatusCode::OK {
        return response;
    }

    let is_json = response
        .header("content-type")
        .is_some_and(|ct| ct.starts_with("application/json"));
    let mut message = "ok".to_owned();
    let data = if response.body().is_empty() {
        Value::Array(Vec::new())
    } else if is_json {
        serde_json::from_slice(response.body()).unwrap_or_else(|e| {
            message = e.to_string();
            Value::Array(Vec::new())
        })
    } else {
        Value::String(response.text_body())
    };

    let envelope = Envelope { code: StatusCode::OK.as_u16(), message, data };
    let mut rewritten = Response::json(&envelope);
    for (name, value) in response.headers() {
        if name != CONTENT_TYPE && name != CONTENT_LENGTH {
            rewritten.headers_mut().append(name.clone(), value.clone());
        }
    }
    rewritten
}

#[cfg(test)]
mod tests {
    use http::Method;
    use serde_json::json;

    use super::*;
    use crate::handler::ready;
    use crate::inject::Injector;
    use crate::request::Request;

    async fn run(answer: fn() -> Response) -> Value {
        let injector = Injector::new();
        let mctx = MiddlewareContext::new("Global", Slot::Global, &injector);
        let next: HandlerFunc = Arc::new(move |_ctx: Context| ready(answer()));
        let handler = Arc::new(ResponseRewriter::new()).wrap(&mctx, next);

        let req = Request::builder(Method::GET, "/").build();
        let res = handler(Context::new(req, Arc::new(Injector::new()))).await;
        assert_eq!(res.header("content-type"), Some("application/json"));
        serde_json::from_slice(res.body()).unwrap()
    }

    #[tokio::test]
    async fn json_body_becomes_data() {
        let body = run(|| Response::json(&json!({ "id": 7 }))).await;
        assert_eq!(body, json!({ "Code": 200, "Message": "ok", "Data": { "id": 7 } }));
    }

    #[tokio::test]
    async fn text_body_is_kept_as_a_string() {
        let body = run(|| Response::text("hello")).await;
        assert_eq!(body, json!({ "Code": 200, "Message": "ok", "Data": "hello" }));
    }

    #[tokio::test]
    async fn other_statuses_pass_through() {
        let injector = Injector::new();
        let mctx = MiddlewareContext::new("Global", Slot::Global, &injector);
        let next: HandlerFunc =
            Arc::new(|_ctx: Context| ready(Response::builder().status(StatusCode::NOT_FOUND).text("gone")));
        let handler = Arc::new(ResponseRewriter::new()).wrap(&mctx, next);

        let req = Request::builder(Method::GET, "/").build();
        let res = handler(Context::new(req, Arc::new(Injector::new()))).await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(res.text_body(), "gone");
    }
}
