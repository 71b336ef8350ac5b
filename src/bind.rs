//! Request binding for business-method parameters.
//!
//! A parameter typed [`Bound<T>`] is filled from the request before the
//! method runs. Its source comes from the last `Param` attribute in the
//! parameter's docs (`@Query`, `@Json`, `@Path` …); without one, `GET` and
//! `HEAD` read the query string and other verbs choose by `Content-Type`.
//!
//! Pair-shaped sources (query, form, path, header, cookie) deserialize `T`
//! from all pairs at once when `T` is a struct or map, and otherwise from the
//! single pair named like the parameter:
//!
//! ```rust
//! use serde::Deserialize;
//! use sigil::bind::Bound;
//!
//! #[derive(Clone, Deserialize)]
//! struct Page { limit: u32, offset: Option<u32> }
//!
//! // async fn list(page: Bound<Page>)         ← ?limit=10&offset=20
//! // async fn get(id: Bound<u64>)             ← @Path on param `id`, /users/{id}
//! ```

use std::fmt;
use std::ops::Deref;

use http::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::inject::{FromInjector, InjectError, Injector};
use crate::request::Request;
use crate::response::{IntoResponse, Response};

// ── Sources ───────────────────────────────────────────────────────────────────

/// Where a parameter's value comes from.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ParamSource {
    /// Request body, codec chosen by `Content-Type`.
    Body,
    Json,
    Form,
    Query,
    Path,
    Header,
    Cookie,
    /// Body as text.
    Plain,
    /// A value from the injector rather than the request.
    Service,
}

impl ParamSource {
    /// Maps a `Param` attribute name to a source.
    ///
    /// `Ok(None)` for names that are not binding sources. `Err` carries the
    /// name of a recognised source this crate cannot decode.
    pub fn from_attribute(name: &str) -> Result<Option<Self>, String> {
        let source = match name.trim_start_matches('@').to_ascii_uppercase().as_str() {
            "BODY" => Self::Body,
            "JSON" => Self::Json,
            "FORM" => Self::Form,
            "QUERY" => Self::Query,
            "PATH" => Self::Path,
            "HEADER" => Self::Header,
            "COOKIE" => Self::Cookie,
            "PLAIN" => Self::Plain,
            "SERVICE" => Self::Service,
            unsupported @ ("XML" | "MULTIPART") => return Err(unsupported.to_owned()),
            _ => return Ok(None),
        };
        Ok(Some(source))
    }

    fn reads_body(self) -> bool {
        matches!(self, Self::Body | Self::Json)
    }
}

impl fmt::Display for ParamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Body => "body",
            Self::Json => "json",
            Self::Form => "form",
            Self::Query => "query",
            Self::Path => "path",
            Self::Header => "header",
            Self::Cookie => "cookie",
            Self::Plain => "plain",
            Self::Service => "service",
        };
        f.write_str(name)
    }
}

/// A bindable parameter as declared in metadata.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub index: usize,
    pub source: Option<ParamSource>,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, index: usize, source: Option<ParamSource>) -> Self {
        Self { name: name.into(), index, source }
    }

    /// The concrete source for this request.
    pub fn source_for(&self, req: &Request) -> Result<ParamSource, BindError> {
        let no_body = matches!(*req.method(), http::Method::GET | http::Method::HEAD);
        match self.source {
            Some(source) if source.reads_body() && no_body => Err(BindError::BodyNotAllowed {
                param: self.name.clone(),
                method: req.method().to_string(),
            }),
            Some(ParamSource::Body) => Ok(by_content_type(req)),
            Some(source) => Ok(source),
            None if no_body => Ok(ParamSource::Query),
            None => Ok(by_content_type(req)),
        }
    }
}

fn by_content_type(req: &Request) -> ParamSource {
    match req.content_type().as_deref() {
        Some("application/json") => ParamSource::Json,
        Some("text/plain") => ParamSource::Plain,
        _ => ParamSource::Form,
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum BindError {
    #[error("parameter `{param}`: {method} requests have no body")]
    BodyNotAllowed { param: String, method: String },

    #[error("parameter `{param}` ({source_kind}): {message}")]
    Invalid {
        param: String,
        source_kind: ParamSource,
        message: String,
    },

    #[error(transparent)]
    Inject(#[from] InjectError),
}

impl BindError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Inject(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for BindError {
    fn into_response(self) -> Response {
        Response::builder().status(self.status_code()).text(self.to_string())
    }
}

// ── Bound<T> ──────────────────────────────────────────────────────────────────

/// A business-method argument deserialized from the request.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Bound<T>(pub T);

impl<T> Bound<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Bound<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

/// Binds one parameter into the next positional slot of the request
/// injector.
pub type BindFn = fn(&ParamSpec, &Request, &mut Injector) -> Result<(), BindError>;

impl<T> FromInjector for Bound<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// The first bound argument.
    fn from_injector(injector: &Injector) -> Result<Self, InjectError> {
        injector.bound(0)
    }

    fn from_injector_at(injector: &Injector, slot: &mut usize) -> Result<Self, InjectError> {
        let value = injector.bound(*slot)?;
        *slot += 1;
        Ok(value)
    }

    fn binder() -> Option<BindFn> {
        Some(bind_into::<T>)
    }
}

fn bind_into<T>(spec: &ParamSpec, req: &Request, injector: &mut Injector) -> Result<(), BindError>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    let source = spec.source_for(req)?;
    let value = match source {
        ParamSource::Service => injector.resolve::<T>()?,
        _ => bind_value::<T>(spec, source, req)?,
    };
    injector.push_bound(Bound(value));
    Ok(())
}

/// Deserializes `T` for `spec` from an already resolved `source`.
pub fn bind_value<T: DeserializeOwned>(
    spec: &ParamSpec,
    source: ParamSource,
    req: &Request,
) -> Result<T, BindError> {
    let invalid = |message: String| BindError::Invalid {
        param: spec.name.clone(),
        source_kind: source,
        message,
    };

    match source {
        ParamSource::Json | ParamSource::Body => {
            serde_json::from_slice(req.body()).map_err(|e| invalid(e.to_string()))
        }
        ParamSource::Plain => {
            let text = std::str::from_utf8(req.body()).map_err(|e| invalid(e.to_string()))?;
            from_single(&spec.name, text).map_err(invalid)
        }
        ParamSource::Query => from_encoded(&spec.name, req.query()).map_err(invalid),
        ParamSource::Form => {
            let body = std::str::from_utf8(req.body()).map_err(|e| invalid(e.to_string()))?;
            from_encoded(&spec.name, body).map_err(invalid)
        }
        ParamSource::Path => {
            let pairs: Vec<(&str, &str)> = req
                .params()
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            from_pairs(&spec.name, &pairs).map_err(invalid)
        }
        ParamSource::Header => {
            let pairs: Vec<(&str, &str)> = req
                .headers()
                .iter()
                .filter_map(|(k, v)| Some((k.as_str(), v.to_str().ok()?)))
                .collect();
            from_pairs(&spec.name, &pairs).map_err(invalid)
        }
        ParamSource::Cookie => from_pairs(&spec.name, &req.cookies()).map_err(invalid),
        ParamSource::Service => Err(invalid("service parameters are not read from the request".into())),
    }
}

fn from_pairs<T: DeserializeOwned>(name: &str, pairs: &[(&str, &str)]) -> Result<T, String> {
    let encoded = serde_urlencoded::to_string(pairs).map_err(|e| e.to_string())?;
    from_encoded(name, &encoded)
}

/// Whole-struct decode first, then the single pair called `name`.
fn from_encoded<T: DeserializeOwned>(name: &str, encoded: &str) -> Result<T, String> {
    let whole_err = match serde_urlencoded::from_str::<T>(encoded) {
        Ok(value) => return Ok(value),
        Err(e) => e.to_string(),
    };
    let pairs: Vec<(String, String)> =
        serde_urlencoded::from_str(encoded).map_err(|e| e.to_string())?;
    match pairs.into_iter().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
        Some((_, value)) => from_single(name, &value),
        None => Err(whole_err),
    }
}

/// Decodes one value, parsing numbers and booleans from text.
fn from_single<T: DeserializeOwned>(name: &str, value: &str) -> Result<T, String> {
    let encoded = serde_urlencoded::to_string([(name, value)]).map_err(|e| e.to_string())?;
    let mut decoded: Vec<(String, T)> =
        serde_urlencoded::from_str(&encoded).map_err(|e| e.to_string())?;
    decoded
        .pop()
        .map(|(_, v)| v)
        .ok_or_else(|| format!("missing value for `{name}`"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use http::Method;
    use serde::Deserialize;

    use super::*;

    #[derive(Clone, Debug, Deserialize, PartialEq)]
    struct Page {
        limit: u32,
        offset: Option<u32>,
    }

    fn spec(name: &str, source: Option<ParamSource>) -> ParamSpec {
        ParamSpec::new(name, 0, source)
    }

    #[test]
    fn get_defaults_to_query() {
        let req = Request::builder(Method::GET, "/users?limit=10&offset=20").build();
        let s = spec("page", None);
        let source = s.source_for(&req).unwrap();
        assert_eq!(source, ParamSource::Query);
        let page: Page = bind_value(&s, source, &req).unwrap();
        assert_eq!(page, Page { limit: 10, offset: Some(20) });
    }

    #[test]
    fn post_picks_codec_by_content_type() {
        let req = Request::builder(Method::POST, "/users")
            .header("content-type", "application/json")
            .body(r#"{"limit":5}"#)
            .build();
        let s = spec("page", Some(ParamSource::Body));
        assert_eq!(s.source_for(&req).unwrap(), ParamSource::Json);

        let form = Request::builder(Method::POST, "/users").body("limit=7").build();
        let source = spec("page", None).source_for(&form).unwrap();
        assert_eq!(source, ParamSource::Form);
        let page: Page = bind_value(&s, source, &form).unwrap();
        assert_eq!(page.limit, 7);
    }

    #[test]
    fn body_on_get_is_rejected() {
        let req = Request::builder(Method::GET, "/").build();
        let err = spec("user", Some(ParamSource::Json)).source_for(&req).unwrap_err();
        assert!(matches!(err, BindError::BodyNotAllowed { .. }));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn scalar_path_param_is_parsed() {
        let mut req = Request::builder(Method::GET, "/users/42").build();
        req.set_params(HashMap::from([("id".to_owned(), "42".to_owned())]));
        let id: u64 = bind_value(&spec("id", None), ParamSource::Path, &req).unwrap();
        assert_eq!(id, 42);
    }

    #[test]
    fn header_and_cookie_by_name() {
        let req = Request::builder(Method::GET, "/")
            .header("x-tenant", "acme")
            .header("cookie", "session=abc")
            .build();
        let tenant: String = bind_value(&spec("x-tenant", None), ParamSource::Header, &req).unwrap();
        let session: String = bind_value(&spec("session", None), ParamSource::Cookie, &req).unwrap();
        assert_eq!((tenant.as_str(), session.as_str()), ("acme", "abc"));
    }

    #[test]
    fn malformed_value_is_invalid() {
        let req = Request::builder(Method::GET, "/?limit=many").build();
        let err = bind_value::<Page>(&spec("page", None), ParamSource::Query, &req).unwrap_err();
        assert!(matches!(err, BindError::Invalid { source_kind: ParamSource::Query, .. }));
    }

    #[test]
    fn xml_is_recognised_but_unsupported() {
        assert_eq!(ParamSource::from_attribute("@Xml"), Err("XML".to_owned()));
        assert_eq!(ParamSource::from_attribute("query"), Ok(Some(ParamSource::Query)));
        assert_eq!(ParamSource::from_attribute("Deprecated"), Ok(None));
    }

    #[test]
    fn binder_fills_the_next_slot() {
        let req = Request::builder(Method::GET, "/?limit=3").build();
        let mut injector = Injector::new();
        let bind = <Bound<Page> as FromInjector>::binder().unwrap();
        bind(&spec("page", None), &req, &mut injector).unwrap();
        let Bound(page) = injector.bound::<Bound<Page>>(0).unwrap();
        assert_eq!(page.limit, 3);
    }

    #[test]
    fn same_typed_arguments_keep_their_own_values() {
        let mut req = Request::builder(Method::GET, "/users/1/posts/2").build();
        req.set_params(HashMap::from([
            ("uid".to_owned(), "1".to_owned()),
            ("pid".to_owned(), "2".to_owned()),
        ]));
        let mut injector = Injector::new();
        let bind = <Bound<u64> as FromInjector>::binder().unwrap();
        bind(&spec("uid", Some(ParamSource::Path)), &req, &mut injector).unwrap();
        bind(&spec("pid", Some(ParamSource::Path)), &req, &mut injector).unwrap();

        let out = injector
            .invoke(&|uid: Bound<u64>, pid: Bound<u64>| format!("{}/{}", *uid, *pid))
            .unwrap();
        assert_eq!(out, "1/2");
    }
}
