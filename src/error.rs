//! Unified error type.

use thiserror::Error;

use crate::inject::InjectError;

/// The error type returned by sigil's fallible operations.
///
/// Almost every variant is a *configuration* error: something declared in
/// the metadata, the options or a middleware parameter cannot be turned into
/// a working route. These surface from [`App::register_controller`] and
/// [`App::into_service`] so a misconfigured server never starts serving.
///
/// Request-level failures (bad input, rejected credentials, panics) are
/// expressed as HTTP [`Response`](crate::Response) values, not as `Error`s.
///
/// [`App::register_controller`]: crate::App::register_controller
/// [`App::into_service`]: crate::App::into_service
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{0}`")]
    InvalidAddress(String),

    #[error("http method `{method}` is not supported (route `{path}`)")]
    UnsupportedMethod { method: String, path: String },

    #[error("invalid route `{path}`: {reason}")]
    InvalidRoute { path: String, reason: String },

    #[error("middleware `{middleware}`: {reason}")]
    MiddlewareParam { middleware: String, reason: String },

    #[error("no metadata found for controller `{0}`")]
    UnknownController(String),

    #[error("`{0}` is neither annotated with @Controller nor named *Controller")]
    NotAController(String),

    #[error("method `{controller}.{method}` is declared in metadata but not bound by the controller")]
    UnboundMethod { controller: String, method: String },

    #[error("method `{controller}.{method}` declares {declared} parameters but binds {bound}")]
    SignatureMismatch {
        controller: String,
        method: String,
        declared: usize,
        bound: usize,
    },

    #[error("parameter `{param}` of `{method}` uses unsupported source @{source_name}")]
    UnsupportedParamSource {
        method: String,
        param: String,
        source_name: String,
    },

    #[error(transparent)]
    Inject(#[from] InjectError),

    #[error("metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("config value `{key}`: cannot parse `{value}`")]
    ConfigValue { key: String, value: String },
}

impl Error {
    /// Shorthand for a middleware rejecting its annotation parameter.
    pub fn middleware_param(middleware: &str, reason: impl Into<String>) -> Self {
        Self::MiddlewareParam {
            middleware: middleware.to_owned(),
            reason: reason.into(),
        }
    }
}
