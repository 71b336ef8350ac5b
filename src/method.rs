//! HTTP verbs as they appear in route annotations.
//!
//! `@GET`, `@POST` … map one-to-one to a verb. `@ANY` and `@WS` register a
//! route on every verb. `@TRACE` and `@CONNECT` are recognised as HTTP-method
//! annotations but have no route registration, so they fail to parse here and
//! the registrar reports them as unsupported.

use std::fmt;
use std::str::FromStr;

/// A verb a route can be registered on.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RouteMethod {
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
    /// Matches every verb.
    Any,
}

impl RouteMethod {
    /// Returns the uppercase representation (e.g. `"GET"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delete  => "DELETE",
            Self::Get     => "GET",
            Self::Head    => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch   => "PATCH",
            Self::Post    => "POST",
            Self::Put     => "PUT",
            Self::Any     => "ANY",
        }
    }

    /// The concrete verb, or `None` for [`RouteMethod::Any`].
    pub fn to_http(self) -> Option<http::Method> {
        match self {
            Self::Delete  => Some(http::Method::DELETE),
            Self::Get     => Some(http::Method::GET),
            Self::Head    => Some(http::Method::HEAD),
            Self::Options => Some(http::Method::OPTIONS),
            Self::Patch   => Some(http::Method::PATCH),
            Self::Post    => Some(http::Method::POST),
            Self::Put     => Some(http::Method::PUT),
            Self::Any     => None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnsupportedMethod(pub String);

impl fmt::Display for UnsupportedMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported http method `{}`", self.0)
    }
}

impl std::error::Error for UnsupportedMethod {}

/// Parses an annotation name. Case-insensitive; `WS` is an alias of `ANY`.
impl FromStr for RouteMethod {
    type Err = UnsupportedMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches('@').to_ascii_uppercase().as_str() {
            "DELETE"    => Ok(Self::Delete),
            "GET"       => Ok(Self::Get),
            "HEAD"      => Ok(Self::Head),
            "OPTIONS"   => Ok(Self::Options),
            "PATCH"     => Ok(Self::Patch),
            "POST"      => Ok(Self::Post),
            "PUT"       => Ok(Self::Put),
            "ANY" | "WS" => Ok(Self::Any),
            _           => Err(UnsupportedMethod(s.to_owned())),
        }
    }
}

impl fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
