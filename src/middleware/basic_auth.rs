//! HTTP basic authentication.
//!
//! ```text
//! // @BasicAuth realm=admin&alice=secret&bob=hunter2
//! // @BasicAuth proxy=true&gateway=token
//! ```
//!
//! Every pair other than `realm` and `proxy` is a `user=password` account.
//! Accounts are parsed when the route is composed; a malformed or empty
//! list stops the server from starting.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::StatusCode;
use subtle::ConstantTimeEq;

use super::{MethodLayer, Middleware, MiddlewareContext, Slot};
use crate::context::Context;
use crate::error::Error;
use crate::handler::{HandlerFunc, ready};
use crate::inject::{FromInjector, InjectError, Injector};
use crate::response::Response;

/// Context key holding the authenticated user name.
pub const AUTH_USER_KEY: &str = "user";
/// Context key holding the authenticated proxy user name.
pub const AUTH_PROXY_USER_KEY: &str = "proxy_user";

/// The authenticated user, injectable into business methods behind
/// [`BasicAuth`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AuthUser(pub String);

impl FromInjector for AuthUser {
    fn from_injector(injector: &Injector) -> Result<Self, InjectError> {
        injector.resolve()
    }
}

#[derive(Clone, Debug)]
struct Account {
    user: String,
    /// Full expected header value, `Basic <base64>`.
    header: String,
}

/// Basic-auth middleware for the controller or method slot.
#[derive(Clone, Debug)]
pub struct BasicAuth {
    slot: Slot,
    realm: String,
    proxy: bool,
    accounts: Vec<Account>,
}

impl BasicAuth {
    pub fn new(slot: Slot) -> Self {
        Self { slot, realm: String::new(), proxy: false, accounts: Vec::new() }
    }

    fn authenticate(&self, header: Option<&str>) -> Option<&str> {
        let given = header?.as_bytes();
        if given.is_empty() {
            return None;
        }
        // Compare against every account so timing does not reveal which matched.
        let mut found = None;
        for account in &self.accounts {
            if bool::from(account.header.as_bytes().ct_eq(given)) && found.is_none() {
                found = Some(account.user.as_str());
            }
        }
        found
    }

    fn reject(&self) -> Response {
        let (status, header) = if self.proxy {
            (StatusCode::PROXY_AUTHENTICATION_REQUIRED, "proxy-authenticate")
        } else {
            (StatusCode::UNAUTHORIZED, "www-authenticate")
        };
        Response::builder()
            .status(status)
            .header(header, &self.realm)
            .no_body()
    }
}

impl Middleware for BasicAuth {
    fn name(&self) -> &str {
        "BasicAuth"
    }

    fn slot(&self) -> Slot {
        self.slot
    }

    fn as_layer(&self) -> Option<&dyn MethodLayer> {
        Some(self)
    }
}

impl MethodLayer for BasicAuth {
    fn clone_layer(&self) -> Box<dyn MethodLayer> {
        Box::new(Self::new(self.slot))
    }

    fn configure(&mut self, ctx: &MiddlewareContext<'_>) -> Result<(), Error> {
        let pairs = ctx.query().map_err(|e| {
            Error::middleware_param(
                "BasicAuth",
                format!("`{}` should look like `realm=xxx&user=pass`: {e}", ctx.param),
            )
        })?;

        let mut realm = String::new();
        for (key, value) in pairs {
            match key.as_str() {
                "realm" => realm = value,
                "proxy" => self.proxy = value == "true",
                "" => return Err(Error::middleware_param("BasicAuth", "user can not be empty")),
                _ => {
                    let header = format!("Basic {}", STANDARD.encode(format!("{key}:{value}")));
                    self.accounts.push(Account { user: key, header });
                }
            }
        }
        if self.accounts.is_empty() {
            return Err(Error::middleware_param(
                "BasicAuth",
                format!("no accounts in `{}` ({}.{})", ctx.param, ctx.controller, ctx.method),
            ));
        }
        if realm.is_empty() {
            realm = if self.proxy {
                "Proxy Authorization Required".to_owned()
            } else {
                "Authorization Required".to_owned()
            };
        }
        self.realm = format!("Basic realm={realm:?}");
        Ok(())
    }

    fn wrap(self: Arc<Self>, _ctx: &MiddlewareContext<'_>, next: HandlerFunc) -> HandlerFunc {
        Arc::new(move |mut ctx: Context| {
            let credentials = if self.proxy { "proxy-authorization" } else { "authorization" };
            let user = match self.authenticate(ctx.request().header(credentials)) {
                Some(user) => user.to_owned(),
                None => return ready(self.reject()),
            };
            let key = if self.proxy { AUTH_PROXY_USER_KEY } else { AUTH_USER_KEY };
            ctx.set(key, user.clone());
            ctx.map(AuthUser(user));
            next(ctx)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured(param: &str) -> Result<BasicAuth, Error> {
        let injector = Injector::new();
        let ctx = MiddlewareContext::new("Admin", Slot::Method, &injector)
            .method("Stats")
            .param(param);
        let mut auth = BasicAuth::new(Slot::Method);
        auth.configure(&ctx).map(|_| auth)
    }

    #[test]
    fn parses_accounts_and_realm() {
        let auth = configured("realm=ops&alice=secret&bob=pw").unwrap();
        assert_eq!(auth.realm, r#"Basic realm="ops""#);
        assert_eq!(auth.accounts.len(), 2);
        let header = format!("Basic {}", STANDARD.encode("alice:secret"));
        assert_eq!(auth.authenticate(Some(&header)), Some("alice"));
        assert_eq!(auth.authenticate(Some("Basic Ym9iOm5vcGU=")), None);
        assert_eq!(auth.authenticate(None), None);
    }

    #[test]
    fn empty_account_list_fails_fast() {
        assert!(matches!(configured("realm=ops"), Err(Error::MiddlewareParam { .. })));
        assert!(matches!(configured(""), Err(Error::MiddlewareParam { .. })));
    }

    #[test]
    fn empty_user_fails_fast() {
        assert!(matches!(configured("=secret"), Err(Error::MiddlewareParam { .. })));
    }

    #[test]
    fn proxy_mode_uses_407() {
        let auth = configured("proxy=true&gw=token").unwrap();
        let res = auth.reject();
        assert_eq!(res.status_code(), StatusCode::PROXY_AUTHENTICATION_REQUIRED);
        assert_eq!(
            res.header("proxy-authenticate"),
            Some(r#"Basic realm="Proxy Authorization Required""#)
        );
    }
}
