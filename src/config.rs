//! Server options.
//!
//! Options live in the `server:` section of a YAML file:
//!
//! ```yaml
//! server:
//!   listen: 0.0.0.0
//!   port: 8080
//!   basePath: /api
//!   showRequestTimeHeader: false
//! ```
//!
//! A missing file means defaults. `SIGIL_*` environment variables
//! (`SIGIL_PORT`, `SIGIL_BASE_PATH`, …) override whatever the file says.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Error;

const ENV_PREFIX: &str = "SIGIL_";

/// 4 MiB.
pub const DEFAULT_MAX_BODY_SIZE: usize = 4 * 1024 * 1024;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerOptions {
    pub listen: String,
    pub port: u16,
    /// Prefix for every controller route.
    pub base_path: String,
    pub name: String,
    pub dev: bool,
    /// Adds the handling time to every response.
    pub show_request_time_header: bool,
    pub request_time_header: String,
    /// Largest request body read from a connection, in bytes. Larger bodies
    /// get `413 Payload Too Large`.
    pub max_body_size: usize,
    /// Where the analyzer wrote its metadata.
    pub metadata_file: PathBuf,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1".to_owned(),
            port: 2024,
            base_path: "/".to_owned(),
            name: "sigil".to_owned(),
            dev: true,
            show_request_time_header: true,
            request_time_header: "Request-Time".to_owned(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            metadata_file: PathBuf::from("gen.json"),
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    server: ServerOptions,
}

impl ServerOptions {
    /// Parses the `server:` section; absent keys keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, Error> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let file: ConfigFile = serde_yaml::from_str(yaml)?;
        Ok(file.server)
    }

    /// Reads `path`, then applies the process environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let options = match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_yaml_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
            Err(e) => return Err(e.into()),
        };
        options.with_env()
    }

    /// Applies `SIGIL_*` variables from the process environment.
    pub fn with_env(self) -> Result<Self, Error> {
        self.apply_env(std::env::vars())
    }

    /// Applies `SIGIL_*` pairs. Unknown keys are ignored; unparsable values
    /// are an error.
    pub fn apply_env<I, K, V>(mut self, vars: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(field) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref();
            match field {
                "LISTEN" => self.listen = value.to_owned(),
                "PORT" => self.port = parse(key.as_ref(), value)?,
                "BASE_PATH" => self.base_path = value.to_owned(),
                "NAME" => self.name = value.to_owned(),
                "DEV" => self.dev = parse(key.as_ref(), value)?,
                "SHOW_REQUEST_TIME_HEADER" => self.show_request_time_header = parse(key.as_ref(), value)?,
                "REQUEST_TIME_HEADER" => self.request_time_header = value.to_owned(),
                "MAX_BODY_SIZE" => self.max_body_size = parse(key.as_ref(), value)?,
                "METADATA_FILE" => self.metadata_file = PathBuf::from(value),
                _ => {}
            }
        }
        Ok(self)
    }

    /// `listen:port` as a socket address.
    pub fn addr(&self) -> Result<SocketAddr, Error> {
        let ip: IpAddr = self
            .listen
            .parse()
            .map_err(|_| Error::InvalidAddress(self.listen.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, Error> {
    value.trim().parse().map_err(|_| Error::ConfigValue {
        key: key.to_owned(),
        value: value.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = ServerOptions::default();
        assert_eq!(options.port, 2024);
        assert_eq!(options.base_path, "/");
        assert_eq!(options.request_time_header, "Request-Time");
        assert_eq!(options.max_body_size, 4 * 1024 * 1024);
        assert_eq!(options.addr().unwrap(), "127.0.0.1:2024".parse().unwrap());
    }

    #[test]
    fn yaml_overrides_only_what_it_names() {
        let options = ServerOptions::from_yaml_str(
            "server:\n  port: 8080\n  basePath: /api\n  showRequestTimeHeader: false\n",
        )
        .unwrap();
        assert_eq!(options.port, 8080);
        assert_eq!(options.base_path, "/api");
        assert!(!options.show_request_time_header);
        assert_eq!(options.listen, "127.0.0.1");
    }

    #[test]
    fn other_sections_are_ignored() {
        let options = ServerOptions::from_yaml_str("redis:\n  addr: localhost\n").unwrap();
        assert_eq!(options, ServerOptions::default());
    }

    #[test]
    fn env_wins_over_file() {
        let options = ServerOptions::default()
            .apply_env([("SIGIL_PORT", "9000"), ("SIGIL_BASE_PATH", "/v2"), ("HOME", "/root")])
            .unwrap();
        assert_eq!(options.port, 9000);
        assert_eq!(options.base_path, "/v2");
    }

    #[test]
    fn body_limit_from_yaml_and_env() {
        let options = ServerOptions::from_yaml_str("server:\n  maxBodySize: 1024\n").unwrap();
        assert_eq!(options.max_body_size, 1024);
        let options = options.apply_env([("SIGIL_MAX_BODY_SIZE", "64")]).unwrap();
        assert_eq!(options.max_body_size, 64);
    }

    #[test]
    fn malformed_env_value_is_an_error() {
        let err = ServerOptions::default()
            .apply_env([("SIGIL_PORT", "lots")])
            .unwrap_err();
        assert!(matches!(err, Error::ConfigValue { .. }));
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        assert!(matches!(
            ServerOptions::from_yaml_str("server: [1, 2"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn bad_listen_address() {
        let options = ServerOptions { listen: "localhost".into(), ..ServerOptions::default() };
        assert!(matches!(options.addr(), Err(Error::InvalidAddress(_))));
    }
}
