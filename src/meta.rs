//! The static metadata graph.
//!
//! An external analyzer scans controller sources and emits one JSON document
//! describing every struct, its methods and their parameters, each with the
//! doc lines written above the declaration:
//!
//! ```json
//! {
//!   "structs": [{
//!     "package": "demo",
//!     "name": "HelloController",
//!     "docs": ["@Controller", "@Route /api"],
//!     "methods": [{
//!       "name": "Hello",
//!       "docs": ["Hello says hello", "@GET /hello"],
//!       "params": [{ "name": "name", "index": 0, "type": "String", "docs": ["@Query"] }]
//!     }]
//!   }]
//! }
//! ```
//!
//! Every declaration has a stable key (`demo.HelloController`,
//! `demo.HelloController::Hello`, `demo.HelloController::Hello#0`) used to
//! cache its classified attributes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Metadata {
    #[serde(default)]
    pub structs: Vec<StructMeta>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct StructMeta {
    pub name: String,
    #[serde(default)]
    pub package: String,
    #[serde(default)]
    pub docs: Vec<String>,
    #[serde(default)]
    pub methods: Vec<MethodMeta>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct MethodMeta {
    pub name: String,
    #[serde(default)]
    pub docs: Vec<String>,
    /// Unexported methods are never routed.
    #[serde(default)]
    pub private: bool,
    /// Promoted from an embedded struct.
    #[serde(default)]
    pub inherited: bool,
    #[serde(default)]
    pub params: Vec<ParamMeta>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ParamMeta {
    pub name: String,
    #[serde(default)]
    pub index: usize,
    #[serde(rename = "type", default)]
    pub type_name: String,
    #[serde(default)]
    pub docs: Vec<String>,
}

impl Metadata {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn push(&mut self, s: StructMeta) -> &mut Self {
        self.structs.push(s);
        self
    }

    /// Finds a struct by key (`package.Name`) or by bare name.
    pub fn find_struct(&self, key: &str) -> Option<&StructMeta> {
        self.structs
            .iter()
            .find(|s| s.key() == key)
            .or_else(|| self.structs.iter().find(|s| s.name == key))
    }
}

impl StructMeta {
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self { name: name.into(), package: package.into(), ..Self::default() }
    }

    pub fn doc(mut self, line: impl Into<String>) -> Self {
        self.docs.push(line.into());
        self
    }

    pub fn method(mut self, method: MethodMeta) -> Self {
        self.methods.push(method);
        self
    }

    pub fn key(&self) -> String {
        if self.package.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.package, self.name)
        }
    }

    pub fn method_key(&self, method: &MethodMeta) -> String {
        format!("{}::{}", self.key(), method.name)
    }

    pub fn param_key(&self, method: &MethodMeta, param: &ParamMeta) -> String {
        format!("{}#{}", self.method_key(method), param.index)
    }
}

impl MethodMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn doc(mut self, line: impl Into<String>) -> Self {
        self.docs.push(line.into());
        self
    }

    pub fn param(mut self, param: ParamMeta) -> Self {
        self.params.push(param);
        self
    }

    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    pub fn inherited(mut self) -> Self {
        self.inherited = true;
        self
    }
}

impl ParamMeta {
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self { name: name.into(), index, ..Self::default() }
    }

    pub fn type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }

    pub fn doc(mut self, line: impl Into<String>) -> Self {
        self.docs.push(line.into());
        self
    }
}
