//! Doc-comment attributes.
//!
//! The static analyzer hands over each declaration's doc lines verbatim:
//!
//! ```text
//! // Hello says hello
//! // @GET /hello
//! // @BasicAuth user=admin&pass=secret
//! ```
//!
//! [`classify`] turns those lines into [`Attribute`]s, one per line, in
//! declaration order. Lines starting with `@` are directives whose category
//! comes from an [`AttributeRegistry`]; everything else is documentation.
//!
//! The registries are not global: a [`Vocabulary`] belongs to one
//! [`App`](crate::App) and middleware teach it their annotation names when
//! they are registered.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

// ── Types ─────────────────────────────────────────────────────────────────────

/// Semantic category of an attribute.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum AttributeType {
    /// `@GET /path` and friends.
    HttpMethod,
    /// Unregistered directive.
    #[default]
    Other,
    /// Free-form documentation line.
    Doc,
    /// Activates a registered middleware.
    Middleware,
    /// Declares the binding source of a method parameter.
    Param,
    /// Marks an element without carrying behaviour (`@Controller`).
    Tagger,
    /// Consumed by the framework itself (`@Route`, `@Ignore`).
    Inner,
}

/// One classified doc line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Attribute {
    /// Upper-cased directive name, or the declaration name for doc lines.
    pub name: String,
    /// Raw trailing text.
    pub value: String,
    pub kind: AttributeType,
    /// Position of the source line.
    pub index: usize,
}

impl Attribute {
    /// Case-insensitive name comparison.
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name.trim_start_matches('@'))
    }
}

/// Canonical form of a directive name: no leading `@`, upper-case.
pub fn normalize(name: &str) -> String {
    name.trim().trim_start_matches('@').to_ascii_uppercase()
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Append-only name → [`AttributeType`] table.
///
/// The first registration of a name wins, so middleware registering their
/// annotation at startup cannot clobber a framework built-in.
#[derive(Clone, Debug, Default)]
pub struct AttributeRegistry {
    types: HashMap<String, AttributeType>,
}

impl AttributeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: &[(&str, AttributeType)]) -> Self {
        let mut registry = Self::new();
        for (name, kind) in entries {
            registry.add(name, *kind);
        }
        registry
    }

    /// Registers `name`. Returns `false` (and changes nothing) if the name
    /// was already known.
    pub fn add(&mut self, name: &str, kind: AttributeType) -> bool {
        let key = normalize(name);
        if key.is_empty() || self.types.contains_key(&key) {
            return false;
        }
        self.types.insert(key, kind);
        true
    }

    /// Unknown names resolve to [`AttributeType::Other`].
    pub fn lookup(&self, name: &str) -> AttributeType {
        self.types.get(&normalize(name)).copied().unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(&normalize(name))
    }
}

/// Which kind of declaration a doc list belongs to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DeclKind {
    Controller,
    Method,
    Param,
}

const CONTROLLER_BUILTINS: &[(&str, AttributeType)] = &[
    ("CONTROLLER", AttributeType::Tagger),
    ("CTL", AttributeType::Tagger),
    ("BASE", AttributeType::Tagger),
    ("ROUTE", AttributeType::Inner),
    ("TAG", AttributeType::Doc),
    ("DEPRECATED", AttributeType::Doc),
    ("OPENAPIDOC", AttributeType::Doc),
    ("INJECT", AttributeType::Other),
];

const METHOD_BUILTINS: &[(&str, AttributeType)] = &[
    ("GET", AttributeType::HttpMethod),
    ("POST", AttributeType::HttpMethod),
    ("PUT", AttributeType::HttpMethod),
    ("PATCH", AttributeType::HttpMethod),
    ("DELETE", AttributeType::HttpMethod),
    ("HEAD", AttributeType::HttpMethod),
    ("OPTIONS", AttributeType::HttpMethod),
    ("TRACE", AttributeType::HttpMethod),
    ("CONNECT", AttributeType::HttpMethod),
    ("ANY", AttributeType::HttpMethod),
    ("WS", AttributeType::HttpMethod),
    ("IGNORE", AttributeType::Inner),
    ("TAG", AttributeType::Doc),
    ("DEPRECATED", AttributeType::Doc),
];

const PARAM_BUILTINS: &[(&str, AttributeType)] = &[
    ("BODY", AttributeType::Param),
    ("JSON", AttributeType::Param),
    ("FORM", AttributeType::Param),
    ("QUERY", AttributeType::Param),
    ("PATH", AttributeType::Param),
    ("HEADER", AttributeType::Param),
    ("COOKIE", AttributeType::Param),
    ("PLAIN", AttributeType::Param),
    ("XML", AttributeType::Param),
    ("MULTIPART", AttributeType::Param),
    ("SERVICE", AttributeType::Param),
];

/// One registry per declaration kind, seeded with the framework built-ins.
#[derive(Clone, Debug)]
pub struct Vocabulary {
    controller: AttributeRegistry,
    method: AttributeRegistry,
    param: AttributeRegistry,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            controller: AttributeRegistry::with_entries(CONTROLLER_BUILTINS),
            method: AttributeRegistry::with_entries(METHOD_BUILTINS),
            param: AttributeRegistry::with_entries(PARAM_BUILTINS),
        }
    }
}

impl Vocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self, kind: DeclKind) -> &AttributeRegistry {
        match kind {
            DeclKind::Controller => &self.controller,
            DeclKind::Method => &self.method,
            DeclKind::Param => &self.param,
        }
    }

    pub fn add(&mut self, kind: DeclKind, name: &str, attribute: AttributeType) -> bool {
        match kind {
            DeclKind::Controller => self.controller.add(name, attribute),
            DeclKind::Method => self.method.add(name, attribute),
            DeclKind::Param => self.param.add(name, attribute),
        }
    }
}

// ── Classification ────────────────────────────────────────────────────────────

/// Classifies a declaration's doc lines.
///
/// Output order is input order. An empty list yields a single
/// [`AttributeType::Doc`] attribute whose name and value are `decl_name`.
pub fn classify<S: AsRef<str>>(
    lines: &[S],
    decl_name: &str,
    registry: &AttributeRegistry,
) -> Vec<Attribute> {
    if lines.is_empty() {
        return vec![Attribute {
            name: decl_name.to_owned(),
            value: decl_name.to_owned(),
            kind: AttributeType::Doc,
            index: 0,
        }];
    }

    lines
        .iter()
        .enumerate()
        .map(|(index, line)| classify_line(line.as_ref().trim(), decl_name, registry, index))
        .collect()
}

fn classify_line(
    line: &str,
    decl_name: &str,
    registry: &AttributeRegistry,
    index: usize,
) -> Attribute {
    if let Some(directive) = line.strip_prefix('@') {
        let (name, value) = split_first_word(directive);
        let name = normalize(name);
        let kind = registry.lookup(&name);
        return Attribute { name, value: value.to_owned(), kind, index };
    }

    // godoc convention: "Hello says hello" documents `Hello`.
    let value = match line.strip_prefix(decl_name) {
        Some(rest)
            if !decl_name.is_empty()
                && (rest.is_empty() || rest.starts_with(char::is_whitespace)) =>
        {
            rest.trim()
        }
        _ => line,
    };
    Attribute {
        name: decl_name.to_owned(),
        value: value.to_owned(),
        kind: AttributeType::Doc,
        index,
    }
}

fn split_first_word(s: &str) -> (&str, &str) {
    match s.split_once(char::is_whitespace) {
        Some((head, tail)) => (head, tail.trim()),
        None => (s, ""),
    }
}

// ── Cache ─────────────────────────────────────────────────────────────────────

/// Memoized classification keyed by declaration identity.
///
/// Declarations never change after analysis, so entries are never
/// invalidated. Repeat lookups return the same shared slice.
#[derive(Debug, Default)]
pub struct AttributeCache {
    entries: Mutex<HashMap<String, Arc<[Attribute]>>>,
}

impl AttributeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_classify<S: AsRef<str>>(
        &self,
        key: &str,
        lines: &[S],
        decl_name: &str,
        registry: &AttributeRegistry,
    ) -> Arc<[Attribute]> {
        let mut entries = self.entries.lock();
        if let Some(hit) = entries.get(key) {
            return Arc::clone(hit);
        }
        let attrs: Arc<[Attribute]> = classify(lines, decl_name, registry).into();
        entries.insert(key.to_owned(), Arc::clone(&attrs));
        attrs
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A [`Vocabulary`] plus the cache of everything classified with it.
#[derive(Debug, Default)]
pub struct Classifier {
    vocabulary: Vocabulary,
    cache: AttributeCache,
}

impl Classifier {
    pub fn new(vocabulary: Vocabulary) -> Self {
        Self { vocabulary, cache: AttributeCache::new() }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Registration happens before routes are composed; anything classified
    /// earlier keeps its cached categories.
    pub fn vocabulary_mut(&mut self) -> &mut Vocabulary {
        &mut self.vocabulary
    }

    pub fn classify<S: AsRef<str>>(
        &self,
        kind: DeclKind,
        key: &str,
        lines: &[S],
        decl_name: &str,
    ) -> Arc<[Attribute]> {
        self.cache
            .get_or_classify(key, lines, decl_name, self.vocabulary.registry(kind))
    }
}

/// First attribute named `name`.
pub fn find<'a>(attrs: &'a [Attribute], name: &str) -> Option<&'a Attribute> {
    attrs.iter().find(|a| a.is(name))
}

pub fn of_kind(attrs: &[Attribute], kind: AttributeType) -> impl Iterator<Item = &Attribute> {
    attrs.iter().filter(move |a| a.kind == kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method_registry() -> AttributeRegistry {
        Vocabulary::default().registry(DeclKind::Method).clone()
    }

    #[test]
    fn directives_keep_declaration_order() {
        let lines = ["Hello says hello", "@GET /hello", "@post /hello/{id}", "@Ignore BasicAuth"];
        let attrs = classify(&lines, "Hello", &method_registry());

        assert_eq!(attrs.len(), 4);
        assert_eq!(attrs[0].kind, AttributeType::Doc);
        assert_eq!(attrs[0].name, "Hello");
        assert_eq!(attrs[0].value, "says hello");
        assert_eq!((attrs[1].name.as_str(), attrs[1].value.as_str()), ("GET", "/hello"));
        assert_eq!(attrs[1].kind, AttributeType::HttpMethod);
        assert_eq!((attrs[2].name.as_str(), attrs[2].value.as_str()), ("POST", "/hello/{id}"));
        assert_eq!(attrs[3].kind, AttributeType::Inner);
        assert_eq!(attrs.iter().map(|a| a.index).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn empty_docs_yield_one_synthetic_doc() {
        let attrs = classify::<&str>(&[], "Hello", &method_registry());
        assert_eq!(
            attrs,
            vec![Attribute {
                name: "Hello".into(),
                value: "Hello".into(),
                kind: AttributeType::Doc,
                index: 0,
            }]
        );
    }

    #[test]
    fn unknown_directive_is_other() {
        let attrs = classify(&["@Cache ttl=30"], "List", &method_registry());
        assert_eq!(attrs[0].kind, AttributeType::Other);
        assert_eq!(attrs[0].name, "CACHE");
        assert_eq!(attrs[0].value, "ttl=30");
    }

    #[test]
    fn plain_text_not_prefixed_by_name_is_kept_whole() {
        let attrs = classify(&["returns the greeting"], "Hello", &method_registry());
        assert_eq!(attrs[0].value, "returns the greeting");
        assert_eq!(attrs[0].name, "Hello");
    }

    #[test]
    fn first_registration_wins() {
        let mut registry = AttributeRegistry::new();
        assert!(registry.add("@Auth", AttributeType::Middleware));
        assert!(!registry.add("auth", AttributeType::Doc));
        assert_eq!(registry.lookup("AUTH"), AttributeType::Middleware);
    }

    #[test]
    fn builtins_cannot_be_overridden() {
        let mut vocabulary = Vocabulary::default();
        assert!(!vocabulary.add(DeclKind::Method, "GET", AttributeType::Middleware));
        assert_eq!(vocabulary.registry(DeclKind::Method).lookup("get"), AttributeType::HttpMethod);
    }

    #[test]
    fn cache_returns_the_same_slice() {
        let classifier = Classifier::default();
        let lines = vec!["@GET /a".to_owned()];
        let first = classifier.classify(DeclKind::Method, "pkg.A::a", &lines, "a");
        let second = classifier.classify(DeclKind::Method, "pkg.A::a", &lines, "a");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(classifier.cache.len(), 1);
    }

    #[test]
    fn find_is_case_insensitive() {
        let attrs = classify(&["@Route /users"], "Users", &AttributeRegistry::new());
        assert_eq!(find(&attrs, "route").map(|a| a.value.as_str()), Some("/users"));
        assert!(find(&attrs, "@ROUTE").is_some());
    }
}
