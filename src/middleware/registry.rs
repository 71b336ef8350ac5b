//! Slot-partitioned store of middleware prototypes.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, warn};

use super::{Middleware, Slot};
use crate::attribute::{Vocabulary, normalize};

/// One map per [`Slot`], each in registration order.
///
/// Global middleware are keyed by [`name`](Middleware::name) exactly;
/// controller and method middleware by their upper-cased
/// [`attribute`](Middleware::attribute). Lookups never fall through to
/// another slot.
#[derive(Default)]
pub struct MiddlewareRegistry {
    global: IndexMap<String, Arc<dyn Middleware>>,
    controller: IndexMap<String, Arc<dyn Middleware>>,
    method: IndexMap<String, Arc<dyn Middleware>>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the middleware's registration hook against `vocabulary`, then
    /// stores it. A middleware registered again under the same key replaces
    /// the earlier one in place.
    pub fn register<M: Middleware>(&mut self, middleware: M, vocabulary: &mut Vocabulary) {
        middleware.register(vocabulary);
        let slot = middleware.slot();
        let key = match slot {
            Slot::Global => middleware.name().to_owned(),
            Slot::Controller | Slot::Method => normalize(middleware.attribute()),
        };
        debug!(name = middleware.name(), ?slot, "middleware registered");
        if self.partition_mut(slot).insert(key, Arc::new(middleware)).is_some() {
            warn!(?slot, "middleware registered twice, keeping the latest");
        }
    }

    pub fn lookup(&self, slot: Slot, name: &str) -> Option<&Arc<dyn Middleware>> {
        match slot {
            Slot::Global => self.global.get(name),
            Slot::Controller => self.controller.get(&normalize(name)),
            Slot::Method => self.method.get(&normalize(name)),
        }
    }

    /// Visits global middleware in registration order. The visitor returns
    /// `true` to stop; the return value says whether it did.
    pub fn for_each_global<F>(&self, mut visitor: F) -> bool
    where
        F: FnMut(&Arc<dyn Middleware>) -> bool,
    {
        self.global.values().any(|mw| visitor(mw))
    }

    pub fn len(&self, slot: Slot) -> usize {
        match slot {
            Slot::Global => self.global.len(),
            Slot::Controller => self.controller.len(),
            Slot::Method => self.method.len(),
        }
    }

    fn partition_mut(&mut self, slot: Slot) -> &mut IndexMap<String, Arc<dyn Middleware>> {
        match slot {
            Slot::Global => &mut self.global,
            Slot::Controller => &mut self.controller,
            Slot::Method => &mut self.method,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{AttributeType, DeclKind};

    struct Named(&'static str, Slot);

    impl Middleware for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn slot(&self) -> Slot {
            self.1
        }
    }

    #[test]
    fn registration_teaches_the_vocabulary() {
        let mut vocabulary = Vocabulary::default();
        let mut registry = MiddlewareRegistry::new();
        registry.register(Named("Audit", Slot::Method), &mut vocabulary);
        assert_eq!(
            vocabulary.registry(DeclKind::Method).lookup("@audit"),
            AttributeType::Middleware
        );
        assert_eq!(
            vocabulary.registry(DeclKind::Controller).lookup("Audit"),
            AttributeType::Other
        );
    }

    #[test]
    fn slots_are_partitioned() {
        let mut vocabulary = Vocabulary::default();
        let mut registry = MiddlewareRegistry::new();
        registry.register(Named("Audit", Slot::Controller), &mut vocabulary);
        assert!(registry.lookup(Slot::Controller, "audit").is_some());
        assert!(registry.lookup(Slot::Method, "Audit").is_none());
        assert!(registry.lookup(Slot::Global, "Audit").is_none());
    }

    #[test]
    fn global_keys_are_exact() {
        let mut vocabulary = Vocabulary::default();
        let mut registry = MiddlewareRegistry::new();
        registry.register(Named("Recovery", Slot::Global), &mut vocabulary);
        assert!(registry.lookup(Slot::Global, "Recovery").is_some());
        assert!(registry.lookup(Slot::Global, "RECOVERY").is_none());
    }

    #[test]
    fn for_each_global_keeps_order_and_stops_early() {
        let mut vocabulary = Vocabulary::default();
        let mut registry = MiddlewareRegistry::new();
        for name in ["A", "B", "C"] {
            registry.register(Named(name, Slot::Global), &mut vocabulary);
        }

        let mut seen = Vec::new();
        let stopped = registry.for_each_global(|mw| {
            seen.push(mw.name().to_owned());
            mw.name() == "B"
        });
        assert!(stopped);
        assert_eq!(seen, ["A", "B"]);

        assert!(!registry.for_each_global(|_| false));
    }
}
