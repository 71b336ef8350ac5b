//! Chain composition.
//!
//! For one business method the composer folds every applicable middleware
//! around the innermost handler, once, at startup:
//!
//! ```text
//! Global[0] → Global[1] → Controller[0] → … → Method[0] → … → business
//! ```
//!
//! Each scope keeps declaration (or registration) order, the first entry
//! being the outermost. Method middleware are cloned from their prototype
//! and configured per method; controller middleware arrive already
//! configured for the whole controller. `@Ignore <Attr>` on a method swaps
//! the matching controller layer's `wrap` for `wrap_ignored`.

use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::attribute::{Attribute, AttributeType, normalize};
use crate::error::Error;
use crate::handler::HandlerFunc;
use crate::inject::Injector;
use crate::meta::MethodMeta;
use crate::middleware::{MethodLayer, MiddlewareContext, MiddlewareRegistry, Slot};

/// A controller-scope middleware configured for one controller.
#[derive(Clone)]
pub struct ControllerLayer {
    /// Upper-cased annotation name, matched against `@Ignore`.
    pub attribute: String,
    pub param: String,
    pub layer: Arc<dyn MethodLayer>,
}

/// A configured global middleware.
#[derive(Clone)]
pub struct GlobalLayer {
    pub name: String,
    pub layer: Arc<dyn MethodLayer>,
}

/// A route's finished chain.
pub struct Composed {
    pub handler: HandlerFunc,
    /// `@Attr` names of the controller and method layers that run.
    pub signature: Vec<String>,
}

/// The method being composed.
pub struct Step<'a> {
    pub controller: &'a str,
    pub method: &'a str,
    pub attributes: &'a [Attribute],
    pub meta: Option<&'a MethodMeta>,
}

pub struct Composer<'a> {
    registry: &'a MiddlewareRegistry,
    injector: &'a Injector,
    globals: &'a [GlobalLayer],
    controller_value: Option<Arc<dyn Any + Send + Sync>>,
}

impl<'a> Composer<'a> {
    pub fn new(
        registry: &'a MiddlewareRegistry,
        injector: &'a Injector,
        globals: &'a [GlobalLayer],
    ) -> Self {
        Self { registry, injector, globals, controller_value: None }
    }

    /// Makes the controller instance visible to middleware through
    /// [`MiddlewareContext::value`] under [`Slot::Controller`].
    pub fn with_controller(mut self, controller: Arc<dyn Any + Send + Sync>) -> Self {
        self.controller_value = Some(controller);
        self
    }

    fn context(&self, step: &Step<'a>, slot: Slot, param: &'a str) -> MiddlewareContext<'a> {
        let mut ctx = MiddlewareContext::new(step.controller, slot, self.injector)
            .method(step.method)
            .param(param);
        if let Some(controller) = &self.controller_value {
            ctx = ctx.with_shared(Slot::Controller, Arc::clone(controller));
        }
        if let Some(meta) = step.meta {
            ctx = ctx.with_value(Slot::Method, meta.clone());
        }
        ctx
    }

    /// Clones and configures the controller-scope middleware named by the
    /// controller's own attributes.
    pub fn controller_layers(
        &self,
        controller: &'a str,
        attributes: &'a [Attribute],
    ) -> Result<Vec<ControllerLayer>, Error> {
        let step = Step { controller, method: "", attributes, meta: None };
        let mut layers = Vec::new();
        for attr in attributes.iter().filter(|a| a.kind == AttributeType::Middleware) {
            let Some(layer) = self.configure(&step, Slot::Controller, attr)? else {
                continue;
            };
            layers.push(ControllerLayer {
                attribute: attr.name.clone(),
                param: attr.value.clone(),
                layer,
            });
        }
        Ok(layers)
    }

    fn configure(
        &self,
        step: &Step<'a>,
        slot: Slot,
        attr: &'a Attribute,
    ) -> Result<Option<Arc<dyn MethodLayer>>, Error> {
        let Some(prototype) = self.registry.lookup(slot, &attr.name) else {
            debug!(attribute = %attr.name, ?slot, "no middleware registered for attribute");
            return Ok(None);
        };
        let Some(prototype) = prototype.as_layer() else {
            return Ok(None);
        };
        let mut layer = prototype.clone_layer();
        layer.configure(&self.context(step, slot, &attr.value))?;
        Ok(Some(Arc::from(layer)))
    }

    /// Builds the chain for one method around `business`.
    pub fn compose(
        &self,
        step: &Step<'a>,
        controller_layers: &'a [ControllerLayer],
        business: HandlerFunc,
    ) -> Result<Composed, Error> {
        let ignored = ignore_list(step.attributes);

        let mut method_layers = Vec::new();
        for attr in step.attributes.iter().filter(|a| a.kind == AttributeType::Middleware) {
            if let Some(layer) = self.configure(step, Slot::Method, attr)? {
                method_layers.push((attr, layer));
            }
        }

        let mut next = business;

        for (attr, layer) in method_layers.iter().rev() {
            let ctx = self.context(step, Slot::Method, &attr.value);
            next = Arc::clone(layer).wrap(&ctx, next);
        }

        for cl in controller_layers.iter().rev() {
            let ctx = self.context(step, Slot::Controller, &cl.param);
            next = if ignored.contains(&cl.attribute) {
                Arc::clone(&cl.layer).wrap_ignored(&ctx.ignored(true), next)
            } else {
                Arc::clone(&cl.layer).wrap(&ctx, next)
            };
        }

        for global in self.globals.iter().rev() {
            let ctx = self.context(step, Slot::Global, "");
            next = Arc::clone(&global.layer).wrap(&ctx, next);
        }

        let signature = controller_layers
            .iter()
            .filter(|cl| !ignored.contains(&cl.attribute))
            .map(|cl| format!("@{}", cl.attribute))
            .chain(method_layers.iter().map(|(attr, _)| format!("@{}", attr.name)))
            .collect();

        Ok(Composed { handler: next, signature })
    }
}

/// Configures every global middleware that can wrap, in registration order.
pub fn global_layers(
    registry: &MiddlewareRegistry,
    injector: &Injector,
) -> Result<Vec<GlobalLayer>, Error> {
    let mut layers = Vec::new();
    let mut failed = None;
    registry.for_each_global(|mw| {
        let Some(prototype) = mw.as_layer() else {
            return false;
        };
        let mut layer = prototype.clone_layer();
        let ctx = MiddlewareContext::new("Global", Slot::Global, injector);
        if let Err(err) = layer.configure(&ctx) {
            failed = Some(err);
            return true;
        }
        layers.push(GlobalLayer { name: mw.name().to_owned(), layer: Arc::from(layer) });
        false
    });
    match failed {
        Some(err) => Err(err),
        None => Ok(layers),
    }
}

/// Upper-cased attribute names listed by `@Ignore` lines. One line may name
/// several, separated by commas or whitespace.
pub fn ignore_list(attributes: &[Attribute]) -> HashSet<String> {
    attributes
        .iter()
        .filter(|a| a.is("IGNORE"))
        .flat_map(|a| a.value.split(|c: char| c == ',' || c.is_whitespace()))
        .filter(|name| !name.is_empty())
        .map(normalize)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{DeclKind, Vocabulary, classify};

    #[test]
    fn ignore_list_accepts_lists_and_repeats() {
        let registry = Vocabulary::default();
        let attrs = classify(
            &["@Ignore BasicAuth, log", "@Ignore @Audit", "@GET /x"],
            "X",
            registry.registry(DeclKind::Method),
        );
        let ignored = ignore_list(&attrs);
        assert_eq!(ignored.len(), 3);
        for name in ["BASICAUTH", "LOG", "AUDIT"] {
            assert!(ignored.contains(name), "{name}");
        }
    }
}
