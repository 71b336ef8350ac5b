//! Type-indexed dependency container.
//!
//! An [`Injector`] stores values keyed by their type. Lookups resolve in
//! three steps:
//!
//! 1. exact type match;
//! 2. interface match: entries registered with [`Injector::map_as`] or
//!    [`Injector::implements`] carry upcasts to trait-object types, scanned
//!    in insertion order;
//! 3. the parent injector, if any.
//!
//! The application owns one root injector. Every request gets a child whose
//! parent is the root, so request-scoped values (the [`Request`], an
//! authenticated user) never leak between requests.
//!
//! ```rust
//! use std::sync::Arc;
//! use sigil::inject::Injector;
//!
//! trait Greeter: Send + Sync { fn greet(&self) -> String; }
//! struct English;
//! impl Greeter for English { fn greet(&self) -> String { "hello".into() } }
//!
//! let mut injector = Injector::new();
//! injector.map_as(Arc::new(English), |g| g as Arc<dyn Greeter>);
//!
//! let greeter: Arc<dyn Greeter> = injector.get().unwrap();
//! assert_eq!(greeter.greet(), "hello");
//! ```
//!
//! [`Request`]: crate::Request

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use thiserror::Error;

use crate::bind::BindFn;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum InjectError {
    #[error("no value of type `{type_name}` in the injector")]
    NotFound { type_name: &'static str },

    #[error("cannot wire `{owner}.{field}`: no value of type `{type_name}`")]
    Field {
        owner: &'static str,
        field: &'static str,
        type_name: &'static str,
    },

    #[error("no bound argument of type `{type_name}` at position {slot}")]
    Unbound { slot: usize, type_name: &'static str },

    #[error("injector parent is already set")]
    ParentAlreadySet,
}

// ── Storage ───────────────────────────────────────────────────────────────────

type Value = Arc<dyn Any + Send + Sync>;
type Cast = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

struct Entry {
    type_name: &'static str,
    value: Value,
    casts: HashMap<TypeId, Cast>,
}

/// The container. See the [module docs](self).
#[derive(Default)]
pub struct Injector {
    entries: Vec<Entry>,
    index: HashMap<TypeId, usize>,
    bound: Vec<Value>,
    parent: Option<Arc<Injector>>,
}

impl Injector {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty injector that falls back to `parent`.
    pub fn child(parent: Arc<Injector>) -> Self {
        Self { parent: Some(parent), ..Self::default() }
    }

    /// Stores `value` under its own type. A later value of the same type
    /// replaces the earlier one.
    pub fn map<T>(&mut self, value: T) -> &mut Self
    where
        T: Clone + Send + Sync + 'static,
    {
        self.insert(TypeId::of::<T>(), type_name::<T>(), Arc::new(value));
        self
    }

    /// Stores a trait object under `Arc<I>`.
    ///
    /// The interface type is the static type of the argument, so handing in
    /// something that is not an interface is impossible rather than a
    /// runtime failure.
    pub fn map_to<I>(&mut self, value: Arc<I>) -> &mut Self
    where
        I: ?Sized + Send + Sync + 'static,
    {
        self.map(value)
    }

    /// Stores `Arc<T>` under its concrete type and records that it can be
    /// resolved as `Arc<I>` through `upcast`.
    pub fn map_as<T, I>(&mut self, value: Arc<T>, upcast: fn(Arc<T>) -> Arc<I>) -> &mut Self
    where
        T: Send + Sync + 'static,
        I: ?Sized + Send + Sync + 'static,
    {
        self.map(value);
        self.implements(upcast);
        self
    }

    /// Declares that the stored `Arc<T>` also satisfies `Arc<I>`.
    /// Returns `false` when no `Arc<T>` is stored in this injector.
    pub fn implements<T, I>(&mut self, upcast: fn(Arc<T>) -> Arc<I>) -> bool
    where
        T: Send + Sync + 'static,
        I: ?Sized + Send + Sync + 'static,
    {
        let Some(&slot) = self.index.get(&TypeId::of::<Arc<T>>()) else {
            return false;
        };
        let cast: Cast = Arc::new(move |value: &Value| {
            let concrete = value.downcast_ref::<Arc<T>>()?;
            Some(Arc::new(upcast(Arc::clone(concrete))) as Value)
        });
        self.entries[slot].casts.insert(TypeId::of::<Arc<I>>(), cast);
        true
    }

    fn insert(&mut self, id: TypeId, type_name: &'static str, value: Value) {
        match self.index.get(&id) {
            Some(&slot) => {
                let entry = &mut self.entries[slot];
                entry.value = value;
                entry.casts.clear();
            }
            None => {
                self.index.insert(id, self.entries.len());
                self.entries.push(Entry { type_name, value, casts: HashMap::new() });
            }
        }
    }

    /// Appends a value bound from the request. Bound values are read back
    /// by position, so two arguments of the same type stay distinct.
    pub fn push_bound<T>(&mut self, value: T) -> &mut Self
    where
        T: Send + Sync + 'static,
    {
        self.bound.push(Arc::new(value));
        self
    }

    /// The bound value at `slot`. Bound values never fall back to the parent.
    pub fn bound<T>(&self, slot: usize) -> Result<T, InjectError>
    where
        T: Clone + 'static,
    {
        self.bound
            .get(slot)
            .and_then(|value| value.downcast_ref::<T>().cloned())
            .ok_or(InjectError::Unbound { slot, type_name: type_name::<T>() })
    }

    // ── Lookup ────────────────────────────────────────────────────────────────

    /// Exact match, then interface match, then parent.
    pub fn get<T>(&self) -> Option<T>
    where
        T: Clone + 'static,
    {
        let id = TypeId::of::<T>();
        if let Some(&slot) = self.index.get(&id) {
            return self.entries[slot].value.downcast_ref::<T>().cloned();
        }

        // First implementor in insertion order.
        for entry in &self.entries {
            if let Some(cast) = entry.casts.get(&id) {
                if let Some(value) = cast(&entry.value) {
                    return value.downcast_ref::<T>().cloned();
                }
            }
        }

        self.parent.as_ref()?.get()
    }

    pub fn resolve<T>(&self) -> Result<T, InjectError>
    where
        T: Clone + 'static,
    {
        self.get().ok_or(InjectError::NotFound { type_name: type_name::<T>() })
    }

    /// Whether `T` resolves anywhere in the chain.
    pub fn contains<T>(&self) -> bool
    where
        T: Clone + 'static,
    {
        self.get::<T>().is_some()
    }

    /// Number of values stored locally, parent excluded.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn parent(&self) -> Option<&Arc<Injector>> {
        self.parent.as_ref()
    }

    /// One-time wiring of the fallback chain.
    pub fn set_parent(&mut self, parent: Arc<Injector>) -> Result<(), InjectError> {
        if self.parent.is_some() {
            return Err(InjectError::ParentAlreadySet);
        }
        self.parent = Some(parent);
        Ok(())
    }

    // ── Wiring ────────────────────────────────────────────────────────────────

    /// Resolves a struct field, naming the field in the error.
    pub fn field<T: FromInjector>(
        &self,
        owner: &'static str,
        field: &'static str,
    ) -> Result<T, InjectError> {
        T::from_injector(self).map_err(|err| match err {
            InjectError::NotFound { type_name } => InjectError::Field { owner, field, type_name },
            other => other,
        })
    }

    /// Fills every wired field of `target`.
    pub fn apply<T: Autowire + ?Sized>(&self, target: &mut T) -> Result<(), InjectError> {
        target.autowire(self)
    }

    /// Calls `f` with every argument resolved from the container.
    ///
    /// An argument that cannot be resolved yields `Err` and `f` is not called.
    pub fn invoke<Args, F>(&self, f: &F) -> Result<F::Output, InjectError>
    where
        F: Invocable<Args>,
    {
        f.invoke(self)
    }
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injector")
            .field("types", &self.entries.iter().map(|e| e.type_name).collect::<Vec<_>>())
            .field("bound", &self.bound.len())
            .field("parent", &self.parent)
            .finish()
    }
}

// ── Resolution traits ─────────────────────────────────────────────────────────

/// A type that can be produced from an [`Injector`].
///
/// Implemented for `Arc<T>` (services), [`Inject<T>`] (any cloneable value),
/// [`Request`](crate::Request), [`Bound<T>`](crate::bind::Bound) and the
/// request-scoped values built-in middleware provide.
pub trait FromInjector: Sized + Send + 'static {
    fn from_injector(injector: &Injector) -> Result<Self, InjectError>;

    /// Resolution as the argument of an invoked function. `slot` counts the
    /// bound arguments seen so far; only bound types read or advance it.
    #[doc(hidden)]
    fn from_injector_at(injector: &Injector, _slot: &mut usize) -> Result<Self, InjectError> {
        Self::from_injector(injector)
    }

    /// How a request value for this argument is produced before the call.
    /// `None` for plain dependencies.
    #[doc(hidden)]
    fn binder() -> Option<BindFn> {
        None
    }
}

impl<T> FromInjector for Arc<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    fn from_injector(injector: &Injector) -> Result<Self, InjectError> {
        injector.resolve()
    }
}

/// Resolves any cloneable value stored with [`Injector::map`].
#[derive(Clone, Debug)]
pub struct Inject<T>(pub T);

impl<T> Deref for Inject<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> FromInjector for Inject<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn from_injector(injector: &Injector) -> Result<Self, InjectError> {
        injector.resolve().map(Inject)
    }
}

/// A function whose arguments all implement [`FromInjector`].
pub trait Invocable<Args>: Send + Sync + 'static {
    type Output;

    fn invoke(&self, injector: &Injector) -> Result<Self::Output, InjectError>;
}

/// The argument tuple of an [`Invocable`].
pub trait MethodParams {
    /// One binder per argument that is bound from the request, in order.
    fn binders() -> Vec<BindFn>;
}

macro_rules! impl_invocable {
    ($($arg:ident),*) => {
        impl<F, R, $($arg,)*> Invocable<($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> R + Send + Sync + 'static,
            $($arg: FromInjector,)*
        {
            type Output = R;

            #[allow(non_snake_case, unused_variables, unused_mut)]
            fn invoke(&self, injector: &Injector) -> Result<R, InjectError> {
                let mut slot = 0;
                $(let $arg = <$arg as FromInjector>::from_injector_at(injector, &mut slot)?;)*
                Ok((self)($($arg),*))
            }
        }

        impl<$($arg,)*> MethodParams for ($($arg,)*)
        where
            $($arg: FromInjector,)*
        {
            #[allow(unused_mut)]
            fn binders() -> Vec<BindFn> {
                let mut binders = Vec::new();
                $(binders.extend(<$arg as FromInjector>::binder());)*
                binders
            }
        }
    };
}

impl_invocable!();
impl_invocable!(A1);
impl_invocable!(A1, A2);
impl_invocable!(A1, A2, A3);
impl_invocable!(A1, A2, A3, A4);
impl_invocable!(A1, A2, A3, A4, A5);
impl_invocable!(A1, A2, A3, A4, A5, A6);
impl_invocable!(A1, A2, A3, A4, A5, A6, A7);
impl_invocable!(A1, A2, A3, A4, A5, A6, A7, A8);

// ── Autowiring ────────────────────────────────────────────────────────────────

/// Structs whose fields are filled from an [`Injector`]. Usually derived
/// with [`autowire!`](crate::autowire).
pub trait Autowire {
    fn autowire(&mut self, injector: &Injector) -> Result<(), InjectError>;
}

/// Implements [`Autowire`] for a struct whose listed fields are `Option<T>`
/// with `T: FromInjector`.
///
/// ```rust
/// use std::sync::Arc;
/// use sigil::autowire;
/// use sigil::inject::{Injector, Autowire};
///
/// struct Repo;
///
/// #[derive(Default)]
/// struct UserController {
///     repo: Option<Arc<Repo>>,
/// }
/// autowire!(UserController { repo });
///
/// let mut injector = Injector::new();
/// injector.map(Arc::new(Repo));
/// let mut ctl = UserController::default();
/// injector.apply(&mut ctl).unwrap();
/// assert!(ctl.repo.is_some());
/// ```
#[macro_export]
macro_rules! autowire {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl $crate::inject::Autowire for $ty {
            fn autowire(
                &mut self,
                injector: &$crate::inject::Injector,
            ) -> ::std::result::Result<(), $crate::inject::InjectError> {
                // Resolve everything first so a failure leaves `self` untouched.
                $(
                    let $field = injector.field(stringify!($ty), stringify!($field))?;
                )*
                $(
                    self.$field = ::std::option::Option::Some($field);
                )*
                Ok(())
            }
        }
    };
}
