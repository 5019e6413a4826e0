//! Leaf models and the model registry.
//!
//! A [`ComponentModel`] supplies everything about a component the tree
//! cannot know on its own: how many states it contributes, how many root
//! functions it watches, and what its equations do. Containers and other
//! structural nodes implement nothing; every method defaults to inert.
//!
//! Models are constructed by kind name through a [`ModelRegistry`] value
//! that callers build and pass into their construction path. There is no
//! global registration.

use crate::component::{Component, ComponentFlags};
use crate::locations::Locations;
use crate::mode::SolverMode;
use crate::offsets::{RootCount, StateSizes};
use crate::state::StateData;
use dst_sparse::Accumulator;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors from model construction by name
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown model kind '{0}'")]
    UnknownKind(String),
}

/// Behavior a component delegates to its model.
///
/// Size hooks answer for the component alone; the tree aggregates them.
/// Evaluation hooks receive locations already positioned at the
/// component's blocks, so all indexing is local and starts at zero.
pub trait ComponentModel {
    /// Model kind name, matching its registry entry.
    fn kind(&self) -> &str;

    /// State variables this component contributes on its own.
    fn local_state_sizes(&self, flags: &ComponentFlags, mode: &SolverMode) -> StateSizes {
        let _ = (flags, mode);
        StateSizes::default()
    }

    /// Jacobian entry estimate for the component's own equations.
    fn local_jacobian_count(&self, mode: &SolverMode) -> usize {
        let _ = mode;
        0
    }

    /// Root functions this component watches on its own.
    fn local_root_count(&self, mode: &SolverMode) -> RootCount {
        let _ = mode;
        RootCount::default()
    }

    /// Structural gate: may a child of `kind` attach here?
    fn accepts_child(&self, kind: &str) -> bool {
        let _ = kind;
        true
    }

    /// Diagnostic names for the local states, algebraic block first.
    fn state_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Algebraic residuals, written to `loc.dest_alg`.
    fn residual(&self, sd: &StateData<'_>, loc: &mut Locations<'_>, mode: &SolverMode) {
        let _ = (sd, loc, mode);
    }

    /// State derivatives, written to `loc.dest_diff`.
    fn derivative(&self, sd: &StateData<'_>, loc: &mut Locations<'_>, mode: &SolverMode) {
        let _ = (sd, loc, mode);
    }

    /// Algebraic update sweep with relaxation factor `alpha`, written to
    /// `loc.dest_alg`.
    fn algebraic_update(
        &self,
        sd: &StateData<'_>,
        loc: &mut Locations<'_>,
        mode: &SolverMode,
        alpha: f64,
    ) {
        let _ = (sd, loc, mode, alpha);
    }

    /// Jacobian contributions, appended to `md` at the component's
    /// assigned flat indices. `sd.cj` carries the derivative weighting.
    fn jacobian_elements(
        &self,
        sd: &StateData<'_>,
        loc: &Locations<'_>,
        md: &mut dyn Accumulator,
        mode: &SolverMode,
    ) {
        let _ = (sd, loc, md, mode);
    }

    /// Root function values, written to the component's window of `roots`.
    fn root_test(
        &self,
        sd: &StateData<'_>,
        loc: &Locations<'_>,
        roots: &mut [f64],
        mode: &SolverMode,
    ) {
        let _ = (sd, loc, roots, mode);
    }

    /// React to triggered roots; `mask` covers the component's window.
    fn root_trigger(&mut self, time: f64, mask: &[bool], mode: &SolverMode) {
        let _ = (time, mask, mode);
    }
}

/// Pure grouping node: no states, no roots, no equations.
#[derive(Debug, Default, Clone)]
pub struct ContainerModel;

impl ComponentModel for ContainerModel {
    fn kind(&self) -> &str {
        "container"
    }
}

type Factory = Arc<dyn Fn() -> Box<dyn ComponentModel> + Send + Sync>;

/// Registry of model factories, keyed by kind name.
///
/// Build one, register the kinds an application knows, and pass it into
/// whatever constructs the tree. Registering a kind twice replaces the
/// earlier factory.
#[derive(Default)]
pub struct ModelRegistry {
    factories: HashMap<String, Factory>,
}

impl ModelRegistry {
    /// Empty registry with no kinds.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry preloaded with the built-in kinds.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("container", || Box::new(ContainerModel));
        registry
    }

    /// Register a factory for `kind`.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn ComponentModel> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
    }

    /// Construct a model of `kind`.
    pub fn create(&self, kind: &str) -> Result<Box<dyn ComponentModel>, RegistryError> {
        self.factories
            .get(kind)
            .map(|factory| factory())
            .ok_or_else(|| RegistryError::UnknownKind(kind.to_string()))
    }

    /// Construct a named component carrying a model of `kind`.
    pub fn create_component(
        &self,
        kind: &str,
        name: impl Into<String>,
    ) -> Result<Component, RegistryError> {
        Ok(Component::new(name, self.create(kind)?))
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kind names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.factories.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}
