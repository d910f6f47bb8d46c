//! Caller-supplied compilation settings.

use serde::{Deserialize, Serialize};

/// Default number of elements above which in-memory filters run in parallel.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 4096;

/// How member access on a possibly-null value is compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NullPropagation {
    /// Propagating for in-memory sources, strict for remote sources.
    #[default]
    Default,
    /// Access null directly and fail at evaluation.
    Strict,
    /// Short-circuit every nullable access to a typed null.
    Propagating,
}

/// Kind of queryable the compiled expression will be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SourceKind {
    /// In-memory sequence evaluated by this crate.
    #[default]
    InMemory,
    /// Provider that translates the tree (a database driver, ...).
    Remote,
}

impl NullPropagation {
    /// Resolves `Default` against the source kind.
    #[must_use]
    pub fn resolve(self, source: SourceKind) -> NullPropagation {
        match (self, source) {
            (NullPropagation::Default, SourceKind::InMemory) => NullPropagation::Propagating,
            (NullPropagation::Default, SourceKind::Remote) => NullPropagation::Strict,
            (mode, _) => mode,
        }
    }
}

/// Settings shared by all binders of one compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    pub null_propagation: NullPropagation,
    /// Hoist scalar constants into shared cells.
    pub enable_constant_parameterization: bool,
    /// Server-driven page size applied to expanded collections.
    pub page_size: Option<usize>,
    /// Materialize correlated collections once per outer element.
    pub enable_correlated_subquery_buffering: bool,
    /// Honor nested filters on single-valued navigation expansions.
    pub handle_reference_navigation_expand_filter: bool,
    /// Order paged expansions by key when no ordering is given.
    pub ensure_stable_ordering: bool,
    /// Source length above which in-memory filters run in parallel.
    pub parallel_threshold: usize,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            null_propagation: NullPropagation::Default,
            enable_constant_parameterization: true,
            page_size: None,
            enable_correlated_subquery_buffering: false,
            handle_reference_navigation_expand_filter: true,
            ensure_stable_ordering: true,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }
}

impl QuerySettings {
    /// Creates default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the null-propagation mode.
    #[must_use]
    pub fn with_null_propagation(mut self, mode: NullPropagation) -> Self {
        self.null_propagation = mode;
        self
    }

    /// Enables or disables constant parameterization.
    #[must_use]
    pub fn with_constant_parameterization(mut self, enabled: bool) -> Self {
        self.enable_constant_parameterization = enabled;
        self
    }

    /// Sets the page size for expanded collections.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Enables or disables correlated-subquery buffering.
    #[must_use]
    pub fn with_correlated_subquery_buffering(mut self, enabled: bool) -> Self {
        self.enable_correlated_subquery_buffering = enabled;
        self
    }

    /// Enables or disables nested filters on single-valued expansions.
    #[must_use]
    pub fn with_reference_navigation_expand_filter(mut self, enabled: bool) -> Self {
        self.handle_reference_navigation_expand_filter = enabled;
        self
    }

    /// Enables or disables key ordering of paged expansions.
    #[must_use]
    pub fn with_stable_ordering(mut self, enabled: bool) -> Self {
        self.ensure_stable_ordering = enabled;
        self
    }

    /// Sets the parallel evaluation threshold.
    #[must_use]
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }
}
