//! Layers 1–5: the deletion validation gate.
//!
//! A candidate walks `Proposed → PathChecked → CategoryChecked →
//! DryRunChecked → RestorationChecked → ConfirmationChecked → Approved`;
//! any layer can short-circuit to `Rejected` with the failing layer and a
//! human-readable reason. No side effects happen before approval — the gate
//! reads, it never writes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use crate::catalog::store::CatalogStore;
use crate::classify::{Category, CategorySet, DO_NOT_DELETE};
use crate::core::paths::resolve_absolute_path;
use crate::safety::protected::ProtectedPathRegistry;

/// The five validation layers, in gate order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SafetyLayer {
    ProtectedPath,
    Category,
    DryRun,
    Restoration,
    Confirmation,
}

impl SafetyLayer {
    /// 1-based layer number as documented for callers.
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::ProtectedPath => 1,
            Self::Category => 2,
            Self::DryRun => 3,
            Self::Restoration => 4,
            Self::Confirmation => 5,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ProtectedPath => "protected-path",
            Self::Category => "category",
            Self::DryRun => "dry-run",
            Self::Restoration => "restoration",
            Self::Confirmation => "confirmation",
        }
    }
}

/// Terminal, non-retryable validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub layer: SafetyLayer,
    pub reason: String,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rejected at layer {} ({}): {}",
            self.layer.number(),
            self.layer.name(),
            self.reason
        )
    }
}

/// A candidate that cleared all five layers.
///
/// Only the validator constructs this; holding one is the executor's proof
/// that the gate ran.
#[derive(Debug, Clone)]
pub struct ApprovedCandidate {
    pub(crate) path: PathBuf,
    pub(crate) category: String,
    pub(crate) restoration_hint: String,
}

impl ApprovedCandidate {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn restoration_hint(&self) -> &str {
        &self.restoration_hint
    }
}

/// Outcome of a validation run, with the layers that passed for observability.
#[derive(Debug, Clone)]
pub enum ValidationOutcome {
    Approved(ApprovedCandidate),
    Rejected(Rejection),
}

impl ValidationOutcome {
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved(_))
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(rejection) => Some(rejection),
            Self::Approved(_) => None,
        }
    }
}

/// One validation request.
#[derive(Debug, Clone, Copy)]
pub struct ValidationRequest<'a> {
    pub path: &'a Path,
    /// Dry-run is the default; passing `false` is the explicit opt-out.
    pub dry_run: bool,
    /// Explicit confirmation token; `None` or blank never passes Layer 5.
    pub confirmation: Option<&'a str>,
}

impl<'a> ValidationRequest<'a> {
    /// A preview request: dry-run on, no confirmation.
    pub fn preview(path: &'a Path) -> Self {
        Self {
            path,
            dry_run: true,
            confirmation: None,
        }
    }
}

/// The gate itself. Stateless; safe to share across threads.
pub struct SafetyValidator<'a> {
    protected: &'a ProtectedPathRegistry,
    categories: &'a CategorySet,
    catalog: &'a CatalogStore,
}

impl<'a> SafetyValidator<'a> {
    pub fn new(
        protected: &'a ProtectedPathRegistry,
        categories: &'a CategorySet,
        catalog: &'a CatalogStore,
    ) -> Self {
        Self {
            protected,
            categories,
            catalog,
        }
    }

    /// Run all five layers in order; the first failure wins.
    pub fn validate(&self, request: &ValidationRequest<'_>) -> ValidationOutcome {
        let path = resolve_absolute_path(request.path);

        // Layer 1: protected paths. Not overridable by anything below.
        if let Some(pattern) = self.protected.matching_pattern(&path) {
            return reject(
                SafetyLayer::ProtectedPath,
                format!(
                    "{} matches protected pattern {pattern} and can never be deleted",
                    path.display()
                ),
            );
        }

        // Layer 2: the matched category must be deletable. The catalog row is
        // authoritative when present; the in-memory snapshot covers categories
        // the external config has not (yet) been mirrored into the store.
        let Some(snapshot) = self.categories.classify(&path) else {
            return reject(
                SafetyLayer::Category,
                format!("{} matches no category", path.display()),
            );
        };
        let category = self
            .catalog
            .category(&snapshot.name)
            .ok()
            .flatten()
            .unwrap_or_else(|| snapshot.clone());
        if !category.deletable {
            return reject(
                SafetyLayer::Category,
                format!("category {:?} is not deletable", category.name),
            );
        }

        // Layer 3: dry-run is an explicit opt-out, never a default.
        if request.dry_run {
            return reject(
                SafetyLayer::DryRun,
                "preview only: dry-run mode is active (explicitly disable it to delete)"
                    .to_string(),
            );
        }

        // Layer 4: every deletable category must document restoration.
        if !has_restoration_hint(&category) {
            return reject(
                SafetyLayer::Restoration,
                format!(
                    "category {:?} documents no restoration method",
                    category.name
                ),
            );
        }

        // Layer 5: an explicit confirmation token, not merely the absence of
        // an objection.
        if request.confirmation.is_none_or(|token| token.trim().is_empty()) {
            return reject(
                SafetyLayer::Confirmation,
                "no explicit confirmation supplied".to_string(),
            );
        }

        ValidationOutcome::Approved(ApprovedCandidate {
            path,
            category: category.name.clone(),
            restoration_hint: category.restoration_hint.clone(),
        })
    }
}

fn has_restoration_hint(category: &Category) -> bool {
    let hint = category.restoration_hint.trim();
    !hint.is_empty() && hint != DO_NOT_DELETE
}

fn reject(layer: SafetyLayer, reason: String) -> ValidationOutcome {
    ValidationOutcome::Rejected(Rejection { layer, reason })
}
