//! Deletion safety: the protected-path registry, the five-layer validation
//! gate, the recoverable trash, and the audited cleanup executor.

pub mod cleanup;
pub mod protected;
pub mod trash;
pub mod validator;

pub use cleanup::CleanupExecutor;
pub use protected::ProtectedPathRegistry;
pub use trash::{FilesystemTrash, TrashBin};
pub use validator::{
    ApprovedCandidate, Rejection, SafetyLayer, SafetyValidator, ValidationOutcome,
    ValidationRequest,
};
