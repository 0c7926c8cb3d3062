//! Model backends, loading, dispatch and output normalization

pub mod backend;
pub mod inference;
pub mod loader;
pub mod neural_net;
pub mod normalizer;
pub mod transform;
pub mod tree_ensemble;

pub use backend::{ModelBackend, ModelKind};
pub use inference::{predict, ModelCache};
pub use loader::{ModelHandle, ModelLoader, VerifyReport};
pub use normalizer::normalize;
pub use transform::Transform;
