//! Vector index (C2): one embedding per live `(id, version)`, plus the
//! background reconciler that keeps it aligned with the storage engine.

pub mod embedder;
pub mod engine;
pub mod reconciler;

pub use embedder::HashingEmbedder;
pub use engine::{FlatVectorIndex, VectorHit, VectorIndex};
pub use reconciler::{spawn_reconciler, EmbeddingFn};
