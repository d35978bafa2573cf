use serde::{Deserialize, Serialize};

/// Fixed embedding width. Chosen to match a typical small local embedding
/// model's output shape even though `embed()` itself is a deterministic
/// feature-hashing function rather than a learned model (see crate docs).
pub const EMBEDDING_DIM: usize = 384;

/// A stored vector, tied to one row in some other table (`source_type` +
/// `source_id`) via a loose foreign key — the embeddings crate doesn't know
/// about `remy-knowledge`'s schema, only about opaque source identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub id: i64,
    pub user_id: String,
    pub source_type: String,
    pub source_id: i64,
    /// The text the vector was computed from, kept alongside it so a caller
    /// that only has a [`Match`] (e.g. the memory injector rendering a
    /// retrieved fact) never needs a second round-trip to the owning table.
    pub content_text: String,
    pub model_name: String,
    pub created_at: String,
}

/// A single ANN search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub id: i64,
    pub source_id: i64,
    pub source_type: String,
    pub content_text: String,
    /// Cosine distance: 0.0 = identical, 2.0 = opposite.
    pub distance: f32,
}
