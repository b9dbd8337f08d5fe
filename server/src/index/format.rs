//! Binary layout of the vector artifact.
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │ HEADER (64 bytes, fixed)             │
//! │  magic: [u8; 8] = b"MAILIDX\0"       │
//! │  version: u32                        │
//! │  vector_count: u64                   │
//! │  dimension: u32                      │
//! │  fingerprint: [u8; 32]               │
//! │  (padding to 64 bytes)               │
//! ├──────────────────────────────────────┤
//! │ VECTORS (variable)                   │
//! │  bincode-serialized Vec<Vec<f32>>    │
//! └──────────────────────────────────────┘
//! ```
//!
//! The fingerprint is also recorded in the document store, which is how the
//! two halves of an index pair are tied together.

/// Magic bytes identifying a vector artifact.
pub const MAGIC: &[u8; 8] = b"MAILIDX\0";

/// Current artifact format version.
pub const VERSION: u32 = 1;

/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 64;

/// Serializable artifact header.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct IndexHeader {
    /// Magic bytes (must equal [`MAGIC`]).
    pub magic: [u8; 8],
    /// Format version (must equal [`VERSION`]).
    pub version: u32,
    /// Number of vectors in the artifact.
    pub vector_count: u64,
    /// Dimension shared by every vector.
    pub dimension: u32,
    /// SHA-256 over the embedding model id and every stored chunk.
    pub fingerprint: [u8; 32],
}

impl IndexHeader {
    /// Validate that the header is well-formed and matches the current format.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.magic != *MAGIC {
            return Err("Invalid magic bytes".into());
        }
        if self.version != VERSION {
            return Err(format!(
                "Incompatible version: expected {VERSION}, found {}",
                self.version
            ));
        }
        Ok(())
    }
}
