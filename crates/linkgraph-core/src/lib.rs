pub mod entity;
pub mod id;
pub mod partition;

// Re-export commonly used types
pub use entity::{Edge, Link};
pub use id::{EdgeId, LinkId};
pub use partition::{PartitionError, PartitionRange};
