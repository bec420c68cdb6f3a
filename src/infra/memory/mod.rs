//! In-process collaborators used when no external service is configured.

mod followers;
mod posts;
mod search;

pub use followers::MemoryFollowerDirectory;
pub use posts::MemoryPostStore;
pub use search::MemorySearchIndex;
