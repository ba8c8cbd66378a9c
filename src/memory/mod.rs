//! 记忆层：长期（SQLite 行存储）、短期与实体（相似度索引）、统一句柄

pub mod handle;
pub mod long_term;
pub mod record;
pub mod vector;

pub use handle::MemoryHandle;
pub use long_term::LongTermStore;
pub use record::{MemoryKind, MemoryRecord};
pub use vector::VectorStore;
