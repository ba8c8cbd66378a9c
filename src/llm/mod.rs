//! 完成能力与嵌入：CompletionClient 抽象及其后端实现（OpenAI 兼容 / Mock / Scripted）

pub mod embedding;
pub mod mock;
pub mod openai;
pub mod traits;

pub use embedding::{create_embedder_from_config, EmbeddingProvider, OpenAiEmbedder};
pub use mock::{MockCompletionClient, ScriptedCompletionClient};
pub use openai::OpenAiClient;
pub use traits::{CompletionClient, Message, Role};
