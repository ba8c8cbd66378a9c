//! 结构化输出契约：声明式 Schema 树 + 通用校验器 + 注册表

pub mod domain;
pub mod registry;
pub mod types;

pub use domain::{candidate_list_schema, research_list_schema};
pub use registry::{extract_json_block, SchemaRegistry};
pub use types::{FieldType, Schema, SchemaField};
