//! 记忆句柄
//!
//! 三个存储（长期 / 短期 / 实体）背后的统一接口：write(record) / query(kind, text, limit)。
//! 句柄由 Manager 显式传递进每次智能体调用，生命周期随 Run，不做隐藏单例。
//! 写入按存储串行（每个存储各自持锁）；查询失败降级为空结果，仅长期库打开失败致命。

use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::core::MemoryError;
use crate::llm::EmbeddingProvider;
use crate::memory::{LongTermStore, MemoryKind, MemoryRecord, VectorStore};

/// 短期记忆默认保留窗口
const DEFAULT_SHORT_TERM_ENTRIES: usize = 200;
/// 实体记忆默认保留窗口
const DEFAULT_ENTITY_ENTRIES: usize = 1000;

/// 记忆句柄：Run 启动时打开，Run 结束时 flush 并随 drop 关闭
pub struct MemoryHandle {
    long_term: LongTermStore,
    short_term: Mutex<VectorStore>,
    entity: Mutex<VectorStore>,
}

impl MemoryHandle {
    pub fn new(long_term: LongTermStore, short_term: VectorStore, entity: VectorStore) -> Self {
        Self {
            long_term,
            short_term: Mutex::new(short_term),
            entity: Mutex::new(entity),
        }
    }

    /// 按约定布局打开记忆目录：long_term.db + short_term.json + entity.json
    pub fn open(
        memory_dir: impl AsRef<Path>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Result<Self, MemoryError> {
        let dir = memory_dir.as_ref();
        let long_term = LongTermStore::open(dir.join("long_term.db"))?;
        let short_term = VectorStore::new(MemoryKind::ShortTerm, embedder.clone(), DEFAULT_SHORT_TERM_ENTRIES)
            .with_path(dir.join("short_term.json"))?;
        let entity = VectorStore::new(MemoryKind::Entity, embedder, DEFAULT_ENTITY_ENTRIES)
            .with_path(dir.join("entity.json"))?;
        Ok(Self::new(long_term, short_term, entity))
    }

    /// 写入一条记录，按 kind 路由到对应存储
    pub fn write(&self, record: MemoryRecord) -> Result<(), MemoryError> {
        match record.kind {
            MemoryKind::LongTerm => self.long_term.insert(&record),
            MemoryKind::ShortTerm => {
                self.short_term.lock().unwrap().add(record);
                Ok(())
            }
            MemoryKind::Entity => {
                self.entity.lock().unwrap().add(record);
                Ok(())
            }
        }
    }

    /// 查询某一存储；瞬时失败降级为空结果并记录警告，Run 继续
    pub fn query(&self, kind: MemoryKind, query: &str, limit: usize) -> Vec<MemoryRecord> {
        match kind {
            MemoryKind::LongTerm => match self.long_term.query(query, limit) {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!("long-term memory query degraded: {}", e);
                    Vec::new()
                }
            },
            MemoryKind::ShortTerm => self.short_term.lock().unwrap().search(query, limit),
            MemoryKind::Entity => self.entity.lock().unwrap().search(query, limit),
        }
    }

    /// 某实体名下的全部事实（实体存储 topic 精确匹配）
    pub fn entity_facts(&self, entity_name: &str) -> Vec<MemoryRecord> {
        self.entity.lock().unwrap().records_for_topic(entity_name)
    }

    /// 将向量存储落盘（长期库每次写入已即时持久化）
    pub fn flush(&self) -> Result<(), MemoryError> {
        self.short_term.lock().unwrap().save()?;
        self.entity.lock().unwrap().save()?;
        Ok(())
    }

    /// 各存储当前条数：(long_term, short_term, entity)
    pub fn stats(&self) -> (usize, usize, usize) {
        let long_term = self.long_term.len().unwrap_or(0);
        let short_term = self.short_term.lock().unwrap().len();
        let entity = self.entity.lock().unwrap().len();
        (long_term, short_term, entity)
    }
}
