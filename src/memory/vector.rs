//! 相似度索引存储：短期记忆与实体记忆共用实现
//!
//! 有嵌入提供方时按余弦距离检索；无嵌入时退化为小写词重叠评分。
//! 保留窗口有界（最近 max_entries 条），可持久化为 JSON 文件（配置的记忆目录下）。

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::MemoryError;
use crate::llm::EmbeddingProvider;
use crate::memory::{MemoryKind, MemoryRecord};

/// 将文本切分为小写词集合，用于无嵌入时的简单相似度（词重叠数）
fn tokenize_lower(s: &str) -> HashSet<String> {
    s.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| w.len() > 1)
        .collect()
}

/// 余弦相似度
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// 相似度存储：短期 / 实体各持有一个实例
pub struct VectorStore {
    kind: MemoryKind,
    /// (记录, 小写词集合)
    entries: Vec<(MemoryRecord, HashSet<String>)>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    max_entries: usize,
    path: Option<PathBuf>,
}

impl VectorStore {
    pub fn new(kind: MemoryKind, embedder: Option<Arc<dyn EmbeddingProvider>>, max_entries: usize) -> Self {
        Self {
            kind,
            entries: Vec::new(),
            embedder,
            max_entries,
            path: None,
        }
    }

    /// 绑定磁盘文件；文件已存在时加载其中的历史记录
    pub fn with_path(mut self, path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            let data = std::fs::read_to_string(&path).map_err(|e| MemoryError::Io(e.to_string()))?;
            let records: Vec<MemoryRecord> =
                serde_json::from_str(&data).map_err(|e| MemoryError::Io(e.to_string()))?;
            for record in records {
                let tokens = Self::tokens_for(&record);
                self.entries.push((record, tokens));
            }
            self.prune();
        }
        self.path = Some(path);
        Ok(self)
    }

    pub fn kind(&self) -> MemoryKind {
        self.kind
    }

    fn tokens_for(record: &MemoryRecord) -> HashSet<String> {
        let mut text = record.content.clone();
        if let Some(topic) = &record.topic {
            text.push(' ');
            text.push_str(topic);
        }
        tokenize_lower(&text)
    }

    /// 写入一条记录：有嵌入提供方且记录无向量时先编码；嵌入失败不阻塞写入
    pub fn add(&mut self, mut record: MemoryRecord) {
        if record.content.trim().is_empty() {
            return;
        }
        if record.embedding.is_none() {
            if let Some(embedder) = &self.embedder {
                match embedder.embed_sync(&record.content) {
                    Ok(v) if !v.is_empty() => record.embedding = Some(v),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(kind = self.kind.as_str(), "embedding failed: {}", e),
                }
            }
        }
        let tokens = Self::tokens_for(&record);
        self.entries.push((record, tokens));
        self.prune();
    }

    /// 超出保留窗口时丢弃最旧的记录
    fn prune(&mut self) {
        if self.entries.len() > self.max_entries {
            let n = self.entries.len();
            self.entries.drain(0..n - self.max_entries);
        }
    }

    /// 检索最相关的 k 条：query 向量与记录向量均存在时用余弦，否则词重叠
    pub fn search(&self, query: &str, k: usize) -> Vec<MemoryRecord> {
        let query_tokens = tokenize_lower(query);
        let query_embedding = self.embedder.as_ref().and_then(|e| match e.embed_sync(query) {
            Ok(v) if !v.is_empty() => Some(v),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(kind = self.kind.as_str(), "query embedding failed: {}", e);
                None
            }
        });

        let mut scored: Vec<(f32, &MemoryRecord)> = self
            .entries
            .iter()
            .map(|(record, tokens)| {
                let score = match (&query_embedding, &record.embedding) {
                    (Some(q), Some(r)) => cosine_similarity(q, r),
                    _ => query_tokens.intersection(tokens).count() as f32,
                };
                (score, record)
            })
            .filter(|(score, _)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(k).map(|(_, r)| r.clone()).collect()
    }

    /// 检索某实体名下的全部记录（topic 精确匹配，新的在前）
    pub fn records_for_topic(&self, topic: &str) -> Vec<MemoryRecord> {
        let mut records: Vec<MemoryRecord> = self
            .entries
            .iter()
            .filter(|(r, _)| r.topic.as_deref() == Some(topic))
            .map(|(r, _)| r.clone())
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    /// 持久化当前记录到绑定文件；未绑定文件时为 no-op
    pub fn save(&self) -> Result<(), MemoryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MemoryError::Io(e.to_string()))?;
        }
        let records: Vec<&MemoryRecord> = self.entries.iter().map(|(r, _)| r).collect();
        let data = serde_json::to_string_pretty(&records).map_err(|e| MemoryError::Io(e.to_string()))?;
        std::fs::write(path, data).map_err(|e| MemoryError::Io(e.to_string()))?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
