//! 长期记忆：SQLite 行存储，按键检索，跨 Run 持久
//!
//! 打开失败在 Run 启动时致命（StoreUnavailable）；查询支持精确与模糊（LIKE）键匹配，
//! 用于避免跨 Run 重复推荐：上一次 Run 的决策行在下一次 Run 前被检索并注入上下文。

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};

use crate::core::MemoryError;
use crate::memory::{MemoryKind, MemoryRecord};

/// 长期存储：Mutex<Connection> 保证同一存储内写入串行
pub struct LongTermStore {
    conn: Mutex<Connection>,
}

impl LongTermStore {
    /// 打开或创建数据库文件；父目录不存在时自动创建
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MemoryError::StoreUnavailable(format!("{}: {}", parent.display(), e)))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| MemoryError::StoreUnavailable(format!("{}: {}", path.display(), e)))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS long_term_memories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT NOT NULL,
                payload TEXT NOT NULL,
                task_id TEXT NOT NULL,
                agent_id TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_long_term_key ON long_term_memories(key);",
        )
        .map_err(|e| MemoryError::StoreUnavailable(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// 内存数据库（测试用）
    pub fn open_in_memory() -> Result<Self, MemoryError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| MemoryError::StoreUnavailable(e.to_string()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS long_term_memories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT NOT NULL,
                payload TEXT NOT NULL,
                task_id TEXT NOT NULL,
                agent_id TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );",
        )
        .map_err(|e| MemoryError::StoreUnavailable(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// 写入一行；键取 record.topic，未设置时退回 task_id
    pub fn insert(&self, record: &MemoryRecord) -> Result<(), MemoryError> {
        let key = record.topic.as_deref().unwrap_or(&record.task_id);
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO long_term_memories (key, payload, task_id, agent_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![key, record.content, record.task_id, record.agent_id, record.created_at],
        )
        .map_err(|e| MemoryError::Io(e.to_string()))?;
        Ok(())
    }

    /// 按键检索：精确匹配优先级与模糊（LIKE 子串）匹配合并，新行在前
    pub fn query(&self, key: &str, limit: usize) -> Result<Vec<MemoryRecord>, MemoryError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT key, payload, task_id, agent_id, created_at
                 FROM long_term_memories
                 WHERE key = ?1 OR key LIKE '%' || ?1 || '%'
                 ORDER BY created_at DESC
                 LIMIT ?2",
            )
            .map_err(|e| MemoryError::Io(e.to_string()))?;

        let rows = stmt
            .query_map(params![key, limit as i64], |row| {
                Ok(MemoryRecord {
                    kind: MemoryKind::LongTerm,
                    topic: Some(row.get::<_, String>(0)?),
                    content: row.get(1)?,
                    embedding: None,
                    created_at: row.get(4)?,
                    task_id: row.get(2)?,
                    agent_id: row.get(3)?,
                })
            })
            .map_err(|e| MemoryError::Io(e.to_string()))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(|e| MemoryError::Io(e.to_string()))?);
        }
        Ok(records)
    }

    /// 行数（测试与统计用）
    pub fn len(&self) -> Result<usize, MemoryError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM long_term_memories", [], |row| row.get(0))
            .map_err(|e| MemoryError::Io(e.to_string()))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, MemoryError> {
        Ok(self.len()? == 0)
    }
}
