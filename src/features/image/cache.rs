//! 图片字节缓存：窄接口 [`CacheStore`] + 基于 moka 的默认实现。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use moka::future::Cache;
use moka::policy::EvictionPolicy;

use crate::config::CacheConfig;
use crate::error::AppError;

/// 缓存存储接口，便于替换淘汰策略而不改动 handler
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<Bytes>;

    /// 写入一条记录；容量或内部错误时返回 `CacheWriteFailure`
    async fn try_insert(&self, key: String, bytes: Bytes) -> Result<(), AppError>;

    /// 清空全部记录
    async fn clear(&self);
}

/// 写入缓存：失败时清空整个缓存并重试一次，重试仍失败则把错误交给调用方。
pub async fn store_with_flush_retry(
    store: &dyn CacheStore,
    key: String,
    bytes: Bytes,
) -> Result<(), AppError> {
    match store.try_insert(key.clone(), bytes.clone()).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::warn!("缓存写入失败，清空缓存后重试: {}", e);
            store.clear().await;
            store.try_insert(key, bytes).await
        }
    }
}

/// moka 实现：条目数上限（LRU 淘汰）+ TTL，过期在读取时惰性判定并由后台维护任务清理
#[derive(Clone)]
pub struct MokaImageStore {
    cache: Cache<String, Bytes>,
    max_entry_bytes: usize,
}

impl MokaImageStore {
    pub fn new(max_entries: u64, ttl: Duration, max_entry_bytes: usize) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            // 默认的 TinyLFU 在满载时会拒绝新键，这里必须淘汰最久未用的旧条目
            .eviction_policy(EvictionPolicy::lru())
            .time_to_live(ttl)
            .build();
        Self {
            cache,
            max_entry_bytes,
        }
    }

    pub fn from_config(cfg: &CacheConfig) -> Self {
        Self::new(
            cfg.max_entries,
            Duration::from_secs(cfg.ttl_secs),
            cfg.max_entry_bytes,
        )
    }

    /// 当前条目数（近似值）
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl CacheStore for MokaImageStore {
    async fn get(&self, key: &str) -> Option<Bytes> {
        self.cache.get(key).await
    }

    async fn try_insert(&self, key: String, bytes: Bytes) -> Result<(), AppError> {
        if bytes.len() > self.max_entry_bytes {
            return Err(AppError::CacheWriteFailure(format!(
                "entry {} is {} bytes, limit is {}",
                key,
                bytes.len(),
                self.max_entry_bytes
            )));
        }
        self.cache.insert(key, bytes).await;
        Ok(())
    }

    async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }
}

/// 关闭缓存时使用：永远未命中，写入直接成功
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledStore;

#[async_trait]
impl CacheStore for DisabledStore {
    async fn get(&self, _key: &str) -> Option<Bytes> {
        None
    }

    async fn try_insert(&self, _key: String, _bytes: Bytes) -> Result<(), AppError> {
        Ok(())
    }

    async fn clear(&self) {}
}

/// 按配置构建缓存
pub fn build_cache_store(cfg: &CacheConfig) -> Arc<dyn CacheStore> {
    if cfg.enabled {
        Arc::new(MokaImageStore::from_config(cfg))
    } else {
        tracing::info!("图片缓存已关闭");
        Arc::new(DisabledStore)
    }
}
