//! Caché de outputs de etapa con single-flight.
//!
//! La clave combina etapa, versión de la base de conocimiento y fingerprint
//! del input canónico. Cada clave apunta a un `OnceCell`: el primer llamador
//! ejecuta el cómputo y los concurrentes esperan su resultado. Los errores no
//! se cachean; si el cómputo falla o se cancela, el siguiente en espera lo
//! intenta de nuevo.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::OnceCell;

use crate::constants::PIPELINE_VERSION;
use crate::hashing::hash_value;
use crate::model::Envelope;
use crate::stage::Stage;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub stage: Stage,
    pub kb_version: String,
    pub fingerprint: String,
}

impl CacheKey {
    /// `material` es el input canónico de la etapa (término normalizado,
    /// hashes de entidades + parámetros, hash del resultado + tamaño).
    pub fn new(stage: Stage, kb_version: impl Into<String>, material: &Value) -> Self {
        let kb_version = kb_version.into();
        let fingerprint = hash_value(&json!({
            "pipeline_version": PIPELINE_VERSION,
            "stage": stage.as_str(),
            "kb_version": kb_version,
            "input": material,
        }));
        Self { stage,
               kb_version,
               fingerprint }
    }
}

pub type CacheSlot = Arc<OnceCell<Envelope>>;

pub trait StageCache: Send + Sync {
    /// Devuelve (creándolo si no existe) el slot asociado a `key`.
    fn slot(&self, key: &CacheKey) -> CacheSlot;

    fn get(&self, key: &CacheKey) -> Option<Envelope>;

    /// Número de entradas con valor.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elimina todas las entradas de una versión de KB. Devuelve cuántas.
    fn invalidate_kb_version(&self, kb_version: &str) -> usize;
}

#[derive(Default)]
pub struct InMemoryStageCache {
    slots: DashMap<CacheKey, CacheSlot>,
}

impl InMemoryStageCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StageCache for InMemoryStageCache {
    fn slot(&self, key: &CacheKey) -> CacheSlot {
        self.slots.entry(key.clone()).or_default().clone()
    }

    fn get(&self, key: &CacheKey) -> Option<Envelope> {
        self.slots.get(key).and_then(|slot| slot.get().cloned())
    }

    fn len(&self) -> usize {
        self.slots.iter().filter(|e| e.value().initialized()).count()
    }

    fn invalidate_kb_version(&self, kb_version: &str) -> usize {
        let before = self.slots.len();
        self.slots.retain(|k, _| k.kb_version != kb_version);
        before - self.slots.len()
    }
}

/// Devuelve el output cacheado o ejecuta `compute` una sola vez por clave.
/// El booleano indica si el valor ya estaba disponible.
pub async fn get_or_compute<F, Fut, E>(cache: &dyn StageCache, key: &CacheKey, compute: F) -> Result<(Envelope, bool), E>
    where F: FnOnce() -> Fut,
          Fut: Future<Output = Result<Envelope, E>>
{
    let slot = cache.slot(key);
    if let Some(hit) = slot.get() {
        return Ok((hit.clone(), true));
    }
    let mut computed = false;
    let value = slot.get_or_try_init(|| {
                        computed = true;
                        compute()
                    })
                    .await?
                    .clone();
    Ok((value, !computed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PayloadKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn envelope(n: u64) -> Envelope {
        let body = json!({ "n": n });
        Envelope { kind: PayloadKind::CalculationResult,
                   schema_version: 1,
                   hash: hash_value(&body),
                   body }
    }

    #[test]
    fn key_depends_on_kb_version_and_input() {
        let a = CacheKey::new(Stage::Resolve, "kb1", &json!({"term": "sodium"}));
        let b = CacheKey::new(Stage::Resolve, "kb1", &json!({"term": "sodium"}));
        let c = CacheKey::new(Stage::Resolve, "kb2", &json!({"term": "sodium"}));
        let d = CacheKey::new(Stage::Calculate, "kb1", &json!({"term": "sodium"}));
        assert_eq!(a, b);
        assert_ne!(a.fingerprint, c.fingerprint);
        assert_ne!(a.fingerprint, d.fingerprint);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_computation() {
        let cache = Arc::new(InMemoryStageCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new(Stage::Calculate, "kb1", &json!({"x": 1}));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            let key = key.clone();
            tasks.push(tokio::spawn(async move {
                get_or_compute::<_, _, String>(cache.as_ref(), &key, || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    Ok(envelope(7))
                }).await
            }));
        }
        let mut fresh = 0;
        for t in tasks {
            let (env, cached) = t.await.unwrap().unwrap();
            assert_eq!(env.body["n"], 7);
            if !cached {
                fresh += 1;
            }
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(fresh, 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let cache = InMemoryStageCache::new();
        let key = CacheKey::new(Stage::Resolve, "kb1", &json!("x"));
        let first = get_or_compute(&cache, &key, || async { Err::<Envelope, _>("boom") }).await;
        assert_eq!(first, Err("boom"));
        assert!(cache.is_empty());
        let (env, cached) = get_or_compute::<_, _, &str>(&cache, &key, || async { Ok(envelope(1)) }).await
                                                                                                   .unwrap();
        assert!(!cached);
        assert_eq!(env.body["n"], 1);
    }

    #[tokio::test]
    async fn invalidation_drops_only_old_version() {
        let cache = InMemoryStageCache::new();
        let old = CacheKey::new(Stage::Resolve, "kb1", &json!("a"));
        let new = CacheKey::new(Stage::Resolve, "kb2", &json!("a"));
        get_or_compute::<_, _, ()>(&cache, &old, || async { Ok(envelope(1)) }).await.unwrap();
        get_or_compute::<_, _, ()>(&cache, &new, || async { Ok(envelope(2)) }).await.unwrap();
        assert_eq!(cache.invalidate_kb_version("kb1"), 1);
        assert!(cache.get(&old).is_none());
        assert!(cache.get(&new).is_some());
    }
}
