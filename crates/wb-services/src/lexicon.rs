use std::sync::Arc;

use async_trait::async_trait;
use wb_core::{Envelope, StageError, StagePayload};
use wb_domain::{DomainError, KbEntry, KnowledgeBase, ResolvedEntity, Term};

use crate::contracts::LexiconResolver;

/// Resolver respaldado por una `KnowledgeBase` en memoria.
#[derive(Clone)]
pub struct KnowledgeBaseResolver {
    kb: Arc<dyn KnowledgeBase>,
}

impl KnowledgeBaseResolver {
    pub fn new(kb: Arc<dyn KnowledgeBase>) -> Self {
        Self { kb }
    }

    /// Varias entradas distintas -> AMBIGUOUS con los ids candidatos; nunca
    /// se elige una arbitrariamente.
    pub fn lookup(&self, term: &Term) -> Result<ResolvedEntity, DomainError> {
        let matches = self.kb.find(term.normalized());
        match matches.as_slice() {
            [] => Err(DomainError::NotFound(term.raw().trim().to_string())),
            [entry] => Ok(entry.to_entity(self.kb.version())),
            many => {
                let mut candidates: Vec<String> = many.iter().map(|e| e.id.clone()).collect();
                candidates.sort();
                Err(DomainError::Ambiguous { term: term.normalized().to_string(),
                                             candidates })
            }
        }
    }

    pub fn catalogue(&self) -> Vec<KbEntry> {
        self.kb.entries().into_iter().cloned().collect()
    }

    pub fn entry(&self, id: &str) -> Option<KbEntry> {
        self.kb.get(id).cloned()
    }

    pub fn version(&self) -> &str {
        self.kb.version()
    }
}

#[async_trait]
impl LexiconResolver for KnowledgeBaseResolver {
    fn name(&self) -> &str {
        "knowledge-base"
    }

    async fn kb_version(&self) -> Result<String, StageError> {
        Ok(self.kb.version().to_string())
    }

    async fn resolve(&self, term: &Term) -> Result<Envelope, StageError> {
        let entity = self.lookup(term)?;
        tracing::debug!(term = %term, entity = %entity.id, kb_version = %entity.kb_version, "term resolved");
        Ok(entity.to_envelope()?)
    }
}
