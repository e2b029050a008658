//! One-time knowledge base initialization shared by every handler.

use std::sync::Arc;

use kbreason_prover::Prover;
use tokio::sync::OnceCell;

use crate::{KbError, Ontology, OntologyConfig};

pub struct KbManager {
    config: OntologyConfig,
    prover: Arc<dyn Prover>,
    kb: OnceCell<Arc<Ontology>>,
}

impl KbManager {
    pub fn new(config: OntologyConfig, prover: Arc<dyn Prover>) -> Self {
        Self {
            config,
            prover,
            kb: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &OntologyConfig {
        &self.config
    }

    /// The loaded knowledge base, loading it on first use.
    ///
    /// Concurrent callers wait on the same load. A failed load leaves the
    /// manager empty, so the next call tries again.
    pub async fn kb(&self) -> Result<Arc<Ontology>, KbError> {
        let kb = self
            .kb
            .get_or_try_init(|| async {
                let config = self.config.clone();
                let prover = Arc::clone(&self.prover);
                tracing::info!(kb = %config.name, sources = config.sources.len(), "loading knowledge base");
                let ontology = tokio::task::spawn_blocking(move || Ontology::load(config, prover))
                    .await
                    .map_err(|err| KbError::Initialization(format!("load task failed: {err}")))??;
                Ok::<_, KbError>(Arc::new(ontology))
            })
            .await?;
        Ok(Arc::clone(kb))
    }

    /// `None` until the first successful load.
    pub fn loaded(&self) -> Option<Arc<Ontology>> {
        self.kb.get().cloned()
    }
}
