use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::analysts::{AnalystKey, LlmAnalyst};
use crate::domain::signal::AnalystSignal;
use crate::error::ProviderError;
use crate::llm::LlmRouter;
use crate::market::PriceSummary;

/// Everything a provider gets to evaluate one ticker.
#[derive(Debug, Clone)]
pub struct EvaluationInput {
    pub ticker: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub model_name: String,
    /// Price history summary, when the price source had data.
    pub market: Option<PriceSummary>,
}

#[async_trait::async_trait]
pub trait SignalProvider: Send + Sync {
    fn key(&self) -> AnalystKey;

    /// Upper bound on one `evaluate` call; exceeding it counts as a failure.
    fn timeout(&self) -> Duration;

    async fn evaluate(&self, input: &EvaluationInput) -> Result<AnalystSignal, ProviderError>;
}

#[derive(Clone, Default)]
pub struct AnalystRegistry {
    providers: BTreeMap<AnalystKey, Arc<dyn SignalProvider>>,
}

impl AnalystRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an LLM-backed provider for every analyst in the catalog.
    pub fn with_llm_analysts(llm: Arc<LlmRouter>, timeout: Duration) -> Self {
        let mut registry = Self::new();
        for key in AnalystKey::ALL {
            registry.register(Arc::new(LlmAnalyst::new(key, llm.clone(), timeout)));
        }
        registry
    }

    /// Returns the provider previously registered under the same key, if any.
    pub fn register(&mut self, provider: Arc<dyn SignalProvider>) -> Option<Arc<dyn SignalProvider>> {
        self.providers.insert(provider.key(), provider)
    }

    pub fn get(&self, key: AnalystKey) -> Option<Arc<dyn SignalProvider>> {
        self.providers.get(&key).cloned()
    }

    pub fn keys(&self) -> impl Iterator<Item = AnalystKey> + '_ {
        self.providers.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for AnalystRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalystRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::Signal;

    struct Fixed(AnalystKey);

    #[async_trait::async_trait]
    impl SignalProvider for Fixed {
        fn key(&self) -> AnalystKey {
            self.0
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(1)
        }

        async fn evaluate(&self, input: &EvaluationInput) -> Result<AnalystSignal, ProviderError> {
            Ok(AnalystSignal::new(self.0, &input.ticker, Signal::Neutral, 10.0, "fixed"))
        }
    }

    #[test]
    fn register_replaces_by_key() {
        let mut registry = AnalystRegistry::new();
        assert!(registry.register(Arc::new(Fixed(AnalystKey::Wsb))).is_none());
        assert!(registry.register(Arc::new(Fixed(AnalystKey::Wsb))).is_some());
        registry.register(Arc::new(Fixed(AnalystKey::BenGraham)));

        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.keys().collect::<Vec<_>>(),
            vec![AnalystKey::BenGraham, AnalystKey::Wsb]
        );
        assert!(registry.get(AnalystKey::NancyPelosi).is_none());
    }

    #[test]
    fn llm_registry_covers_the_catalog() {
        let registry = AnalystRegistry::with_llm_analysts(
            Arc::new(LlmRouter::default()),
            Duration::from_secs(5),
        );
        assert_eq!(registry.len(), AnalystKey::ALL.len());
        for key in AnalystKey::ALL {
            assert_eq!(registry.get(key).map(|p| p.key()), Some(key));
        }
    }
}
