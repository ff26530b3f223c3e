//! Name-to-factory table of strategies.

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::greedy::{GREEDY, GreedyStrategy};
use crate::negotiator::AgentHandle;
use crate::random::{RANDOM, RandomStrategy};
use crate::satisficer::{SATISFICER, SatisficerStrategy};
use crate::strategy::OneShotStrategy;

/// Builds a strategy from a configuration.
pub type StrategyFactory =
    Box<dyn Fn(&AgentConfig) -> Result<Box<dyn OneShotStrategy>, AgentError> + Send + Sync>;

/// Strategies available by name. There is no global instance; callers own
/// their registry.
#[derive(Default)]
pub struct StrategyRegistry {
    factories: BTreeMap<String, StrategyFactory>,
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.names())
            .finish()
    }
}

impl StrategyRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the satisficer, greedy, and random strategies.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut factories: BTreeMap<String, StrategyFactory> = BTreeMap::new();
        factories.insert(SATISFICER.to_owned(), Box::new(satisficer));
        factories.insert(GREEDY.to_owned(), Box::new(greedy));
        factories.insert(RANDOM.to_owned(), Box::new(random));
        Self { factories }
    }

    /// Adds a strategy under `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> Result<(), AgentError>
    where
        F: Fn(&AgentConfig) -> Result<Box<dyn OneShotStrategy>, AgentError> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(AgentError::DuplicateStrategy(name));
        }
        debug!(strategy = %name, "registered strategy");
        self.factories.insert(name, Box::new(factory));
        Ok(())
    }

    /// Builds the strategy registered as `name` after validating `config`.
    pub fn create(&self, name: &str, config: &AgentConfig) -> Result<Box<dyn OneShotStrategy>, AgentError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| AgentError::UnknownStrategy(name.to_owned()))?;
        config.validate()?;
        factory(config)
    }

    /// Builds the strategy and wraps it in a handle.
    pub fn create_handle(&self, name: &str, config: &AgentConfig) -> Result<AgentHandle, AgentError> {
        self.create(name, config).map(AgentHandle::new)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

fn satisficer(config: &AgentConfig) -> Result<Box<dyn OneShotStrategy>, AgentError> {
    Ok(Box::new(SatisficerStrategy::new(config)?))
}

fn greedy(config: &AgentConfig) -> Result<Box<dyn OneShotStrategy>, AgentError> {
    Ok(Box::new(GreedyStrategy::new(config)?))
}

fn random(config: &AgentConfig) -> Result<Box<dyn OneShotStrategy>, AgentError> {
    Ok(Box::new(RandomStrategy::new(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RandomConfig;
    use test_case::test_case;

    #[test_case(SATISFICER)]
    #[test_case(GREEDY)]
    #[test_case(RANDOM)]
    fn builtins_create_by_name(name: &str) {
        let registry = StrategyRegistry::with_builtins();
        let strategy = registry.create(name, &AgentConfig::default()).unwrap();
        assert_eq!(strategy.name(), name);
    }

    #[test]
    fn names_are_sorted() {
        let registry = StrategyRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["greedy", "random", "satisficer"]);
        assert!(registry.contains("greedy"));
        assert!(StrategyRegistry::new().names().is_empty());
    }

    #[test]
    fn unknown_name_is_an_error() {
        let registry = StrategyRegistry::with_builtins();
        assert!(matches!(
            registry.create("tit-for-tat", &AgentConfig::default()),
            Err(AgentError::UnknownStrategy(name)) if name == "tit-for-tat"
        ));
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut registry = StrategyRegistry::with_builtins();
        let result = registry.register(RANDOM, |config| Ok(Box::new(RandomStrategy::new(config)?)));
        assert!(matches!(result, Err(AgentError::DuplicateStrategy(_))));

        registry
            .register("cautious", |config| Ok(Box::new(SatisficerStrategy::new(config)?)))
            .unwrap();
        assert_eq!(registry.names().len(), 4);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let registry = StrategyRegistry::with_builtins();
        let mut config = AgentConfig::default();
        config.random = RandomConfig {
            accept_probability: 2.0,
        };
        assert!(matches!(
            registry.create_handle(RANDOM, &config),
            Err(AgentError::Config(_))
        ));
    }
}
