// SPDX-License-Identifier: MIT

//! Shared execution bundle for a flow and every flow nested in it

use std::fmt;
use std::sync::Arc;

use super::contract::{ContractValidator, SchemaValidator};
use super::credentials::CredentialResolver;
use crate::config::RuntimeConfig;
use crate::events::EventBus;
use crate::pack::StatePack;

/// Store, bus, collaborators and limits handed to every node
#[derive(Clone)]
pub struct FlowRuntime {
    pub pack: StatePack,
    pub bus: EventBus,
    pub validator: Arc<dyn ContractValidator>,
    pub credentials: Option<Arc<dyn CredentialResolver>>,
    pub max_steps: usize,
    pub strict_contracts: bool,
}

impl FlowRuntime {
    /// Runtime over an existing pack and bus with default limits
    pub fn new(pack: StatePack, bus: EventBus) -> Self {
        let defaults = RuntimeConfig::default();
        Self {
            pack,
            bus,
            validator: Arc::new(SchemaValidator),
            credentials: None,
            max_steps: defaults.max_steps,
            strict_contracts: defaults.strict_contracts,
        }
    }

    /// Fresh pack wired to a fresh bus, sized by the config
    pub fn from_config(config: &RuntimeConfig) -> Self {
        let bus = EventBus::with_history(config.event_history);
        let pack = StatePack::with_bus(bus.clone());
        Self {
            max_steps: config.max_steps,
            strict_contracts: config.strict_contracts,
            ..Self::new(pack, bus)
        }
    }

    pub fn with_credentials(mut self, resolver: Arc<dyn CredentialResolver>) -> Self {
        self.credentials = Some(resolver);
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn ContractValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }
}

impl Default for FlowRuntime {
    fn default() -> Self {
        Self::from_config(&RuntimeConfig::default())
    }
}

impl fmt::Debug for FlowRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowRuntime")
            .field("pack", &self.pack)
            .field("bus", &self.bus)
            .field("credentials", &self.credentials.is_some())
            .field("max_steps", &self.max_steps)
            .field("strict_contracts", &self.strict_contracts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::{AccessPattern, Namespace, Writer};
    use serde_json::json;

    #[test]
    fn test_from_config_wires_pack_to_bus() {
        let config = RuntimeConfig {
            event_history: 8,
            max_steps: 12,
            strict_contracts: true,
        };
        let runtime = FlowRuntime::from_config(&config);
        assert_eq!(runtime.max_steps, 12);
        assert!(runtime.strict_contracts);
        assert_eq!(runtime.bus.history_capacity(), 8);

        let ns = Namespace::new("demo").unwrap();
        runtime
            .pack
            .write("x", json!(1), &ns, &Writer::external())
            .unwrap();
        assert_eq!(runtime.bus.history(None).len(), 1);
        assert_eq!(
            runtime.pack.read("x", &ns, &AccessPattern::all()).unwrap(),
            Some(json!(1))
        );
    }

    #[test]
    fn test_clones_share_state() {
        let runtime = FlowRuntime::default();
        let other = runtime.clone();
        runtime
            .pack
            .write("x", json!(1), &Namespace::root(), &Writer::external())
            .unwrap();
        assert_eq!(other.pack.latest_sequence(), 1);
    }
}
