//! Resource offers and resource arithmetic.

use std::collections::BTreeMap;

use armada_id::{AgentId, OfferId};
use serde::{Deserialize, Serialize};

/// Smallest cpu share a further match round could still use.
const MIN_USEFUL_CPUS: f64 = 0.01;

/// Smallest memory amount (MiB) a further match round could still use.
const MIN_USEFUL_MEM: f64 = 1.0;

/// Scalar resources of an offer or a task.
///
/// Memory and disk are in MiB.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    pub cpus: f64,
    pub mem: f64,
    pub disk: f64,
}

impl Resources {
    /// No resources at all.
    pub const ZERO: Resources = Resources {
        cpus: 0.0,
        mem: 0.0,
        disk: 0.0,
    };

    /// Creates a resource bundle.
    #[must_use]
    pub const fn new(cpus: f64, mem: f64, disk: f64) -> Self {
        Self { cpus, mem, disk }
    }

    /// True if every dimension covers `need`.
    #[must_use]
    pub fn can_satisfy(&self, need: &Resources) -> bool {
        self.cpus >= need.cpus && self.mem >= need.mem && self.disk >= need.disk
    }

    /// Removes `used` from this bundle, clamping at zero.
    pub fn subtract(&mut self, used: &Resources) {
        self.cpus = (self.cpus - used.cpus).max(0.0);
        self.mem = (self.mem - used.mem).max(0.0);
        self.disk = (self.disk - used.disk).max(0.0);
    }

    /// True once no realistic task could still fit.
    #[must_use]
    pub fn is_depleted(&self) -> bool {
        self.cpus < MIN_USEFUL_CPUS || self.mem < MIN_USEFUL_MEM
    }
}

/// One resource offer from the master, valid for a brief window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    /// Offer identifier, unique per offer round.
    pub id: OfferId,

    /// The worker node the resources belong to.
    pub agent_id: AgentId,

    /// Hostname of the worker node.
    pub hostname: String,

    /// Free resources advertised.
    pub resources: Resources,

    /// Node attributes, used by placement constraints.
    pub attributes: BTreeMap<String, String>,
}

impl Offer {
    /// Creates an offer without attributes.
    pub fn new(
        id: OfferId,
        agent_id: AgentId,
        hostname: impl Into<String>,
        resources: Resources,
    ) -> Self {
        Self {
            id,
            agent_id,
            hostname: hostname.into(),
            resources,
            attributes: BTreeMap::new(),
        }
    }

    /// Adds a node attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// The same offer with its free resources replaced; used to carry the
    /// shrinking remainder through one match round.
    #[must_use]
    pub fn with_resources(&self, resources: Resources) -> Self {
        let mut offer = self.clone();
        offer.resources = resources;
        offer
    }

    /// Value of a constraint field on this offer: the hostname or a node
    /// attribute.
    #[must_use]
    pub fn field_value(&self, field: &str) -> Option<&str> {
        if field == crate::app::Constraint::HOSTNAME {
            Some(&self.hostname)
        } else {
            self.attributes.get(field).map(String::as_str)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_satisfy() {
        let free = Resources::new(4.0, 1024.0, 100.0);
        assert!(free.can_satisfy(&Resources::new(1.0, 128.0, 0.0)));
        assert!(free.can_satisfy(&free));
        assert!(!free.can_satisfy(&Resources::new(4.1, 128.0, 0.0)));
        assert!(!free.can_satisfy(&Resources::new(1.0, 2048.0, 0.0)));
    }

    #[test]
    fn test_subtract_clamps_at_zero() {
        let mut free = Resources::new(1.0, 256.0, 0.0);
        free.subtract(&Resources::new(2.0, 128.0, 10.0));
        assert_eq!(free.cpus, 0.0);
        assert_eq!(free.mem, 128.0);
        assert_eq!(free.disk, 0.0);
    }

    #[test]
    fn test_depletion() {
        assert!(!Resources::new(1.0, 128.0, 0.0).is_depleted());
        assert!(Resources::new(0.001, 128.0, 0.0).is_depleted());
        assert!(Resources::new(1.0, 0.5, 0.0).is_depleted());
        assert!(Resources::ZERO.is_depleted());
    }

    #[test]
    fn test_field_value() {
        let offer = Offer::new(
            OfferId::new("o-1"),
            AgentId::new("agent-1"),
            "node-a.dc1",
            Resources::new(4.0, 1024.0, 0.0),
        )
        .with_attribute("rack", "r7");

        assert_eq!(offer.field_value("hostname"), Some("node-a.dc1"));
        assert_eq!(offer.field_value("rack"), Some("r7"));
        assert_eq!(offer.field_value("zone"), None);
    }
}
