use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A reconstructed particle belonging to a jet.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Particle {
    pub pt: f64,
    pub eta: f64,
    pub phi: f64, // periodic, 2*pi
}

impl Particle {
    pub fn new(pt: f64, eta: f64, phi: f64) -> Self {
        Self { pt, eta, phi }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct JetCluster {
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
    #[serde(default)]
    pub constituents: Vec<Particle>,
}

impl JetCluster {
    pub fn new(pt: f64, eta: f64, phi: f64, constituents: Vec<Particle>) -> Self {
        Self {
            pt,
            eta,
            phi,
            constituents,
        }
    }
}

/// One event as delivered by the event file: jet collections keyed by id.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Event {
    pub id: u64,
    #[serde(default)]
    pub collections: HashMap<String, Vec<JetCluster>>,
}

impl Event {
    /// Only the first jet of a collection is ever imaged.
    pub fn leading_jet(&self, collection: &str) -> Option<&JetCluster> {
        self.collections.get(collection).and_then(|jets| jets.first())
    }
}
