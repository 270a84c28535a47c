//! # rnsim-model
//!
//! Loads a YAML scenario, checks it, and turns it into a [`Simulation`]: the
//! nodes with their protocol stacks, the channel, and the scheduler settings.
//!
//! ```rust
//! use rnsim_model::{build_simulation, load_model_from_str};
//!
//! let yaml = r#"
//! nodes:
//!   - name: gnb
//!     role: base_station
//!   - name: ue
//!     role: terminal
//!     serving: gnb
//!     position: [50.0, 0.0, 1.5]
//! "#;
//! let model = load_model_from_str(yaml)?;
//! let sim = build_simulation(&model, 42)?;
//! assert_eq!(sim.nodes.len(), 2);
//! # Ok::<(), rnsim_model::ModelError>(())
//! ```

mod build;
mod scenario;

pub use build::{build_simulation, Simulation};
pub use scenario::{
    ChannelSection, InnerChannel, NodeSection, Role, Scenario, SimulationSection,
};

use rnsim_common::{ConfigError, SimError};
use std::path::Path;
use thiserror::Error;

/// Errors from loading or building a scenario.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The YAML did not match the schema.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The scenario is structurally wrong.
    #[error("Invalid scenario: {0}")]
    Validation(String),

    /// A component rejected its configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Building a component failed.
    #[error("Simulation error: {0}")]
    Sim(#[from] SimError),
}

/// Load and validate a scenario file.
pub fn load_model(path: &Path) -> Result<Scenario, ModelError> {
    let text = std::fs::read_to_string(path)?;
    load_model_from_str(&text)
}

/// Parse and validate a scenario from YAML text.
pub fn load_model_from_str(yaml: &str) -> Result<Scenario, ModelError> {
    let scenario: Scenario = serde_yaml::from_str(yaml)?;
    validate(&scenario)?;
    Ok(scenario)
}

/// Structural checks that do not need any component to be built.
pub fn validate(scenario: &Scenario) -> Result<(), ModelError> {
    if scenario.nodes.is_empty() {
        return Err(ModelError::Validation("scenario has no nodes".to_string()));
    }
    if !(scenario.simulation.duration_ms.is_finite() && scenario.simulation.duration_ms > 0.0) {
        return Err(ModelError::Validation(format!(
            "duration_ms must be positive, got {}",
            scenario.simulation.duration_ms
        )));
    }
    if scenario.simulation.scheduler.max_same_instant_iterations == 0 {
        return Err(ModelError::Validation(
            "max_same_instant_iterations must be at least 1".to_string(),
        ));
    }

    let mut names = std::collections::BTreeSet::new();
    for node in &scenario.nodes {
        if !names.insert(node.name.as_str()) {
            return Err(ModelError::Validation(format!("duplicate node name '{}'", node.name)));
        }
    }

    for node in &scenario.nodes {
        match (node.role, node.serving.as_deref()) {
            (Role::Terminal, None) => {
                return Err(ModelError::Validation(format!(
                    "terminal '{}' has no serving base station",
                    node.name
                )));
            }
            (Role::Terminal, Some(serving)) => {
                let target = scenario.nodes.iter().find(|n| n.name == serving);
                match target {
                    Some(n) if n.role == Role::BaseStation => {}
                    Some(_) => {
                        return Err(ModelError::Validation(format!(
                            "terminal '{}' is served by '{}', which is not a base station",
                            node.name, serving
                        )));
                    }
                    None => {
                        return Err(ModelError::Validation(format!(
                            "terminal '{}' is served by unknown node '{}'",
                            node.name, serving
                        )));
                    }
                }
            }
            (Role::BaseStation, Some(_)) => {
                return Err(ModelError::Validation(format!(
                    "base station '{}' cannot have a serving node",
                    node.name
                )));
            }
            (Role::BaseStation, None) => {}
        }
        if !(0.0..=1.0).contains(&node.block_error_rate) {
            return Err(ModelError::Validation(format!(
                "node '{}': block_error_rate {} outside [0, 1]",
                node.name, node.block_error_rate
            )));
        }
    }
    Ok(())
}
