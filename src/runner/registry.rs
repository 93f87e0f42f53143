//! Registry of named step descriptors.

use std::collections::HashMap;

use crate::error::{OrchestrationError, Result};

use super::step::StepDescriptor;

/// Holds every step known to a pipeline, keyed by id.
///
/// Population happens once at configuration time; afterwards the registry
/// is only read. Iteration follows registration order so plans built from
/// the same registry are reproducible.
#[derive(Debug, Clone, Default)]
pub struct StepRegistry {
    steps: Vec<StepDescriptor>,
    index: HashMap<String, usize>,
}

impl StepRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a step.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateStep` if a step with the same id exists.
    pub fn register(&mut self, descriptor: StepDescriptor) -> Result<()> {
        if self.index.contains_key(descriptor.id()) {
            return Err(OrchestrationError::DuplicateStep {
                id: descriptor.id().to_string(),
            });
        }

        self.index
            .insert(descriptor.id().to_string(), self.steps.len());
        self.steps.push(descriptor);
        Ok(())
    }

    /// Look up a step by id.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStep` if no step has this id.
    pub fn get(&self, id: &str) -> Result<&StepDescriptor> {
        self.index
            .get(id)
            .map(|&i| &self.steps[i])
            .ok_or_else(|| OrchestrationError::UnknownStep { id: id.to_string() })
    }

    /// All steps in registration order.
    pub fn all(&self) -> &[StepDescriptor] {
        &self.steps
    }

    /// Step ids in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.id())
    }

    /// Check if a step is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
