//! Wave-layered execution plans.

use std::collections::HashMap;

use crate::error::Result;

use super::dependency::DependencyGraph;
use super::step::StepDescriptor;

/// Steps of one wave that share a parallel-group tag.
///
/// Untagged steps each get a group of their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParallelGroup {
    tag: Option<String>,
    steps: Vec<String>,
}

impl ParallelGroup {
    /// The group tag, `None` for a singleton untagged step.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Member step ids in dispatch order.
    pub fn steps(&self) -> &[String] {
        &self.steps
    }
}

/// A set of steps whose dependencies are all satisfied by earlier waves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wave {
    index: usize,
    steps: Vec<String>,
    groups: Vec<ParallelGroup>,
}

impl Wave {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Step ids ordered by descending priority, ties in registration order.
    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    /// The wave partitioned by parallel-group tag.
    pub fn groups(&self) -> &[ParallelGroup] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Immutable, validated layout of a pipeline run.
///
/// Every step appears in exactly one wave and waves are strictly ordered.
/// The plan owns (cheap) clones of the descriptors so it can be executed on
/// its own.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    waves: Vec<Wave>,
    steps: HashMap<String, StepDescriptor>,
    wave_of: HashMap<String, usize>,
}

impl ExecutionPlan {
    /// Lay out `steps` using an already validated graph of the same steps.
    pub(crate) fn new(graph: &DependencyGraph, steps: &[StepDescriptor]) -> Result<Self> {
        let layers = graph.layers()?;

        let position: HashMap<&str, usize> = steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id(), i))
            .collect();
        let by_id: HashMap<&str, &StepDescriptor> = steps.iter().map(|s| (s.id(), s)).collect();

        let mut waves = Vec::with_capacity(layers.len());
        let mut wave_of = HashMap::with_capacity(steps.len());

        for (index, mut layer) in layers.into_iter().enumerate() {
            layer.sort_by_key(|id| {
                let priority = by_id.get(id.as_str()).map_or(0, |s| s.priority());
                (std::cmp::Reverse(priority), position.get(id.as_str()).copied())
            });

            let mut groups: Vec<ParallelGroup> = Vec::new();
            for id in &layer {
                wave_of.insert(id.clone(), index);

                let tag = by_id.get(id.as_str()).and_then(|s| s.parallel_group());
                match tag {
                    Some(tag) => {
                        match groups.iter_mut().find(|g| g.tag.as_deref() == Some(tag)) {
                            Some(group) => group.steps.push(id.clone()),
                            None => groups.push(ParallelGroup {
                                tag: Some(tag.to_string()),
                                steps: vec![id.clone()],
                            }),
                        }
                    }
                    None => groups.push(ParallelGroup {
                        tag: None,
                        steps: vec![id.clone()],
                    }),
                }
            }

            waves.push(Wave {
                index,
                steps: layer,
                groups,
            });
        }

        Ok(Self {
            waves,
            steps: steps
                .iter()
                .map(|s| (s.id().to_string(), s.clone()))
                .collect(),
            wave_of,
        })
    }

    /// Waves in execution order.
    pub fn waves(&self) -> &[Wave] {
        &self.waves
    }

    /// Wave index of a step.
    pub fn wave_of(&self, id: &str) -> Option<usize> {
        self.wave_of.get(id).copied()
    }

    /// Descriptor of a planned step.
    pub fn step(&self, id: &str) -> Option<&StepDescriptor> {
        self.steps.get(id)
    }

    /// Number of planned steps.
    pub fn len(&self) -> usize {
        self.wave_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wave_of.is_empty()
    }

    /// Every step id, wave ascending then priority descending.
    ///
    /// This is the order steps run in with a concurrency limit of 1.
    pub fn execution_order(&self) -> Vec<&str> {
        self.waves
            .iter()
            .flat_map(|w| w.steps.iter().map(String::as_str))
            .collect()
    }
}
