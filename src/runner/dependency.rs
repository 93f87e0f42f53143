//! Dependency graph for step execution ordering.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{OrchestrationError, Result};

use super::plan::ExecutionPlan;
use super::step::StepDescriptor;

/// Represents the dependency relationships between steps.
///
/// Step order is the order steps were added; every traversal follows it so
/// cycle reports and layerings are reproducible.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Step names in insertion order.
    order: Vec<String>,
    /// Map of step name to its direct dependencies, in declaration order.
    dependencies: HashMap<String, Vec<String>>,
    /// Map of step name to steps that depend on it.
    dependents: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Create a new dependency graph builder.
    pub fn builder() -> DependencyGraphBuilder {
        DependencyGraphBuilder::new()
    }

    /// Build a graph from step descriptors.
    ///
    /// Returns `DuplicateStep` if two descriptors share an id and
    /// `MissingDependency` if a step names an unknown dependency.
    pub fn from_steps(steps: &[StepDescriptor]) -> Result<Self> {
        let mut seen = HashSet::new();
        if let Some(dup) = steps.iter().find(|step| !seen.insert(step.id())) {
            return Err(OrchestrationError::DuplicateStep {
                id: dup.id().to_string(),
            });
        }

        steps
            .iter()
            .fold(Self::builder(), |builder, step| {
                builder.add_step(step.id(), step.dependencies().to_vec())
            })
            .build()
    }

    /// Validate `steps` and lay them out as an [`ExecutionPlan`].
    ///
    /// # Errors
    ///
    /// - `DuplicateStep` if two descriptors share an id
    /// - `MissingDependency` if a dependency id is not among `steps`
    /// - `CyclicDependency` with the offending cycle
    pub fn build(steps: &[StepDescriptor]) -> Result<ExecutionPlan> {
        let graph = Self::from_steps(steps)?;
        ExecutionPlan::new(&graph, steps)
    }

    /// Get the direct dependencies of a step.
    pub fn dependencies_of(&self, step: &str) -> Option<&[String]> {
        self.dependencies.get(step).map(Vec::as_slice)
    }

    /// Get steps that depend on the given step.
    pub fn dependents_of(&self, step: &str) -> Option<&[String]> {
        self.dependents.get(step).map(Vec::as_slice)
    }

    /// Check if a step exists in the graph.
    pub fn contains(&self, step: &str) -> bool {
        self.dependencies.contains_key(step)
    }

    /// All step names in insertion order.
    pub fn steps(&self) -> &[String] {
        &self.order
    }

    /// Get the number of steps in the graph.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Returns steps in topological order (dependencies before dependents).
    ///
    /// Returns an error if a cycle is detected.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        if let Some(cycle) = self.find_cycle() {
            return Err(OrchestrationError::CyclicDependency { cycle });
        }

        // Count incoming edges for each node
        let mut in_degree: HashMap<&str, usize> = self
            .order
            .iter()
            .map(|s| (s.as_str(), self.dependencies[s].len()))
            .collect();

        // Start with nodes that have no dependencies
        let mut queue: VecDeque<&str> = self
            .order
            .iter()
            .map(String::as_str)
            .filter(|s| in_degree[s] == 0)
            .collect();

        let mut result = Vec::with_capacity(self.order.len());

        while let Some(step) = queue.pop_front() {
            result.push(step.to_string());

            // Reduce in-degree for all dependents
            for dependent in &self.dependents[step] {
                if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        Ok(result)
    }

    /// Find a cycle in the graph, returning the path if one exists.
    ///
    /// The path starts and ends with the same step, e.g. `[a, b, a]`.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum State {
            Unvisited,
            Visiting,
            Visited,
        }

        let mut state: HashMap<&str, State> = self
            .order
            .iter()
            .map(|s| (s.as_str(), State::Unvisited))
            .collect();

        let mut path: Vec<String> = Vec::new();

        fn dfs<'a>(
            node: &'a str,
            graph: &'a DependencyGraph,
            state: &mut HashMap<&'a str, State>,
            path: &mut Vec<String>,
        ) -> Option<Vec<String>> {
            state.insert(node, State::Visiting);
            path.push(node.to_string());

            if let Some(deps) = graph.dependencies.get(node) {
                for dep in deps {
                    match state.get(dep.as_str()) {
                        Some(State::Visiting) => {
                            // Found cycle - build the cycle path
                            let cycle_start = path.iter().position(|s| s == dep).unwrap_or(0);
                            let mut cycle: Vec<String> = path[cycle_start..].to_vec();
                            cycle.push(dep.clone());
                            return Some(cycle);
                        }
                        Some(State::Unvisited) => {
                            if let Some(cycle) = dfs(dep, graph, state, path) {
                                return Some(cycle);
                            }
                        }
                        Some(State::Visited) | None => {}
                    }
                }
            }

            path.pop();
            state.insert(node, State::Visited);
            None
        }

        for step in &self.order {
            if state.get(step.as_str()) == Some(&State::Unvisited) {
                if let Some(cycle) = dfs(step, self, &mut state, &mut path) {
                    return Some(cycle);
                }
            }
        }

        None
    }

    /// Wave number of every step.
    ///
    /// A step with no dependencies is in wave 0; any other step is one wave
    /// after its latest dependency (longest path from a source).
    pub fn wave_numbers(&self) -> Result<HashMap<String, usize>> {
        let order = self.topological_order()?;
        let mut waves: HashMap<String, usize> = HashMap::with_capacity(order.len());

        for step in order {
            let wave = self.dependencies[&step]
                .iter()
                .filter_map(|dep| waves.get(dep))
                .map(|w| w + 1)
                .max()
                .unwrap_or(0);
            waves.insert(step, wave);
        }

        Ok(waves)
    }

    /// Returns the waves of the graph, each in insertion order.
    ///
    /// Each wave contains exactly the steps whose dependencies are all in
    /// earlier waves.
    pub fn layers(&self) -> Result<Vec<Vec<String>>> {
        let waves = self.wave_numbers()?;
        let depth = waves.values().max().map_or(0, |w| w + 1);

        let mut layers: Vec<Vec<String>> = vec![Vec::new(); depth];
        for step in &self.order {
            layers[waves[step]].push(step.clone());
        }

        Ok(layers)
    }

    /// Get all transitive dependents of a step.
    ///
    /// Returns steps that depend on the given step, directly or indirectly.
    pub fn transitive_dependents(&self, step: &str) -> HashSet<String> {
        let mut result = HashSet::new();
        let mut to_visit = vec![step.to_string()];

        while let Some(current) = to_visit.pop() {
            if let Some(dependents) = self.dependents.get(&current) {
                for dep in dependents {
                    if result.insert(dep.clone()) {
                        to_visit.push(dep.clone());
                    }
                }
            }
        }

        result
    }
}

/// Builder for constructing a DependencyGraph.
#[derive(Debug, Default)]
pub struct DependencyGraphBuilder {
    order: Vec<String>,
    dependencies: HashMap<String, Vec<String>>,
}

impl DependencyGraphBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step with its dependencies.
    ///
    /// Adding the same step twice merges the dependency lists.
    pub fn add_step(mut self, name: impl Into<String>, depends_on: Vec<String>) -> Self {
        let name = name.into();
        if !self.dependencies.contains_key(&name) {
            self.order.push(name.clone());
        }

        let deps = self.dependencies.entry(name).or_default();
        for dep in depends_on {
            if !deps.contains(&dep) {
                deps.push(dep);
            }
        }
        self
    }

    /// Build the dependency graph.
    ///
    /// Returns `MissingDependency` if any dependency references a
    /// non-existent step.
    pub fn build(self) -> Result<DependencyGraph> {
        // Validate all dependencies exist
        for step in &self.order {
            for dep in &self.dependencies[step] {
                if !self.dependencies.contains_key(dep) {
                    return Err(OrchestrationError::MissingDependency {
                        step: step.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        // Build dependents map (reverse lookup)
        let mut dependents: HashMap<String, Vec<String>> = self
            .order
            .iter()
            .map(|s| (s.clone(), Vec::new()))
            .collect();

        for step in &self.order {
            for dep in &self.dependencies[step] {
                if let Some(list) = dependents.get_mut(dep) {
                    list.push(step.clone());
                }
            }
        }

        Ok(DependencyGraph {
            order: self.order,
            dependencies: self.dependencies,
            dependents,
        })
    }
}
