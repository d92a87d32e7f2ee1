//! Step dependency graph of a resolved job.

use indexmap::IndexMap;
use pipedef_core::ResolvedJob;
use std::collections::HashMap;

/// Edges from each step to the steps it needs, in declaration order.
///
/// A step needs every step named in `inputs.steps` and `depends`, and the
/// producer of every output it consumes. References to unknown steps are
/// left out; they are reported separately.
#[derive(Debug, Clone)]
pub struct StepGraph<'a> {
    edges: IndexMap<&'a str, Vec<&'a str>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

impl<'a> StepGraph<'a> {
    pub fn from_job(job: &'a ResolvedJob) -> Self {
        let outputs = job.outputs();
        let mut edges = IndexMap::new();

        for step in job.steps.values() {
            let mut needs: Vec<&'a str> = step
                .step_dependencies()
                .into_iter()
                .filter(|dep| job.has_step(dep))
                .collect();

            for output in step.inputs.values() {
                if let Some(&producer) = outputs.get(output.as_str()) {
                    if producer != step.name && !needs.contains(&producer) {
                        needs.push(producer);
                    }
                }
            }

            edges.insert(step.name.as_str(), needs);
        }

        Self { edges }
    }

    /// Steps needed by `step`.
    pub fn needs(&self, step: &str) -> &[&'a str] {
        self.edges.get(step).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The first dependency cycle found, as ordered step names: each step
    /// needs the one after it and the last needs the first.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut marks = HashMap::new();
        let mut stack = Vec::new();

        for &step in self.edges.keys() {
            if !marks.contains_key(step) {
                if let Some(cycle) = self.visit(step, &mut marks, &mut stack) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn visit(
        &self,
        step: &'a str,
        marks: &mut HashMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        marks.insert(step, Mark::InProgress);
        stack.push(step);

        for &dep in self.needs(step) {
            match marks.get(dep) {
                None => {
                    if let Some(cycle) = self.visit(dep, marks, stack) {
                        return Some(cycle);
                    }
                }
                Some(Mark::InProgress) => {
                    let start = stack.iter().position(|s| *s == dep).unwrap_or(0);
                    return Some(stack[start..].iter().map(|s| s.to_string()).collect());
                }
                Some(Mark::Done) => {}
            }
        }

        stack.pop();
        marks.insert(step, Mark::Done);
        None
    }

    /// Steps ordered so every step comes after the steps it needs; ties keep
    /// declaration order. Back edges of a cycle are ignored.
    pub fn topological_order(&self) -> Vec<String> {
        let mut order = Vec::new();
        let mut visited = HashMap::new();

        for &step in self.edges.keys() {
            self.topo_visit(step, &mut visited, &mut order);
        }
        order
    }

    fn topo_visit(
        &self,
        step: &'a str,
        visited: &mut HashMap<&'a str, bool>,
        order: &mut Vec<String>,
    ) {
        if visited.contains_key(step) {
            return;
        }
        visited.insert(step, true);

        for &dep in self.needs(step) {
            self.topo_visit(dep, visited, order);
        }

        order.push(step.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipedef_core::Step;
    use serde_json::Map;

    fn make_step(name: &str, input_steps: Vec<&str>) -> Step {
        let mut step = Step::with_defaults(name);
        step.input_steps = input_steps.into_iter().map(String::from).collect();
        step
    }

    fn make_job(steps: Vec<Step>) -> ResolvedJob {
        ResolvedJob {
            name: "job".to_string(),
            steps: steps.into_iter().map(|s| (s.name.clone(), s)).collect(),
            traits: IndexMap::new(),
            settings: Map::new(),
        }
    }

    #[test]
    fn test_three_step_cycle() {
        let job = make_job(vec![
            make_step("a", vec!["b"]),
            make_step("b", vec!["c"]),
            make_step("c", vec!["a"]),
        ]);

        let cycle = StepGraph::from_job(&job).find_cycle().unwrap();
        assert_eq!(cycle, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_cycle_not_through_first_step() {
        let job = make_job(vec![
            make_step("test", vec![]),
            make_step("lint", vec!["build"]),
            make_step("build", vec!["package"]),
            make_step("package", vec!["build"]),
        ]);

        let cycle = StepGraph::from_job(&job).find_cycle().unwrap();
        assert_eq!(cycle, vec!["build", "package"]);
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let job = make_job(vec![make_step("lint", vec!["lint"])]);
        assert_eq!(
            StepGraph::from_job(&job).find_cycle(),
            Some(vec!["lint".to_string()])
        );
    }

    #[test]
    fn test_acyclic_diamond() {
        let job = make_job(vec![
            make_step("release", vec!["build", "docs"]),
            make_step("build", vec!["test"]),
            make_step("docs", vec!["test"]),
            make_step("test", vec![]),
        ]);

        let graph = StepGraph::from_job(&job);
        assert!(graph.find_cycle().is_none());
        assert_eq!(
            graph.topological_order(),
            vec!["test", "build", "docs", "release"]
        );
    }

    #[test]
    fn test_output_consumers_need_producers() {
        let mut build = make_step("build_python_packages", vec![]);
        build.output_dir = Some("dist".to_string());
        let mut release = make_step("release_to_pypi", vec![]);
        release
            .inputs
            .insert("DIST_DIR".to_string(), "dist_path".to_string());

        let job = make_job(vec![release, build]);
        let graph = StepGraph::from_job(&job);
        assert_eq!(graph.needs("release_to_pypi"), &["build_python_packages"]);
        assert_eq!(
            graph.topological_order(),
            vec!["build_python_packages", "release_to_pypi"]
        );
    }

    #[test]
    fn test_unknown_steps_are_not_edges() {
        let job = make_job(vec![make_step("lint", vec!["missing"])]);
        let graph = StepGraph::from_job(&job);
        assert!(graph.needs("lint").is_empty());
        assert!(graph.find_cycle().is_none());
    }
}
