// Graph Builder
// Validates node definitions and linearizes them into checkpoints

use super::{Checkpoint, Edge, Graph, GraphError, Node, WorkItem, END, START};

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Declarative definition of one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    pub work: WorkItem,
}

impl NodeSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, work: WorkItem) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            depends_on: Vec::new(),
            work,
        }
    }

    pub fn shell<I, S>(name: impl Into<String>, description: impl Into<String>, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            name,
            description,
            WorkItem::Shell {
                commands: commands.into_iter().map(Into::into).collect(),
            },
        )
    }

    pub fn plugin(
        name: impl Into<String>,
        description: impl Into<String>,
        plugin: impl Into<String>,
        params: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self::new(
            name,
            description,
            WorkItem::Plugin {
                name: plugin.into(),
                params,
            },
        )
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }
}

/// Explicit checkpoint, referring to nodes by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointPlan {
    Sequential(String),
    FanOut(Vec<String>),
}

/// On-disk form of a build graph (JSON or YAML)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub nodes: Vec<NodeSpec>,
    /// When absent, checkpoints are derived from `depends_on`.
    /// Each entry is a one-key map, `sequential: <node>` or `fan_out: [..]`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_yaml::with::singleton_map_recursive"
    )]
    pub checkpoints: Option<Vec<CheckpointPlan>>,
}

impl GraphDocument {
    pub fn from_json(content: &str) -> Result<Self, GraphError> {
        serde_json::from_str(content)
            .map_err(|e| GraphError::invalid_document(format!("invalid JSON graph: {}", e)))
    }

    pub fn from_yaml(content: &str) -> Result<Self, GraphError> {
        serde_yaml::from_str(content)
            .map_err(|e| GraphError::invalid_document(format!("invalid YAML graph: {}", e)))
    }

    /// Load a document, choosing the format by file extension
    pub fn from_file(path: &Path) -> Result<Self, GraphError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GraphError::invalid_document(format!("failed to read {}: {}", path.display(), e))
        })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    pub fn into_graph(self) -> Result<Graph, GraphError> {
        let mut builder = GraphBuilder::new().nodes(self.nodes);
        if let Some(plan) = self.checkpoints {
            builder = builder.plan(plan);
        }
        builder.build()
    }
}

/// Checkpoint over user node positions, before markers are added
#[derive(Debug)]
enum Planned {
    Sequential(usize),
    FanOut(Vec<usize>),
}

/// Builds a [`Graph`], injecting the START and END markers
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<NodeSpec>,
    plan: Option<Vec<CheckpointPlan>>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(mut self, spec: NodeSpec) -> Self {
        self.nodes.push(spec);
        self
    }

    pub fn nodes(mut self, specs: impl IntoIterator<Item = NodeSpec>) -> Self {
        self.nodes.extend(specs);
        self
    }

    /// Use an explicit checkpoint sequence instead of deriving one
    pub fn plan(mut self, plan: Vec<CheckpointPlan>) -> Self {
        self.plan = Some(plan);
        self
    }

    pub fn build(self) -> Result<Graph, GraphError> {
        let indices = index_nodes(&self.nodes)?;
        validate_dependencies(&self.nodes, &indices)?;

        let planned = match &self.plan {
            Some(plan) => resolve_plan(plan, &self.nodes, &indices)?,
            None => derive_plan(&self.nodes, &indices)?,
        };

        // START occupies position 0, so user nodes shift by one.
        let end_index = self.nodes.len() + 1;
        let mut checkpoints = Vec::with_capacity(planned.len() + 2);
        checkpoints.push(Checkpoint::Sequential(0));
        for step in planned {
            checkpoints.push(match step {
                Planned::Sequential(i) => Checkpoint::Sequential(i + 1),
                Planned::FanOut(members) => Checkpoint::FanOut(
                    members.into_iter().map(|i| Edge { target: i + 1 }).collect(),
                ),
            });
        }
        checkpoints.push(Checkpoint::Sequential(end_index));

        let mut nodes = Vec::with_capacity(self.nodes.len() + 2);
        nodes.push(Node::marker(START));
        nodes.extend(
            self.nodes
                .into_iter()
                .map(|spec| Node::new(spec.name, spec.description, spec.depends_on, spec.work)),
        );
        nodes.push(Node::marker(END));

        Ok(Graph::from_parts(nodes, checkpoints))
    }
}

fn index_nodes(specs: &[NodeSpec]) -> Result<HashMap<&str, usize>, GraphError> {
    let mut indices = HashMap::with_capacity(specs.len());
    for (i, spec) in specs.iter().enumerate() {
        if spec.name.trim().is_empty() {
            return Err(GraphError::invalid_structure(format!(
                "node #{} has an empty name",
                i + 1
            )));
        }
        if spec.name == START || spec.name == END {
            return Err(GraphError::invalid_structure(format!(
                "node name '{}' is reserved",
                spec.name
            )));
        }
        if indices.insert(spec.name.as_str(), i).is_some() {
            return Err(GraphError::duplicate(format!(
                "node '{}' is defined more than once",
                spec.name
            )));
        }
    }
    Ok(indices)
}

fn validate_dependencies(specs: &[NodeSpec], indices: &HashMap<&str, usize>) -> Result<(), GraphError> {
    for spec in specs {
        for dep in &spec.depends_on {
            if dep == &spec.name {
                return Err(GraphError::cyclic(format!(
                    "node '{}' depends on itself",
                    spec.name
                )));
            }
            if !indices.contains_key(dep.as_str()) {
                return Err(GraphError::unknown_dependency(format!(
                    "node '{}' depends on unknown node '{}'",
                    spec.name, dep
                )));
            }
        }
    }
    Ok(())
}

/// One checkpoint per dependency level: single-node levels are sequential,
/// wider levels fan out.
fn derive_plan(specs: &[NodeSpec], indices: &HashMap<&str, usize>) -> Result<Vec<Planned>, GraphError> {
    let members: Vec<usize> = (0..specs.len()).collect();
    let levels = execution_levels(&members, specs, indices)?;
    Ok(levels
        .into_iter()
        .map(|level| {
            if level.len() == 1 {
                Planned::Sequential(level[0])
            } else {
                Planned::FanOut(level)
            }
        })
        .collect())
}

fn resolve_plan(
    plan: &[CheckpointPlan],
    specs: &[NodeSpec],
    indices: &HashMap<&str, usize>,
) -> Result<Vec<Planned>, GraphError> {
    let lookup = |name: &str| {
        indices.get(name).copied().ok_or_else(|| {
            GraphError::unknown_dependency(format!("checkpoint references unknown node '{}'", name))
        })
    };

    let mut position: HashMap<usize, usize> = HashMap::new();
    let mut groups = Vec::with_capacity(plan.len());
    for (pos, step) in plan.iter().enumerate() {
        let members = match step {
            CheckpointPlan::Sequential(name) => vec![lookup(name)?],
            CheckpointPlan::FanOut(names) => {
                if names.is_empty() {
                    return Err(GraphError::invalid_structure(format!(
                        "checkpoint #{} fans out to no nodes",
                        pos + 1
                    )));
                }
                names.iter().map(|name| lookup(name)).collect::<Result<Vec<_>, _>>()?
            }
        };
        for &member in &members {
            if position.insert(member, pos).is_some() {
                return Err(GraphError::invalid_structure(format!(
                    "node '{}' appears in more than one checkpoint",
                    specs[member].name
                )));
            }
        }
        groups.push(members);
    }

    if let Some(missing) = specs.iter().enumerate().find(|(i, _)| !position.contains_key(i)) {
        return Err(GraphError::invalid_structure(format!(
            "node '{}' is not scheduled by any checkpoint",
            missing.1.name
        )));
    }

    for (i, spec) in specs.iter().enumerate() {
        for dep in &spec.depends_on {
            let dep_pos = position[&indices[dep.as_str()]];
            if dep_pos > position[&i] {
                return Err(GraphError::invalid_structure(format!(
                    "node '{}' depends on '{}', which is scheduled after it",
                    spec.name, dep
                )));
            }
        }
    }

    let mut planned = Vec::with_capacity(groups.len());
    for (step, members) in plan.iter().zip(groups) {
        planned.push(match step {
            CheckpointPlan::Sequential(_) => Planned::Sequential(members[0]),
            CheckpointPlan::FanOut(_) => {
                // Edges inside one fan-out run in dependency order.
                let ordered = execution_levels(&members, specs, indices)?
                    .into_iter()
                    .flatten()
                    .collect();
                Planned::FanOut(ordered)
            }
        });
    }
    Ok(planned)
}

/// Group `members` into dependency levels, considering only dependencies
/// between members. Declaration order is kept within each level.
fn execution_levels(
    members: &[usize],
    specs: &[NodeSpec],
    indices: &HashMap<&str, usize>,
) -> Result<Vec<Vec<usize>>, GraphError> {
    let member_set: HashSet<usize> = members.iter().copied().collect();
    let mut in_degree: HashMap<usize, usize> = members.iter().map(|&m| (m, 0)).collect();
    let mut dependents: HashMap<usize, Vec<usize>> = HashMap::new();

    for &member in members {
        for dep in &specs[member].depends_on {
            if let Some(&dep_index) = indices.get(dep.as_str()) {
                if member_set.contains(&dep_index) {
                    *in_degree.entry(member).or_insert(0) += 1;
                    dependents.entry(dep_index).or_default().push(member);
                }
            }
        }
    }

    let mut levels = Vec::new();
    let mut processed = HashSet::new();

    while processed.len() < members.len() {
        let current_level: Vec<usize> = members
            .iter()
            .copied()
            .filter(|m| !processed.contains(m) && in_degree[m] == 0)
            .collect();

        if current_level.is_empty() {
            let stuck: Vec<&str> = members
                .iter()
                .filter(|m| !processed.contains(*m))
                .map(|&m| specs[m].name.as_str())
                .collect();
            return Err(GraphError::cyclic(format!(
                "circular dependency detected among: {}",
                stuck.join(", ")
            )));
        }

        for &node in &current_level {
            processed.insert(node);
            if let Some(next) = dependents.get(&node) {
                for dependent in next {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                    }
                }
            }
        }

        levels.push(current_level);
    }

    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphErrorKind;

    fn names(graph: &Graph, checkpoint: &Checkpoint) -> Vec<String> {
        checkpoint
            .targets()
            .into_iter()
            .map(|i| graph.node_at(i).name().to_string())
            .collect()
    }

    #[test]
    fn test_empty_graph_has_only_markers() {
        let graph = GraphBuilder::new().build().unwrap();
        assert_eq!(graph.nodes().len(), 2);
        assert_eq!(
            graph.checkpoints(),
            &[Checkpoint::Sequential(0), Checkpoint::Sequential(1)]
        );
    }

    #[test]
    fn test_derived_levels() {
        let graph = GraphBuilder::new()
            .node(NodeSpec::shell("checkout", "", ["git checkout"]))
            .node(NodeSpec::shell("lint", "", ["cargo clippy"]).depends_on(["checkout"]))
            .node(NodeSpec::shell("test", "", ["cargo test"]).depends_on(["checkout"]))
            .node(NodeSpec::shell("package", "", ["cargo build"]).depends_on(["lint", "test"]))
            .build()
            .unwrap();

        let checkpoints = graph.checkpoints();
        assert_eq!(checkpoints.len(), 5);
        assert_eq!(names(&graph, &checkpoints[1]), vec!["checkout"]);
        assert!(matches!(checkpoints[2], Checkpoint::FanOut(ref edges) if edges.len() == 2));
        assert_eq!(names(&graph, &checkpoints[2]), vec!["lint", "test"]);
        assert_eq!(names(&graph, &checkpoints[3]), vec!["package"]);
    }

    #[test]
    fn test_cycle_detected() {
        let err = GraphBuilder::new()
            .node(NodeSpec::shell("a", "", ["true"]).depends_on(["b"]))
            .node(NodeSpec::shell("b", "", ["true"]).depends_on(["a"]))
            .build()
            .unwrap_err();
        assert_eq!(err.kind, GraphErrorKind::CyclicDependency);
    }

    #[test]
    fn test_unknown_dependency() {
        let err = GraphBuilder::new()
            .node(NodeSpec::shell("a", "", ["true"]).depends_on(["ghost"]))
            .build()
            .unwrap_err();
        assert_eq!(err.kind, GraphErrorKind::UnknownDependency);
        assert!(err.message.contains("ghost"));
    }

    #[test]
    fn test_duplicate_and_reserved_names() {
        let err = GraphBuilder::new()
            .node(NodeSpec::shell("a", "", ["true"]))
            .node(NodeSpec::shell("a", "", ["true"]))
            .build()
            .unwrap_err();
        assert_eq!(err.kind, GraphErrorKind::DuplicateNode);

        let err = GraphBuilder::new()
            .node(NodeSpec::shell(END, "", ["true"]))
            .build()
            .unwrap_err();
        assert_eq!(err.kind, GraphErrorKind::InvalidStructure);
    }

    #[test]
    fn test_explicit_plan_orders_fan_out_edges() {
        let graph = GraphBuilder::new()
            .node(NodeSpec::shell("setup", "", ["true"]))
            .node(NodeSpec::shell("report", "", ["true"]).depends_on(["unit"]))
            .node(NodeSpec::shell("unit", "", ["true"]).depends_on(["setup"]))
            .plan(vec![
                CheckpointPlan::Sequential("setup".to_string()),
                CheckpointPlan::FanOut(vec!["report".to_string(), "unit".to_string()]),
            ])
            .build()
            .unwrap();

        assert_eq!(names(&graph, &graph.checkpoints()[2]), vec!["unit", "report"]);
    }

    #[test]
    fn test_explicit_plan_rejects_late_dependency() {
        let err = GraphBuilder::new()
            .node(NodeSpec::shell("a", "", ["true"]).depends_on(["b"]))
            .node(NodeSpec::shell("b", "", ["true"]))
            .plan(vec![
                CheckpointPlan::Sequential("a".to_string()),
                CheckpointPlan::Sequential("b".to_string()),
            ])
            .build()
            .unwrap_err();
        assert_eq!(err.kind, GraphErrorKind::InvalidStructure);
    }

    #[test]
    fn test_explicit_plan_must_schedule_every_node_once() {
        let missing = GraphBuilder::new()
            .node(NodeSpec::shell("a", "", ["true"]))
            .node(NodeSpec::shell("b", "", ["true"]))
            .plan(vec![CheckpointPlan::Sequential("a".to_string())])
            .build()
            .unwrap_err();
        assert!(missing.message.contains("'b'"));

        let twice = GraphBuilder::new()
            .node(NodeSpec::shell("a", "", ["true"]))
            .plan(vec![
                CheckpointPlan::Sequential("a".to_string()),
                CheckpointPlan::FanOut(vec!["a".to_string()]),
            ])
            .build()
            .unwrap_err();
        assert_eq!(twice.kind, GraphErrorKind::InvalidStructure);
    }

    #[test]
    fn test_yaml_document() {
        let yaml = r#"
name: service
nodes:
  - name: build
    description: compile sources
    work:
      type: shell
      commands: ["make"]
  - name: upload
    depends_on: [build]
    work:
      type: plugin
      name: s3
      params:
        bucket: artifacts
checkpoints:
  - sequential: build
  - sequential: upload
"#;
        let document = GraphDocument::from_yaml(yaml).unwrap();
        assert_eq!(document.name.as_deref(), Some("service"));
        assert_eq!(document.nodes[1].depends_on, vec!["build"]);

        let graph = document.into_graph().unwrap();
        assert_eq!(graph.checkpoints().len(), 4);
        assert!(matches!(
            graph.node("upload").unwrap().work(),
            WorkItem::Plugin { name, params } if name == "s3" && params["bucket"] == "artifacts"
        ));
    }

    #[test]
    fn test_plan_in_yaml_and_json() {
        let yaml = r#"
nodes:
  - name: fetch
    work: { type: shell, commands: ["git fetch"] }
  - name: unit
    depends_on: [fetch]
    work: { type: shell, commands: ["make test"] }
  - name: docs
    depends_on: [fetch]
    work: { type: marker }
checkpoints:
  - sequential: fetch
  - fan_out: [unit, docs]
"#;
        let from_yaml = GraphDocument::from_yaml(yaml).unwrap();
        assert_eq!(
            from_yaml.checkpoints,
            Some(vec![
                CheckpointPlan::Sequential("fetch".to_string()),
                CheckpointPlan::FanOut(vec!["unit".to_string(), "docs".to_string()]),
            ])
        );

        let json = r#"{
            "nodes": [
                {"name": "fetch", "work": {"type": "shell", "commands": ["git fetch"]}},
                {"name": "unit", "depends_on": ["fetch"], "work": {"type": "shell", "commands": ["make test"]}},
                {"name": "docs", "depends_on": ["fetch"], "work": {"type": "marker"}}
            ],
            "checkpoints": [{"sequential": "fetch"}, {"fan_out": ["unit", "docs"]}]
        }"#;
        let from_json = GraphDocument::from_json(json).unwrap();
        assert_eq!(from_json.checkpoints, from_yaml.checkpoints);

        let graph = from_yaml.into_graph().unwrap();
        assert_eq!(graph.checkpoints().len(), 4);
        assert_eq!(names(&graph, &graph.checkpoints()[2]), vec!["unit", "docs"]);

        let written = serde_yaml::to_string(&from_json).unwrap();
        assert!(written.contains("fan_out:"));
        assert_eq!(GraphDocument::from_yaml(&written).unwrap(), from_json);
    }

    #[test]
    fn test_document_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        std::fs::write(
            &path,
            r#"{"nodes": [{"name": "only", "work": {"type": "shell", "commands": ["true"]}}]}"#,
        )
        .unwrap();

        let graph = GraphDocument::from_file(&path).unwrap().into_graph().unwrap();
        assert!(graph.node("only").is_some());

        let err = GraphDocument::from_file(&dir.path().join("missing.yaml")).unwrap_err();
        assert_eq!(err.kind, GraphErrorKind::InvalidDocument);
    }
}
