use bif::{archive::ArchivePath, Archive, EntityKind, Experiment, NodeId};
use serde_json::Value;
use std::borrow::Cow;

type Node<'a> = &'a NodeDescriptor;
type Edge<'a> = (usize, usize);

struct ExperimentGraph {
    nodes: Vec<NodeDescriptor>,
    edges: Vec<(usize, usize)>,
}

struct NodeDescriptor {
    id: usize,
    kind: EntityKind,
    label: String,
    /// samples of a channel
    samples: usize,
    hashed: bool,
}

impl<'a> dot::Labeller<'a, Node<'a>, Edge<'a>> for ExperimentGraph {
    fn graph_id(&'a self) -> dot::Id<'a> {
        dot::Id::new("experiment").unwrap()
    }

    fn node_id(&'a self, n: &Node<'a>) -> dot::Id<'a> {
        dot::Id::new(format!("N{}", n.id)).unwrap()
    }

    fn node_label(&'a self, n: &Node<'a>) -> dot::LabelText<'a> {
        let text = match n.kind {
            EntityKind::Channel => format!("{}\n{} samples", n.label, n.samples),
            _ => n.label.clone(),
        };
        dot::LabelText::label(text)
    }

    fn node_shape(&'a self, n: &Node<'a>) -> Option<dot::LabelText<'a>> {
        let shape = match n.kind {
            EntityKind::Channel => "circle",
            _ => "box",
        };
        Some(dot::LabelText::label(shape))
    }

    fn node_color(&'a self, n: &Node<'a>) -> Option<dot::LabelText<'a>> {
        if n.hashed {
            None
        } else {
            Some(dot::LabelText::label("grey"))
        }
    }

    fn node_style(&'a self, n: &Node<'a>) -> dot::Style {
        if n.hashed {
            dot::Style::None
        } else {
            dot::Style::Filled
        }
    }
}

impl<'a> dot::GraphWalk<'a, Node<'a>, Edge<'a>> for ExperimentGraph {
    fn nodes(&'a self) -> dot::Nodes<'a, Node<'a>> {
        self.nodes.iter().collect()
    }

    fn edges(&'a self) -> dot::Edges<'a, Edge<'a>> {
        Cow::Borrowed(&self.edges[..])
    }

    fn source(&'a self, edge: &Edge<'a>) -> Node<'a> {
        &self.nodes[edge.0]
    }

    fn target(&'a self, edge: &Edge<'a>) -> Node<'a> {
        &self.nodes[edge.1]
    }
}

fn describe(experiment: &Experiment, node: NodeId) -> bif::Result<String> {
    let entity = experiment.entity(node)?;
    let name = |key: &str| {
        entity
            .metadata()
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned()
    };
    Ok(match entity.kind() {
        EntityKind::Experiment => format!("Experiment\n{}", name("name")),
        EntityKind::Subject => format!("Subject\n{}", name("name")),
        EntityKind::Session => format!("Session\n{}", name("name")),
        EntityKind::Channel => name("label"),
        EntityKind::Derived => "Derived".to_owned(),
    })
}

fn collect(
    experiment: &Experiment,
    node: NodeId,
    graph: &mut ExperimentGraph,
) -> bif::Result<usize> {
    let id = graph.nodes.len();
    let entity = experiment.entity(node)?;
    let samples = match entity.kind() {
        EntityKind::Channel => experiment.data_len(experiment.channel_id(node)?)?,
        _ => 0,
    };
    graph.nodes.push(NodeDescriptor {
        id,
        kind: entity.kind(),
        label: describe(experiment, node)?,
        samples,
        hashed: entity.content_hash().is_some(),
    });
    for child in experiment.children(node)? {
        let child_id = collect(experiment, *child, graph)?;
        graph.edges.push((id, child_id));
    }
    Ok(id)
}

/// Writes the live tree of an experiment as a dot graph.
///
/// Channels are depicted as circles, all other nodes as boxes. Nodes without a content
/// hash are greyed out.
pub fn graph(experiment: &Experiment, mut out: impl std::io::Write) -> anyhow::Result<()> {
    let mut graph = ExperimentGraph {
        nodes: Vec::new(),
        edges: Vec::new(),
    };
    collect(experiment, experiment.root(), &mut graph)?;
    dot::render(&graph, &mut out)?;
    Ok(())
}

/// Reads an object and writes it to `writer`, as pretty printed json if it parses as json
pub fn dump_json(
    archive: &dyn Archive,
    path: &ArchivePath,
    mut writer: impl std::io::Write,
) -> anyhow::Result<()> {
    let bytes = archive.read(path)?;
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(value) => writeln!(writer, "{}", serde_json::to_string_pretty(&value)?)?,
        Err(_) => writer.write_all(&bytes)?,
    }
    Ok(())
}
