//! Report export — write engine results as tab-separated tables.
//!
//! Every writer produces byte-identical output for identical input, so
//! reports from repeated runs can be diffed directly.
//!
//! ```text
//! TraversalReport  → write_node_report() / write_edge_report() → TSV
//! PathResult       → write_path()                              → TSV
//! Subgraph / graph → write_sif() / export_sif()                → SIF
//! NullDistribution → write_null_distribution()                 → JSON
//! ```

use std::fmt::Display;
use std::io::Write;

use crate::model::*;
use crate::sampling::NullDistribution;
use crate::scoring::NeighbourhoodScore;
use crate::storage::StorageBackend;
use crate::traversal::TraversalReport;
use crate::tx::TxMode;
use crate::{Error, Result};

/// Placeholder for measurement columns of an unmeasured node.
pub const ABSENT: &str = "absent";

/// Node table: one row per visited node, seed first.
pub fn write_node_report(report: &TraversalReport, writer: &mut dyn Write) -> Result<()> {
    writeln!(writer, "accession\tname\tkind\tdepth\tabundance\tsupport\tpValue\tsignificant")?;
    for row in &report.nodes {
        let accession = row.accession.clone().unwrap_or_else(|| row.node_id.to_string());
        let measured = match &row.measurement {
            Some(m) => [cell(m.abundance), cell(m.support), cell(m.p_value), cell(m.significant)]
                .join("\t"),
            None => [ABSENT; 4].join("\t"),
        };
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}",
            accession,
            escape(&row.name),
            row.kind,
            row.depth,
            measured
        )?;
    }
    Ok(())
}

/// Edge table: one row per walked relationship, in discovery order.
pub fn write_edge_report(report: &TraversalReport, writer: &mut dyn Write) -> Result<()> {
    writeln!(writer, "depth\ttype\tsource\ttarget")?;
    for row in &report.edges {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}",
            row.depth, row.rel_type, row.source_label, row.target_label
        )?;
    }
    Ok(())
}

/// Path as ordered steps; each row names the relationship that led to it.
pub fn write_path(result: &PathResult, writer: &mut dyn Write) -> Result<()> {
    writeln!(writer, "# total cost: {}", result.total_cost)?;
    writeln!(writer, "step\tnode\tname\tvia")?;
    let path = &result.path;
    for (step, node) in path.nodes.iter().enumerate() {
        let via = step
            .checked_sub(1)
            .and_then(|i| path.relationships.get(i))
            .map_or("", |r| r.rel_type.as_str());
        writeln!(writer, "{}\t{}\t{}\t{}", step, node.label(), escape(&node.display_name()), via)?;
    }
    Ok(())
}

/// Per-node enrichment results.
pub fn write_scores(scores: &[NeighbourhoodScore], writer: &mut dyn Write) -> Result<()> {
    writeln!(writer, "node\tdepth\tk\tn\tbackground\tpValue\tempiricalPValue\tsignificant")?;
    for s in scores {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            s.node,
            s.depth,
            s.significant_neighbours,
            s.neighbours,
            s.background,
            s.p_value,
            cell(s.empirical_p_value),
            s.significant
        )?;
    }
    Ok(())
}

/// Subgraph in Simple Interaction Format: `source<TAB>type<TAB>target`,
/// plus a bare line for every member node without a member relationship.
pub fn write_sif(subgraph: &Subgraph, writer: &mut dyn Write) -> Result<()> {
    let label = |id: NodeId| subgraph.nodes.get(&id).map_or_else(|| id.to_string(), Node::label);
    for rel in &subgraph.relationships {
        writeln!(writer, "{}\t{}\t{}", label(rel.src), rel.rel_type, label(rel.dst))?;
    }
    for node in subgraph.nodes.values() {
        let linked = subgraph
            .relationships
            .iter()
            .any(|r| r.src == node.id || r.dst == node.id);
        if !linked {
            writeln!(writer, "{}", node.label())?;
        }
    }
    Ok(())
}

/// Dump the whole graph as SIF, relationships in ascending ID.
pub async fn export_sif<B: StorageBackend>(backend: &B, writer: &mut dyn Write) -> Result<()> {
    let tx = backend.begin_tx(TxMode::ReadOnly).await?;
    let result = async {
        let nodes = backend.all_nodes(&tx).await?;
        let mut rels = Vec::new();
        let mut isolated = Vec::new();
        for node in &nodes {
            let around = backend.get_relationships(&tx, node.id, Direction::Both, None).await?;
            if around.is_empty() {
                isolated.push(node.label());
            }
            rels.extend(around.into_iter().filter(|r| r.src == node.id));
        }
        rels.sort_by_key(|r| r.id);

        let label = |id: NodeId| {
            nodes
                .binary_search_by_key(&id, |n| n.id)
                .map_or_else(|_| id.to_string(), |i| nodes[i].label())
        };
        for rel in &rels {
            writeln!(writer, "{}\t{}\t{}", label(rel.src), rel.rel_type, label(rel.dst))?;
        }
        for name in isolated {
            writeln!(writer, "{name}")?;
        }
        Ok::<_, Error>(())
    }
    .await;
    backend.commit_tx(tx).await?;
    result
}

/// Null distribution as pretty-printed JSON.
pub fn write_null_distribution(null: &NullDistribution, writer: &mut dyn Write) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, null).map_err(std::io::Error::from)?;
    writeln!(writer)?;
    Ok(())
}

/// Empty for a missing field.
fn cell<T: Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Keep free text on one TSV cell.
fn escape(s: &str) -> String {
    s.replace(['\t', '\n', '\r'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::traversal::{NodeReport, TraversalDirection};

    fn report() -> TraversalReport {
        TraversalReport {
            seed: NodeId(0),
            direction: TraversalDirection::Downstream,
            experiment: "0".into(),
            nodes: vec![
                NodeReport {
                    node_id: NodeId(0),
                    accession: Some("P1".into()),
                    name: "Kinase\tone".into(),
                    kind: NodeKind::Protein,
                    depth: 0,
                    measurement: Some(Measurement {
                        abundance: Some(2.5),
                        support: None,
                        p_value: Some(0.01),
                        significant: Some(true),
                    }),
                },
                NodeReport {
                    node_id: NodeId(1),
                    accession: None,
                    name: "1".into(),
                    kind: NodeKind::Reaction,
                    depth: 1,
                    measurement: None,
                },
            ],
            edges: Vec::new(),
        }
    }

    #[test]
    fn test_node_report_marks_absent() {
        let mut out = Vec::new();
        write_node_report(&report(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "accession\tname\tkind\tdepth\tabundance\tsupport\tpValue\tsignificant\n\
             P1\tKinase one\tProtein\t0\t2.5\t\t0.01\ttrue\n\
             1\t1\tReaction\t1\tabsent\tabsent\tabsent\tabsent\n"
        );
    }

    #[test]
    fn test_sif_lists_isolated_nodes() {
        let mut sub = Subgraph::new("0");
        sub.add_node(Node::new(NodeId(0), NodeKind::Protein).with_property(ACCESSION_KEY, "P1"));
        sub.add_node(Node::new(NodeId(1), NodeKind::Reaction));
        sub.add_node(Node::new(NodeId(2), NodeKind::Protein).with_property(ACCESSION_KEY, "P2"));
        sub.add_relationship(Relationship::new(RelId(0), NodeId(0), NodeId(1), "catalyzes"));

        let mut out = Vec::new();
        write_sif(&sub, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "P1\tcatalyzes\t1\nP2\n");
    }

    #[test]
    fn test_null_distribution_json() {
        let mut null = NullDistribution::default();
        null.record(1, 2, 5);
        let mut out = Vec::new();
        write_null_distribution(&null, &mut out).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed["depths"]["1"]["total_neighbours"], 5);
        assert_eq!(parsed["depths"]["1"]["histogram"]["2"], 1);
    }
}
