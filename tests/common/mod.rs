//! Shared fixture: a small insulin signalling network.
//!
//! ```text
//! INSR -catalyzes-> (autophosphorylation) -produces-> IRS1
//! IRS1 -controls-> PIK3R1 -controls-> AKT1 -controls-> GSK3B
//! INSR, AKT1 -participates_in-> (Insulin signalling)
//! ```
//!
//! Experiment "0": INSR, IRS1 and AKT1 significant, PIK3R1 measured but not
//! significant, GSK3B unmeasured. The two reaction edges carry their own
//! support. Experiment "1" marks every protein significant.

#![allow(dead_code)]

use phosphograph::model::{props, ACCESSION_KEY, NAME_KEY, SPECIES_KEY};
use phosphograph::{
    Measurement, MemoryBackend, Network, NodeId, NodeKind, PropertyMap, RelId, StorageBackend,
    TxMode, Value,
};

pub const HUMAN: &str = "Homo sapiens";
pub const MOUSE: &str = "Mus musculus";

pub struct Insulin {
    pub network: Network<MemoryBackend>,
    pub insr: NodeId,
    pub irs1: NodeId,
    pub pik3r1: NodeId,
    pub akt1: NodeId,
    pub gsk3b: NodeId,
    pub pathway: NodeId,
    pub reaction: NodeId,
    pub rels: Vec<RelId>,
}

fn protein(accession: &str, name: &str, species: &str, measured: Option<Measurement>) -> PropertyMap {
    let mut p = props([
        (ACCESSION_KEY, Value::from(accession)),
        (NAME_KEY, Value::from(name)),
        (SPECIES_KEY, Value::from(species)),
        ("significant_1", Value::from(true)),
    ]);
    if let Some(m) = measured {
        p.extend(m.to_properties("0"));
    }
    p
}

fn measured(abundance: f64, support: f64, p_value: f64, significant: bool) -> Option<Measurement> {
    Some(Measurement {
        abundance: Some(abundance),
        support: Some(support),
        p_value: Some(p_value),
        significant: Some(significant),
    })
}

pub async fn insulin_network() -> Insulin {
    let network = Network::open_memory().await.unwrap();
    let db = network.backend();
    let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

    let insr = db
        .create_node(&mut tx, NodeKind::Protein, protein("P06213", "INSR", HUMAN, measured(2.5, 4.0, 0.001, true)))
        .await
        .unwrap();
    let irs1 = db
        .create_node(&mut tx, NodeKind::Protein, protein("P35568", "IRS1", HUMAN, measured(1.8, 3.0, 0.01, true)))
        .await
        .unwrap();
    let pik3r1 = db
        .create_node(&mut tx, NodeKind::Protein, protein("P27986", "PIK3R1", HUMAN, measured(0.2, 1.0, 0.4, false)))
        .await
        .unwrap();
    let akt1 = db
        .create_node(&mut tx, NodeKind::Protein, protein("P31749", "AKT1", HUMAN, measured(1.1, 5.0, 0.02, true)))
        .await
        .unwrap();
    let gsk3b = db
        .create_node(&mut tx, NodeKind::Protein, protein("P49841", "GSK3B", MOUSE, None))
        .await
        .unwrap();
    let pathway = db
        .create_node(&mut tx, NodeKind::Pathway, props([(NAME_KEY, "Insulin signalling")]))
        .await
        .unwrap();
    let reaction = db
        .create_node(&mut tx, NodeKind::Reaction, props([(NAME_KEY, "INSR autophosphorylation")]))
        .await
        .unwrap();

    let mut rels = Vec::new();
    for (src, dst, rel_type, support) in [
        (insr, reaction, "catalyzes", Some(4.0)),
        (reaction, irs1, "produces", Some(3.0)),
        (irs1, pik3r1, "controls", None),
        (pik3r1, akt1, "controls", None),
        (akt1, gsk3b, "controls", None),
        (insr, pathway, "participates_in", None),
        (akt1, pathway, "participates_in", None),
    ] {
        let p = support.map_or_else(PropertyMap::new, |s: f64| props([("support_0", s)]));
        rels.push(db.create_relationship(&mut tx, src, dst, rel_type, p).await.unwrap());
    }
    db.commit_tx(tx).await.unwrap();

    Insulin { network, insr, irs1, pik3r1, akt1, gsk3b, pathway, reaction, rels }
}

/// Add a protein with no relationships.
pub async fn add_isolated_protein(network: &Network<MemoryBackend>, accession: &str) -> NodeId {
    let db = network.backend();
    let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
    let id = db
        .create_node(&mut tx, NodeKind::Protein, props([(ACCESSION_KEY, accession)]))
        .await
        .unwrap();
    db.commit_tx(tx).await.unwrap();
    id
}

/// Read a node back in its own snapshot.
pub async fn node(network: &Network<MemoryBackend>, id: NodeId) -> phosphograph::Node {
    let db = network.backend();
    let tx = db.begin_tx(TxMode::ReadOnly).await.unwrap();
    let node = db.get_node(&tx, id).await.unwrap().unwrap();
    db.commit_tx(tx).await.unwrap();
    node
}
