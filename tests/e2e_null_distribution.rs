//! End-to-end resampling tests: measurement files on disk, seeded runs,
//! species restriction and cancellation.

mod common;

use std::io::Write;

use common::{insulin_network, node, Insulin, HUMAN};
use phosphograph::export::write_null_distribution;
use phosphograph::{
    Background, EngineConfig, Error, MemoryBackend, NeighbourhoodQuery, Network, SamplingPlan,
};
use pretty_assertions::assert_eq;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

const MEASUREMENTS: &str = "\
Proteins\tModified sequence\tPEP\tIntensity
P06213;P06213-2\t_LGS(ph)PK_\t0.001\t2.1
P06213\t_VY(ph)EK_\t0.03\t2.9
P35568\t_S(ph)PGEYVNIEFGSDQK_\t0.01\t1.8
P27986\t_T(ph)LQK_\t0.4\t0.2
P27986\t_S(ph)AEK_\t0.6\t0.1
P31749\t_T(ph)FCGTPEYLAPEVLEDNDYGR_\t0.02\t1.1
P49841\t_GEPNVS(ph)YICSR_\t0.2\t0.7
Q99999\t_AAK_\t0.001\t9.0
";

fn measurement_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn configured(net: &Insulin, seed: u64) -> Network<MemoryBackend> {
    let config = EngineConfig::from_toml_str(&format!(
        r#"
        [measurements.columns]
        accession = "Proteins"
        modified_sequence = "Modified sequence"
        p_value = "PEP"
        value = "Intensity"

        [sampling]
        seed = {seed}
        progress_interval = 10
        "#
    ))
    .unwrap();
    Network::with_backend(net.network.backend().clone()).with_config(config)
}

#[tokio::test]
async fn test_seeded_runs_are_reproducible() {
    let net = insulin_network().await;
    let file = measurement_file(MEASUREMENTS);
    let network = configured(&net, 42);
    let plan = SamplingPlan::new(1, 3, 50).unwrap();
    let cancel = CancellationToken::new();

    let first = network.sample_null_distribution(file.path(), &plan, &cancel).await.unwrap();
    let second = network.sample_null_distribution(file.path(), &plan, &cancel).await.unwrap();
    assert_eq!(first, second);

    // Q99999 is not in the graph
    assert_eq!(first.universe_size, 5);
    assert_eq!(first.seed, 42);
    assert_eq!(first.repetitions, 50);
    // three proteins per repetition, every protein has a neighbour
    assert_eq!(first.observations(1), 150);
    let depth = first.at_depth(1).unwrap();
    assert_eq!(depth.histogram.values().sum::<u64>(), 150);
    let rate = first.background_rate(1).unwrap();
    assert!((0.0..=1.0).contains(&rate));

    let mut a = Vec::new();
    let mut b = Vec::new();
    write_null_distribution(&first, &mut a).unwrap();
    write_null_distribution(&second, &mut b).unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_species_restricts_universe() {
    let net = insulin_network().await;
    let file = measurement_file(MEASUREMENTS);
    let network = configured(&net, 7);
    let plan = SamplingPlan::new(1, 10, 20).unwrap();

    let null = network
        .sample_null_distribution_for_species(file.path(), HUMAN, &plan, &CancellationToken::new())
        .await
        .unwrap();
    // GSK3B is the mouse protein
    assert_eq!(null.universe_size, 4);
    assert_eq!(null.observations(1), 80);

    let err = network
        .sample_null_distribution_for_species(file.path(), "Danio rerio", &plan, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InsufficientData(ref m) if m.contains("Danio rerio")));
}

#[tokio::test]
async fn test_null_distribution_feeds_scoring() {
    let net = insulin_network().await;
    let file = measurement_file(MEASUREMENTS);
    let network = configured(&net, 3);
    let plan = SamplingPlan::new(1, 4, 25).unwrap();
    let null = network
        .sample_null_distribution(file.path(), &plan, &CancellationToken::new())
        .await
        .unwrap();

    let query = NeighbourhoodQuery {
        depth: 1,
        direction: None,
        background: Background::Empirical(&null),
    };
    let score = network.score_neighbourhood_with("P27986", &query, "0").await.unwrap();
    assert_eq!(score.background, null.background_rate(1).unwrap());
    assert_eq!(score.empirical_p_value, null.upper_tail(1, score.significant_neighbours));
    assert!(node(&network, net.pik3r1).await.properties.contains_key("enrichment_pValue_0"));
}

#[tokio::test]
async fn test_cancelled_run_stops() {
    let net = insulin_network().await;
    let file = measurement_file(MEASUREMENTS);
    let network = configured(&net, 1);
    let plan = SamplingPlan::new(1, 3, 100_000).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = network.sample_null_distribution(file.path(), &plan, &cancel).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled(ref m) if m.contains("0 of 100000")));
}

#[tokio::test]
async fn test_bad_inputs() {
    let net = insulin_network().await;
    let network = configured(&net, 1);
    let cancel = CancellationToken::new();

    assert!(matches!(SamplingPlan::new(1, -5, 10), Err(Error::InvalidArgument(_))));
    assert!(matches!(SamplingPlan::new(1, 5, 0), Err(Error::InvalidArgument(_))));

    let plan = SamplingPlan::new(1, 3, 5).unwrap();
    let err = network
        .sample_null_distribution("/nonexistent/measurements.tsv", &plan, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DataFile(ref m) if m.contains("/nonexistent/measurements.tsv")));

    // default column names do not match this header
    let file = measurement_file(MEASUREMENTS);
    let err = net
        .network
        .sample_null_distribution(file.path(), &plan, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DataFile(ref m) if m.contains("missing required column")));

    let file = measurement_file("Proteins\tModified sequence\tPEP\tIntensity\nP06213\t_K_\tn/a\t1.0\n");
    let err = network.sample_null_distribution(file.path(), &plan, &cancel).await.unwrap_err();
    assert!(matches!(err, Error::DataFile(ref m) if m.contains("row 2")));
}

#[tokio::test]
async fn test_annotation_from_file() {
    let net = insulin_network().await;
    let file = measurement_file(MEASUREMENTS);
    let network = configured(&net, 1);

    let table = network.load_measurements(file.path()).unwrap();
    assert_eq!(table.len(), 6);
    let summary = network.annotate_measurements(&table, "2").await.unwrap();
    assert_eq!(summary.annotated, 5);
    assert_eq!(summary.unmatched, vec!["Q99999".to_string()]);
    // INSR (0.001), IRS1 (0.01), AKT1 (0.02) fall below 0.05
    assert_eq!(summary.significant, 3);

    let insr = node(&network, net.insr).await.measurement("2").unwrap();
    assert_eq!(insr.abundance, Some(2.5));
    assert_eq!(insr.support, Some(2.0));
    assert_eq!(insr.p_value, Some(0.001));
    assert!(node(&network, net.gsk3b).await.measurement("2").unwrap().significant == Some(false));

    let sub = network.minimal_connection_network("2").await.unwrap();
    assert_eq!(sub.terminals, vec![net.insr, net.irs1, net.akt1]);
}
