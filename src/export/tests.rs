use chrono::TimeZone;

use super::*;
use crate::catalog::CatalogSource;
use crate::model::Sample;

fn catalog(ids: &[&str]) -> Catalog {
    Catalog {
        source: CatalogSource::Manifest {
            path: "selected_pairs.json".to_string(),
        },
        samples: ids
            .iter()
            .map(|id| Sample {
                id: id.to_string(),
                text: format!("report for {id}"),
                image_reference: format!("/static/images/{id}.jpg"),
            })
            .collect(),
        warnings: Vec::new(),
    }
}

fn rating(sample_id: &str, scores: Scores) -> Rating {
    Rating {
        sample_id: sample_id.to_string(),
        rater_id: "X".to_string(),
        scores,
        timestamp: fixed_time(),
        needs_review: false,
    }
}

fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 12, 1, 10, 22, 3)
        .single()
        .expect("valid timestamp")
}

fn exporter() -> Exporter {
    Exporter::new(ScoreBounds::default())
}

#[test]
fn unrated_samples_are_included_with_zero_totals_and_ranked_last() {
    let catalog = catalog(&["A", "B", "C"]);
    let ratings = vec![
        rating("A", Scores::new(7, 7, 7)),
        rating("B", Scores::new(1, 1, 1)),
    ];

    let artifact = exporter()
        .export_at("X", &catalog, &ratings, fixed_time())
        .expect("export");

    let summary: Vec<(&str, i64, usize)> = artifact
        .results
        .iter()
        .map(|r| (r.sample_id.as_str(), r.total_score, r.rank))
        .collect();
    assert_eq!(summary, vec![("A", 21, 1), ("B", 3, 2), ("C", 0, 3)]);
    assert_eq!(artifact.total_samples, 3);
    assert_eq!(artifact.rated_samples, 2);
    assert_eq!(artifact.results[2].image_quality, 0);
    assert_eq!(artifact.results[0].text, "report for A");
}

#[test]
fn artifact_carries_rating_system_metadata() {
    let artifact = exporter()
        .export_at("X", &catalog(&["A"]), &[rating("A", Scores::new(2, 3, 4))], fixed_time())
        .expect("export");

    assert_eq!(artifact.artifact_version, EXPORT_ARTIFACT_VERSION);
    assert_eq!(artifact.generated_at, "2024-12-01T10:22:03Z");
    assert_eq!(artifact.rating_system.max_per_dimension, 7);
    assert_eq!(artifact.rating_system.max_total, 21);
    assert_eq!(
        artifact.rating_system.dimensions,
        vec!["image_quality", "text_quality", "consistency"]
    );
    assert_eq!(
        artifact.catalog_fingerprint.as_deref(),
        Some(catalog(&["A"]).fingerprint().as_str())
    );
}

#[test]
fn ties_keep_catalog_order() {
    let catalog = catalog(&["d", "a", "c", "b"]);
    let ratings = vec![
        rating("a", Scores::new(2, 2, 2)),
        rating("b", Scores::new(3, 3, 3)),
        rating("c", Scores::new(1, 2, 3)),
        rating("d", Scores::new(2, 2, 2)),
    ];

    let artifact = exporter()
        .export_at("X", &catalog, &ratings, fixed_time())
        .expect("export");

    let order: Vec<&str> = artifact.results.iter().map(|r| r.sample_id.as_str()).collect();
    assert_eq!(order, vec!["b", "d", "a", "c"]);
}

#[test]
fn ranks_are_gap_free_and_totals_non_increasing() {
    let ids: Vec<String> = (0..40).map(|i| format!("s{i:02}")).collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let catalog = catalog(&id_refs);
    let ratings: Vec<Rating> = ids
        .iter()
        .enumerate()
        .filter(|(i, _)| i % 3 != 0)
        .map(|(i, id)| {
            let i = i as i64;
            rating(id, Scores::new(i % 7 + 1, (i * 5) % 7 + 1, (i * 3) % 7 + 1))
        })
        .collect();

    let artifact = exporter()
        .export_at("X", &catalog, &ratings, fixed_time())
        .expect("export");

    let ranks: Vec<usize> = artifact.results.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, (1..=40).collect::<Vec<_>>());
    for pair in artifact.results.windows(2) {
        assert!(pair[0].total_score >= pair[1].total_score);
    }
}

#[test]
fn export_is_deterministic_for_identical_inputs() {
    let catalog = catalog(&["A", "B", "C", "D"]);
    let ratings = vec![
        rating("C", Scores::new(4, 4, 4)),
        rating("A", Scores::new(4, 4, 4)),
        rating("D", Scores::new(1, 1, 1)),
    ];

    let first = exporter()
        .export_at("X", &catalog, &ratings, fixed_time())
        .expect("first");
    let mut reversed = ratings.clone();
    reversed.reverse();
    let second = exporter()
        .export_at("X", &catalog, &reversed, fixed_time())
        .expect("second");

    assert_eq!(
        serde_json::to_vec(&first.results).expect("serialize"),
        serde_json::to_vec(&second.results).expect("serialize")
    );
}

#[test]
fn rater_without_ratings_is_a_no_data_error() {
    let err = exporter()
        .export_at("nobody", &catalog(&["A"]), &[], fixed_time())
        .expect_err("no data");
    assert!(matches!(err, RatingError::NoData { rater_id } if rater_id == "nobody"));
}

#[test]
fn ratings_outside_the_catalog_and_path_like_ids_are_handled() {
    let catalog = catalog(&["A", "B"]);
    let ratings = vec![
        rating("/static/images/B.jpg", Scores::new(3, 3, 3)),
        rating("retired_sample", Scores::new(7, 7, 7)),
    ];

    let artifact = exporter()
        .export_at("X", &catalog, &ratings, fixed_time())
        .expect("export");

    assert_eq!(artifact.total_samples, 2);
    assert_eq!(artifact.rated_samples, 1);
    assert_eq!(artifact.results[0].sample_id, "B");
    assert_eq!(artifact.results[0].total_score, 9);
}

#[test]
fn rater_whose_ratings_all_fall_outside_the_catalog_is_a_no_data_error() {
    let ratings = vec![rating("retired", Scores::new(5, 5, 5))];

    let err = exporter()
        .export_at("X", &catalog(&["A", "B"]), &ratings, fixed_time())
        .expect_err("nothing to export");
    assert!(matches!(err, RatingError::NoData { rater_id } if rater_id == "X"));
}

#[test]
fn artifact_file_names_are_sanitized_and_distinguish_snapshots() {
    assert_eq!(
        artifact_file_name("GaoJie", ArtifactNaming::Latest).expect("name"),
        "rating_results_GaoJie.json"
    );
    assert_eq!(
        artifact_file_name("高洁", ArtifactNaming::Latest).expect("name"),
        "rating_results_高洁.json"
    );

    let sanitized = artifact_file_name("../evil rater", ArtifactNaming::Latest).expect("name");
    assert!(sanitized.starts_with("rating_results____evil_rater."));
    assert!(sanitized.ends_with(".json"));
    assert!(!sanitized.contains('/'));

    assert_eq!(
        artifact_file_name(
            "GaoJie",
            ArtifactNaming::Snapshot {
                taken_at: fixed_time()
            }
        )
        .expect("name"),
        "rating_results_GaoJie_20241201T102203Z.json"
    );
}

#[test]
fn raters_that_sanitize_alike_get_distinct_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let catalog = catalog(&["A"]);
    let ratings = [rating("A", Scores::new(1, 1, 1))];

    let spaced = exporter()
        .export_at("lab a", &catalog, &ratings, fixed_time())
        .expect("export");
    let underscored = exporter()
        .export_at("lab_a", &catalog, &ratings, fixed_time())
        .expect("export");

    let spaced_path = write_artifact(dir.path(), &spaced, ArtifactNaming::Latest).expect("write");
    let underscored_path =
        write_artifact(dir.path(), &underscored, ArtifactNaming::Latest).expect("write");

    assert_ne!(spaced_path, underscored_path);
    assert_eq!(read_artifact(&spaced_path).expect("read").rater_id, "lab a");
    assert_eq!(read_artifact(&underscored_path).expect("read").rater_id, "lab_a");
    assert_eq!(
        latest_artifact_path(dir.path(), "lab a").expect("path"),
        spaced_path
    );
    assert_ne!(
        artifact_file_name("lab a", ArtifactNaming::Latest).expect("name"),
        artifact_file_name("lab.a", ArtifactNaming::Latest).expect("name")
    );
}

#[test]
fn written_artifacts_read_back_and_discovery_skips_snapshots() {
    let dir = tempfile::tempdir().expect("tempdir");
    let artifact = exporter()
        .export_at("X", &catalog(&["A", "B"]), &[rating("A", Scores::new(1, 2, 3))], fixed_time())
        .expect("export");

    let latest = write_artifact(dir.path(), &artifact, ArtifactNaming::Latest).expect("latest");
    let snapshot = write_artifact(
        dir.path(),
        &artifact,
        ArtifactNaming::Snapshot {
            taken_at: fixed_time(),
        },
    )
    .expect("snapshot");
    fs::write(dir.path().join("selected_pairs.json"), "[]").expect("unrelated file");

    assert_eq!(snapshot.parent(), Some(dir.path().join("snapshots").as_path()));
    assert_eq!(read_artifact(&latest).expect("read back"), artifact);
    assert_eq!(read_artifact(&snapshot).expect("read snapshot"), artifact);
    assert_eq!(latest_artifact_path(dir.path(), "X").expect("path"), latest);
    assert_eq!(
        discover_latest_artifacts(dir.path()).expect("discover"),
        vec![latest]
    );
}

#[test]
fn rater_id_shaped_like_a_snapshot_suffix_is_still_discovered() {
    let dir = tempfile::tempdir().expect("tempdir");
    let artifact = exporter()
        .export_at(
            "lab_20241201T102203Z",
            &catalog(&["A"]),
            &[rating("A", Scores::new(1, 2, 3))],
            fixed_time(),
        )
        .expect("export");

    let latest = write_artifact(dir.path(), &artifact, ArtifactNaming::Latest).expect("latest");

    assert_eq!(
        discover_latest_artifacts(dir.path()).expect("discover"),
        vec![latest]
    );
}

#[test]
fn export_stamps_the_current_time() {
    let before = Utc::now() - chrono::Duration::seconds(1);
    let artifact = exporter()
        .export("X", &catalog(&["A"]), &[rating("A", Scores::new(1, 1, 1))])
        .expect("export");

    let generated_at = DateTime::parse_from_rfc3339(&artifact.generated_at)
        .expect("rfc3339 timestamp")
        .with_timezone(&Utc);
    assert!(generated_at >= before);
}
