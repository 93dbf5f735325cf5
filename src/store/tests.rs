use std::thread;

use chrono::TimeZone;

use super::*;

fn store() -> RatingStore {
    RatingStore::open_in_memory(ScoreBounds::default()).expect("in-memory store")
}

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 11, 20, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

#[test]
fn upsert_then_list_returns_the_rating_unchanged() {
    let mut store = store();
    let outcome = store
        .upsert_at("case_01", "rater-a", Scores::new(7, 4, 1), at(9))
        .expect("valid rating");
    assert_eq!(outcome, UpsertOutcome::Inserted);

    let ratings = store.list_by_rater("rater-a").expect("list");
    assert_eq!(
        ratings,
        vec![Rating {
            sample_id: "case_01".to_string(),
            rater_id: "rater-a".to_string(),
            scores: Scores::new(7, 4, 1),
            timestamp: at(9),
            needs_review: false,
        }]
    );
}

#[test]
fn resubmission_overwrites_instead_of_duplicating() {
    let mut store = store();
    store
        .upsert_at("case_01", "rater-a", Scores::new(1, 1, 1), at(9))
        .expect("first");
    let outcome = store
        .upsert_at("images/case_01.jpg", "rater-a", Scores::new(5, 6, 7), at(10))
        .expect("second");
    assert_eq!(outcome, UpsertOutcome::Updated);

    let ratings = store.list_by_rater("rater-a").expect("list");
    assert_eq!(ratings.len(), 1);
    assert_eq!(ratings[0].scores, Scores::new(5, 6, 7));
    assert_eq!(ratings[0].timestamp, at(10));
    assert_eq!(store.count_ratings().expect("count"), 1);
}

#[test]
fn out_of_bound_dimension_is_rejected_without_touching_prior_state() {
    let mut store = store();
    store
        .upsert_at("case_01", "rater-a", Scores::new(3, 3, 3), at(9))
        .expect("valid");

    for bad in [Scores::new(0, 3, 3), Scores::new(3, 8, 3), Scores::new(3, 3, 30)] {
        let err = store
            .upsert_at("case_01", "rater-a", bad, at(11))
            .expect_err("out of bound");
        assert!(matches!(err, RatingError::Validation(_)));
    }

    let err = store
        .upsert_at("case_02", "rater-a", Scores::new(-1, 1, 1), at(11))
        .expect_err("out of bound");
    assert!(matches!(err, RatingError::Validation(_)));

    let ratings = store.list_by_rater("rater-a").expect("list");
    assert_eq!(ratings.len(), 1);
    assert_eq!(ratings[0].scores, Scores::new(3, 3, 3));
    assert_eq!(ratings[0].timestamp, at(9));
}

#[test]
fn empty_ids_are_validation_errors() {
    let mut store = store();
    assert!(matches!(
        store.upsert("", "rater-a", Scores::new(1, 1, 1)),
        Err(RatingError::Validation(_))
    ));
    assert!(matches!(
        store.upsert("case_01", "   ", Scores::new(1, 1, 1)),
        Err(RatingError::Validation(_))
    ));
    assert_eq!(store.count_ratings().expect("count"), 0);
}

#[test]
fn ratings_are_isolated_per_rater() {
    let mut store = store();
    store.upsert("case_01", "rater-a", Scores::new(1, 2, 3)).expect("a");
    store.upsert("case_01", "rater-b", Scores::new(7, 7, 7)).expect("b");
    store.upsert("case_02", "rater-b", Scores::new(2, 2, 2)).expect("b2");

    assert_eq!(store.list_by_rater("rater-a").expect("a").len(), 1);
    assert_eq!(store.list_by_rater("rater-b").expect("b").len(), 2);
    assert!(store.list_by_rater("nobody").expect("none").is_empty());

    let raters = store.list_raters().expect("raters");
    let counts: Vec<(&str, i64)> = raters
        .iter()
        .map(|summary| (summary.rater_id.as_str(), summary.ratings))
        .collect();
    assert_eq!(counts, vec![("rater-a", 1), ("rater-b", 2)]);
}

#[test]
fn configured_bound_is_enforced() {
    let mut store =
        RatingStore::open_in_memory(ScoreBounds { min: 1, max: 3 }).expect("store");
    assert!(store.upsert("case_01", "rater-a", Scores::new(3, 3, 3)).is_ok());
    assert!(store.upsert("case_01", "rater-a", Scores::new(4, 3, 3)).is_err());
}

#[test]
fn reopening_a_file_store_preserves_rows() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ratings.db");

    {
        let mut store = RatingStore::open(&path, ScoreBounds::default()).expect("open");
        store
            .upsert_at("case_01", "rater-a", Scores::new(2, 2, 2), at(9))
            .expect("write");
    }

    let store = RatingStore::open(&path, ScoreBounds::default()).expect("reopen");
    let ratings = store.list_by_rater("rater-a").expect("list");
    assert_eq!(ratings.len(), 1);
    assert_eq!(ratings[0].scores, Scores::new(2, 2, 2));
}

#[test]
fn concurrent_upserts_on_one_key_leave_a_single_row() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ratings.db");
    RatingStore::open(&path, ScoreBounds::default()).expect("create schema");

    let workers: Vec<_> = (0..4_i64)
        .map(|worker| {
            let path = path.clone();
            thread::spawn(move || {
                let mut store = RatingStore::open(&path, ScoreBounds::default()).expect("open");
                for round in 0..25_i64 {
                    let value = (worker + round) % 7 + 1;
                    store
                        .upsert("case_01", "rater-a", Scores::new(value, value, value))
                        .expect("upsert");
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker panicked");
    }

    let store = RatingStore::open(&path, ScoreBounds::default()).expect("reopen");
    assert_eq!(store.count_ratings().expect("count"), 1);
    let rating = &store.list_by_rater("rater-a").expect("list")[0];
    let Scores {
        image_quality,
        text_quality,
        consistency,
    } = rating.scores;
    assert!(image_quality == text_quality && text_quality == consistency);
}

#[test]
fn reset_drops_rows_and_keeps_store_usable() {
    let mut store = store();
    store.upsert("case_01", "rater-a", Scores::new(1, 1, 1)).expect("a");
    store.upsert("case_02", "rater-a", Scores::new(1, 1, 1)).expect("b");

    assert_eq!(store.reset().expect("reset"), 2);
    assert_eq!(store.count_ratings().expect("count"), 0);
    store.upsert("case_01", "rater-a", Scores::new(1, 1, 1)).expect("after reset");
}

#[test]
fn repair_rows_only_counts_changed_rows_and_flags_them() {
    let mut store = store();
    store.upsert("case_01", "rater-a", Scores::new(7, 1, 1)).expect("a");
    store.upsert("case_02", "rater-a", Scores::new(1, 1, 1)).expect("b");

    let repaired = store
        .repair_rows("rater-a", |scores| scores.map(|value| value.min(3)))
        .expect("repair");
    assert_eq!(repaired, 1);
    assert_eq!(store.count_needs_review().expect("flags"), 1);

    let ratings = store.list_by_rater("rater-a").expect("list");
    assert_eq!(ratings[0].scores, Scores::new(3, 1, 1));
    assert!(ratings[0].needs_review);
    assert!(!ratings[1].needs_review);
}

fn write_legacy_db(path: &Path) {
    let legacy = Connection::open(path).expect("legacy db");
    legacy
        .execute_batch(
            "
            CREATE TABLE ratings
            (id INTEGER PRIMARY KEY AUTOINCREMENT,
             image_id TEXT,
             rater_id TEXT,
             image_quality INTEGER,
             text_quality INTEGER,
             consistency INTEGER,
             timestamp DATETIME);
            INSERT INTO ratings(image_id, rater_id, image_quality, text_quality, consistency, timestamp)
            VALUES
              ('/static/images/case_01.jpg', 'GaoJie', 2, 2, 2, '2024-11-01 08:00:00'),
              ('case_01', 'GaoJie', 3, 3, 1, '2024-11-02 08:00:00'),
              ('case_02.jpg', 'GaoJie', 30, 2, 1, '2024-11-02 09:00:00'),
              (NULL, 'GaoJie', 1, 1, 1, '2024-11-02 10:00:00');
            ",
        )
        .expect("legacy rows");
}

#[test]
fn import_legacy_canonicalizes_ids_keeps_latest_and_flags_out_of_bound_rows() {
    let dir = tempfile::tempdir().expect("tempdir");
    let legacy_path = dir.path().join("legacy.db");
    write_legacy_db(&legacy_path);

    let mut store = store();
    let summary = store.import_legacy(&legacy_path).expect("import");

    assert_eq!(summary.rows_read, 4);
    assert_eq!(summary.rows_skipped, 1);
    assert_eq!(summary.rows_applied, 3);
    assert_eq!(summary.rows_flagged, 1);

    let ratings = store.list_by_rater("GaoJie").expect("list");
    assert_eq!(ratings.len(), 2);
    assert_eq!(ratings[0].sample_id, "case_01");
    assert_eq!(ratings[0].scores, Scores::new(3, 3, 1));
    assert_eq!(ratings[1].sample_id, "case_02");
    assert_eq!(ratings[1].scores, Scores::new(30, 2, 1));
    assert!(ratings[1].needs_review);
}

#[test]
fn opening_a_legacy_database_directly_is_refused() {
    let dir = tempfile::tempdir().expect("tempdir");
    let legacy_path = dir.path().join("legacy.db");
    write_legacy_db(&legacy_path);

    let err = RatingStore::open(&legacy_path, ScoreBounds::default())
        .err()
        .expect("legacy schema should be refused");
    assert!(matches!(err, RatingError::Validation(_)));

    let legacy = Connection::open(&legacy_path).expect("legacy db");
    let journal_mode: String = legacy
        .query_row("PRAGMA journal_mode", [], |row| row.get(0))
        .expect("journal mode");
    assert_eq!(journal_mode, "delete");
    assert!(
        table_columns(&legacy, "metadata")
            .expect("columns")
            .is_empty()
    );
}

fn metadata_value(path: &Path, key: &str) -> String {
    let connection = Connection::open(path).expect("db");
    connection
        .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| row.get(0))
        .expect("metadata row")
}

#[test]
fn read_only_open_reports_counts_without_touching_the_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ratings.db");
    {
        let mut store = RatingStore::open(&path, ScoreBounds::default()).expect("open");
        store.upsert("case_01", "rater-a", Scores::new(7, 1, 1)).expect("a");
        store.upsert("case_02", "rater-b", Scores::new(2, 2, 2)).expect("b");
        store
            .repair_rows("rater-a", |scores| scores.map(|value| value.min(3)))
            .expect("repair");
    }
    let updated_at = metadata_value(&path, "db_updated_at");

    let mut store = RatingStore::open_read_only(&path, ScoreBounds::default()).expect("read only");
    assert_eq!(store.count_ratings().expect("count"), 2);
    assert_eq!(store.count_needs_review().expect("flags"), 1);
    assert_eq!(store.list_raters().expect("raters").len(), 2);
    assert!(store.upsert("case_03", "rater-a", Scores::new(1, 1, 1)).is_err());
    drop(store);

    assert_eq!(metadata_value(&path, "db_updated_at"), updated_at);
}

#[test]
fn read_only_open_refuses_legacy_and_foreign_databases() {
    let dir = tempfile::tempdir().expect("tempdir");
    let legacy_path = dir.path().join("legacy.db");
    write_legacy_db(&legacy_path);
    assert!(matches!(
        RatingStore::open_read_only(&legacy_path, ScoreBounds::default()),
        Err(RatingError::Validation(_))
    ));

    let empty_path = dir.path().join("empty.db");
    Connection::open(&empty_path)
        .expect("empty db")
        .execute_batch("CREATE TABLE unrelated (id INTEGER);")
        .expect("unrelated table");
    assert!(matches!(
        RatingStore::open_read_only(&empty_path, ScoreBounds::default()),
        Err(RatingError::Validation(_))
    ));
}

#[test]
fn parse_legacy_timestamp_accepts_sqlite_and_rfc3339_forms() {
    assert_eq!(parse_legacy_timestamp("2024-11-20 09:00:00"), Some(at(9)));
    assert_eq!(parse_legacy_timestamp("2024-11-20T09:00:00Z"), Some(at(9)));
    assert_eq!(parse_legacy_timestamp("yesterday"), None);
}
