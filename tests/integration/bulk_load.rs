mod util;

use tempfile::tempdir;
use tessera::{
    snapshot, Any, AnyOwned, ColumnData, EdgeSource, GraphDb, GraphError, LabelId,
    LoadingConfig, RecordBatch, RecordBatchSupplier, Result, VecSupplier, VertexSource,
};
use util::{person_schema, rich_schema, E, V};

fn person_batch(ids: &[i64], names: &[&str]) -> RecordBatch {
    RecordBatch {
        columns: vec![
            ColumnData::Int64(ids.to_vec()),
            ColumnData::Str(names.iter().map(|s| s.to_string()).collect()),
        ],
    }
}

fn knows_batch(rows: &[(i64, i64, f64)]) -> RecordBatch {
    RecordBatch {
        columns: vec![
            ColumnData::Int64(rows.iter().map(|r| r.0).collect()),
            ColumnData::Int64(rows.iter().map(|r| r.1).collect()),
            ColumnData::Double(rows.iter().map(|r| r.2).collect()),
        ],
    }
}

#[test]
fn bulk_load_matches_transactional_ingest() -> Result<()> {
    let dir = tempdir()?;
    let loading = LoadingConfig {
        vertices: vec![VertexSource {
            label: "V".into(),
            supplier: Box::new(VecSupplier::new(
                &["id", "name"],
                vec![person_batch(&[1, 2], &["alice", "bob"])],
            )),
        }],
        edges: vec![EdgeSource {
            src: "V".into(),
            dst: "V".into(),
            edge: "E".into(),
            supplier: Box::new(VecSupplier::new(
                &["src", "dst", "weight"],
                vec![knows_batch(&[(1, 2, 0.5)])],
            )),
        }],
    };
    GraphDb::bulk_load(dir.path(), &person_schema(), loading, 2)?;

    let db = GraphDb::open(dir.path(), person_schema())?;
    let read = db.begin_read();
    assert_eq!(read.vertex_count(V)?, 2);
    let va = read.lookup(V, &Any::Int64(1))?.expect("alice loaded");
    let vb = read.lookup(V, &Any::Int64(2))?.expect("bob loaded");
    assert_eq!(read.vertex_field(V, va, 0)?, AnyOwned::Str("alice".into()));
    assert_eq!(read.vertex_field(V, vb, 0)?, AnyOwned::Str("bob".into()));
    let out = read.out_edges(V, V, E, va)?;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].nbr, vb);
    assert_eq!(out[0].data, AnyOwned::Double(0.5));
    let incoming = read.in_edges(V, V, E, vb)?;
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].nbr, va);
    Ok(())
}

#[test]
fn bulk_load_is_updatable_after_open() -> Result<()> {
    let dir = tempdir()?;
    let loading = LoadingConfig {
        vertices: vec![VertexSource {
            label: "V".into(),
            supplier: Box::new(VecSupplier::new(
                &["id", "name"],
                vec![person_batch(&[1, 2], &["alice", "bob"])],
            )),
        }],
        edges: vec![],
    };
    GraphDb::bulk_load(dir.path(), &person_schema(), loading, 2)?;

    let db = GraphDb::open(dir.path(), person_schema())?;
    let mut txn = db.begin_update()?;
    txn.add_vertex(V, &Any::Int64(3), &[Any::Str("carol")])?;
    txn.add_edge(V, &Any::Int64(1), V, &Any::Int64(3), E, &Any::Double(2.0))?;
    txn.commit()?;

    let read = db.begin_read();
    assert_eq!(read.vertex_count(V)?, 3);
    let va = read.lookup(V, &Any::Int64(1))?.unwrap();
    let vc = read.lookup(V, &Any::Int64(3))?.unwrap();
    assert_eq!(vc.0, 2, "loaded vids are dense, new vids extend them");
    let out = read.out_edges(V, V, E, va)?;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].nbr, vc);
    Ok(())
}

#[test]
fn duplicate_primary_keys_fail_the_load() {
    let dir = tempdir().unwrap();
    let loading = LoadingConfig {
        vertices: vec![VertexSource {
            label: "V".into(),
            supplier: Box::new(VecSupplier::new(
                &["id", "name"],
                vec![person_batch(&[1, 1], &["alice", "alias"])],
            )),
        }],
        edges: vec![],
    };
    let err = GraphDb::bulk_load(dir.path(), &person_schema(), loading, 2).unwrap_err();
    assert!(matches!(err, GraphError::Duplicate));
    assert!(
        !snapshot::version_path(dir.path()).exists(),
        "a failed load must not be promoted"
    );
}

#[test]
fn unknown_edge_endpoint_fails_fast() {
    let dir = tempdir().unwrap();
    let loading = LoadingConfig {
        vertices: vec![VertexSource {
            label: "V".into(),
            supplier: Box::new(VecSupplier::new(
                &["id", "name"],
                vec![person_batch(&[1], &["alice"])],
            )),
        }],
        edges: vec![EdgeSource {
            src: "V".into(),
            dst: "V".into(),
            edge: "E".into(),
            supplier: Box::new(VecSupplier::new(
                &["src", "dst", "weight"],
                vec![knows_batch(&[(1, 42, 0.5)])],
            )),
        }],
    };
    let err = GraphDb::bulk_load(dir.path(), &person_schema(), loading, 2).unwrap_err();
    assert!(matches!(err, GraphError::BadInput(_)));
    assert!(!snapshot::version_path(dir.path()).exists());
}

#[test]
fn mismatched_columns_are_bad_input() {
    let dir = tempdir().unwrap();
    let loading = LoadingConfig {
        vertices: vec![VertexSource {
            label: "V".into(),
            supplier: Box::new(VecSupplier::new(
                &["id", "wrong_name"],
                vec![person_batch(&[1], &["alice"])],
            )),
        }],
        edges: vec![],
    };
    let err = GraphDb::bulk_load(dir.path(), &person_schema(), loading, 1).unwrap_err();
    assert!(matches!(err, GraphError::BadInput(_)));
}

/// Supplier whose batches error after a while, to abort mid-load.
struct FailingSupplier {
    names: Vec<String>,
}

impl RecordBatchSupplier for FailingSupplier {
    fn column_names(&self) -> Vec<String> {
        self.names.clone()
    }

    fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        Err(GraphError::BadInput("source went away".into()))
    }
}

#[test]
fn interrupted_load_resumes_without_reingesting_vertices() -> Result<()> {
    let dir = tempdir()?;
    let failing = LoadingConfig {
        vertices: vec![VertexSource {
            label: "V".into(),
            supplier: Box::new(VecSupplier::new(
                &["id", "name"],
                vec![person_batch(&[1, 2], &["alice", "bob"])],
            )),
        }],
        edges: vec![EdgeSource {
            src: "V".into(),
            dst: "V".into(),
            edge: "E".into(),
            supplier: Box::new(FailingSupplier {
                names: vec!["src".into(), "dst".into(), "weight".into()],
            }),
        }],
    };
    let err = GraphDb::bulk_load(dir.path(), &person_schema(), failing, 2).unwrap_err();
    assert!(matches!(err, GraphError::BadInput(_)));

    // The progress log records the committed vertex label.
    let progress = std::fs::read_to_string(snapshot::bulk_load_progress_path(dir.path()))?;
    assert!(progress.contains("VERTEX V Committed"));
    assert!(!progress.contains("EDGE V E V Committed"));

    // Resume with a working edge source; the vertex phase is skipped.
    let resume = LoadingConfig {
        vertices: vec![],
        edges: vec![EdgeSource {
            src: "V".into(),
            dst: "V".into(),
            edge: "E".into(),
            supplier: Box::new(VecSupplier::new(
                &["src", "dst", "weight"],
                vec![knows_batch(&[(1, 2, 0.5)])],
            )),
        }],
    };
    GraphDb::bulk_load(dir.path(), &person_schema(), resume, 2)?;

    let db = GraphDb::open(dir.path(), person_schema())?;
    let read = db.begin_read();
    assert_eq!(read.vertex_count(V)?, 2);
    let va = read.lookup(V, &Any::Int64(1))?.unwrap();
    assert_eq!(read.out_edges(V, V, E, va)?.len(), 1);
    Ok(())
}

#[test]
fn rich_schema_round_trips_through_the_loader() -> Result<()> {
    let person = LabelId(0);
    let city = LabelId(1);
    let lives_in = LabelId(0);

    let dir = tempdir()?;
    let loading = LoadingConfig {
        vertices: vec![
            VertexSource {
                label: "PERSON".into(),
                supplier: Box::new(VecSupplier::new(
                    &["id", "name", "age", "nickname"],
                    vec![RecordBatch {
                        columns: vec![
                            ColumnData::Int64(vec![10, 20]),
                            ColumnData::Str(vec!["alice".into(), "bob".into()]),
                            ColumnData::Int32(vec![30, 41]),
                            ColumnData::Str(vec!["al".into(), "".into()]),
                        ],
                    }],
                )),
            },
            VertexSource {
                label: "CITY".into(),
                supplier: Box::new(VecSupplier::new(
                    &["code", "population"],
                    vec![RecordBatch {
                        columns: vec![
                            ColumnData::Str(vec!["ams".into(), "ber".into()]),
                            ColumnData::Int64(vec![900_000, 3_700_000]),
                        ],
                    }],
                )),
            },
        ],
        edges: vec![EdgeSource {
            src: "PERSON".into(),
            dst: "CITY".into(),
            edge: "LIVES_IN".into(),
            supplier: Box::new(VecSupplier::new(
                &["src", "dst", "since", "street"],
                vec![RecordBatch {
                    columns: vec![
                        ColumnData::Int64(vec![10, 20]),
                        ColumnData::Str(vec!["ams".into(), "ber".into()]),
                        ColumnData::Date(vec![1_600_000_000_000, 1_700_000_000_000]),
                        ColumnData::Str(vec!["canal 1".into(), "strasse 2".into()]),
                    ],
                }],
            )),
        }],
    };
    GraphDb::bulk_load(dir.path(), &rich_schema(), loading, 3)?;

    let db = GraphDb::open(dir.path(), rich_schema())?;
    let read = db.begin_read();
    assert_eq!(read.vertex_count(person)?, 2);
    assert_eq!(read.vertex_count(city)?, 2);

    let alice = read.lookup(person, &Any::Int64(10))?.expect("alice");
    let ams = read.lookup(city, &Any::Str("ams"))?.expect("string key");
    assert_eq!(read.vertex_field(person, alice, 1)?, AnyOwned::Int32(30));
    assert_eq!(read.vertex_field(person, alice, 2)?, AnyOwned::Str("al".into()));
    assert_eq!(
        read.vertex_field(city, ams, 0)?,
        AnyOwned::Int64(900_000)
    );

    // Multi-property edge data reads back as a record view.
    let out = read.out_edges(person, city, lives_in, alice)?;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].nbr, ams);
    match &out[0].data {
        AnyOwned::Record(fields) => {
            assert_eq!(fields[0], AnyOwned::Date(1_600_000_000_000));
            assert_eq!(fields[1], AnyOwned::Str("canal 1".into()));
        }
        other => panic!("expected record edge data, got {other:?}"),
    }
    Ok(())
}

#[test]
fn bulk_load_rejects_a_populated_root() -> Result<()> {
    let dir = tempdir()?;
    {
        let _db = GraphDb::open(dir.path(), person_schema())?;
    }
    let loading = LoadingConfig {
        vertices: vec![],
        edges: vec![],
    };
    let err = GraphDb::bulk_load(dir.path(), &person_schema(), loading, 1).unwrap_err();
    assert!(matches!(err, GraphError::Disallowed(_)));
    Ok(())
}
