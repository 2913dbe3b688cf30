mod util;

use tempfile::tempdir;
use tessera::{Any, AnyOwned, Dir, GraphDb, GraphError, Result, Vid};
use util::{person_schema, single_out_schema, E, V};

#[test]
fn insert_and_read_back() -> Result<()> {
    let dir = tempdir()?;
    let db = GraphDb::open(dir.path(), person_schema())?;

    let mut txn = db.begin_update()?;
    txn.add_vertex(V, &Any::Int64(1), &[Any::Str("alice")])?;
    txn.add_vertex(V, &Any::Int64(2), &[Any::Str("bob")])?;
    txn.add_edge(V, &Any::Int64(1), V, &Any::Int64(2), E, &Any::Double(0.5))?;
    let ts = txn.commit()?;

    let read = db.begin_read();
    assert_eq!(read.vertex_count(V)?, 2);
    let va = read.lookup(V, &Any::Int64(1))?.expect("alice resolves");
    let vb = read.lookup(V, &Any::Int64(2))?.expect("bob resolves");
    assert_eq!(read.vertex_field(V, va, 0)?, AnyOwned::Str("alice".into()));
    assert_eq!(read.vertex_field(V, vb, 0)?, AnyOwned::Str("bob".into()));
    assert_eq!(read.vertex_oid(V, va)?, AnyOwned::Int64(1));

    let out = read.out_edges(V, V, E, va)?;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].nbr, vb);
    assert_eq!(out[0].data, AnyOwned::Double(0.5));
    assert_eq!(out[0].ts, ts);

    let incoming = read.in_edges(V, V, E, vb)?;
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].nbr, va);
    assert_eq!(incoming[0].data, AnyOwned::Double(0.5));
    assert_eq!(incoming[0].ts, ts);
    Ok(())
}

#[test]
fn abort_leaves_no_trace() -> Result<()> {
    let dir = tempdir()?;
    let db = GraphDb::open(dir.path(), person_schema())?;

    let mut txn = db.begin_update()?;
    txn.add_vertex(V, &Any::Int64(3), &[Any::Str("carol")])?;
    txn.abort();

    let read = db.begin_read();
    assert_eq!(read.lookup(V, &Any::Int64(3))?, None);
    assert_eq!(read.vertex_count(V)?, 0);
    let records = tessera::wal::scan(&tessera::snapshot::wal_dir(dir.path()))?;
    assert!(records.is_empty(), "abort must not write a wal record");
    Ok(())
}

#[test]
fn dropped_transaction_behaves_like_abort() -> Result<()> {
    let dir = tempdir()?;
    let db = GraphDb::open(dir.path(), person_schema())?;
    {
        let mut txn = db.begin_update()?;
        txn.add_vertex(V, &Any::Int64(9), &[Any::Str("ghost")])?;
        // Dropped without commit.
    }
    // The write slot is free again and nothing is visible.
    let mut txn = db.begin_update()?;
    txn.add_vertex(V, &Any::Int64(1), &[Any::Str("alice")])?;
    txn.commit()?;
    let read = db.begin_read();
    assert_eq!(read.lookup(V, &Any::Int64(9))?, None);
    assert_eq!(read.vertex_count(V)?, 1);
    Ok(())
}

#[test]
fn type_mismatch_is_recoverable() -> Result<()> {
    let dir = tempdir()?;
    let db = GraphDb::open(dir.path(), person_schema())?;

    let mut txn = db.begin_update()?;
    let err = txn
        .add_vertex(V, &Any::Int64(4), &[Any::Int64(42)])
        .unwrap_err();
    assert!(matches!(err, GraphError::TypeMismatch(_)));
    assert_eq!(txn.op_count(), 0);

    txn.add_vertex(V, &Any::Int64(4), &[Any::Str("dave")])?;
    txn.commit()?;

    let read = db.begin_read();
    assert_eq!(read.vertex_count(V)?, 1);
    let vid = read.lookup(V, &Any::Int64(4))?.expect("dave resolves");
    assert_eq!(read.vertex_field(V, vid, 0)?, AnyOwned::Str("dave".into()));
    Ok(())
}

#[test]
fn add_edge_with_unknown_endpoint_fails_without_staging() -> Result<()> {
    let dir = tempdir()?;
    let db = GraphDb::open(dir.path(), person_schema())?;

    let mut txn = db.begin_update()?;
    txn.add_vertex(V, &Any::Int64(1), &[Any::Str("alice")])?;
    let before = txn.op_count();
    let err = txn
        .add_edge(V, &Any::Int64(1), V, &Any::Int64(999), E, &Any::Double(1.0))
        .unwrap_err();
    assert!(matches!(err, GraphError::NotFound(_)));
    assert_eq!(txn.op_count(), before);
    txn.commit()?;
    Ok(())
}

#[test]
fn edges_to_staged_vertices_resolve_through_the_overlay() -> Result<()> {
    let dir = tempdir()?;
    let db = GraphDb::open(dir.path(), person_schema())?;

    let mut txn = db.begin_update()?;
    txn.add_vertex(V, &Any::Int64(10), &[Any::Str("x")])?;
    txn.add_vertex(V, &Any::Int64(11), &[Any::Str("y")])?;
    // Both endpoints are staged, not committed.
    txn.add_edge(V, &Any::Int64(10), V, &Any::Int64(11), E, &Any::Double(2.5))?;
    let staged = txn.out_edges(V, V, E, Vid(0))?;
    assert_eq!(staged.len(), 1);
    assert_eq!(staged[0].data, AnyOwned::Double(2.5));
    txn.commit()?;

    let read = db.begin_read();
    let vx = read.lookup(V, &Any::Int64(10))?.unwrap();
    let vy = read.lookup(V, &Any::Int64(11))?.unwrap();
    let out = read.out_edges(V, V, E, vx)?;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].nbr, vy);
    Ok(())
}

#[test]
fn staged_rows_shadow_committed_rows() -> Result<()> {
    let dir = tempdir()?;
    let db = GraphDb::open(dir.path(), person_schema())?;

    let mut setup = db.begin_update()?;
    setup.add_vertex(V, &Any::Int64(1), &[Any::Str("alice")])?;
    setup.commit()?;

    let mut txn = db.begin_update()?;
    let vid = Vid(0);
    assert_eq!(txn.get_vertex_field(V, vid, 0)?, AnyOwned::Str("alice".into()));
    txn.set_vertex_field(V, vid, 0, &Any::Str("alicia"))?;
    // The update transaction sees its own write; a fresh reader does not.
    assert_eq!(txn.get_vertex_field(V, vid, 0)?, AnyOwned::Str("alicia".into()));
    let read_before = db.begin_read();
    assert_eq!(
        read_before.vertex_field(V, vid, 0)?,
        AnyOwned::Str("alice".into())
    );
    txn.commit()?;

    let read = db.begin_read();
    assert_eq!(read.vertex_field(V, vid, 0)?, AnyOwned::Str("alicia".into()));
    Ok(())
}

#[test]
fn set_vertex_field_bounds_and_types() -> Result<()> {
    let dir = tempdir()?;
    let db = GraphDb::open(dir.path(), person_schema())?;
    let mut setup = db.begin_update()?;
    setup.add_vertex(V, &Any::Int64(1), &[Any::Str("alice")])?;
    setup.commit()?;

    let mut txn = db.begin_update()?;
    assert!(matches!(
        txn.set_vertex_field(V, Vid(5), 0, &Any::Str("x")),
        Err(GraphError::OutOfRange(_))
    ));
    assert!(matches!(
        txn.set_vertex_field(V, Vid(0), 3, &Any::Str("x")),
        Err(GraphError::OutOfRange(_))
    ));
    assert!(matches!(
        txn.set_vertex_field(V, Vid(0), 0, &Any::Int64(1)),
        Err(GraphError::TypeMismatch(_))
    ));
    txn.abort();
    Ok(())
}

#[test]
fn single_strategy_overwrites_in_place() -> Result<()> {
    let dir = tempdir()?;
    let db = GraphDb::open(dir.path(), single_out_schema())?;

    let mut txn = db.begin_update()?;
    txn.add_vertex(V, &Any::Int64(1), &[Any::Str("alice")])?;
    txn.add_vertex(V, &Any::Int64(2), &[Any::Str("bob")])?;
    txn.add_edge(V, &Any::Int64(1), V, &Any::Int64(2), E, &Any::Double(0.5))?;
    txn.commit()?;

    let mut txn = db.begin_update()?;
    txn.add_edge(V, &Any::Int64(1), V, &Any::Int64(2), E, &Any::Double(0.75))?;
    let second_ts = txn.commit()?;

    let read = db.begin_read();
    let va = read.lookup(V, &Any::Int64(1))?.unwrap();
    let vb = read.lookup(V, &Any::Int64(2))?.unwrap();
    let out = read.out_edges(V, V, E, va)?;
    assert_eq!(out.len(), 1, "single strategy must not grow");
    assert_eq!(out[0].data, AnyOwned::Double(0.75));
    assert_eq!(out[0].ts, second_ts);
    // The mirrored in-edge was updated too.
    let incoming = read.in_edges(V, V, E, vb)?;
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].data, AnyOwned::Double(0.75));
    Ok(())
}

#[test]
fn immutable_single_rejects_overwrite() -> Result<()> {
    use tessera::EdgeStrategy;
    let dir = tempdir()?;
    let db = GraphDb::open(
        dir.path(),
        util::schema_with(EdgeStrategy::Single, EdgeStrategy::Single, false),
    )?;

    let mut txn = db.begin_update()?;
    txn.add_vertex(V, &Any::Int64(1), &[Any::Str("a")])?;
    txn.add_vertex(V, &Any::Int64(2), &[Any::Str("b")])?;
    txn.add_edge(V, &Any::Int64(1), V, &Any::Int64(2), E, &Any::Double(0.5))?;
    txn.commit()?;

    let mut txn = db.begin_update()?;
    let err = txn
        .add_edge(V, &Any::Int64(1), V, &Any::Int64(2), E, &Any::Double(0.9))
        .unwrap_err();
    assert!(matches!(err, GraphError::Conflict));
    txn.abort();
    Ok(())
}

#[test]
fn set_edge_data_updates_first_match_and_mirror() -> Result<()> {
    let dir = tempdir()?;
    let db = GraphDb::open(dir.path(), person_schema())?;

    let mut txn = db.begin_update()?;
    txn.add_vertex(V, &Any::Int64(1), &[Any::Str("a")])?;
    txn.add_vertex(V, &Any::Int64(2), &[Any::Str("b")])?;
    txn.add_edge(V, &Any::Int64(1), V, &Any::Int64(2), E, &Any::Double(0.1))?;
    txn.commit()?;

    let va = db.begin_read().lookup(V, &Any::Int64(1))?.unwrap();
    let vb = db.begin_read().lookup(V, &Any::Int64(2))?.unwrap();

    let mut txn = db.begin_update()?;
    txn.set_edge_data(Dir::Out, V, va, V, vb, E, &Any::Double(0.9))?;
    let ts = txn.commit()?;

    let read = db.begin_read();
    let out = read.out_edges(V, V, E, va)?;
    assert_eq!(out[0].data, AnyOwned::Double(0.9));
    assert_eq!(out[0].ts, ts);
    let incoming = read.in_edges(V, V, E, vb)?;
    assert_eq!(incoming[0].data, AnyOwned::Double(0.9));
    assert_eq!(incoming[0].ts, ts);

    // Updating a missing edge is NotFound and leaves the op count alone.
    let mut txn = db.begin_update()?;
    let before = txn.op_count();
    assert!(matches!(
        txn.set_edge_data(Dir::Out, V, vb, V, va, E, &Any::Double(1.0)),
        Err(GraphError::NotFound(_))
    ));
    assert_eq!(txn.op_count(), before);
    txn.abort();
    Ok(())
}

#[test]
fn readers_observe_prior_commits_in_order() -> Result<()> {
    let dir = tempdir()?;
    let db = GraphDb::open(dir.path(), person_schema())?;

    let mut txn = db.begin_update()?;
    txn.add_vertex(V, &Any::Int64(1), &[Any::Str("a")])?;
    let t1 = txn.commit()?;

    let reader_between = db.begin_read();

    let mut txn = db.begin_update()?;
    txn.add_vertex(V, &Any::Int64(2), &[Any::Str("b")])?;
    let t2 = txn.commit()?;
    assert!(t1 < t2);

    // The reader begun between the commits sees only t1's effects.
    assert_eq!(reader_between.vertex_count(V)?, 1);
    assert_eq!(reader_between.lookup(V, &Any::Int64(2))?, None);

    // A reader begun after t2's publication sees both.
    let reader_after = db.begin_read();
    assert_eq!(reader_after.vertex_count(V)?, 2);
    assert!(reader_after.lookup(V, &Any::Int64(2))?.is_some());
    Ok(())
}

#[test]
fn empty_commit_writes_nothing() -> Result<()> {
    let dir = tempdir()?;
    let db = GraphDb::open(dir.path(), person_schema())?;
    let txn = db.begin_update()?;
    txn.commit()?;
    let records = tessera::wal::scan(&tessera::snapshot::wal_dir(dir.path()))?;
    assert!(records.is_empty());
    Ok(())
}

#[test]
fn merged_add_vertex_overwrites_properties() -> Result<()> {
    let dir = tempdir()?;
    let db = GraphDb::open(dir.path(), person_schema())?;

    let mut txn = db.begin_update()?;
    txn.add_vertex(V, &Any::Int64(1), &[Any::Str("alice")])?;
    txn.commit()?;

    let mut txn = db.begin_update()?;
    txn.add_vertex(V, &Any::Int64(1), &[Any::Str("renamed")])?;
    txn.commit()?;

    let read = db.begin_read();
    assert_eq!(read.vertex_count(V)?, 1, "merge must not mint a new vid");
    let vid = read.lookup(V, &Any::Int64(1))?.unwrap();
    assert_eq!(read.vertex_field(V, vid, 0)?, AnyOwned::Str("renamed".into()));
    Ok(())
}

#[test]
fn concurrent_readers_see_monotone_counts() -> Result<()> {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    let dir = tempdir()?;
    let db = Arc::new(GraphDb::open(dir.path(), person_schema())?);
    let stop = Arc::new(AtomicBool::new(false));

    let mut handles = Vec::new();
    for _ in 0..3 {
        let db = Arc::clone(&db);
        let stop = Arc::clone(&stop);
        handles.push(std::thread::spawn(move || {
            let mut last = 0u32;
            while !stop.load(Ordering::Acquire) {
                let read = db.begin_read();
                let count = read.vertex_count(V).expect("label exists");
                assert!(count >= last, "vertex counts must be monotone");
                last = count;
            }
        }));
    }

    for i in 0..50i64 {
        let mut txn = db.begin_update()?;
        txn.add_vertex(V, &Any::Int64(i), &[Any::Str("v")])?;
        txn.commit()?;
    }
    stop.store(true, Ordering::Release);
    for handle in handles {
        handle.join().expect("reader thread");
    }
    assert_eq!(db.begin_read().vertex_count(V)?, 50);
    Ok(())
}
