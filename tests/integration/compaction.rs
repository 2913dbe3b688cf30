mod util;

use tempfile::tempdir;
use tessera::{snapshot, wal, Any, AnyOwned, EdgeStrategy, GraphDb, Result};
use util::{person_schema, E, V};

#[test]
fn compaction_snapshot_restores_without_wal_replay() -> Result<()> {
    let dir = tempdir()?;
    {
        let db = GraphDb::open(dir.path(), person_schema())?;
        let mut txn = db.begin_update()?;
        txn.add_vertex(V, &Any::Int64(1), &[Any::Str("alice")])?;
        txn.add_vertex(V, &Any::Int64(2), &[Any::Str("bob")])?;
        txn.add_edge(V, &Any::Int64(1), V, &Any::Int64(2), E, &Any::Double(0.5))?;
        txn.commit()?;

        let compaction = db.begin_compaction()?;
        let version = compaction.commit()?;
        assert_eq!(snapshot::read_version(dir.path())?, version);
        assert!(version > 0, "compaction takes a fresh timestamp");
    }

    // Every wal record predates the new snapshot; replay must skip all.
    let version = snapshot::read_version(dir.path())?;
    for record in wal::scan(&snapshot::wal_dir(dir.path()))? {
        assert!(record.ts.0 <= version);
    }

    let db = GraphDb::open(dir.path(), person_schema())?;
    let read = db.begin_read();
    assert_eq!(read.vertex_count(V)?, 2);
    let va = read.lookup(V, &Any::Int64(1))?.expect("alice survives compaction");
    let out = read.out_edges(V, V, E, va)?;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].data, AnyOwned::Double(0.5));
    Ok(())
}

#[test]
fn commits_continue_after_compaction() -> Result<()> {
    let dir = tempdir()?;
    let db = GraphDb::open(dir.path(), person_schema())?;

    let mut txn = db.begin_update()?;
    txn.add_vertex(V, &Any::Int64(1), &[Any::Str("a")])?;
    txn.commit()?;

    db.begin_compaction()?.commit()?;

    let mut txn = db.begin_update()?;
    txn.add_vertex(V, &Any::Int64(2), &[Any::Str("b")])?;
    let ts = txn.commit()?;
    assert!(ts.0 > snapshot::read_version(dir.path())? - 1);

    let read = db.begin_read();
    assert_eq!(read.vertex_count(V)?, 2);
    drop(read);
    db.close()?;

    // Post-compaction commits recover through the wal.
    let db = GraphDb::open(dir.path(), person_schema())?;
    let read = db.begin_read();
    assert_eq!(read.vertex_count(V)?, 2);
    assert!(read.lookup(V, &Any::Int64(2))?.is_some());
    Ok(())
}

#[test]
fn aborted_compaction_changes_nothing() -> Result<()> {
    let dir = tempdir()?;
    let db = GraphDb::open(dir.path(), person_schema())?;
    let mut txn = db.begin_update()?;
    txn.add_vertex(V, &Any::Int64(1), &[Any::Str("a")])?;
    txn.commit()?;

    let before = snapshot::read_version(dir.path())?;
    db.begin_compaction()?.abort();
    assert_eq!(snapshot::read_version(dir.path())?, before);

    // The write slot is free again.
    let mut txn = db.begin_update()?;
    txn.add_vertex(V, &Any::Int64(2), &[Any::Str("b")])?;
    txn.commit()?;
    assert_eq!(db.begin_read().vertex_count(V)?, 2);
    Ok(())
}

#[test]
fn sort_on_compaction_orders_neighbor_runs() -> Result<()> {
    let mut schema = util::schema_with(EdgeStrategy::Multiple, EdgeStrategy::Multiple, true);
    schema.triplets[0].sort_on_compaction = true;

    let dir = tempdir()?;
    let db = GraphDb::open(dir.path(), schema.clone())?;
    let mut txn = db.begin_update()?;
    for (id, name) in [(1i64, "a"), (2, "b"), (3, "c"), (4, "d")] {
        txn.add_vertex(V, &Any::Int64(id), &[Any::Str(name)])?;
    }
    for (dst, w) in [(2i64, 0.9), (3, 0.1), (4, 0.5)] {
        txn.add_edge(V, &Any::Int64(1), V, &Any::Int64(dst), E, &Any::Double(w))?;
    }
    txn.commit()?;

    let read = db.begin_read();
    let va = read.lookup(V, &Any::Int64(1))?.unwrap();
    let before: Vec<AnyOwned> = read
        .out_edges(V, V, E, va)?
        .into_iter()
        .map(|e| e.data)
        .collect();
    assert_eq!(
        before,
        vec![
            AnyOwned::Double(0.9),
            AnyOwned::Double(0.1),
            AnyOwned::Double(0.5)
        ],
        "append order before compaction"
    );
    drop(read);

    db.begin_compaction()?.commit()?;
    db.close()?;

    let db = GraphDb::open(dir.path(), schema)?;
    let read = db.begin_read();
    let va = read.lookup(V, &Any::Int64(1))?.unwrap();
    let after: Vec<AnyOwned> = read
        .out_edges(V, V, E, va)?
        .into_iter()
        .map(|e| e.data)
        .collect();
    assert_eq!(
        after,
        vec![
            AnyOwned::Double(0.1),
            AnyOwned::Double(0.5),
            AnyOwned::Double(0.9)
        ],
        "runs are sorted by edge data after compaction"
    );
    Ok(())
}
