mod util;

use tempfile::tempdir;
use tessera::{
    snapshot, wal, Any, AnyOwned, Dir, GraphConfig, GraphDb, GraphError, Result,
};
use util::{person_schema, E, V};

#[test]
fn crash_recovery_replays_the_wal() -> Result<()> {
    let dir = tempdir()?;
    {
        let db = GraphDb::open(dir.path(), person_schema())?;
        let mut txn = db.begin_update()?;
        txn.add_vertex(V, &Any::Int64(1), &[Any::Str("alice")])?;
        txn.add_vertex(V, &Any::Int64(2), &[Any::Str("bob")])?;
        txn.add_edge(V, &Any::Int64(1), V, &Any::Int64(2), E, &Any::Double(0.5))?;
        txn.commit()?;
        // Simulated crash: the handle drops with no snapshot taken.
    }

    assert_eq!(snapshot::read_version(dir.path())?, 0, "still on the empty snapshot");
    let records = wal::scan(&snapshot::wal_dir(dir.path()))?;
    assert_eq!(records.len(), 1, "one committed transaction, one record");

    let db = GraphDb::open(dir.path(), person_schema())?;
    let read = db.begin_read();
    assert_eq!(read.vertex_count(V)?, 2);
    let va = read.lookup(V, &Any::Int64(1))?.expect("alice recovered");
    let vb = read.lookup(V, &Any::Int64(2))?.expect("bob recovered");
    assert_eq!(read.vertex_field(V, va, 0)?, AnyOwned::Str("alice".into()));
    let out = read.out_edges(V, V, E, va)?;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].nbr, vb);
    assert_eq!(out[0].data, AnyOwned::Double(0.5));
    Ok(())
}

#[test]
fn replay_matches_live_state_across_all_op_kinds() -> Result<()> {
    let dir = tempdir()?;
    let live = {
        let db = GraphDb::open(dir.path(), person_schema())?;

        let mut txn = db.begin_update()?;
        for i in 0..10i64 {
            txn.add_vertex(V, &Any::Int64(i), &[Any::Str(&format!("v{i}"))])?;
        }
        txn.commit()?;

        let mut txn = db.begin_update()?;
        for i in 1..10i64 {
            txn.add_edge(V, &Any::Int64(0), V, &Any::Int64(i), E, &Any::Double(i as f64))?;
        }
        txn.commit()?;

        let read = db.begin_read();
        let v0 = read.lookup(V, &Any::Int64(0))?.unwrap();
        let mut txn = db.begin_update()?;
        txn.set_vertex_field(V, v0, 0, &Any::Str("renamed"))?;
        let v3 = read.lookup(V, &Any::Int64(3))?.unwrap();
        txn.set_edge_data(Dir::Out, V, v0, V, v3, E, &Any::Double(-1.0))?;
        txn.commit()?;

        observe(&db)?
    };

    // Reopen: everything must come back from snapshot 0 + wal replay.
    let db = GraphDb::open(dir.path(), person_schema())?;
    assert_eq!(observe(&db)?, live);
    Ok(())
}

/// Collects every public observable into a comparable structure.
fn observe(db: &GraphDb) -> Result<Vec<String>> {
    let read = db.begin_read();
    let mut out = Vec::new();
    let n = read.vertex_count(V)?;
    out.push(format!("count={n}"));
    for vid in 0..n {
        let vid = tessera::Vid(vid);
        out.push(format!(
            "v {} oid={} name={}",
            vid,
            read.vertex_oid(V, vid)?,
            read.vertex_field(V, vid, 0)?
        ));
        for edge in read.out_edges(V, V, E, vid)? {
            out.push(format!("oe {} -> {} {} @{}", vid, edge.nbr, edge.data, edge.ts));
        }
        for edge in read.in_edges(V, V, E, vid)? {
            out.push(format!("ie {} <- {} {} @{}", vid, edge.nbr, edge.data, edge.ts));
        }
    }
    Ok(out)
}

#[test]
fn wal_segments_roll_and_replay_in_order() -> Result<()> {
    let dir = tempdir()?;
    let config = GraphConfig {
        wal_segment_bytes: 64,
        ..GraphConfig::default()
    };
    {
        let db = GraphDb::open_with_config(dir.path(), person_schema(), config.clone())?;
        for i in 0..20i64 {
            let mut txn = db.begin_update()?;
            txn.add_vertex(V, &Any::Int64(i), &[Any::Str(&format!("v{i}"))])?;
            txn.commit()?;
        }
    }

    let segments = std::fs::read_dir(snapshot::wal_dir(dir.path()))?.count();
    assert!(segments > 1, "tiny segment limit must have rolled, saw {segments}");

    let db = GraphDb::open_with_config(dir.path(), person_schema(), config)?;
    let read = db.begin_read();
    assert_eq!(read.vertex_count(V)?, 20);
    for i in 0..20i64 {
        assert!(read.lookup(V, &Any::Int64(i))?.is_some(), "vertex {i} recovered");
    }
    Ok(())
}

#[test]
fn reopen_with_a_different_schema_is_corrupt() -> Result<()> {
    let dir = tempdir()?;
    {
        let _db = GraphDb::open(dir.path(), person_schema())?;
    }
    let mut other = person_schema();
    other.vertex_labels[0].props.push(tessera::PropDef::new(
        "extra",
        tessera::PropType::Int32,
    ));
    other.vertex_labels[0]
        .strategies
        .push(tessera::ColumnStrategy::Dense);
    let err = GraphDb::open(dir.path(), other).unwrap_err();
    assert!(matches!(err, GraphError::Corrupt(_)));
    Ok(())
}

#[test]
fn recovery_is_idempotent_across_repeated_reopens() -> Result<()> {
    let dir = tempdir()?;
    {
        let db = GraphDb::open(dir.path(), person_schema())?;
        let mut txn = db.begin_update()?;
        txn.add_vertex(V, &Any::Int64(7), &[Any::Str("seven")])?;
        txn.commit()?;
    }
    for _ in 0..3 {
        let db = GraphDb::open(dir.path(), person_schema())?;
        let read = db.begin_read();
        assert_eq!(read.vertex_count(V)?, 1);
        assert_eq!(
            read.vertex_field(V, tessera::Vid(0), 0)?,
            AnyOwned::Str("seven".into())
        );
    }
    Ok(())
}

#[test]
fn commits_after_recovery_continue_the_timestamp_line() -> Result<()> {
    let dir = tempdir()?;
    let first_ts = {
        let db = GraphDb::open(dir.path(), person_schema())?;
        let mut txn = db.begin_update()?;
        txn.add_vertex(V, &Any::Int64(1), &[Any::Str("a")])?;
        txn.commit()?
    };
    let db = GraphDb::open(dir.path(), person_schema())?;
    let mut txn = db.begin_update()?;
    txn.add_vertex(V, &Any::Int64(2), &[Any::Str("b")])?;
    let second_ts = txn.commit()?;
    assert!(second_ts > first_ts, "timestamps stay monotone across restarts");

    let records = wal::scan(&snapshot::wal_dir(dir.path()))?;
    assert_eq!(records.len(), 2);
    assert!(records[0].ts < records[1].ts);
    Ok(())
}
