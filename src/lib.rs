//! # Tessera - Real-time Mutable Property-Graph Storage
//!
//! Tessera is the storage engine and transactional runtime of a labeled,
//! directed property-graph database: typed columnar vertex stores with
//! per-label primary-key indexing, dual-indexed CSR adjacency per
//! (src-label, dst-label, edge-label) triplet, single-writer update
//! transactions with lock-free snapshot readers, WAL-based crash
//! recovery, a versioned snapshot directory layout, and a parallel bulk
//! loader.
//!
//! ## Quick Start
//!
//! ```no_run
//! use tessera::{Any, GraphDb, LabelId};
//! # fn schema() -> tessera::Schema { unimplemented!() }
//!
//! # fn main() -> tessera::Result<()> {
//! let db = GraphDb::open(std::path::Path::new("/data/graph"), schema())?;
//!
//! let mut txn = db.begin_update()?;
//! txn.add_vertex(LabelId(0), &Any::Int64(1), &[Any::Str("alice")])?;
//! txn.add_vertex(LabelId(0), &Any::Int64(2), &[Any::Str("bob")])?;
//! txn.add_edge(
//!     LabelId(0), &Any::Int64(1),
//!     LabelId(0), &Any::Int64(2),
//!     LabelId(0), &Any::Double(0.5),
//! )?;
//! txn.commit()?;
//!
//! let read = db.begin_read();
//! let alice = read.lookup(LabelId(0), &Any::Int64(1))?.unwrap();
//! for edge in read.out_edges(LabelId(0), LabelId(0), LabelId(0), alice)? {
//!     println!("{} -> {} ({})", alice, edge.nbr, edge.data);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **Value layer**: the tagged [`Any`] view type over the closed set of
//!   property types, with a one-byte-tag wire encoding.
//! - **Stores**: primary-key indexers (`indexer`), columnar vertex and
//!   edge-side tables (`table`), CSR adjacency (`csr`), all backed by
//!   memory-mapped working files.
//! - **Runtime**: version manager and transactions (`txn`), write-ahead
//!   log (`wal`), snapshot directory management (`snapshot`).
//! - **Ingestion**: the parallel bulk loader (`loader`).

pub mod csr;
pub mod error;
pub mod graph;
pub mod indexer;
pub mod loader;
pub mod logging;
pub mod mem;
pub mod schema;
pub mod snapshot;
pub mod table;
pub mod txn;
pub mod types;
pub mod value;
pub mod wal;

pub use crate::error::{GraphError, Result};
pub use crate::graph::{EdgeEntry, GraphConfig, GraphDb};
pub use crate::loader::{
    ColumnData, EdgeSource, LoadingConfig, RecordBatch, RecordBatchSupplier, VecSupplier,
    VertexSource,
};
pub use crate::schema::{
    ColumnStrategy, EdgeStrategy, EdgeTripletSchema, PropDef, Schema, VertexLabelSchema,
};
pub use crate::txn::{CompactionTransaction, ReadTransaction, UpdateTransaction};
pub use crate::types::{Dir, LabelId, Timestamp, Vid};
pub use crate::value::{Any, AnyOwned, PropType};
