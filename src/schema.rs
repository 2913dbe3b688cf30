//! The schema object consumed by the storage core.
//!
//! The core does not parse schema configuration; callers hand it a fully
//! formed [`Schema`]. A serialized image is kept at `<root>/schema` so a
//! reopened graph can verify it is being driven with the schema it was
//! built under.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};
use crate::types::LabelId;
use crate::value::PropType;

/// Storage strategy for one vertex-table column.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub enum ColumnStrategy {
    /// Flat array indexed by vid (string columns add an arena).
    Dense,
    /// Hash map from vid to value, for mostly-absent properties.
    Sparse,
}

/// Storage strategy for one direction of an edge triplet.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub enum EdgeStrategy {
    /// Edges disallowed in this direction.
    None,
    /// At most one neighbor per vertex.
    Single,
    /// Append-ordered neighbor list.
    Multiple,
}

/// One named, typed property.
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct PropDef {
    pub name: String,
    pub ty: PropType,
}

impl PropDef {
    pub fn new(name: impl Into<String>, ty: PropType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Schema of one vertex label.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct VertexLabelSchema {
    pub name: String,
    /// Primary key: exactly one property of a supported key type. Not
    /// repeated in `props`.
    pub primary_key: PropDef,
    pub props: Vec<PropDef>,
    /// One strategy per entry of `props`.
    pub strategies: Vec<ColumnStrategy>,
    /// Sizing hint for the mutable path; the stores grow past it.
    pub max_vertex_num: u32,
}

impl VertexLabelSchema {
    pub fn column_id(&self, name: &str) -> Option<usize> {
        self.props.iter().position(|p| p.name == name)
    }
}

/// Schema of one (src-label, dst-label, edge-label) triplet.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct EdgeTripletSchema {
    pub src: LabelIdSer,
    pub dst: LabelIdSer,
    pub edge: LabelIdSer,
    pub props: Vec<PropDef>,
    pub in_strategy: EdgeStrategy,
    pub out_strategy: EdgeStrategy,
    /// When false, `Single` slots refuse overwrite and edge data is
    /// immutable after insert.
    pub mutable: bool,
    /// Compaction sorts each neighbor run by the first property.
    pub sort_on_compaction: bool,
}

/// Serde-friendly label id (u8 newtype does not derive serde in `types`).
pub type LabelIdSer = u8;

/// Payload category of a triplet, derived from its property list.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum EdgePayloadKind {
    /// No properties: records carry `{neighbor, ts}` only.
    None,
    /// Exactly one fixed-width property, inlined in the record.
    Inline(PropType),
    /// Multi-property or variable-width: records carry an edge-table row.
    Table,
}

impl EdgeTripletSchema {
    pub fn src_label(&self) -> LabelId {
        LabelId(self.src)
    }

    pub fn dst_label(&self) -> LabelId {
        LabelId(self.dst)
    }

    pub fn edge_label(&self) -> LabelId {
        LabelId(self.edge)
    }

    pub fn payload_kind(&self) -> EdgePayloadKind {
        match self.props.len() {
            0 => EdgePayloadKind::None,
            1 => match self.props[0].ty.fixed_width() {
                Some(_) => EdgePayloadKind::Inline(self.props[0].ty),
                None => EdgePayloadKind::Table,
            },
            _ => EdgePayloadKind::Table,
        }
    }
}

/// The complete schema the core runs under.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Schema {
    pub vertex_labels: Vec<VertexLabelSchema>,
    pub edge_label_names: Vec<String>,
    pub triplets: Vec<EdgeTripletSchema>,
}

impl Schema {
    pub fn vertex_label_num(&self) -> usize {
        self.vertex_labels.len()
    }

    pub fn edge_label_num(&self) -> usize {
        self.edge_label_names.len()
    }

    pub fn vertex_label(&self, label: LabelId) -> Result<&VertexLabelSchema> {
        self.vertex_labels
            .get(label.0 as usize)
            .ok_or(GraphError::OutOfRange("vertex label id"))
    }

    pub fn vertex_label_by_name(&self, name: &str) -> Option<LabelId> {
        self.vertex_labels
            .iter()
            .position(|l| l.name == name)
            .map(|i| LabelId(i as u8))
    }

    pub fn edge_label_by_name(&self, name: &str) -> Option<LabelId> {
        self.edge_label_names
            .iter()
            .position(|l| l == name)
            .map(|i| LabelId(i as u8))
    }

    pub fn edge_label_name(&self, label: LabelId) -> Result<&str> {
        self.edge_label_names
            .get(label.0 as usize)
            .map(String::as_str)
            .ok_or(GraphError::OutOfRange("edge label id"))
    }

    pub fn triplet(
        &self,
        src: LabelId,
        dst: LabelId,
        edge: LabelId,
    ) -> Option<&EdgeTripletSchema> {
        self.triplets
            .iter()
            .find(|t| t.src == src.0 && t.dst == dst.0 && t.edge == edge.0)
    }

    /// Flat index of a triplet into the per-direction CSR arrays.
    pub fn csr_index(&self, src: LabelId, dst: LabelId, edge: LabelId) -> usize {
        let v = self.vertex_label_num();
        let e = self.edge_label_num();
        (src.0 as usize * v + dst.0 as usize) * e + edge.0 as usize
    }

    pub fn csr_slots(&self) -> usize {
        self.vertex_label_num() * self.vertex_label_num() * self.edge_label_num()
    }

    /// Structural sanity: key types, strategy arity, label-id bounds.
    pub fn validate(&self) -> Result<()> {
        if self.vertex_label_num() > u8::MAX as usize || self.edge_label_num() > u8::MAX as usize {
            return Err(GraphError::BadInput("too many labels for 8-bit ids".into()));
        }
        for label in &self.vertex_labels {
            if !label.primary_key.ty.is_key_type() {
                return Err(GraphError::BadInput(format!(
                    "label {}: unsupported primary key type {:?}",
                    label.name, label.primary_key.ty
                )));
            }
            if label.props.len() != label.strategies.len() {
                return Err(GraphError::BadInput(format!(
                    "label {}: one strategy per property required",
                    label.name
                )));
            }
        }
        let v = self.vertex_label_num() as u8;
        let e = self.edge_label_num() as u8;
        for t in &self.triplets {
            if t.src >= v || t.dst >= v || t.edge >= e {
                return Err(GraphError::BadInput("triplet references unknown label".into()));
            }
        }
        Ok(())
    }

    /// Writes the serialized image to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| GraphError::BadInput(format!("schema serialization: {e}")))?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Loads a serialized image from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let schema: Schema = serde_json::from_slice(&bytes)
            .map_err(|e| GraphError::Corrupt(format!("schema image: {e}")))?;
        schema.validate()?;
        Ok(schema)
    }
}
