#![allow(dead_code)]

use tessera::{
    ColumnStrategy, EdgeStrategy, EdgeTripletSchema, PropDef, PropType, Schema,
    VertexLabelSchema,
};

pub const V: tessera::LabelId = tessera::LabelId(0);
pub const E: tessera::LabelId = tessera::LabelId(0);

/// Vertex label `V` with i64 key `id` and property `name: string`; edge
/// label `E` with property `weight: f64`, strategy `Multiple` both
/// sides.
pub fn person_schema() -> Schema {
    schema_with(EdgeStrategy::Multiple, EdgeStrategy::Multiple, true)
}

/// Same graph shape with a `Single` out-strategy.
pub fn single_out_schema() -> Schema {
    schema_with(EdgeStrategy::Single, EdgeStrategy::Multiple, true)
}

pub fn schema_with(out: EdgeStrategy, inn: EdgeStrategy, mutable: bool) -> Schema {
    Schema {
        vertex_labels: vec![VertexLabelSchema {
            name: "V".into(),
            primary_key: PropDef::new("id", PropType::Int64),
            props: vec![PropDef::new("name", PropType::String)],
            strategies: vec![ColumnStrategy::Dense],
            max_vertex_num: 1024,
        }],
        edge_label_names: vec!["E".into()],
        triplets: vec![EdgeTripletSchema {
            src: 0,
            dst: 0,
            edge: 0,
            props: vec![PropDef::new("weight", PropType::Double)],
            in_strategy: inn,
            out_strategy: out,
            mutable,
            sort_on_compaction: false,
        }],
    }
}

/// A two-label schema exercising string keys, sparse columns, and a
/// multi-property edge table.
pub fn rich_schema() -> Schema {
    Schema {
        vertex_labels: vec![
            VertexLabelSchema {
                name: "PERSON".into(),
                primary_key: PropDef::new("id", PropType::Int64),
                props: vec![
                    PropDef::new("name", PropType::String),
                    PropDef::new("age", PropType::Int32),
                    PropDef::new("nickname", PropType::String),
                ],
                strategies: vec![
                    ColumnStrategy::Dense,
                    ColumnStrategy::Dense,
                    ColumnStrategy::Sparse,
                ],
                max_vertex_num: 1024,
            },
            VertexLabelSchema {
                name: "CITY".into(),
                primary_key: PropDef::new("code", PropType::String),
                props: vec![PropDef::new("population", PropType::Int64)],
                strategies: vec![ColumnStrategy::Dense],
                max_vertex_num: 256,
            },
        ],
        edge_label_names: vec!["LIVES_IN".into()],
        triplets: vec![EdgeTripletSchema {
            src: 0,
            dst: 1,
            edge: 0,
            props: vec![
                PropDef::new("since", PropType::Date),
                PropDef::new("street", PropType::String),
            ],
            in_strategy: EdgeStrategy::Multiple,
            out_strategy: EdgeStrategy::Multiple,
            mutable: true,
            sort_on_compaction: false,
        }],
    }
}
