//! Typed value system.
//!
//! Property values move through the engine as [`Any`], a tagged view over
//! the closed set of supported primitive types. String payloads are
//! non-owning slices into whichever arena or buffer holds them; the owned
//! counterpart [`AnyOwned`] exists for results that must outlive a borrow
//! (point reads through the public API, staged overlay cells).
//!
//! The wire form is a one-byte type tag followed by a little-endian
//! payload, produced and consumed by [`Encoder`] / [`Decoder`].

use std::fmt;

use crate::error::{GraphError, Result};

/// Closed set of property types.
///
/// `StringMap` is a column type only: values of an interned-string column
/// are plain strings on the wire, and a `String` value is accepted into a
/// `StringMap` column (the one permitted implicit conversion).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum PropType {
    Empty = 0,
    Bool = 1,
    Int32 = 2,
    UInt32 = 3,
    Int64 = 4,
    UInt64 = 5,
    Float = 6,
    Double = 7,
    /// Milliseconds since the Unix epoch.
    Date = 8,
    /// Days since the Unix epoch.
    Day = 9,
    String = 10,
    StringMap = 11,
    Record = 12,
}

impl PropType {
    pub fn from_tag(tag: u8) -> Result<Self> {
        Ok(match tag {
            0 => PropType::Empty,
            1 => PropType::Bool,
            2 => PropType::Int32,
            3 => PropType::UInt32,
            4 => PropType::Int64,
            5 => PropType::UInt64,
            6 => PropType::Float,
            7 => PropType::Double,
            8 => PropType::Date,
            9 => PropType::Day,
            10 => PropType::String,
            11 => PropType::StringMap,
            12 => PropType::Record,
            _ => return Err(GraphError::BadInput(format!("unknown type tag {tag}"))),
        })
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Byte width of the fixed-size encoding, or `None` for
    /// variable-width types.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            PropType::Empty => Some(0),
            PropType::Bool => Some(1),
            PropType::Int32 | PropType::UInt32 | PropType::Float | PropType::Day => Some(4),
            PropType::Int64
            | PropType::UInt64
            | PropType::Double
            | PropType::Date => Some(8),
            PropType::String | PropType::StringMap | PropType::Record => None,
        }
    }

    /// True when this type may serve as a vertex primary key.
    pub fn is_key_type(self) -> bool {
        matches!(
            self,
            PropType::Int32
                | PropType::UInt32
                | PropType::Int64
                | PropType::UInt64
                | PropType::String
        )
    }
}

/// True when a value of type `value_ty` may be stored into a column of
/// type `column_ty`. Exact match, with the single exception that plain
/// strings intern into string-map columns. Numeric widenings are never
/// silent.
pub fn compatible(value_ty: PropType, column_ty: PropType) -> bool {
    value_ty == column_ty
        || (value_ty == PropType::String && column_ty == PropType::StringMap)
}

/// Read access to one row of a columnar side table. Implemented by the
/// edge-side table so multi-property edge data can be exposed without
/// copying.
pub trait RecordSource {
    fn field_count(&self) -> usize;
    fn field(&self, row: u32, col: usize) -> Result<Any<'_>>;
}

impl RecordSource for Vec<AnyOwned> {
    fn field_count(&self) -> usize {
        self.len()
    }

    fn field(&self, _row: u32, col: usize) -> Result<Any<'_>> {
        self.get(col)
            .map(AnyOwned::as_any)
            .ok_or(GraphError::OutOfRange("record column id"))
    }
}

/// Borrowed view of a record row: a source pointer plus the row index.
#[derive(Copy, Clone)]
pub struct RecordView<'a> {
    src: &'a dyn RecordSource,
    row: u32,
}

impl<'a> RecordView<'a> {
    pub fn new(src: &'a dyn RecordSource, row: u32) -> Self {
        Self { src, row }
    }

    pub fn len(&self) -> usize {
        self.src.field_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn row(&self) -> u32 {
        self.row
    }

    pub fn field(&self, col: usize) -> Result<Any<'a>> {
        self.src.field(self.row, col)
    }
}

impl fmt::Debug for RecordView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordView(row={}, cols={})", self.row, self.len())
    }
}

impl PartialEq for RecordView<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(
            self.src as *const dyn RecordSource as *const (),
            other.src as *const dyn RecordSource as *const (),
        ) && self.row == other.row
    }
}

/// Tagged property value with borrowed payloads (zero-copy).
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Any<'a> {
    Empty,
    Bool(bool),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    /// Milliseconds since the Unix epoch.
    Date(i64),
    /// Days since the Unix epoch.
    Day(i32),
    Str(&'a str),
    Record(RecordView<'a>),
}

impl<'a> Any<'a> {
    pub fn type_of(&self) -> PropType {
        match self {
            Any::Empty => PropType::Empty,
            Any::Bool(_) => PropType::Bool,
            Any::Int32(_) => PropType::Int32,
            Any::UInt32(_) => PropType::UInt32,
            Any::Int64(_) => PropType::Int64,
            Any::UInt64(_) => PropType::UInt64,
            Any::Float(_) => PropType::Float,
            Any::Double(_) => PropType::Double,
            Any::Date(_) => PropType::Date,
            Any::Day(_) => PropType::Day,
            Any::Str(_) => PropType::String,
            Any::Record(_) => PropType::Record,
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Any::Bool(v) => Ok(*v),
            _ => Err(GraphError::TypeMismatch("expected bool")),
        }
    }

    pub fn as_i32(&self) -> Result<i32> {
        match self {
            Any::Int32(v) => Ok(*v),
            _ => Err(GraphError::TypeMismatch("expected int32")),
        }
    }

    pub fn as_u32(&self) -> Result<u32> {
        match self {
            Any::UInt32(v) => Ok(*v),
            _ => Err(GraphError::TypeMismatch("expected uint32")),
        }
    }

    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Any::Int64(v) => Ok(*v),
            _ => Err(GraphError::TypeMismatch("expected int64")),
        }
    }

    pub fn as_u64(&self) -> Result<u64> {
        match self {
            Any::UInt64(v) => Ok(*v),
            _ => Err(GraphError::TypeMismatch("expected uint64")),
        }
    }

    pub fn as_f32(&self) -> Result<f32> {
        match self {
            Any::Float(v) => Ok(*v),
            _ => Err(GraphError::TypeMismatch("expected float")),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Any::Double(v) => Ok(*v),
            _ => Err(GraphError::TypeMismatch("expected double")),
        }
    }

    pub fn as_date(&self) -> Result<i64> {
        match self {
            Any::Date(v) => Ok(*v),
            _ => Err(GraphError::TypeMismatch("expected date")),
        }
    }

    pub fn as_day(&self) -> Result<i32> {
        match self {
            Any::Day(v) => Ok(*v),
            _ => Err(GraphError::TypeMismatch("expected day")),
        }
    }

    pub fn as_str(&self) -> Result<&'a str> {
        match self {
            Any::Str(v) => Ok(v),
            _ => Err(GraphError::TypeMismatch("expected string")),
        }
    }

    pub fn as_record(&self) -> Result<RecordView<'a>> {
        match self {
            Any::Record(v) => Ok(*v),
            _ => Err(GraphError::TypeMismatch("expected record")),
        }
    }

    pub fn to_owned(&self) -> Result<AnyOwned> {
        Ok(match self {
            Any::Empty => AnyOwned::Empty,
            Any::Bool(v) => AnyOwned::Bool(*v),
            Any::Int32(v) => AnyOwned::Int32(*v),
            Any::UInt32(v) => AnyOwned::UInt32(*v),
            Any::Int64(v) => AnyOwned::Int64(*v),
            Any::UInt64(v) => AnyOwned::UInt64(*v),
            Any::Float(v) => AnyOwned::Float(*v),
            Any::Double(v) => AnyOwned::Double(*v),
            Any::Date(v) => AnyOwned::Date(*v),
            Any::Day(v) => AnyOwned::Day(*v),
            Any::Str(v) => AnyOwned::Str((*v).to_string()),
            Any::Record(view) => {
                let mut fields = Vec::with_capacity(view.len());
                for col in 0..view.len() {
                    fields.push(view.field(col)?.to_owned()?);
                }
                AnyOwned::Record(fields)
            }
        })
    }
}

/// Tagged property value with owned payloads.
#[derive(Clone, Debug, PartialEq)]
pub enum AnyOwned {
    Empty,
    Bool(bool),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    Date(i64),
    Day(i32),
    Str(String),
    Record(Vec<AnyOwned>),
}

impl AnyOwned {
    pub fn as_any(&self) -> Any<'_> {
        match self {
            AnyOwned::Empty => Any::Empty,
            AnyOwned::Bool(v) => Any::Bool(*v),
            AnyOwned::Int32(v) => Any::Int32(*v),
            AnyOwned::UInt32(v) => Any::UInt32(*v),
            AnyOwned::Int64(v) => Any::Int64(*v),
            AnyOwned::UInt64(v) => Any::UInt64(*v),
            AnyOwned::Float(v) => Any::Float(*v),
            AnyOwned::Double(v) => Any::Double(*v),
            AnyOwned::Date(v) => Any::Date(*v),
            AnyOwned::Day(v) => Any::Day(*v),
            AnyOwned::Str(v) => Any::Str(v),
            AnyOwned::Record(fields) => Any::Record(RecordView::new(fields, 0)),
        }
    }

    pub fn type_of(&self) -> PropType {
        self.as_any().type_of()
    }
}

impl fmt::Display for AnyOwned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnyOwned::Empty => write!(f, "()"),
            AnyOwned::Bool(v) => write!(f, "{v}"),
            AnyOwned::Int32(v) => write!(f, "{v}"),
            AnyOwned::UInt32(v) => write!(f, "{v}"),
            AnyOwned::Int64(v) => write!(f, "{v}"),
            AnyOwned::UInt64(v) => write!(f, "{v}"),
            AnyOwned::Float(v) => write!(f, "{v}"),
            AnyOwned::Double(v) => write!(f, "{v}"),
            AnyOwned::Date(v) => write!(f, "date({v})"),
            AnyOwned::Day(v) => write!(f, "day({v})"),
            AnyOwned::Str(v) => write!(f, "{v}"),
            AnyOwned::Record(fields) => write!(f, "record(cols={})", fields.len()),
        }
    }
}

/// Append-only byte sink for the tagged value and op-stream encodings.
#[derive(Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    pub fn put_str(&mut self, v: &str) {
        self.put_u32(v.len() as u32);
        self.buf.extend_from_slice(v.as_bytes());
    }

    /// Writes the one-byte type tag followed by the payload.
    ///
    /// Record values are encoded as a field count and the flattened
    /// fields; nested records are rejected.
    pub fn put_any(&mut self, value: &Any<'_>) -> Result<()> {
        self.put_u8(value.type_of().tag());
        match value {
            Any::Empty => {}
            Any::Bool(v) => self.put_u8(u8::from(*v)),
            Any::Int32(v) => self.put_i32(*v),
            Any::UInt32(v) => self.put_u32(*v),
            Any::Int64(v) => self.put_i64(*v),
            Any::UInt64(v) => self.put_u64(*v),
            Any::Float(v) => self.put_f32(*v),
            Any::Double(v) => self.put_f64(*v),
            Any::Date(v) => self.put_i64(*v),
            Any::Day(v) => self.put_i32(*v),
            Any::Str(v) => self.put_str(v),
            Any::Record(view) => {
                self.put_u16(view.len() as u16);
                for col in 0..view.len() {
                    let field = view.field(col)?;
                    if matches!(field, Any::Record(_)) {
                        return Err(GraphError::BadInput(
                            "nested record values are not encodable".into(),
                        ));
                    }
                    self.put_any(&field)?;
                }
            }
        }
        Ok(())
    }
}

/// Cursor over an encoded byte slice. All reads are bounds-checked and
/// fail with `BadInput` on truncation.
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(GraphError::BadInput("truncated value payload".into()));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn get_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn get_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn get_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn get_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.take(len)
    }

    pub fn get_str(&mut self) -> Result<&'a str> {
        let len = self.get_u32()? as usize;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map_err(|_| GraphError::BadInput("invalid utf-8 in string payload".into()))
    }

    /// Reads one tagged value, borrowing string payloads from the
    /// underlying buffer. Record tags do not occur on the wire (the
    /// transactional path moves scalars only).
    pub fn get_any(&mut self) -> Result<Any<'a>> {
        let ty = PropType::from_tag(self.get_u8()?)?;
        Ok(match ty {
            PropType::Empty => Any::Empty,
            PropType::Bool => Any::Bool(self.get_u8()? != 0),
            PropType::Int32 => Any::Int32(self.get_i32()?),
            PropType::UInt32 => Any::UInt32(self.get_u32()?),
            PropType::Int64 => Any::Int64(self.get_i64()?),
            PropType::UInt64 => Any::UInt64(self.get_u64()?),
            PropType::Float => Any::Float(self.get_f32()?),
            PropType::Double => Any::Double(self.get_f64()?),
            PropType::Date => Any::Date(self.get_i64()?),
            PropType::Day => Any::Day(self.get_i32()?),
            PropType::String | PropType::StringMap => Any::Str(self.get_str()?),
            PropType::Record => {
                return Err(GraphError::Unsupported(
                    "record values do not appear in op streams",
                ))
            }
        })
    }
}

/// Packs a fixed-width scalar into the 64-bit inline payload slot of a
/// neighbor record. Fails with `TypeMismatch` when the value does not
/// match the declared inline type.
pub fn to_inline_bits(value: &Any<'_>, ty: PropType) -> Result<u64> {
    if !compatible(value.type_of(), ty) {
        return Err(GraphError::TypeMismatch("edge data type"));
    }
    Ok(match value {
        Any::Empty => 0,
        Any::Bool(v) => u64::from(*v),
        Any::Int32(v) => *v as u32 as u64,
        Any::UInt32(v) => u64::from(*v),
        Any::Int64(v) => *v as u64,
        Any::UInt64(v) => *v,
        Any::Float(v) => u64::from(v.to_bits()),
        Any::Double(v) => v.to_bits(),
        Any::Date(v) => *v as u64,
        Any::Day(v) => *v as u32 as u64,
        Any::Str(_) | Any::Record(_) => {
            return Err(GraphError::TypeMismatch("variable-width edge data is not inlinable"))
        }
    })
}

/// Inverse of [`to_inline_bits`].
pub fn from_inline_bits(bits: u64, ty: PropType) -> Any<'static> {
    match ty {
        PropType::Empty => Any::Empty,
        PropType::Bool => Any::Bool(bits != 0),
        PropType::Int32 => Any::Int32(bits as u32 as i32),
        PropType::UInt32 => Any::UInt32(bits as u32),
        PropType::Int64 => Any::Int64(bits as i64),
        PropType::UInt64 => Any::UInt64(bits),
        PropType::Float => Any::Float(f32::from_bits(bits as u32)),
        PropType::Double => Any::Double(f64::from_bits(bits)),
        PropType::Date => Any::Date(bits as i64),
        PropType::Day => Any::Day(bits as u32 as i32),
        PropType::String | PropType::StringMap | PropType::Record => Any::Empty,
    }
}
