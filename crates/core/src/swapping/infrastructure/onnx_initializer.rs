//! Minimal ONNX protobuf reader for graph initializers.
//!
//! Only walks `ModelProto.graph` (field 7) → `GraphProto.initializer`
//! (field 5) → `TensorProto` and skips everything else by wire type, so a
//! multi-hundred-megabyte model is scanned without decoding its nodes.

use std::path::{Path, PathBuf};

use thiserror::Error;

const MODEL_GRAPH: u32 = 7;
const GRAPH_INITIALIZER: u32 = 5;
const TENSOR_DIMS: u32 = 1;
const TENSOR_DATA_TYPE: u32 = 2;
const TENSOR_FLOAT_DATA: u32 = 4;
const TENSOR_NAME: u32 = 8;
const TENSOR_RAW_DATA: u32 = 9;

/// `TensorProto.DataType.FLOAT`.
const DATA_TYPE_FLOAT: u64 = 1;

#[derive(Error, Debug)]
pub enum InitializerError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed ONNX protobuf: {0}")]
    Malformed(&'static str),
    #[error("model graph has no initializers")]
    NoInitializers,
    #[error("initializer '{name}' has data type {data_type}, expected float")]
    UnsupportedType { name: String, data_type: u64 },
    #[error("initializer '{name}' holds {actual} values but dims {dims:?} need {expected}")]
    ShapeMismatch {
        name: String,
        dims: Vec<usize>,
        expected: usize,
        actual: usize,
    },
}

/// A float tensor stored in the model graph.
#[derive(Clone, Debug, PartialEq)]
pub struct TensorInitializer {
    pub name: String,
    pub dims: Vec<usize>,
    pub values: Vec<f32>,
}

impl TensorInitializer {
    /// Reshape into a 2-D array, if the tensor is 2-D.
    pub fn into_array2(self) -> Option<ndarray::Array2<f32>> {
        match self.dims[..] {
            [rows, cols] => ndarray::Array2::from_shape_vec((rows, cols), self.values).ok(),
            _ => None,
        }
    }
}

/// Reads the last initializer of the model graph stored at `path`.
pub fn read_last_initializer(path: &Path) -> Result<TensorInitializer, InitializerError> {
    let bytes = std::fs::read(path).map_err(|e| InitializerError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    last_initializer(&bytes)
}

/// The last initializer of a serialized `ModelProto`.
pub fn last_initializer(model: &[u8]) -> Result<TensorInitializer, InitializerError> {
    let mut graph = None;
    let mut reader = Reader::new(model);
    while let Some((field, value)) = reader.next_field()? {
        if let (MODEL_GRAPH, Value::Bytes(bytes)) = (field, value) {
            graph = Some(bytes);
        }
    }
    let graph = graph.ok_or(InitializerError::NoInitializers)?;

    let mut last = None;
    let mut reader = Reader::new(graph);
    while let Some((field, value)) = reader.next_field()? {
        if let (GRAPH_INITIALIZER, Value::Bytes(bytes)) = (field, value) {
            last = Some(bytes);
        }
    }
    parse_tensor(last.ok_or(InitializerError::NoInitializers)?)
}

fn parse_tensor(bytes: &[u8]) -> Result<TensorInitializer, InitializerError> {
    let mut name = String::new();
    let mut dims = Vec::new();
    let mut data_type = 0;
    let mut float_data = Vec::new();
    let mut raw_data: &[u8] = &[];

    let mut reader = Reader::new(bytes);
    while let Some((field, value)) = reader.next_field()? {
        match (field, value) {
            (TENSOR_DIMS, Value::Varint(v)) => dims.push(v as usize),
            (TENSOR_DIMS, Value::Bytes(packed)) => {
                let mut inner = Reader::new(packed);
                while !inner.is_empty() {
                    dims.push(inner.varint()? as usize);
                }
            }
            (TENSOR_DATA_TYPE, Value::Varint(v)) => data_type = v,
            (TENSOR_FLOAT_DATA, Value::Fixed32(bits)) => float_data.push(f32::from_bits(bits)),
            (TENSOR_FLOAT_DATA, Value::Bytes(packed)) => float_data.extend(le_floats(packed)?),
            (TENSOR_NAME, Value::Bytes(s)) => name = String::from_utf8_lossy(s).into_owned(),
            (TENSOR_RAW_DATA, Value::Bytes(raw)) => raw_data = raw,
            _ => {}
        }
    }

    if data_type != DATA_TYPE_FLOAT {
        return Err(InitializerError::UnsupportedType { name, data_type });
    }
    let values = if raw_data.is_empty() {
        float_data
    } else {
        le_floats(raw_data)?
    };
    let expected: usize = dims.iter().product();
    if values.len() != expected {
        return Err(InitializerError::ShapeMismatch {
            name,
            dims,
            expected,
            actual: values.len(),
        });
    }
    Ok(TensorInitializer { name, dims, values })
}

fn le_floats(bytes: &[u8]) -> Result<Vec<f32>, InitializerError> {
    if bytes.len() % 4 != 0 {
        return Err(InitializerError::Malformed("float data length is not a multiple of 4"));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

// ---------------------------------------------------------------------------
// Protobuf wire format
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Value<'a> {
    Varint(u64),
    Fixed64,
    Bytes(&'a [u8]),
    Fixed32(u32),
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn varint(&mut self) -> Result<u64, InitializerError> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = *self
                .buf
                .get(self.pos)
                .ok_or(InitializerError::Malformed("truncated varint"))?;
            self.pos += 1;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(InitializerError::Malformed("varint longer than 10 bytes"))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], InitializerError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or(InitializerError::Malformed("field runs past end of buffer"))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn next_field(&mut self) -> Result<Option<(u32, Value<'a>)>, InitializerError> {
        if self.is_empty() {
            return Ok(None);
        }
        let key = self.varint()?;
        let field = (key >> 3) as u32;
        let value = match key & 0x7 {
            0 => Value::Varint(self.varint()?),
            1 => {
                self.take(8)?;
                Value::Fixed64
            }
            2 => {
                let len = self.varint()? as usize;
                Value::Bytes(self.take(len)?)
            }
            5 => {
                let b = self.take(4)?;
                Value::Fixed32(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            }
            _ => return Err(InitializerError::Malformed("unsupported wire type")),
        };
        Ok(Some((field, value)))
    }
}
