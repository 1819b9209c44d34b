//! MAT Level 5 (legacy) container reader.
//!
//! Parses the little-endian element stream: small and regular data elements,
//! `miCOMPRESSED` wrappers (zlib), numeric arrays of every integer/float
//! class (widened to f64, column-major), char arrays, and recursive
//! struct/cell matrices. Sparse, object and big-endian files surface as
//! unsupported rather than misread.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use flate2::read::ZlibDecoder;

use crate::error::{CoreError, CoreResult};

/// Container version, sniffed from the 128-byte text header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatVersion {
    Legacy,
    V73,
}

/// Sniff the version marker from the first 128 bytes.
pub fn sniff_version(path: &Path) -> CoreResult<MatVersion> {
    let mut file = File::open(path)?;
    let mut header = [0u8; 128];
    let read = file.read(&mut header)?;
    let text = String::from_utf8_lossy(&header[..read]);
    if text.contains("MATLAB 7.3 MAT-file") {
        Ok(MatVersion::V73)
    } else {
        Ok(MatVersion::Legacy)
    }
}

/// Dense numeric array, stored column-major (Fortran order) like the file.
#[derive(Debug, Clone, PartialEq)]
pub struct MatArray {
    pub dims: Vec<usize>,
    pub data: Vec<f64>,
    /// Source class name, e.g. `double`, `int16`.
    pub class_name: String,
}

impl MatArray {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Linear (column-major) offset of a multi-index.
    pub fn offset(&self, index: &[usize]) -> usize {
        let mut offset = 0usize;
        let mut stride = 1usize;
        for (i, dim) in index.iter().zip(self.dims.iter()) {
            offset += i * stride;
            stride *= dim;
        }
        offset
    }
}

/// One parsed MAT value.
#[derive(Debug, Clone, PartialEq)]
pub enum MatValue {
    Numeric(MatArray),
    /// Struct (or struct array): per-element field values, element-major.
    Struct {
        dims: Vec<usize>,
        fields: Vec<String>,
        elements: Vec<Vec<MatValue>>,
    },
    Cell {
        dims: Vec<usize>,
        elements: Vec<MatValue>,
    },
    Unsupported {
        class_name: String,
        dims: Vec<usize>,
    },
}

/// A parsed legacy MAT file: top-level variables in file order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatFile {
    pub variables: Vec<(String, MatValue)>,
}

// MAT data element types.
const MI_INT8: u32 = 1;
const MI_UINT8: u32 = 2;
const MI_INT16: u32 = 3;
const MI_UINT16: u32 = 4;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_SINGLE: u32 = 7;
const MI_DOUBLE: u32 = 9;
const MI_INT64: u32 = 12;
const MI_UINT64: u32 = 13;
const MI_MATRIX: u32 = 14;
const MI_COMPRESSED: u32 = 15;
const MI_UTF8: u32 = 16;
const MI_UTF16: u32 = 17;

// Array classes.
const MX_CELL: u8 = 1;
const MX_STRUCT: u8 = 2;
const MX_OBJECT: u8 = 3;
const MX_CHAR: u8 = 4;
const MX_SPARSE: u8 = 5;
const MX_DOUBLE: u8 = 6;
const MX_SINGLE: u8 = 7;
const MX_INT8: u8 = 8;
const MX_UINT8: u8 = 9;
const MX_INT16: u8 = 10;
const MX_UINT16: u8 = 11;
const MX_INT32: u8 = 12;
const MX_UINT32: u8 = 13;
const MX_INT64: u8 = 14;
const MX_UINT64: u8 = 15;

/// Read and parse a legacy MAT file.
pub fn read_mat(path: &Path) -> CoreResult<MatFile> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    parse_mat_bytes(&bytes)
}

/// Parse an in-memory legacy MAT container.
pub fn parse_mat_bytes(bytes: &[u8]) -> CoreResult<MatFile> {
    if bytes.len() < 128 {
        return Err(CoreError::MatFormat("file shorter than MAT header".to_string()));
    }
    let endian = &bytes[126..128];
    if endian == b"MI" {
        return Err(CoreError::MatFormat(
            "big-endian MAT files are not supported".to_string(),
        ));
    }
    if endian != b"IM" {
        return Err(CoreError::MatFormat("missing MAT endian indicator".to_string()));
    }

    let mut cursor = Cursor::new(&bytes[128..]);
    let mut variables = Vec::new();
    while cursor.remaining() >= 8 {
        let (data_type, payload) = cursor.read_element()?;
        match data_type {
            MI_COMPRESSED => {
                let mut inflated = Vec::new();
                ZlibDecoder::new(payload)
                    .read_to_end(&mut inflated)
                    .map_err(|e| CoreError::MatFormat(format!("zlib inflate failed: {e}")))?;
                let mut inner = Cursor::new(&inflated);
                let (inner_type, inner_payload) = inner.read_element()?;
                if inner_type != MI_MATRIX {
                    continue;
                }
                if let Some((name, value)) = parse_matrix(inner_payload)? {
                    variables.push((name, value));
                }
            }
            MI_MATRIX => {
                if let Some((name, value)) = parse_matrix(payload)? {
                    variables.push((name, value));
                }
            }
            _ => {} // subsystem data / unknown top-level elements are skipped
        }
    }

    Ok(MatFile { variables })
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    fn u32(&mut self) -> CoreResult<u32> {
        let end = self.pos + 4;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or_else(|| CoreError::MatFormat("element tag past end of file".to_string()))?;
        self.pos = end;
        Ok(u32::from_le_bytes(slice.try_into().expect("4 bytes")))
    }

    fn take(&mut self, len: usize) -> CoreResult<&'a [u8]> {
        let end = self.pos + len;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or_else(|| CoreError::MatFormat("element data past end of file".to_string()))?;
        self.pos = end;
        Ok(slice)
    }

    /// One data element: small format (type+size packed into one word) or
    /// regular format. Regular payloads are padded to 8-byte boundaries.
    fn read_element(&mut self) -> CoreResult<(u32, &'a [u8])> {
        let first = self.u32()?;
        if first >> 16 != 0 {
            // Small data element: size in the upper 16 bits, data in the
            // following 4 bytes.
            let data_type = first & 0xFFFF;
            let size = (first >> 16) as usize;
            if size > 4 {
                return Err(CoreError::MatFormat("small element larger than 4 bytes".to_string()));
            }
            let payload = self.take(4)?;
            Ok((data_type, &payload[..size]))
        } else {
            let size = self.u32()? as usize;
            let payload = self.take(size)?;
            let pad = (8 - (size % 8)) % 8;
            if pad > 0 && self.remaining() >= pad {
                self.pos += pad;
            }
            Ok((first, payload))
        }
    }
}

/// Parse one `miMATRIX` payload into `(name, value)`. Empty payloads (used
/// for empty cells) come back as an empty numeric array with no name.
fn parse_matrix(payload: &[u8]) -> CoreResult<Option<(String, MatValue)>> {
    if payload.is_empty() {
        return Ok(Some((
            String::new(),
            MatValue::Numeric(MatArray {
                dims: vec![0, 0],
                data: Vec::new(),
                class_name: "double".to_string(),
            }),
        )));
    }

    let mut cursor = Cursor::new(payload);

    let (flags_type, flags_data) = cursor.read_element()?;
    if flags_type != MI_UINT32 || flags_data.len() < 8 {
        return Err(CoreError::MatFormat("malformed array flags".to_string()));
    }
    let flags_word = u32::from_le_bytes(flags_data[0..4].try_into().expect("4 bytes"));
    let class = (flags_word & 0xFF) as u8;

    let (dims_type, dims_data) = cursor.read_element()?;
    if dims_type != MI_INT32 {
        return Err(CoreError::MatFormat("malformed dimensions element".to_string()));
    }
    let dims: Vec<usize> = dims_data
        .chunks_exact(4)
        .map(|c| i32::from_le_bytes(c.try_into().expect("4 bytes")).max(0) as usize)
        .collect();

    let (_name_type, name_data) = cursor.read_element()?;
    let name = String::from_utf8_lossy(name_data)
        .trim_end_matches('\0')
        .to_string();

    let count: usize = dims.iter().product();

    let value = match class {
        MX_DOUBLE | MX_SINGLE | MX_INT8 | MX_UINT8 | MX_INT16 | MX_UINT16 | MX_INT32
        | MX_UINT32 | MX_INT64 | MX_UINT64 => {
            let (real_type, real_data) = cursor.read_element()?;
            let data = decode_numeric(real_type, real_data)?;
            // A complex array carries an imaginary part next; the platform is
            // real-valued, so only the real part is kept.
            MatValue::Numeric(MatArray {
                dims,
                data,
                class_name: class_name(class).to_string(),
            })
        }
        MX_CHAR => MatValue::Unsupported {
            class_name: "char".to_string(),
            dims,
        },
        MX_SPARSE => MatValue::Unsupported {
            class_name: "sparse".to_string(),
            dims,
        },
        MX_OBJECT => MatValue::Unsupported {
            class_name: "object".to_string(),
            dims,
        },
        MX_CELL => {
            let mut elements = Vec::with_capacity(count);
            for _ in 0..count {
                let (elem_type, elem_data) = cursor.read_element()?;
                if elem_type != MI_MATRIX {
                    return Err(CoreError::MatFormat("cell element is not a matrix".to_string()));
                }
                match parse_matrix(elem_data)? {
                    Some((_, value)) => elements.push(value),
                    None => elements.push(MatValue::Unsupported {
                        class_name: "empty".to_string(),
                        dims: vec![0, 0],
                    }),
                }
            }
            MatValue::Cell { dims, elements }
        }
        MX_STRUCT => {
            let (_len_type, len_data) = cursor.read_element()?;
            if len_data.len() < 4 {
                return Err(CoreError::MatFormat("malformed struct field length".to_string()));
            }
            let field_len =
                i32::from_le_bytes(len_data[0..4].try_into().expect("4 bytes")).max(1) as usize;

            let (_names_type, names_data) = cursor.read_element()?;
            let fields: Vec<String> = names_data
                .chunks(field_len)
                .map(|chunk| {
                    String::from_utf8_lossy(chunk)
                        .trim_end_matches('\0')
                        .to_string()
                })
                .filter(|f| !f.is_empty())
                .collect();

            let mut elements = Vec::with_capacity(count);
            for _ in 0..count {
                let mut element = Vec::with_capacity(fields.len());
                for _ in 0..fields.len() {
                    let (field_type, field_data) = cursor.read_element()?;
                    if field_type != MI_MATRIX {
                        return Err(CoreError::MatFormat(
                            "struct field is not a matrix".to_string(),
                        ));
                    }
                    let value = parse_matrix(field_data)?
                        .map(|(_, v)| v)
                        .unwrap_or(MatValue::Unsupported {
                            class_name: "empty".to_string(),
                            dims: vec![0, 0],
                        });
                    element.push(value);
                }
                elements.push(element);
            }
            MatValue::Struct {
                dims,
                fields,
                elements,
            }
        }
        other => MatValue::Unsupported {
            class_name: format!("class_{other}"),
            dims,
        },
    };

    Ok(Some((name, value)))
}

fn class_name(class: u8) -> &'static str {
    match class {
        MX_DOUBLE => "double",
        MX_SINGLE => "single",
        MX_INT8 => "int8",
        MX_UINT8 => "uint8",
        MX_INT16 => "int16",
        MX_UINT16 => "uint16",
        MX_INT32 => "int32",
        MX_UINT32 => "uint32",
        MX_INT64 => "int64",
        MX_UINT64 => "uint64",
        _ => "unknown",
    }
}

fn decode_numeric(data_type: u32, data: &[u8]) -> CoreResult<Vec<f64>> {
    let out = match data_type {
        MI_DOUBLE => data
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes(c.try_into().expect("8 bytes")))
            .collect(),
        MI_SINGLE => data
            .chunks_exact(4)
            .map(|c| f64::from(f32::from_le_bytes(c.try_into().expect("4 bytes"))))
            .collect(),
        MI_INT8 => data.iter().map(|b| f64::from(*b as i8)).collect(),
        MI_UINT8 | MI_UTF8 => data.iter().map(|b| f64::from(*b)).collect(),
        MI_INT16 => data
            .chunks_exact(2)
            .map(|c| f64::from(i16::from_le_bytes(c.try_into().expect("2 bytes"))))
            .collect(),
        MI_UINT16 | MI_UTF16 => data
            .chunks_exact(2)
            .map(|c| f64::from(u16::from_le_bytes(c.try_into().expect("2 bytes"))))
            .collect(),
        MI_INT32 => data
            .chunks_exact(4)
            .map(|c| f64::from(i32::from_le_bytes(c.try_into().expect("4 bytes"))))
            .collect(),
        MI_UINT32 => data
            .chunks_exact(4)
            .map(|c| f64::from(u32::from_le_bytes(c.try_into().expect("4 bytes"))))
            .collect(),
        MI_INT64 => data
            .chunks_exact(8)
            .map(|c| i64::from_le_bytes(c.try_into().expect("8 bytes")) as f64)
            .collect(),
        MI_UINT64 => data
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes(c.try_into().expect("8 bytes")) as f64)
            .collect(),
        other => {
            return Err(CoreError::MatFormat(format!(
                "unsupported numeric element type {other}"
            )));
        }
    };
    Ok(out)
}

// ---------------------------------------------------------------------------
// Writer used by tests: enough of the format to round-trip numeric arrays.
// ---------------------------------------------------------------------------

/// Serialize numeric variables into a legacy MAT container. Data is written
/// uncompressed `miDOUBLE`, column-major, which the reader above accepts.
pub fn write_numeric_mat(variables: &[(&str, &[usize], &[f64])]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut header_text = b"MATLAB 5.0 MAT-file, written by flightdata-core".to_vec();
    header_text.resize(116, b' ');
    out.extend_from_slice(&header_text);
    out.extend_from_slice(&[0u8; 8]); // subsystem data offset
    out.extend_from_slice(&0x0100u16.to_le_bytes());
    out.extend_from_slice(b"IM");

    for (name, dims, data) in variables {
        let body = numeric_matrix_body(name, dims, data);
        out.extend_from_slice(&MI_MATRIX.to_le_bytes());
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&body);
        // matrix bodies below are already 8-byte aligned
    }
    out
}

fn numeric_matrix_body(name: &str, dims: &[usize], data: &[f64]) -> Vec<u8> {
    let mut body = Vec::new();

    // Array flags.
    body.extend_from_slice(&MI_UINT32.to_le_bytes());
    body.extend_from_slice(&8u32.to_le_bytes());
    body.extend_from_slice(&u32::from(MX_DOUBLE).to_le_bytes());
    body.extend_from_slice(&0u32.to_le_bytes());

    // Dimensions.
    let dims_bytes = dims.len() * 4;
    body.extend_from_slice(&MI_INT32.to_le_bytes());
    body.extend_from_slice(&(dims_bytes as u32).to_le_bytes());
    for d in dims {
        body.extend_from_slice(&(*d as i32).to_le_bytes());
    }
    pad8(&mut body);

    // Name.
    body.extend_from_slice(&MI_INT8.to_le_bytes());
    body.extend_from_slice(&(name.len() as u32).to_le_bytes());
    body.extend_from_slice(name.as_bytes());
    pad8(&mut body);

    // Real data.
    body.extend_from_slice(&MI_DOUBLE.to_le_bytes());
    body.extend_from_slice(&((data.len() * 8) as u32).to_le_bytes());
    for v in data {
        body.extend_from_slice(&v.to_le_bytes());
    }
    pad8(&mut body);

    body
}

fn pad8(buf: &mut Vec<u8>) {
    while buf.len() % 8 != 0 {
        buf.push(0);
    }
}
