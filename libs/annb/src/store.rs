//! Single-file store of typed attributes and named 2-D arrays.
//!
//! Layout on disk:
//!
//! ```text
//! +----------+---------+------------------+----------+-------------------------------+
//! | ANNBSTOR | version | array payloads   | manifest | offset u64 | len u64 | ANNBEND! |
//! | 8 bytes  | u32 LE  | LE, row-major    | JSON     | trailer (24 bytes)            |
//! +----------+---------+------------------+----------+-------------------------------+
//! ```
//!
//! The manifest lists every attribute and the dtype, shape and offset of every
//! array. It is written after all payloads, and the file only appears at its
//! final path once [`StoreWriter::finish`] renames it into place, so a reader
//! never observes a half-written store under the real name.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::matrix::Matrix;

const MAGIC: &[u8; 8] = b"ANNBSTOR";
const TRAILER_MAGIC: &[u8; 8] = b"ANNBEND!";
const HEADER_LEN: u64 = 12;
const TRAILER_LEN: u64 = 24;

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

/// Typed scalar attribute.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl AttrValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            AttrValue::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            AttrValue::Float(f) => Some(*f),
            AttrValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for AttrValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttrValue::Bool(b) => write!(f, "{}", b),
            AttrValue::Int(i) => write!(f, "{}", i),
            AttrValue::Float(x) => write!(f, "{}", x),
            AttrValue::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<usize> for AttrValue {
    fn from(v: usize) -> Self {
        AttrValue::Int(v as i64)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Text(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Text(v)
    }
}

/// Element type of a stored array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    F32,
    I64,
}

impl DType {
    fn size(&self) -> u64 {
        match self {
            DType::F32 => 4,
            DType::I64 => 8,
        }
    }
}

/// Manifest entry for one array.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArrayInfo {
    pub dtype: DType,
    pub shape: [usize; 2],
    pub offset: u64,
}

impl ArrayInfo {
    /// Payload size in bytes, `None` when the shape overflows.
    fn byte_len(&self) -> Option<u64> {
        let elements = self.shape[0].checked_mul(self.shape[1])?;
        u64::try_from(elements).ok()?.checked_mul(self.dtype.size())
    }

    /// Exclusive end offset of the payload.
    fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.byte_len()?)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Manifest {
    version: u32,
    attrs: BTreeMap<String, AttrValue>,
    arrays: BTreeMap<String, ArrayInfo>,
}

/// Streams arrays into a temporary file next to the destination.
///
/// Nothing is visible at the destination path until [`finish`](Self::finish)
/// succeeds. Dropping the writer discards the temporary file.
pub struct StoreWriter {
    path: PathBuf,
    out: BufWriter<NamedTempFile>,
    offset: u64,
    manifest: Manifest,
}

impl StoreWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let tmp = tempfile::Builder::new()
            .prefix(".annb-")
            .suffix(".tmp")
            .tempfile_in(&dir)?;

        let mut out = BufWriter::new(tmp);
        out.write_all(MAGIC)?;
        out.write_u32::<LittleEndian>(FORMAT_VERSION)?;

        Ok(Self {
            path,
            out,
            offset: HEADER_LEN,
            manifest: Manifest {
                version: FORMAT_VERSION,
                ..Default::default()
            },
        })
    }

    /// Destination path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<AttrValue>) {
        self.manifest.attrs.insert(name.to_string(), value.into());
    }

    pub fn write_f32(&mut self, name: &str, m: &Matrix<f32>) -> Result<()> {
        self.begin_array(name, DType::F32, m.shape())?;
        for v in m.as_slice() {
            self.out.write_f32::<LittleEndian>(*v)?;
        }
        self.offset += m.as_slice().len() as u64 * DType::F32.size();
        Ok(())
    }

    pub fn write_i64(&mut self, name: &str, m: &Matrix<i64>) -> Result<()> {
        self.begin_array(name, DType::I64, m.shape())?;
        for v in m.as_slice() {
            self.out.write_i64::<LittleEndian>(*v)?;
        }
        self.offset += m.as_slice().len() as u64 * DType::I64.size();
        Ok(())
    }

    fn begin_array(&mut self, name: &str, dtype: DType, shape: (usize, usize)) -> Result<()> {
        if self.manifest.arrays.contains_key(name) {
            return Err(Error::InvalidConfig(format!(
                "array `{}` written twice to {}",
                name,
                self.path.display()
            )));
        }
        self.manifest.arrays.insert(
            name.to_string(),
            ArrayInfo {
                dtype,
                shape: [shape.0, shape.1],
                offset: self.offset,
            },
        );
        Ok(())
    }

    /// Write the manifest and trailer, fsync, and rename into place.
    pub fn finish(mut self) -> Result<()> {
        let manifest = serde_json::to_vec(&self.manifest)?;
        self.out.write_all(&manifest)?;
        self.out.write_u64::<LittleEndian>(self.offset)?;
        self.out.write_u64::<LittleEndian>(manifest.len() as u64)?;
        self.out.write_all(TRAILER_MAGIC)?;

        let tmp = self.out.into_inner().map_err(|e| e.into_error())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Read handle over a finished store.
///
/// Opening reads only the header, trailer and manifest. Array payloads are
/// read on demand.
#[derive(Debug)]
pub struct StoreFile {
    path: PathBuf,
    file: File,
    manifest: Manifest,
}

impl StoreFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(Error::NotFound { path });
        }
        let mut file = File::open(&path)?;
        let len = file.metadata()?.len();
        if len < HEADER_LEN + TRAILER_LEN {
            return Err(Error::cache_invalid(&path, "file is truncated"));
        }

        let mut magic = [0u8; 8];
        file.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(Error::cache_invalid(&path, "not an annb store"));
        }
        let version = file.read_u32::<LittleEndian>()?;
        if version != FORMAT_VERSION {
            return Err(Error::cache_invalid(
                &path,
                format!("unsupported format version {}", version),
            ));
        }

        file.seek(SeekFrom::Start(len - TRAILER_LEN))?;
        let manifest_offset = file.read_u64::<LittleEndian>()?;
        let manifest_len = file.read_u64::<LittleEndian>()?;
        file.read_exact(&mut magic)?;
        if &magic != TRAILER_MAGIC {
            return Err(Error::cache_invalid(&path, "missing trailer"));
        }
        let manifest_end = manifest_offset.checked_add(manifest_len);
        if manifest_offset < HEADER_LEN || manifest_end != Some(len - TRAILER_LEN) {
            return Err(Error::cache_invalid(&path, "manifest bounds out of range"));
        }

        let mut buf = vec![0u8; manifest_len as usize];
        file.seek(SeekFrom::Start(manifest_offset))?;
        file.read_exact(&mut buf)?;
        let manifest: Manifest = serde_json::from_slice(&buf)
            .map_err(|e| Error::cache_invalid(&path, format!("corrupt manifest: {}", e)))?;

        for (name, info) in &manifest.arrays {
            let in_payload = matches!(info.end(), Some(end) if end <= manifest_offset);
            if info.offset < HEADER_LEN || !in_payload {
                return Err(Error::cache_invalid(
                    &path,
                    format!("array `{}` lies outside the payload region", name),
                ));
            }
        }

        Ok(Self {
            path,
            file,
            manifest,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn attrs(&self) -> &BTreeMap<String, AttrValue> {
        &self.manifest.attrs
    }

    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.manifest.attrs.get(name)
    }

    pub fn arrays(&self) -> impl Iterator<Item = (&str, &ArrayInfo)> {
        self.manifest.arrays.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn array_info(&self, name: &str) -> Option<&ArrayInfo> {
        self.manifest.arrays.get(name)
    }

    pub fn has_array(&self, name: &str) -> bool {
        self.manifest.arrays.contains_key(name)
    }

    pub fn read_f32(&self, name: &str) -> Result<Matrix<f32>> {
        self.read_f32_head(name, usize::MAX)
    }

    /// First `rows` rows of an f32 array.
    pub fn read_f32_head(&self, name: &str, rows: usize) -> Result<Matrix<f32>> {
        let (mut reader, rows, cols) = self.open_array(name, DType::F32, rows)?;
        let mut data = vec![0f32; rows * cols];
        reader.read_f32_into::<LittleEndian>(&mut data)?;
        Matrix::from_vec(data, rows, cols)
    }

    pub fn read_i64(&self, name: &str) -> Result<Matrix<i64>> {
        self.read_i64_head(name, usize::MAX)
    }

    pub fn read_i64_head(&self, name: &str, rows: usize) -> Result<Matrix<i64>> {
        let (mut reader, rows, cols) = self.open_array(name, DType::I64, rows)?;
        let mut data = vec![0i64; rows * cols];
        reader.read_i64_into::<LittleEndian>(&mut data)?;
        Matrix::from_vec(data, rows, cols)
    }

    fn open_array(
        &self,
        name: &str,
        dtype: DType,
        rows: usize,
    ) -> Result<(BufReader<&File>, usize, usize)> {
        let info = self
            .manifest
            .arrays
            .get(name)
            .ok_or_else(|| Error::cache_invalid(&self.path, format!("missing array `{}`", name)))?;
        if info.dtype != dtype {
            return Err(Error::cache_invalid(
                &self.path,
                format!("array `{}` has dtype {:?}, expected {:?}", name, info.dtype, dtype),
            ));
        }
        let mut file = &self.file;
        file.seek(SeekFrom::Start(info.offset))?;
        Ok((
            BufReader::new(file),
            rows.min(info.shape[0]),
            info.shape[1],
        ))
    }
}
