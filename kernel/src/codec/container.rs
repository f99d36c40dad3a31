// Binary Container
//
// A single self-describing file holding named sections. Each section is
// a 2-D array of text cells plus string attributes. The whole file is
// checksummed and always rewritten in full.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

pub const MAGIC: &[u8; 8] = b"TAGTABLE";
pub const VERSION_MAJOR: u16 = 1;
pub const VERSION_MINOR: u16 = 0;

const CHECKSUM_LEN: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("not a table container (bad magic)")]
    BadMagic,

    #[error("unsupported container version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("container truncated")]
    Truncated,

    #[error("invalid utf-8 in container: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("array shape mismatch: {rows}x{cols} needs {expected} cells, got {actual}")]
    ShapeMismatch {
        rows: usize,
        cols: usize,
        expected: usize,
        actual: usize,
    },
}

/// Row-major 2-D array of text cells.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextArray {
    rows: usize,
    cols: usize,
    cells: Vec<String>,
}

impl TextArray {
    /// Build an array from row-major cells.
    pub fn new(rows: usize, cols: usize, cells: Vec<String>) -> Result<Self, ContainerError> {
        let expected = rows * cols;
        if cells.len() != expected {
            return Err(ContainerError::ShapeMismatch {
                rows,
                cols,
                expected,
                actual: cells.len(),
            });
        }
        Ok(Self { rows, cols, cells })
    }

    pub fn empty(cols: usize) -> Self {
        Self {
            rows: 0,
            cols,
            cells: Vec::new(),
        }
    }

    /// Row count. Stored rather than derived so zero-width rows survive.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, index: usize) -> &[String] {
        let start = index * self.cols;
        &self.cells[start..start + self.cols]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[String]> {
        (0..self.rows()).map(move |i| self.row(i))
    }
}

/// A named entry in a container.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Section {
    array: TextArray,
    attrs: BTreeMap<String, String>,
}

impl Section {
    pub fn new(array: TextArray) -> Self {
        Self {
            array,
            attrs: BTreeMap::new(),
        }
    }

    pub fn array(&self) -> &TextArray {
        &self.array
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attrs.insert(name.into(), value.into());
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        self.attrs.remove(name)
    }
}

/// In-memory image of a container file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Container {
    sections: BTreeMap<String, Section>,
}

impl Container {
    pub fn new() -> Self {
        Self {
            sections: BTreeMap::new(),
        }
    }

    /// Read and validate a container file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ContainerError> {
        let bytes = fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }

    /// Write the container to `path`, replacing any previous file.
    ///
    /// Bytes go to a sibling temp file first, which is synced and then
    /// renamed over the target.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ContainerError> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        let tmp = temp_path(path);

        {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }

        if let Err(err) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }
        Ok(())
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    pub fn section_mut(&mut self, name: &str) -> Option<&mut Section> {
        self.sections.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    /// Insert a section, replacing any existing one with the same name.
    pub fn insert_section(&mut self, name: impl Into<String>, section: Section) {
        self.sections.insert(name.into(), section);
    }

    pub fn remove_section(&mut self, name: &str) -> Option<Section> {
        self.sections.remove(name)
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ContainerError> {
        let mut buf = Vec::new();
        buf.write_all(MAGIC)?;
        buf.write_u16::<LittleEndian>(VERSION_MAJOR)?;
        buf.write_u16::<LittleEndian>(VERSION_MINOR)?;
        buf.write_u32::<LittleEndian>(self.sections.len() as u32)?;

        for (name, section) in &self.sections {
            put_str(&mut buf, name)?;
            buf.write_u64::<LittleEndian>(section.array.rows as u64)?;
            buf.write_u32::<LittleEndian>(section.array.cols as u32)?;
            for cell in &section.array.cells {
                put_str(&mut buf, cell)?;
            }
            buf.write_u32::<LittleEndian>(section.attrs.len() as u32)?;
            for (key, value) in &section.attrs {
                put_str(&mut buf, key)?;
                put_str(&mut buf, value)?;
            }
        }

        let checksum = crc32fast::hash(&buf);
        buf.write_u32::<LittleEndian>(checksum)?;
        Ok(buf)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ContainerError> {
        if bytes.len() < MAGIC.len() + CHECKSUM_LEN {
            return Err(ContainerError::Truncated);
        }
        if &bytes[..MAGIC.len()] != MAGIC {
            return Err(ContainerError::BadMagic);
        }

        let (body, tail) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
        let stored = Cursor::new(tail).read_u32::<LittleEndian>()?;
        let computed = crc32fast::hash(body);
        if stored != computed {
            return Err(ContainerError::ChecksumMismatch { stored, computed });
        }

        let mut cursor = Cursor::new(&body[MAGIC.len()..]);
        let major = read_u16(&mut cursor)?;
        let minor = read_u16(&mut cursor)?;
        if major != VERSION_MAJOR {
            return Err(ContainerError::UnsupportedVersion { major, minor });
        }

        let count = read_u32(&mut cursor)?;
        let mut sections = BTreeMap::new();
        for _ in 0..count {
            let name = read_str(&mut cursor)?;
            let rows = read_u64(&mut cursor)? as usize;
            let cols = read_u32(&mut cursor)? as usize;

            let total = rows.checked_mul(cols).ok_or(ContainerError::Truncated)?;
            // Every cell carries at least a 4-byte length prefix.
            if total.saturating_mul(4) > remaining(&cursor) {
                return Err(ContainerError::Truncated);
            }
            let mut cells = Vec::with_capacity(total);
            for _ in 0..total {
                cells.push(read_str(&mut cursor)?);
            }

            let attr_count = read_u32(&mut cursor)?;
            let mut attrs = BTreeMap::new();
            for _ in 0..attr_count {
                let key = read_str(&mut cursor)?;
                let value = read_str(&mut cursor)?;
                attrs.insert(key, value);
            }

            sections.insert(
                name,
                Section {
                    array: TextArray::new(rows, cols, cells)?,
                    attrs,
                },
            );
        }

        if remaining(&cursor) != 0 {
            return Err(ContainerError::Truncated);
        }

        Ok(Self { sections })
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn put_str(buf: &mut Vec<u8>, value: &str) -> io::Result<()> {
    buf.write_u32::<LittleEndian>(value.len() as u32)?;
    buf.write_all(value.as_bytes())
}

fn remaining(cursor: &Cursor<&[u8]>) -> usize {
    cursor.get_ref().len() - cursor.position() as usize
}

fn truncated(err: io::Error) -> ContainerError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        ContainerError::Truncated
    } else {
        ContainerError::Io(err)
    }
}

fn read_u16(cursor: &mut Cursor<&[u8]>) -> Result<u16, ContainerError> {
    cursor.read_u16::<LittleEndian>().map_err(truncated)
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32, ContainerError> {
    cursor.read_u32::<LittleEndian>().map_err(truncated)
}

fn read_u64(cursor: &mut Cursor<&[u8]>) -> Result<u64, ContainerError> {
    cursor.read_u64::<LittleEndian>().map_err(truncated)
}

fn read_str(cursor: &mut Cursor<&[u8]>) -> Result<String, ContainerError> {
    let len = read_u32(cursor)? as usize;
    if len > remaining(cursor) {
        return Err(ContainerError::Truncated);
    }
    let mut bytes = vec![0u8; len];
    cursor.read_exact(&mut bytes).map_err(truncated)?;
    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Container {
        let array = TextArray::new(
            2,
            2,
            vec!["a".into(), "b".into(), "c".into(), "dé".into()],
        )
        .unwrap();
        let mut section = Section::new(array);
        section.set_attr("_colnames", "[\"x\",\"y\"]");

        let mut container = Container::new();
        container.insert_section("dataset", section);
        container
    }

    #[test]
    fn bytes_survive_reload() {
        let container = sample();
        let decoded = Container::from_bytes(&container.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, container);

        let section = decoded.section("dataset").unwrap();
        assert_eq!(section.array().rows(), 2);
        assert_eq!(section.array().row(1), ["c", "dé"]);
        assert_eq!(section.attr("_colnames"), Some("[\"x\",\"y\"]"));
    }

    #[test]
    fn empty_array_keeps_width() {
        let mut container = Container::new();
        container.insert_section("dataset", Section::new(TextArray::empty(6)));

        let decoded = Container::from_bytes(&container.to_bytes().unwrap()).unwrap();
        let array = decoded.section("dataset").unwrap().array();
        assert_eq!(array.rows(), 0);
        assert_eq!(array.cols(), 6);
    }

    #[test]
    fn zero_width_array_keeps_row_count() {
        let mut container = Container::new();
        container.insert_section("marks", Section::new(TextArray::new(3, 0, Vec::new()).unwrap()));

        let decoded = Container::from_bytes(&container.to_bytes().unwrap()).unwrap();
        let array = decoded.section("marks").unwrap().array();
        assert_eq!(array.rows(), 3);
        assert_eq!(array.cols(), 0);
        assert_eq!(array.iter_rows().count(), 3);
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let err = TextArray::new(2, 3, vec!["a".into()]).unwrap_err();
        assert!(matches!(err, ContainerError::ShapeMismatch { expected: 6, .. }));
    }

    #[test]
    fn corrupted_byte_fails_checksum() {
        let mut bytes = sample().to_bytes().unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xff;

        let err = Container::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, ContainerError::ChecksumMismatch { .. }));
    }

    #[test]
    fn foreign_file_is_rejected() {
        let err = Container::from_bytes(b"\x89HDF\r\n\x1a\n-not-ours").unwrap_err();
        assert!(matches!(err, ContainerError::BadMagic));

        let err = Container::from_bytes(b"TAG").unwrap_err();
        assert!(matches!(err, ContainerError::Truncated));
    }

    #[test]
    fn save_replaces_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tag_data.tlc");

        sample().save(&path).unwrap();
        let mut reopened = Container::open(&path).unwrap();
        assert!(reopened.contains("dataset"));

        reopened.remove_section("dataset");
        reopened.save(&path).unwrap();

        let reopened = Container::open(&path).unwrap();
        assert_eq!(reopened.section_names().count(), 0);
        assert!(!dir.path().join("tag_data.tlc.tmp").exists());
    }
}
