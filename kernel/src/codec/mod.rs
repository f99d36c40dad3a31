// Table Codec
//
// Stores a table as one container section: a 2-D text array plus
// `_colnames` and `_coltypes` attributes holding JSON string arrays.
// Types are applied on read, best effort.

pub mod container;
pub mod table;

use container::{Container, ContainerError, Section, TextArray};
pub use table::{CoercionError, ColumnType, Table, TableError, TypedTable, Value};

pub const COLNAMES_ATTR: &str = "_colnames";
pub const COLTYPES_ATTR: &str = "_coltypes";

/// Fatal codec errors. The section cannot be interpreted as a table.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("no section at `{0}`")]
    SectionNotFound(String),

    #[error(
        "missing column name attribute `{attr}` at `{location}`; \
         was this section written by the table codec?"
    )]
    MissingMetadata { location: String, attr: &'static str },

    #[error("malformed `{attr}` at `{location}`: {reason}")]
    MalformedMetadata {
        location: String,
        attr: &'static str,
        reason: String,
    },

    #[error("table error: {0}")]
    Table(#[from] TableError),

    #[error("container error: {0}")]
    Container(#[from] ContainerError),
}

/// Recoverable problems found while reading. The table is still returned,
/// with every column left as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadWarning {
    TypeMetadataMissing { location: String },
    TypeCoercionFailed { location: String, reason: String },
}

impl std::fmt::Display for ReadWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadWarning::TypeMetadataMissing { location } => write!(
                f,
                "could not find column type attribute `{COLTYPES_ATTR}` at `{location}`; \
                 skipping type coercion"
            ),
            ReadWarning::TypeCoercionFailed { location, reason } => {
                write!(f, "type coercion failed at `{location}`: {reason}; skipping")
            }
        }
    }
}

/// Result of [`read`]: the raw table, its typed view when coercion
/// succeeded, and any warnings raised on the way.
#[derive(Debug, Clone)]
pub struct TableRead {
    table: Table,
    typed: Option<TypedTable>,
    warnings: Vec<ReadWarning>,
}

impl TableRead {
    pub fn raw(&self) -> &Table {
        &self.table
    }

    pub fn typed(&self) -> Option<&TypedTable> {
        self.typed.as_ref()
    }

    pub fn warnings(&self) -> &[ReadWarning] {
        &self.warnings
    }

    pub fn into_table(self) -> Table {
        self.table
    }
}

/// Write `table` to `location`, replacing whatever was there.
pub fn write(container: &mut Container, location: &str, table: &Table) -> Result<(), CodecError> {
    let cols = table.columns().len();
    let cells: Vec<String> = table.rows().iter().flatten().cloned().collect();
    let array = TextArray::new(table.len(), cols, cells)?;

    let names = json_list(table.columns().iter().map(String::as_str));
    let types = json_list(table.types().iter().map(ColumnType::descriptor));

    let mut section = Section::new(array);
    section.set_attr(COLNAMES_ATTR, names);
    section.set_attr(COLTYPES_ATTR, types);
    container.insert_section(location, section);

    log::debug!("wrote {} rows x {} columns to `{}`", table.len(), cols, location);
    Ok(())
}

/// Read the table stored at `location`.
pub fn read(container: &Container, location: &str) -> Result<TableRead, CodecError> {
    let section = container
        .section(location)
        .ok_or_else(|| CodecError::SectionNotFound(location.to_string()))?;

    let raw_names = section
        .attr(COLNAMES_ATTR)
        .ok_or_else(|| CodecError::MissingMetadata {
            location: location.to_string(),
            attr: COLNAMES_ATTR,
        })?;
    let names: Vec<String> =
        serde_json::from_str(raw_names).map_err(|e| CodecError::MalformedMetadata {
            location: location.to_string(),
            attr: COLNAMES_ATTR,
            reason: e.to_string(),
        })?;

    let array = section.array();
    if names.len() != array.cols() {
        return Err(CodecError::MalformedMetadata {
            location: location.to_string(),
            attr: COLNAMES_ATTR,
            reason: format!("{} names for {} columns", names.len(), array.cols()),
        });
    }

    let mut table = Table::text(names)?;
    for row in array.iter_rows() {
        table.push_row(row.to_vec())?;
    }

    let mut warnings = Vec::new();
    let mut typed = None;

    match section.attr(COLTYPES_ATTR) {
        None => warnings.push(ReadWarning::TypeMetadataMissing {
            location: location.to_string(),
        }),
        Some(raw_types) => match apply_types(table.clone(), raw_types) {
            Ok((with_types, view)) => {
                table = with_types;
                typed = Some(view);
            }
            Err(reason) => warnings.push(ReadWarning::TypeCoercionFailed {
                location: location.to_string(),
                reason,
            }),
        },
    }

    for warning in &warnings {
        log::warn!("{warning}");
    }

    Ok(TableRead {
        table,
        typed,
        warnings,
    })
}

fn apply_types(table: Table, raw_types: &str) -> Result<(Table, TypedTable), String> {
    let descriptors: Vec<String> = serde_json::from_str(raw_types).map_err(|e| e.to_string())?;
    let types = descriptors
        .iter()
        .map(|d| d.parse::<ColumnType>())
        .collect::<Result<Vec<_>, _>>()?;

    let table = table.with_types(types).map_err(|e| e.to_string())?;
    let typed = table.coerce().map_err(|e| e.to_string())?;
    Ok((table, typed))
}

fn json_list<'a>(items: impl Iterator<Item = &'a str>) -> String {
    let items: Vec<&str> = items.collect();
    // A list of strings always serializes.
    serde_json::to_string(&items).unwrap_or_else(|_| "[]".to_string())
}
