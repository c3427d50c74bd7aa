//! Tablespace options (`WITH (...)`, `SET (...)`, `RESET (...)`)

use crate::catalog::TablespaceOptions;
use crate::tablespace::error::{TablespaceError, TablespaceResult};

/// One `name [= value]` element of an option list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefElem {
    pub name: String,
    pub value: Option<String>,
}

impl DefElem {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    /// `RESET (name)` or a bare boolean flag
    pub fn flag(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum OptionKind {
    Real { min: f64, max: f64 },
    Int { min: i64, max: i64 },
}

/// Options a tablespace recognizes
const TABLESPACE_OPTIONS: &[(&str, OptionKind)] = &[
    (
        "seq_page_cost",
        OptionKind::Real {
            min: 0.0,
            max: f64::MAX,
        },
    ),
    (
        "random_page_cost",
        OptionKind::Real {
            min: 0.0,
            max: f64::MAX,
        },
    ),
    (
        "effective_io_concurrency",
        OptionKind::Int { min: 0, max: 1000 },
    ),
    (
        "maintenance_io_concurrency",
        OptionKind::Int { min: 0, max: 1000 },
    ),
];

/// Merge `deltas` into `current`
///
/// With `reset` the named options are removed, otherwise each is set (a bare
/// name means `true`) and moves to the end of the list.
pub fn transform_options(
    current: &TablespaceOptions,
    deltas: &[DefElem],
    reset: bool,
) -> TablespaceResult<TablespaceOptions> {
    let mut merged = current.clone();

    for delta in deltas {
        if delta.name.contains('=') {
            return Err(TablespaceError::InvalidParameter(format!(
                "invalid option name \"{}\": must not contain \"=\"",
                delta.name
            )));
        }
        if reset {
            if delta.value.is_some() {
                return Err(TablespaceError::InvalidParameter(
                    "RESET must not include values for parameters".to_string(),
                ));
            }
            merged.remove(&delta.name);
        } else {
            let value = delta.value.clone().unwrap_or_else(|| "true".to_string());
            merged.remove(&delta.name);
            merged.insert(delta.name.clone(), value);
        }
    }

    Ok(merged)
}

/// Check every option against the recognized set
pub fn validate_options(options: &TablespaceOptions) -> TablespaceResult<()> {
    for (name, value) in options.iter() {
        let kind = TABLESPACE_OPTIONS
            .iter()
            .find(|(known, _)| known == name)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| {
                TablespaceError::InvalidParameter(format!("unrecognized parameter \"{}\"", name))
            })?;

        match kind {
            OptionKind::Real { min, max } => {
                let parsed = value.trim().parse::<f64>().map_err(|_| {
                    TablespaceError::InvalidParameter(format!(
                        "invalid value for floating point option \"{}\": {}",
                        name, value
                    ))
                })?;
                if !(min..=max).contains(&parsed) {
                    return Err(TablespaceError::InvalidParameter(format!(
                        "value {} out of bounds for option \"{}\"",
                        value, name
                    )));
                }
            }
            OptionKind::Int { min, max } => {
                let parsed = value.trim().parse::<i64>().map_err(|_| {
                    TablespaceError::InvalidParameter(format!(
                        "invalid value for integer option \"{}\": {}",
                        name, value
                    ))
                })?;
                if !(min..=max).contains(&parsed) {
                    return Err(TablespaceError::InvalidParameter(format!(
                        "value {} out of bounds for option \"{}\"",
                        value, name
                    )));
                }
            }
        }
    }
    Ok(())
}
