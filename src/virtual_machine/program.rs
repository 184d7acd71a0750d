//! Program text loading.
//!
//! A [`Program`] is the initial memory image of an engine: one line of
//! comma-separated signed decimal integers, e.g. `1,9,10,3,2,3,11,0,99,30,40,50`.

use std::fmt;
use std::fs;
use std::num::ParseIntError;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while loading program text. Fatal before any engine starts.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Input held no cells at all.
    #[error("program is empty")]
    Empty,
    /// A token is not a signed decimal integer.
    #[error("invalid token {token:?} at cell {index}: {source}")]
    InvalidToken {
        index: usize,
        token: String,
        #[source]
        source: ParseIntError,
    },
    /// The program file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Immutable initial memory image.
///
/// Cloning is cheap: the cells are shared, and each engine copies them into
/// its own [`Memory`](super::memory::Memory) when it is created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Program {
    cells: Arc<[i64]>,
}

impl Program {
    /// Creates a program from raw cells.
    pub fn new(cells: impl Into<Vec<i64>>) -> Self {
        let cells: Vec<i64> = cells.into();
        Self {
            cells: cells.into(),
        }
    }

    /// Reads and parses a program file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path_ref = path.as_ref();
        let source = fs::read_to_string(path_ref).map_err(|source| LoadError::Io {
            path: path_ref.display().to_string(),
            source,
        })?;
        source.parse()
    }

    /// Returns the initial cells.
    pub fn cells(&self) -> &[i64] {
        &self.cells
    }

    /// Number of cells in the image.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns `true` if the image holds no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Returns a copy of the program with `cell` set to `value`, growing the
    /// image with zeros if `cell` lies past its end.
    pub fn patched(&self, cell: usize, value: i64) -> Self {
        let mut cells = self.cells.to_vec();
        if cell >= cells.len() {
            cells.resize(cell + 1, 0);
        }
        cells[cell] = value;
        Self::new(cells)
    }
}

impl FromStr for Program {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(LoadError::Empty);
        }
        let cells = trimmed
            .split(',')
            .enumerate()
            .map(|(index, token)| {
                let token = token.trim();
                token.parse::<i64>().map_err(|source| LoadError::InvalidToken {
                    index,
                    token: token.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(cells))
    }
}

impl From<Vec<i64>> for Program {
    fn from(cells: Vec<i64>) -> Self {
        Self::new(cells)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, cell) in self.cells.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{cell}")?;
        }
        Ok(())
    }
}
