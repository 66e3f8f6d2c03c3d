//! Structured and plain-text simulation artifacts.
//!
//! A [`ComparisonArtifact`] is a handle to a structured output file. Opening the
//! handle performs no I/O: the file is read and indexed on the first quantity
//! lookup, and only the requested quantity is decoded into numbers.

mod dataset;
mod text;

pub use dataset::JsonDatasetReader;
pub use text::{TextArtifact, TextLine, TextParsingOptions};

use serde::Serialize;
use std::cell::OnceCell;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeClass {
    Scalar,
    Series,
    Field,
}

impl Display for ShapeClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Scalar => "scalar",
            Self::Series => "series",
            Self::Field => "field",
        })
    }
}

/// A named numeric value stored row-major. An empty shape is a scalar.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    shape: Vec<usize>,
    values: Vec<f64>,
}

impl Quantity {
    pub fn scalar(value: f64) -> Self {
        Self {
            shape: Vec::new(),
            values: vec![value],
        }
    }

    pub fn series(values: Vec<f64>) -> Self {
        Self {
            shape: vec![values.len()],
            values,
        }
    }

    pub fn field(shape: Vec<usize>, values: Vec<f64>) -> Option<Self> {
        let expected_len = shape.iter().product::<usize>();
        (expected_len == values.len()).then_some(Self { shape, values })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn shape_class(&self) -> ShapeClass {
        match self.shape.len() {
            0 => ShapeClass::Scalar,
            1 => ShapeClass::Series,
            _ => ShapeClass::Field,
        }
    }

    /// Multi-dimensional index of a flat row-major offset.
    pub fn unravel_index(&self, flat_index: usize) -> Vec<usize> {
        let mut remaining = flat_index;
        let mut index = vec![0; self.shape.len()];
        for (axis, extent) in self.shape.iter().enumerate().rev() {
            if *extent == 0 {
                continue;
            }
            index[axis] = remaining % extent;
            remaining /= extent;
        }
        index
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("failed to read artifact '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("artifact '{}' is not valid UTF-8: {source}", path.display())]
    Encoding {
        path: PathBuf,
        source: std::string::FromUtf8Error,
    },
    #[error("failed to decode artifact '{}': {source}", path.display())]
    Decode {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("quantity '{key}' in artifact '{}' is malformed: {message}", path.display())]
    MalformedQuantity {
        path: PathBuf,
        key: String,
        message: String,
    },
}

impl ArtifactError {
    pub fn path(&self) -> &Path {
        match self {
            Self::Read { path, .. }
            | Self::Encoding { path, .. }
            | Self::Decode { path, .. }
            | Self::MalformedQuantity { path, .. } => path,
        }
    }
}

/// Indexed contents of one structured artifact.
pub trait QuantitySource {
    fn keys(&self) -> Vec<String>;

    /// Decodes `key`, returning `Ok(None)` when the artifact has no such quantity.
    fn quantity(&self, key: &str) -> Result<Option<Quantity>, ArtifactError>;
}

/// Format-specific loader for structured artifacts.
pub trait ArtifactReader {
    fn open(&self, path: &Path) -> Result<Box<dyn QuantitySource>, ArtifactError>;
}

pub struct ComparisonArtifact<'r> {
    path: PathBuf,
    reader: &'r dyn ArtifactReader,
    contents: OnceCell<Box<dyn QuantitySource>>,
}

impl<'r> ComparisonArtifact<'r> {
    pub fn new(path: impl Into<PathBuf>, reader: &'r dyn ArtifactReader) -> Self {
        Self {
            path: path.into(),
            reader,
            contents: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.contents.get().is_some()
    }

    pub fn keys(&self) -> Result<Vec<String>, ArtifactError> {
        Ok(self.contents()?.keys())
    }

    pub fn quantity(&self, key: &str) -> Result<Option<Quantity>, ArtifactError> {
        self.contents()?.quantity(key)
    }

    fn contents(&self) -> Result<&dyn QuantitySource, ArtifactError> {
        if let Some(source) = self.contents.get() {
            return Ok(source.as_ref());
        }

        tracing::debug!(path = %self.path.display(), "loading structured artifact");
        let source = self.reader.open(&self.path)?;
        Ok(self.contents.get_or_init(|| source).as_ref())
    }
}
