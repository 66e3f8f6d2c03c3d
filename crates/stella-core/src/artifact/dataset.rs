use super::{ArtifactError, ArtifactReader, Quantity, QuantitySource};
use crate::numerics::parse_numeric_token;
use serde::Deserialize;
use serde_json::Value;
use serde_json::value::RawValue;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Reads `{ "variables": { "<key>": <value> } }` datasets.
///
/// A value is a number, nested rectangular arrays of numbers, or an explicit
/// `{ "shape": [..], "data": [..] }` object holding row-major data. `null`,
/// `"NaN"`, `"inf"` and `"-inf"` encode non-finite elements. Variables are kept
/// as raw JSON until requested.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDatasetReader;

impl ArtifactReader for JsonDatasetReader {
    fn open(&self, path: &Path) -> Result<Box<dyn QuantitySource>, ArtifactError> {
        let bytes = fs::read(path).map_err(|source| ArtifactError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let text = String::from_utf8(bytes).map_err(|source| ArtifactError::Encoding {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawDataset = serde_json::from_str(&text).map_err(|source| ArtifactError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Box::new(JsonDataset {
            path: path.to_path_buf(),
            variables: raw.variables,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct RawDataset {
    variables: BTreeMap<String, Box<RawValue>>,
}

#[derive(Debug, Deserialize)]
struct ExplicitQuantity {
    shape: Vec<usize>,
    data: Vec<Value>,
}

struct JsonDataset {
    path: PathBuf,
    variables: BTreeMap<String, Box<RawValue>>,
}

impl JsonDataset {
    fn malformed(&self, key: &str, message: impl Into<String>) -> ArtifactError {
        ArtifactError::MalformedQuantity {
            path: self.path.clone(),
            key: key.to_string(),
            message: message.into(),
        }
    }
}

impl QuantitySource for JsonDataset {
    fn keys(&self) -> Vec<String> {
        self.variables.keys().cloned().collect()
    }

    fn quantity(&self, key: &str) -> Result<Option<Quantity>, ArtifactError> {
        let Some(raw) = self.variables.get(key) else {
            return Ok(None);
        };
        let value: Value = serde_json::from_str(raw.get()).map_err(|source| ArtifactError::Decode {
            path: self.path.clone(),
            source,
        })?;

        decode_quantity(&value)
            .map(Some)
            .map_err(|message| self.malformed(key, message))
    }
}

fn decode_quantity(value: &Value) -> Result<Quantity, String> {
    match value {
        Value::Array(_) => {
            let mut shape = Vec::new();
            let mut values = Vec::new();
            collect_nested(value, 0, &mut shape, &mut values)?;
            Quantity::field(shape, values).ok_or_else(|| "array is not rectangular".to_string())
        }
        Value::Object(_) => {
            let explicit: ExplicitQuantity = serde_json::from_value(value.clone())
                .map_err(|error| format!("expected {{\"shape\", \"data\"}} object: {error}"))?;
            let values = explicit
                .data
                .iter()
                .enumerate()
                .map(|(index, element)| {
                    element_value(element).map_err(|message| format!("data[{index}]: {message}"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let element_count = values.len();
            Quantity::field(explicit.shape.clone(), values).ok_or_else(|| {
                format!(
                    "shape {:?} holds {} element(s) but data has {}",
                    explicit.shape,
                    explicit.shape.iter().product::<usize>(),
                    element_count
                )
            })
        }
        scalar => element_value(scalar).map(Quantity::scalar),
    }
}

fn collect_nested(
    value: &Value,
    depth: usize,
    shape: &mut Vec<usize>,
    values: &mut Vec<f64>,
) -> Result<(), String> {
    match value {
        Value::Array(items) => {
            if depth == shape.len() {
                if !values.is_empty() {
                    return Err(format!("ragged nesting at depth {depth}"));
                }
                shape.push(items.len());
            } else if shape[depth] != items.len() {
                return Err(format!(
                    "ragged array at depth {}: expected {} element(s), found {}",
                    depth,
                    shape[depth],
                    items.len()
                ));
            }

            for item in items {
                collect_nested(item, depth + 1, shape, values)?;
            }
            Ok(())
        }
        element => {
            if depth != shape.len() {
                return Err(format!("ragged nesting at depth {depth}"));
            }
            values.push(element_value(element)?);
            Ok(())
        }
    }
}

fn element_value(value: &Value) -> Result<f64, String> {
    match value {
        Value::Number(number) => number
            .as_f64()
            .ok_or_else(|| format!("number {number} is not representable as f64")),
        Value::Null => Ok(f64::NAN),
        Value::String(token) => {
            parse_numeric_token(token).ok_or_else(|| format!("'{token}' is not a number"))
        }
        other => Err(format!("unsupported element {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::JsonDatasetReader;
    use crate::artifact::{ArtifactError, ArtifactReader, ShapeClass};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_dataset(temp: &TempDir, content: &str) -> PathBuf {
        let path = temp.path().join("dataset.out.json");
        fs::write(&path, content).expect("dataset should be written");
        path
    }

    #[test]
    fn decodes_scalars_series_and_nested_fields() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = write_dataset(
            &temp,
            r#"
            {
              "variables": {
                "nstep": 200,
                "t": [0.0, 0.5, 1.0],
                "phi_vs_t": [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]
              }
            }
            "#,
        );
        let dataset = JsonDatasetReader.open(&path).expect("dataset should open");

        assert_eq!(dataset.keys(), vec!["nstep", "phi_vs_t", "t"]);

        let nstep = dataset.quantity("nstep").expect("decode").expect("present");
        assert_eq!(nstep.shape_class(), ShapeClass::Scalar);
        assert_eq!(nstep.values(), &[200.0]);

        let t = dataset.quantity("t").expect("decode").expect("present");
        assert_eq!(t.shape(), &[3]);

        let phi = dataset.quantity("phi_vs_t").expect("decode").expect("present");
        assert_eq!(phi.shape(), &[2, 3]);
        assert_eq!(phi.values(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn decodes_explicit_shape_objects_and_non_finite_tokens() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = write_dataset(
            &temp,
            r#"
            {
              "variables": {
                "density": { "shape": [2, 2], "data": [1.0, null, "inf", "-inf"] }
              }
            }
            "#,
        );
        let dataset = JsonDatasetReader.open(&path).expect("dataset should open");
        let density = dataset.quantity("density").expect("decode").expect("present");

        assert_eq!(density.shape(), &[2, 2]);
        assert_eq!(density.values()[0], 1.0);
        assert!(density.values()[1].is_nan());
        assert_eq!(density.values()[2], f64::INFINITY);
        assert_eq!(density.values()[3], f64::NEG_INFINITY);
    }

    #[test]
    fn missing_key_is_not_an_error() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = write_dataset(&temp, r#"{ "variables": { "t": [0.0] } }"#);
        let dataset = JsonDatasetReader.open(&path).expect("dataset should open");
        assert!(dataset.quantity("phi2").expect("lookup").is_none());
    }

    #[test]
    fn ragged_arrays_are_malformed() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = write_dataset(
            &temp,
            r#"
            {
              "variables": {
                "uneven": [[1.0, 2.0], [3.0]],
                "mixed": [1.0, [2.0]],
                "short": { "shape": [3], "data": [1.0, 2.0] }
              }
            }
            "#,
        );
        let dataset = JsonDatasetReader.open(&path).expect("dataset should open");

        for key in ["uneven", "mixed", "short"] {
            let error = dataset.quantity(key).expect_err("quantity should be malformed");
            assert!(
                matches!(&error, ArtifactError::MalformedQuantity { key: found, .. } if found == key),
                "unexpected error for {key}: {error}"
            );
        }
    }

    #[test]
    fn invalid_json_is_a_decode_error() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = write_dataset(&temp, "{ \"variables\": [1, 2");
        let error = JsonDatasetReader
            .open(&path)
            .err()
            .expect("open should fail");
        assert!(matches!(error, ArtifactError::Decode { .. }));
    }
}
