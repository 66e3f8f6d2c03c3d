use super::{EXPECTED_OUTPUT_PREFIX, input_stem};
use crate::domain::StellaError;
use std::path::PathBuf;

/// Directory of checked-in golden outputs named `EXPECTED_OUTPUT.<stem><suffix>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedOutputRepository {
    root: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ExpectedOutputError {
    #[error("expected output for '{input_file}' was not found at '{}'", path.display())]
    Missing { input_file: String, path: PathBuf },
}

impl From<ExpectedOutputError> for StellaError {
    fn from(error: ExpectedOutputError) -> Self {
        StellaError::io_system("IO.EXPECTED_OUTPUT", error.to_string())
    }
}

impl ExpectedOutputRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn artifact_path(&self, input_file: &str, suffix: &str) -> PathBuf {
        self.root.join(format!(
            "{EXPECTED_OUTPUT_PREFIX}{}{suffix}",
            input_stem(input_file)
        ))
    }

    pub fn resolve(&self, input_file: &str, suffix: &str) -> Result<PathBuf, ExpectedOutputError> {
        let path = self.artifact_path(input_file, suffix);
        if path.is_file() {
            Ok(path)
        } else {
            Err(ExpectedOutputError::Missing {
                input_file: input_file.to_string(),
                path,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ExpectedOutputError, ExpectedOutputRepository};
    use crate::domain::{StellaError, StellaErrorCategory};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn resolves_existing_golden_files_only() {
        let temp = TempDir::new().expect("tempdir should be created");
        let repository = ExpectedOutputRepository::new(temp.path());
        let golden = temp.path().join("EXPECTED_OUTPUT.miller_linear.out.json");
        fs::write(&golden, "{}").expect("golden written");

        assert_eq!(
            repository.artifact_path("miller_linear.in", ".final_fields"),
            temp.path().join("EXPECTED_OUTPUT.miller_linear.final_fields")
        );
        assert_eq!(
            repository
                .resolve("miller_linear.in", ".out.json")
                .expect("golden exists"),
            golden
        );

        let missing = repository
            .resolve("miller_linear.in", ".final_fields")
            .expect_err("text golden is absent");
        assert!(matches!(missing, ExpectedOutputError::Missing { .. }));
        assert_eq!(
            StellaError::from(missing).category(),
            StellaErrorCategory::IoSystemError
        );
    }

    #[test]
    fn directories_are_not_golden_files() {
        let temp = TempDir::new().expect("tempdir should be created");
        fs::create_dir_all(temp.path().join("EXPECTED_OUTPUT.case.out.json"))
            .expect("directory created");
        let repository = ExpectedOutputRepository::new(temp.path());
        assert!(repository.resolve("case.in", ".out.json").is_err());
    }
}
