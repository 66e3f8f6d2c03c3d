use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StellaResult<T> = Result<T, StellaError>;

/// Failure class of a harness error; each class owns one process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StellaErrorCategory {
    InputValidationError,
    IoSystemError,
    ComputationError,
    InternalError,
}

impl StellaErrorCategory {
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::InputValidationError => 2,
            Self::IoSystemError => 3,
            Self::ComputationError => 4,
            Self::InternalError => 5,
        }
    }

    pub const fn category_name(self) -> &'static str {
        match self {
            Self::InputValidationError => "InputValidationError",
            Self::IoSystemError => "IoSystemError",
            Self::ComputationError => "ComputationError",
            Self::InternalError => "InternalError",
        }
    }
}

/// Categorized error shared by every harness component.
///
/// The placeholder is a stable dotted identifier (`IO.COMPARATOR_ARTIFACT`,
/// `RUN.SIMULATION`, ...) that scripts can match on without parsing messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StellaError {
    category: StellaErrorCategory,
    placeholder: &'static str,
    message: String,
}

impl StellaError {
    pub fn new(
        category: StellaErrorCategory,
        placeholder: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            placeholder,
            message: message.into(),
        }
    }

    pub fn input_validation(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(
            StellaErrorCategory::InputValidationError,
            placeholder,
            message,
        )
    }

    pub fn io_system(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(StellaErrorCategory::IoSystemError, placeholder, message)
    }

    pub fn computation(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(StellaErrorCategory::ComputationError, placeholder, message)
    }

    pub fn internal(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(StellaErrorCategory::InternalError, placeholder, message)
    }

    pub const fn category(&self) -> StellaErrorCategory {
        self.category
    }

    pub const fn placeholder(&self) -> &'static str {
        self.placeholder
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    pub fn diagnostic_line(&self) -> String {
        format!("ERROR: [{}] {}", self.placeholder, self.message)
    }

    pub fn fatal_exit_line(&self) -> String {
        format!("FATAL EXIT CODE: {}", self.exit_code())
    }
}

impl Display for StellaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.category.category_name(),
            self.placeholder,
            self.message
        )
    }
}

impl Error for StellaError {}
