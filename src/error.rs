use std::fmt;

/// Failures raised by a model capability. The attack engine never inspects these; they are
/// handed back to the caller inside `PerturbError::Model`.
#[derive(Debug)]
pub enum ModelError {
    InputShape {
        expected_dim: usize,
        actual_dim: usize,
    },
    LabelCount {
        expected: usize,
        actual: usize,
    },
    LabelOutOfRange {
        label: usize,
        num_classes: usize,
    },
    Custom(String),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InputShape {
                expected_dim,
                actual_dim,
            } => write!(
                f,
                "model expects points of dimension {expected_dim}, got {actual_dim}"
            ),
            Self::LabelCount { expected, actual } => {
                write!(f, "expected {expected} labels, got {actual}")
            }
            Self::LabelOutOfRange { label, num_classes } => {
                write!(f, "label {label} out of range for {num_classes} classes")
            }
            Self::Custom(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ModelError {}

#[derive(Debug)]
pub enum PerturbError {
    ShapeMismatch {
        context: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    InvalidParameter {
        name: &'static str,
        reason: String,
    },
    NumericDegeneracy {
        context: &'static str,
    },
    MissingLoss,
    Model(ModelError),
    Record(serde_json::Error),
    Io(std::io::Error),
    Logging(String),
}

impl PerturbError {
    pub fn shape(context: &'static str, expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            context,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for PerturbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShapeMismatch {
                context,
                expected,
                actual,
            } => write!(
                f,
                "shape mismatch in {context}: expected {expected:?}, got {actual:?}"
            ),
            Self::InvalidParameter { name, reason } => {
                write!(f, "invalid parameter `{name}`: {reason}")
            }
            Self::NumericDegeneracy { context } => {
                write!(f, "non-finite values encountered in {context}")
            }
            Self::MissingLoss => write!(f, "model returned no loss for supplied targets"),
            Self::Model(err) => write!(f, "model evaluation failed: {err}"),
            Self::Record(err) => write!(f, "attack record (de)serialization failed: {err}"),
            Self::Io(err) => write!(f, "i/o error: {err}"),
            Self::Logging(msg) => write!(f, "logger setup failed: {msg}"),
        }
    }
}

impl std::error::Error for PerturbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Model(err) => Some(err),
            Self::Record(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ModelError> for PerturbError {
    fn from(err: ModelError) -> Self {
        Self::Model(err)
    }
}

impl From<serde_json::Error> for PerturbError {
    fn from(err: serde_json::Error) -> Self {
        Self::Record(err)
    }
}

impl From<std::io::Error> for PerturbError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
