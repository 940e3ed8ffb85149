use std::fmt;

#[derive(Debug)]
pub enum CertPressError {
    MissingPageGeometry,
    InvalidInstancesPerPage(u32),
    MissingPositionTable { class_type: String, position: usize },
    InvalidTemplate(String),
    EmptyBatch,
    Underlay(String),
    Io(std::io::Error),
}

impl fmt::Display for CertPressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertPressError::MissingPageGeometry => {
                write!(f, "template has no usable page geometry")
            }
            CertPressError::InvalidInstancesPerPage(value) => {
                write!(f, "instances per page must be 1, 2 or 3 (got {})", value)
            }
            CertPressError::MissingPositionTable {
                class_type,
                position,
            } => {
                write!(
                    f,
                    "no position table for family '{}' position {}",
                    class_type, position
                )
            }
            CertPressError::InvalidTemplate(message) => {
                write!(f, "invalid template: {}", message)
            }
            CertPressError::EmptyBatch => write!(f, "no records provided to render"),
            CertPressError::Underlay(message) => write!(f, "underlay error: {}", message),
            CertPressError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for CertPressError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CertPressError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CertPressError {
    fn from(value: std::io::Error) -> Self {
        CertPressError::Io(value)
    }
}
