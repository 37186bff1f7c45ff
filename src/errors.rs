use std::fmt::Display;

#[derive(Debug)]
pub enum BatchCollapseError {
    /// The driver thread could not be spawned.
    Io(std::io::Error),
}

impl Display for BatchCollapseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchCollapseError::Io(e) => {
                write!(f, "Batch collapse : failed to spawn driver thread [{}]", e)
            }
        }
    }
}

impl std::error::Error for BatchCollapseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BatchCollapseError::Io(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for BatchCollapseError {
    fn from(value: std::io::Error) -> Self {
        BatchCollapseError::Io(value)
    }
}
