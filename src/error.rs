#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("oracle rejected inputs: {0}")]
    Oracle(String),
    #[error("propagation walk hit its ceiling after visiting {visited} nodes")]
    PropagationBounds { visited: usize },
}

pub type EngineResult<T> = Result<T, EngineError>;
