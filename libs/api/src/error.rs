#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    #[error("codec: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("unknown record kind '{0}'")]
    UnknownKind(String),
}
