#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("bridge: {0}")]
    Bridge(#[from] observer_bridge::BridgeError),

    #[error("api: bind {addr}: {source}")]
    ApiBind {
        addr: String,
        source: std::io::Error,
    },

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}
