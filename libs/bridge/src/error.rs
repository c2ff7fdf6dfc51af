use observer_api::ObserverError;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("connect {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error(transparent)]
    Codec(#[from] ObserverError),

    #[error("unexpected reply: {0:?}")]
    UnexpectedReply(observer_api::AckStatus),

    #[error("bridge call timed out")]
    Timeout,
}
