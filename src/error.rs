use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed for '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Failed to connect to the chat server")]
    Connect(#[source] reqwest::Error),
    #[error("Chat request failed with status code: {0}")]
    Status(u16),
    #[error("Chat request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("Malformed response from the chat server: {0}")]
    Decode(#[source] reqwest::Error),
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            ChatError::Connect(e)
        } else if e.is_decode() {
            ChatError::Decode(e)
        } else {
            ChatError::Transport(e)
        }
    }
}
