use thiserror::Error;

#[derive(Debug, Error)]
pub enum LakesqlError {
    #[error("config: {message}")]
    Config { message: String },

    #[error("connection: {message}")]
    Connection { message: String },

    #[error("query: {message}")]
    Query { message: String },

    #[error("timeout: statement timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("auth: {message}")]
    Auth { message: String },

    #[error("unsupported: {message}")]
    Unsupported { message: String },
}
