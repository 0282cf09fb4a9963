pub type SkelterResult<T> = Result<T, SkelterError>;

#[derive(thiserror::Error, Debug)]
pub enum SkelterError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("parse error: {0}")]
    Parse(String),

    /// The container exported no symbol table. Every asset lookup is by
    /// exported name, so such a file can never be used and loading it is fatal.
    #[error("container has no symbol table")]
    MissingSymbolTable,

    #[error("raster error: {0}")]
    Raster(String),

    #[error("compose error: {0}")]
    Compose(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SkelterError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn raster(msg: impl Into<String>) -> Self {
        Self::Raster(msg.into())
    }

    pub fn compose(msg: impl Into<String>) -> Self {
        Self::Compose(msg.into())
    }
}
