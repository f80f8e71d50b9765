pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Bif(#[from] bif::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("unknown format {}", .0)]
    UnknownFormat(String),

    #[error("line {}: {}", .line, .msg)]
    Parse { line: usize, msg: String },
}

impl Error {
    pub(crate) fn parse(line: usize, msg: impl Into<String>) -> Self {
        Self::Parse {
            line,
            msg: msg.into(),
        }
    }
}
