#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Key not found")]
    NotFound,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record truncated mid-field")]
    ShortRead,

    #[error("Store corrupt: {0}")]
    Corrupt(String),

    #[error("Store format version mismatch: {ours} (ours) != {file} (file)")]
    VersionMismatch { ours: u8, file: u8 },

    #[error("Record field of {0} bytes does not fit in a 32-bit length")]
    TooLarge(usize),
}
