#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SyscallError {
    #[error("system call failed")]
    Failed,
    #[error("no such file")]
    NotFound,
    #[error("file table is full")]
    TableFull,
    #[error("bad address")]
    BadAddress,
    #[error("file name too long")]
    NameTooLong,
    #[error("invalid file name")]
    InvalidName,
    #[error("input/output error")]
    Io,
}
