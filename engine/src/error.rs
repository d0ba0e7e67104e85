use error_stack::Report;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackfillError {
    /// Failed to read the chain head.
    Head,
    /// Failed to fetch or store the given block.
    Block(u64),
    /// Failed to read the latest stored block.
    Store,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The identifier or parameter is malformed.
    InvalidInput,
    /// Neither the store nor the chain source have the record.
    NotFound,
    /// The record is not stored and the chain source failed.
    Unavailable,
    /// The store failed while listing blocks.
    Store,
}

pub trait ResolveErrorExt {
    fn is_not_found(&self) -> bool;
}

impl ResolveErrorExt for Report<ResolveError> {
    fn is_not_found(&self) -> bool {
        matches!(self.current_context(), ResolveError::NotFound)
    }
}

impl error_stack::Context for BackfillError {}

impl std::fmt::Display for BackfillError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackfillError::Head => write!(f, "backfill error: failed to read chain head"),
            BackfillError::Block(number) => {
                write!(f, "backfill error: failed to index block {number}")
            }
            BackfillError::Store => write!(f, "backfill error: failed to read store"),
        }
    }
}

impl error_stack::Context for ResolveError {}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveError::InvalidInput => write!(f, "resolve error: invalid input"),
            ResolveError::NotFound => write!(f, "resolve error: not found"),
            ResolveError::Unavailable => write!(f, "resolve error: chain source unavailable"),
            ResolveError::Store => write!(f, "resolve error: store request failed"),
        }
    }
}
