use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Invalid store configuration.
    Configuration,
    /// Failed to connect to the database or check out a connection.
    Connection,
    /// A query or statement failed.
    Query,
    /// Stored data could not be converted back into ledger records.
    Decode,
}

impl error_stack::Context for StoreError {}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Configuration => f.write_str("store error: configuration error"),
            StoreError::Connection => f.write_str("store error: connection error"),
            StoreError::Query => f.write_str("store error: query failed"),
            StoreError::Decode => f.write_str("store error: failed to decode row"),
        }
    }
}
