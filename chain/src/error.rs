use error_stack::Report;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainSourceError {
    /// Failed to send the request or read the response.
    Request,
    /// The request timed out.
    Timeout,
    /// The requested block or transaction does not exist.
    NotFound,
    /// The node returned a JSON-RPC error object.
    Rpc,
    DeserializeResponse,
    /// The node returned data that doesn't fit the ledger model.
    Model,
    Configuration,
}

pub trait ChainSourceErrorExt {
    fn is_not_found(&self) -> bool;
}

impl ChainSourceErrorExt for Report<ChainSourceError> {
    fn is_not_found(&self) -> bool {
        matches!(self.current_context(), ChainSourceError::NotFound)
    }
}

impl error_stack::Context for ChainSourceError {}

impl std::fmt::Display for ChainSourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainSourceError::Request => write!(f, "chain source error: failed to send request"),
            ChainSourceError::Timeout => write!(f, "chain source error: request timed out"),
            ChainSourceError::NotFound => write!(f, "chain source error: not found"),
            ChainSourceError::Rpc => write!(f, "chain source error: rpc error"),
            ChainSourceError::DeserializeResponse => {
                write!(f, "chain source error: failed to deserialize response")
            }
            ChainSourceError::Model => write!(f, "chain source error: conversion error"),
            ChainSourceError::Configuration => {
                write!(f, "chain source error: configuration error")
            }
        }
    }
}
