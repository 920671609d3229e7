use std::time::Duration;

use thiserror::Error;

use crate::accessory::CharacteristicKind;

#[derive(Debug, Error)]
pub enum CharacteristicError {
    #[error("invalid value for {kind}: {reason}")]
    InvalidValue { kind: CharacteristicKind, reason: String },
    #[error("{0} is read-only")]
    ReadOnly(CharacteristicKind),
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("cold sync failed after {attempts} attempt(s): {source}")]
    Sync {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },
    #[error("{step} timed out after {timeout:?}")]
    Timeout { step: &'static str, timeout: Duration },
    #[error("event stream unavailable: {0}")]
    Events(#[source] anyhow::Error),
}
