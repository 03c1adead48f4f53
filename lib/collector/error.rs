use thiserror::Error;

use crate::cloud_client::FetchError;
use crate::inventory::CycleId;
use crate::registry::RegistryError;
use crate::sink::SinkError;

/// Failures that abort a refresh cycle (or, for `Configuration`, startup).
#[derive(Error, Debug)]
pub enum Error {
    #[error("transport failure")]
    Transport(#[from] TransportError),

    #[error("configuration error")]
    Configuration(#[from] RegistryError),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
}

/// Collaborator I/O failures.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("listing scopes failed")]
    Scopes(#[source] FetchError),

    #[error("fetching {entity_type} in scope {scope} failed")]
    Fetch {
        entity_type: String,
        scope: String,
        #[source]
        source: FetchError,
    },

    #[error("inventory store call failed")]
    Sink(#[source] SinkError),
}

impl From<SinkError> for Error {
    fn from(err: SinkError) -> Self {
        if err.is_protocol_violation() {
            Error::ProtocolViolation(err.to_string())
        } else {
            Error::Transport(TransportError::Sink(err))
        }
    }
}

impl Error {
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Error::ProtocolViolation(_))
    }
}

/// A refresh cycle that stopped before its sweep decision.
///
/// Parts uploaded before the failure stay with the store; the cycle is never
/// resumed and its id is never reused.
#[derive(Error, Debug)]
#[error("refresh cycle {cycle_id} for {entity_type} failed after {parts_uploaded} part(s)")]
pub struct CycleError {
    pub cycle_id: CycleId,
    pub entity_type: String,
    pub parts_uploaded: usize,
    #[source]
    pub source: Error,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud_client::FetchErrorKind;
    use crate::logging::format_error_report;

    #[test]
    fn refused_sweep_maps_to_protocol_violation() {
        let err: Error = SinkError::SweepRefused {
            cycle_id: CycleId::generate(),
            reason: "expected 3 parts".to_string(),
        }
        .into();
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn unreachable_store_maps_to_transport() {
        let err: Error = SinkError::Unavailable("connection refused".to_string()).into();
        assert!(err.is_transport());
    }

    #[test]
    fn error_report_walks_the_fetch_chain() {
        let err = CycleError {
            cycle_id: CycleId::generate(),
            entity_type: "vms".to_string(),
            parts_uploaded: 2,
            source: TransportError::Fetch {
                entity_type: "vms".to_string(),
                scope: "sub-3".to_string(),
                source: FetchError::new(FetchErrorKind::Network, "connection reset"),
            }
            .into(),
        };

        let report = format_error_report(&err);
        assert!(report.contains("after 2 part(s)"));
        assert!(report.contains("fetching vms in scope sub-3 failed"));
        assert!(report.contains("connection reset"));
    }
}
