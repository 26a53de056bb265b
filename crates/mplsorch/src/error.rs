//! Error types for MPLS label forwarding operations.
//!
//! Every failure in this crate is local and recoverable: an operation that
//! returns an error has left the binding store and the forwarding table
//! exactly as they were before the call.

use std::io;
use thiserror::Error;

use crate::label::MplsLabel;
use crate::vrf::VrfId;

/// Result type alias for MPLS operations.
pub type Result<T> = std::result::Result<T, MplsError>;

/// Errors that can occur while maintaining label forwarding state.
#[derive(Debug, Error)]
pub enum MplsError {
    /// Label value does not fit in 20 bits.
    #[error("Invalid MPLS label {0}, max is 1048575")]
    InvalidLabel(u32),

    /// Incoming label outside the range allowed for static bindings.
    #[error("Label {label} outside static range {min}-{max}")]
    LabelOutOfRange {
        /// The rejected label.
        label: MplsLabel,
        /// Lowest allowed label.
        min: u32,
        /// Highest allowed label.
        max: u32,
    },

    /// ECMP members of one incoming label would mix swap and PHP.
    #[error("Inconsistent label operation for in-label {in_label}: out-label {out_label} does not match existing nexthops")]
    InconsistentLabelOp {
        /// The incoming label.
        in_label: MplsLabel,
        /// The rejected outgoing label.
        out_label: MplsLabel,
    },

    /// IPv4 and IPv6 nexthops on the same incoming label.
    #[error("Address family mismatch for in-label {0}")]
    FamilyMismatch(MplsLabel),

    /// No static binding matches.
    #[error("Static LSP not found: {in_label} via {nexthop}")]
    BindingNotFound {
        /// The incoming label.
        in_label: MplsLabel,
        /// The nexthop that was looked up.
        nexthop: String,
    },

    /// No forwarding entry for the incoming label.
    #[error("LSP not found: {0}")]
    LspNotFound(MplsLabel),

    /// No candidate matches within an existing forwarding entry.
    #[error("NHLFE not found for in-label {in_label}: {nexthop}")]
    CandidateNotFound {
        /// The incoming label.
        in_label: MplsLabel,
        /// The nexthop that was looked up.
        nexthop: String,
    },

    /// Tables were never created for this VRF.
    #[error("MPLS tables not initialized for VRF {0}")]
    VrfNotFound(VrfId),

    /// Tables already exist for this VRF.
    #[error("MPLS tables already initialized for VRF {0}")]
    VrfExists(VrfId),

    /// Malformed nexthop text or descriptor.
    #[error("Invalid nexthop: {0}")]
    InvalidNexthop(String),

    /// Configuration validation error.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// Reading a configuration file failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration file is not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MplsError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns true for errors raised by validation before any mutation.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            MplsError::InvalidLabel(_)
                | MplsError::LabelOutOfRange { .. }
                | MplsError::InconsistentLabelOp { .. }
                | MplsError::FamilyMismatch(_)
                | MplsError::InvalidNexthop(_)
                | MplsError::InvalidConfig { .. }
        )
    }

    /// Returns true if the target of a removal or lookup did not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            MplsError::BindingNotFound { .. }
                | MplsError::LspNotFound(_)
                | MplsError::CandidateNotFound { .. }
                | MplsError::VrfNotFound(_)
        )
    }
}
