//! SONiC MPLS Orchestration - static LSPs and label forwarding
//!
//! Maintains administrator-configured static label bindings and the label
//! forwarding table derived from them (and from other label sources),
//! selects the best/ECMP set per incoming label, and reconciles the result
//! with the forwarding plane.
//!
//! # Architecture
//!
//! ```text
//! [static config] ──> [StaticLspTable] ──┐
//!                                         ├──> [LspTable] ──> reconcile ──> [LspInstaller]
//! [other sources] ────────────────────────┘        ↑                             │
//!                                           [NexthopResolver]            [InstallResult]
//! ```
//!
//! # Key Components
//!
//! - [`orch::MplsOrch`]: per-VRF tables, configuration tasks, reconciliation
//! - [`static_lsp`]: static binding store
//! - [`lsp`]: forwarding table of LSPs and NHLFE candidates
//! - [`consistency`]: swap vs implicit-null ECMP check
//! - [`select`]: best-path and ECMP selection
//! - [`schedule`]: dirty-bit reconciliation and install acknowledgements

pub mod config;
pub mod consistency;
pub mod consumer;
pub mod display;
pub mod error;
pub mod label;
pub mod lsp;
pub mod nexthop;
pub mod orch;
pub mod schedule;
pub mod select;
pub mod static_lsp;
pub mod vrf;

pub use config::{MplsOrchConfig, MplsdConfig, StaticLspConfig};
pub use consumer::{LspConfigEntry, Operation, StaticLspConsumer, StaticLspKey};
pub use error::{MplsError, Result};
pub use label::{LabelOpClass, LabelRange, MplsLabel};
pub use lsp::{CandidateChange, Lsp, LspSource, LspState, LspTable, Nhlfe, NhlfeKey};
pub use nexthop::{AddressFamily, AlwaysActive, NexthopDescriptor, NexthopResolver};
pub use orch::{MplsOrch, MplsOrchStats};
pub use schedule::{
    Generations, InstallNexthop, InstallOp, InstallRequest, InstallResult, LspInstaller,
};
pub use static_lsp::{StaticChange, StaticLsp, StaticLspTable};
pub use vrf::{MplsVrf, VrfId, DEFAULT_VRF};
