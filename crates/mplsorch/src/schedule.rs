//! Reconciliation of the forwarding table with the forwarding plane.
//!
//! Mutations only mark LSPs SCHEDULED. A pass drains the scheduled set,
//! re-runs selection for each LSP once, and hands install requests to the
//! [`LspInstaller`]. Acknowledgements come back asynchronously through
//! [`apply_result`]; each request carries a generation so a late answer to
//! an older request cannot overwrite newer state.

use log::{debug, info, warn};
use serde::Serialize;
use std::fmt;

use crate::label::MplsLabel;
use crate::lsp::{Lsp, LspState, LspTable};
use crate::nexthop::{AddressFamily, NexthopDescriptor, NexthopResolver};
use crate::select::select_best;
use crate::vrf::VrfId;

/// Forwarding-plane operation for one LSP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InstallOp {
    /// Program an LSP that is not in the forwarding plane.
    Install,
    /// Replace the nexthop set of an installed LSP.
    Update,
    /// Remove the LSP from the forwarding plane.
    Uninstall,
}

impl fmt::Display for InstallOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallOp::Install => write!(f, "install"),
            InstallOp::Update => write!(f, "update"),
            InstallOp::Uninstall => write!(f, "uninstall"),
        }
    }
}

/// One ECMP member of an install request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallNexthop {
    pub nexthop: NexthopDescriptor,
    pub out_label: MplsLabel,
}

/// Request handed to the forwarding plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallRequest {
    pub vrf: VrfId,
    pub in_label: MplsLabel,
    pub op: InstallOp,
    pub generation: u64,
    pub family: AddressFamily,
    /// Selected nexthops in selection order. Empty for uninstall.
    pub nexthops: Vec<InstallNexthop>,
}

/// Acknowledgement of an [`InstallRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallResult {
    pub vrf: VrfId,
    pub in_label: MplsLabel,
    pub generation: u64,
    pub op: InstallOp,
    pub success: bool,
}

impl InstallResult {
    /// Builds the acknowledgement for a request.
    pub fn for_request(request: &InstallRequest, success: bool) -> Self {
        Self {
            vrf: request.vrf,
            in_label: request.in_label,
            generation: request.generation,
            op: request.op,
            success,
        }
    }
}

/// Forwarding-plane programming interface.
///
/// `submit` must not block; the outcome is reported later as an
/// [`InstallResult`].
pub trait LspInstaller: Send + Sync {
    fn submit(&self, request: InstallRequest);
}

/// Reconciliation counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    /// Completed reconciliation passes.
    pub passes: u64,
    /// LSPs processed across all passes.
    pub lsps_processed: u64,
    pub installs: u64,
    pub updates: u64,
    pub uninstalls: u64,
    /// LSPs removed from the table after losing all candidates.
    pub lsps_removed: u64,
    /// Acknowledged successes.
    pub acks: u64,
    /// Acknowledged failures.
    pub failures: u64,
    /// Acknowledgements for an older generation.
    pub stale_acks: u64,
}

/// Source of request generations.
///
/// One counter serves every LSP of every VRF and never goes backwards, so
/// an entry that is removed and re-created cannot reuse the generation of a
/// request still in flight for its predecessor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generations {
    last: u64,
}

impl Generations {
    /// Allocates the next generation.
    pub fn next(&mut self) -> u64 {
        self.last += 1;
        self.last
    }

    /// Most recently allocated generation.
    pub fn last(&self) -> u64 {
        self.last
    }
}

fn decide(lsp: &Lsp) -> Option<InstallOp> {
    let fib_possible = lsp.in_fib() || lsp.is_pending();
    if lsp.num_ecmp() > 0 {
        let nhlfe_changed = lsp
            .nhlfes()
            .iter()
            .any(|n| n.flags().changed && (n.is_selected() || n.is_installed()));
        if !lsp.in_fib() {
            if lsp.is_pending() && !lsp.is_changed() && !nhlfe_changed {
                None
            } else {
                Some(InstallOp::Install)
            }
        } else if lsp.is_changed() || nhlfe_changed {
            Some(InstallOp::Update)
        } else {
            None
        }
    } else if fib_possible {
        Some(InstallOp::Uninstall)
    } else {
        None
    }
}

/// Builds the request carrying the current selection of `lsp`.
pub fn build_request(vrf: VrfId, lsp: &Lsp, op: InstallOp, generation: u64) -> InstallRequest {
    let nexthops = match op {
        InstallOp::Uninstall => Vec::new(),
        InstallOp::Install | InstallOp::Update => lsp
            .selected_nhlfes()
            .map(|n| InstallNexthop {
                nexthop: n.nexthop().clone(),
                out_label: n.out_label(),
            })
            .collect(),
    };
    InstallRequest {
        vrf,
        in_label: lsp.in_label(),
        op,
        generation,
        family: lsp.family(),
        nexthops,
    }
}

fn clear_changed(lsp: &mut Lsp) {
    lsp.set_changed(false);
    for nhlfe in lsp.nhlfes_mut().iter_mut() {
        nhlfe.flags_mut().changed = false;
    }
}

fn settled_state(lsp: &Lsp) -> LspState {
    if lsp.in_fib() && !lsp.is_pending() {
        LspState::Installed
    } else {
        LspState::Reconciled
    }
}

/// Runs one reconciliation pass over a VRF's forwarding table.
///
/// Every LSP scheduled at the start of the pass is processed exactly once,
/// in incoming label order. Returns the number of LSPs processed.
pub fn reconcile_table(
    vrf: VrfId,
    table: &mut LspTable,
    resolver: &dyn NexthopResolver,
    installer: &dyn LspInstaller,
    generations: &mut Generations,
    stats: &mut ReconcileStats,
) -> usize {
    let labels = table.take_scheduled();
    let mut processed = 0;

    for in_label in labels {
        let Some(lsp) = table.get_mut(in_label) else {
            continue;
        };
        processed += 1;
        lsp.record_reconcile();

        select_best(lsp, |nexthop| resolver.is_active(vrf, nexthop));
        lsp.purge_deleted();

        match decide(lsp) {
            Some(op) => {
                let generation = generations.next();
                lsp.set_generation(generation);
                let request = build_request(vrf, lsp, op, generation);
                clear_changed(lsp);
                lsp.set_pending(true);
                lsp.set_state(LspState::Reconciled);

                debug!(
                    "VRF {} LSP {}: {} gen {} with {} nexthop(s)",
                    vrf,
                    in_label,
                    op,
                    generation,
                    request.nexthops.len()
                );
                match op {
                    InstallOp::Install => stats.installs += 1,
                    InstallOp::Update => stats.updates += 1,
                    InstallOp::Uninstall => stats.uninstalls += 1,
                }
                installer.submit(request);
            }
            None => {
                clear_changed(lsp);
                if lsp.is_empty() && !lsp.in_fib() && !lsp.is_pending() {
                    table.remove_lsp(in_label);
                    stats.lsps_removed += 1;
                    debug!("VRF {} LSP {}: no candidates left, removed", vrf, in_label);
                } else {
                    let state = settled_state(lsp);
                    lsp.set_state(state);
                }
            }
        }
    }

    stats.passes += 1;
    stats.lsps_processed += processed as u64;
    processed
}

/// Applies a forwarding-plane acknowledgement.
///
/// Returns false if the LSP no longer exists. A failure for the current
/// generation reschedules the LSP so the next pass retries. A stale success
/// only records whether the forwarding plane holds the LSP; if that clears
/// an installed LSP, it is demoted and rescheduled for reinstallation.
pub fn apply_result(
    table: &mut LspTable,
    result: &InstallResult,
    stats: &mut ReconcileStats,
) -> bool {
    let in_label = result.in_label;
    let Some(lsp) = table.get_mut(in_label) else {
        debug!(
            "VRF {} LSP {}: result for unknown LSP ignored",
            result.vrf, in_label
        );
        return false;
    };
    let current = result.generation == lsp.generation();

    if !result.success {
        stats.failures += 1;
        warn!(
            "VRF {} LSP {}: {} gen {} failed",
            result.vrf, in_label, result.op, result.generation
        );
        if current {
            lsp.set_pending(false);
            lsp.set_changed(true);
            lsp.set_state(LspState::Reconciled);
            table.schedule(in_label);
        }
        return true;
    }

    let in_fib = result.op != InstallOp::Uninstall;
    lsp.set_in_fib(in_fib);

    if !current {
        stats.stale_acks += 1;
        debug!(
            "VRF {} LSP {}: stale ack gen {} (current {})",
            result.vrf,
            in_label,
            result.generation,
            lsp.generation()
        );
        if !in_fib && lsp.state() == LspState::Installed {
            for nhlfe in lsp.nhlfes_mut().iter_mut() {
                nhlfe.flags_mut().installed = false;
            }
            lsp.set_state(LspState::Reconciled);
            lsp.set_changed(true);
            table.schedule(in_label);
        }
        return true;
    }

    stats.acks += 1;
    lsp.set_pending(false);
    for nhlfe in lsp.nhlfes_mut().iter_mut() {
        let flags = nhlfe.flags_mut();
        flags.installed = in_fib && flags.selected;
    }
    lsp.purge_deleted();

    if lsp.is_empty() && !in_fib {
        table.remove_lsp(in_label);
        stats.lsps_removed += 1;
        info!("VRF {} LSP {}: uninstalled and removed", result.vrf, in_label);
        return true;
    }

    if lsp.state() == LspState::Reconciled {
        let state = settled_state(lsp);
        lsp.set_state(state);
    }
    true
}
