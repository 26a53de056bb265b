//! Label forwarding table: LSPs and their NHLFE candidates.
//!
//! An [`Lsp`] exclusively owns its candidates. Candidates refer back to
//! their LSP by incoming label only, and the "best" candidate is held as a
//! key into the candidate list, so there are no ownership cycles.

use log::debug;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::consistency::{self, Sibling};
use crate::error::{MplsError, Result};
use crate::label::MplsLabel;
use crate::nexthop::{AddressFamily, NexthopDescriptor};

/// Administrative distance of static routes.
pub const STATIC_DISTANCE: u8 = 1;

/// Distance used for every label source without its own mapping.
pub const DEFAULT_DISTANCE: u8 = 150;

/// Source of an NHLFE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum LspSource {
    /// Configured static LSP.
    Static,
    /// Labeled route handed in by the RIB integration layer.
    Bgp,
}

impl LspSource {
    /// Default distance for candidates of this source.
    pub fn default_distance(&self) -> u8 {
        match self {
            LspSource::Static => STATIC_DISTANCE,
            LspSource::Bgp => DEFAULT_DISTANCE,
        }
    }

    /// Printable source name.
    pub fn as_str(&self) -> &'static str {
        match self {
            LspSource::Static => "Static",
            LspSource::Bgp => "BGP",
        }
    }
}

impl fmt::Display for LspSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a candidate within its LSP.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NhlfeKey {
    /// Candidate source.
    pub source: LspSource,
    /// Candidate nexthop.
    pub nexthop: NexthopDescriptor,
}

impl NhlfeKey {
    /// Creates a candidate key.
    pub fn new(source: LspSource, nexthop: NexthopDescriptor) -> Self {
        Self { source, nexthop }
    }
}

impl fmt::Display for NhlfeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} via {}", self.source, self.nexthop)
    }
}

/// Per-candidate state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NhlfeFlags {
    /// Needs to be reflected in the forwarding plane.
    pub changed: bool,
    /// Part of the installable (ECMP) set.
    pub selected: bool,
    /// Selected and the ECMP set has more than one member.
    pub multipath: bool,
    /// Logically removed; kept until the forwarding plane no longer uses it.
    pub deleted: bool,
    /// Confirmed present in the forwarding plane.
    pub installed: bool,
}

/// A forwarding candidate (next hop label forwarding entry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Nhlfe {
    in_label: MplsLabel,
    key: NhlfeKey,
    out_label: MplsLabel,
    distance: u8,
    /// Nexthop resolution as of the last selection.
    active: bool,
    flags: NhlfeFlags,
}

impl Nhlfe {
    fn new(in_label: MplsLabel, key: NhlfeKey, out_label: MplsLabel, distance: u8) -> Self {
        Self {
            in_label,
            key,
            out_label,
            distance,
            active: false,
            flags: NhlfeFlags {
                changed: true,
                ..Default::default()
            },
        }
    }

    /// Incoming label of the owning LSP.
    pub fn in_label(&self) -> MplsLabel {
        self.in_label
    }

    /// Candidate identity.
    pub fn key(&self) -> &NhlfeKey {
        &self.key
    }

    /// Candidate source.
    pub fn source(&self) -> LspSource {
        self.key.source
    }

    /// Candidate nexthop.
    pub fn nexthop(&self) -> &NexthopDescriptor {
        &self.key.nexthop
    }

    /// Outgoing label.
    pub fn out_label(&self) -> MplsLabel {
        self.out_label
    }

    /// Distance used for best-path comparison.
    pub fn distance(&self) -> u8 {
        self.distance
    }

    /// Whether the nexthop resolved at the last selection.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Candidate flags.
    pub fn flags(&self) -> &NhlfeFlags {
        &self.flags
    }

    /// Whether the candidate is in the ECMP set.
    pub fn is_selected(&self) -> bool {
        self.flags.selected
    }

    /// Whether the candidate was logically removed.
    pub fn is_deleted(&self) -> bool {
        self.flags.deleted
    }

    /// Whether the forwarding plane confirmed this candidate.
    pub fn is_installed(&self) -> bool {
        self.flags.installed
    }

    pub(crate) fn flags_mut(&mut self) -> &mut NhlfeFlags {
        &mut self.flags
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    fn as_sibling(&self) -> Sibling {
        Sibling {
            out_label: self.out_label,
            family: self.key.nexthop.family(),
        }
    }
}

/// Reconciliation state of an LSP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LspState {
    /// No pending reconciliation and nothing confirmed installed.
    Unscheduled,
    /// Queued for the next reconciliation pass.
    Scheduled,
    /// Selection ran; an install request may be awaiting acknowledgement.
    Reconciled,
    /// The forwarding plane confirmed the current selection.
    Installed,
}

impl LspState {
    /// Printable state name.
    pub fn as_str(&self) -> &'static str {
        match self {
            LspState::Unscheduled => "unscheduled",
            LspState::Scheduled => "scheduled",
            LspState::Reconciled => "reconciled",
            LspState::Installed => "installed",
        }
    }
}

/// A label switched path: one incoming label and its candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lsp {
    in_label: MplsLabel,
    family: AddressFamily,
    nhlfes: Vec<Nhlfe>,
    best: Option<NhlfeKey>,
    num_ecmp: u32,
    state: LspState,
    /// The forwarding plane holds some version of this LSP.
    in_fib: bool,
    /// An install request is awaiting acknowledgement.
    pending: bool,
    /// Selection changed since the last request.
    changed: bool,
    /// Generation of the most recent install request.
    generation: u64,
    /// Number of reconciliation passes that processed this LSP.
    reconcile_count: u64,
}

impl Lsp {
    fn new(in_label: MplsLabel, family: AddressFamily) -> Self {
        Self {
            in_label,
            family,
            nhlfes: Vec::new(),
            best: None,
            num_ecmp: 0,
            state: LspState::Unscheduled,
            in_fib: false,
            pending: false,
            changed: false,
            generation: 0,
            reconcile_count: 0,
        }
    }

    /// Incoming label.
    pub fn in_label(&self) -> MplsLabel {
        self.in_label
    }

    /// Address family shared by all candidates.
    pub fn family(&self) -> AddressFamily {
        self.family
    }

    /// All candidates, including deleted ones, in insertion order.
    pub fn nhlfes(&self) -> &[Nhlfe] {
        &self.nhlfes
    }

    /// Candidates that are not deleted.
    pub fn live_nhlfes(&self) -> impl Iterator<Item = &Nhlfe> {
        self.nhlfes.iter().filter(|n| !n.flags.deleted)
    }

    /// Selected candidates in insertion order.
    pub fn selected_nhlfes(&self) -> impl Iterator<Item = &Nhlfe> {
        self.nhlfes.iter().filter(|n| n.flags.selected)
    }

    /// Looks up a candidate by identity, deleted or not.
    pub fn find(&self, key: &NhlfeKey) -> Option<&Nhlfe> {
        self.nhlfes.iter().find(|n| &n.key == key)
    }

    /// The best candidate, if any is selected.
    pub fn best_nhlfe(&self) -> Option<&Nhlfe> {
        self.best.as_ref().and_then(|key| self.find(key))
    }

    /// Key of the best candidate.
    pub fn best_key(&self) -> Option<&NhlfeKey> {
        self.best.as_ref()
    }

    /// Number of selected candidates.
    pub fn num_ecmp(&self) -> u32 {
        self.num_ecmp
    }

    /// Reconciliation state.
    pub fn state(&self) -> LspState {
        self.state
    }

    /// Whether the LSP is queued for reconciliation.
    pub fn is_scheduled(&self) -> bool {
        self.state == LspState::Scheduled
    }

    /// Whether the forwarding plane confirmed the current selection.
    pub fn is_installed(&self) -> bool {
        self.state == LspState::Installed
    }

    /// Whether the forwarding plane holds some version of this LSP.
    pub fn in_fib(&self) -> bool {
        self.in_fib
    }

    /// Whether an install request is awaiting acknowledgement.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Generation of the most recent install request.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of passes that reconciled this LSP.
    pub fn reconcile_count(&self) -> u64 {
        self.reconcile_count
    }

    /// True when no candidates are left, deleted or not.
    pub fn is_empty(&self) -> bool {
        self.nhlfes.is_empty()
    }

    fn position(&self, key: &NhlfeKey) -> Option<usize> {
        self.nhlfes.iter().position(|n| &n.key == key)
    }

    fn siblings_of<'a>(&'a self, key: &'a NhlfeKey) -> impl Iterator<Item = Sibling> + 'a {
        self.live_nhlfes()
            .filter(move |n| &n.key != key)
            .map(Nhlfe::as_sibling)
    }

    pub(crate) fn nhlfes_mut(&mut self) -> &mut Vec<Nhlfe> {
        &mut self.nhlfes
    }

    pub(crate) fn set_selection(&mut self, best: Option<NhlfeKey>, num_ecmp: u32) {
        self.best = best;
        self.num_ecmp = num_ecmp;
    }

    pub(crate) fn is_changed(&self) -> bool {
        self.changed
    }

    pub(crate) fn set_changed(&mut self, changed: bool) {
        self.changed = changed;
    }

    pub(crate) fn set_state(&mut self, state: LspState) {
        self.state = state;
    }

    pub(crate) fn set_in_fib(&mut self, in_fib: bool) {
        self.in_fib = in_fib;
    }

    pub(crate) fn set_pending(&mut self, pending: bool) {
        self.pending = pending;
    }

    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    pub(crate) fn record_reconcile(&mut self) {
        self.reconcile_count += 1;
    }

    /// Drops deleted candidates the forwarding plane does not use.
    pub(crate) fn purge_deleted(&mut self) -> usize {
        let before = self.nhlfes.len();
        self.nhlfes
            .retain(|n| !(n.flags.deleted && !n.flags.installed));
        before - self.nhlfes.len()
    }
}

/// Outcome of an NHLFE upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateChange {
    /// New candidate appended.
    Added,
    /// Out label or distance changed, or a deleted candidate was revived.
    Updated,
    /// Identical live candidate already present.
    Unchanged,
}

/// Label forwarding table for one VRF.
#[derive(Debug, Clone, Default)]
pub struct LspTable {
    lsps: BTreeMap<MplsLabel, Lsp>,
    /// Labels with the SCHEDULED state, processed in key order.
    work_queue: BTreeSet<MplsLabel>,
}

impl LspTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of LSPs.
    pub fn len(&self) -> usize {
        self.lsps.len()
    }

    /// True if the table holds no LSPs.
    pub fn is_empty(&self) -> bool {
        self.lsps.is_empty()
    }

    /// Returns an LSP.
    pub fn get(&self, in_label: MplsLabel) -> Option<&Lsp> {
        self.lsps.get(&in_label)
    }

    pub(crate) fn get_mut(&mut self, in_label: MplsLabel) -> Option<&mut Lsp> {
        self.lsps.get_mut(&in_label)
    }

    /// Iterates LSPs in incoming label order.
    pub fn iter(&self) -> impl Iterator<Item = &Lsp> {
        self.lsps.values()
    }

    /// Number of LSPs waiting for a reconciliation pass.
    pub fn scheduled_count(&self) -> usize {
        self.work_queue.len()
    }

    /// Validates a candidate without mutating the table.
    pub fn check_candidate(
        &self,
        in_label: MplsLabel,
        key: &NhlfeKey,
        out_label: MplsLabel,
    ) -> Result<()> {
        key.nexthop.validate()?;
        let Some(lsp) = self.lsps.get(&in_label) else {
            return Ok(());
        };

        let family = key.nexthop.family();
        if lsp.live_nhlfes().next().is_some() && lsp.family != family {
            return Err(MplsError::FamilyMismatch(in_label));
        }
        consistency::check_siblings(in_label, out_label, family, lsp.siblings_of(key))
    }

    /// Adds or updates a candidate and schedules the LSP.
    pub fn upsert_candidate(
        &mut self,
        in_label: MplsLabel,
        source: LspSource,
        nexthop: &NexthopDescriptor,
        out_label: MplsLabel,
        distance: u8,
    ) -> Result<CandidateChange> {
        let key = NhlfeKey::new(source, nexthop.clone());
        self.check_candidate(in_label, &key, out_label)?;

        let family = nexthop.family();
        let lsp = self.lsps.entry(in_label).or_insert_with(|| {
            debug!("LSP {}: created ({})", in_label, family);
            Lsp::new(in_label, family)
        });
        if lsp.live_nhlfes().next().is_none() {
            lsp.family = family;
        }

        let change = match lsp.position(&key) {
            Some(idx) => {
                let nhlfe = &mut lsp.nhlfes[idx];
                if !nhlfe.flags.deleted
                    && nhlfe.out_label == out_label
                    && nhlfe.distance == distance
                {
                    return Ok(CandidateChange::Unchanged);
                }
                nhlfe.out_label = out_label;
                nhlfe.distance = distance;
                nhlfe.flags.deleted = false;
                nhlfe.flags.changed = true;
                debug!("LSP {}: updated NHLFE {} out-label {}", in_label, key, out_label);
                CandidateChange::Updated
            }
            None => {
                debug!("LSP {}: added NHLFE {} out-label {}", in_label, key, out_label);
                lsp.nhlfes.push(Nhlfe::new(in_label, key, out_label, distance));
                CandidateChange::Added
            }
        };

        self.schedule(in_label);
        Ok(change)
    }

    /// Marks a candidate deleted and schedules the LSP.
    ///
    /// The candidate stays in the list until the forwarding plane stops
    /// using it. Removing an already deleted candidate is a no-op.
    pub fn remove_candidate(
        &mut self,
        in_label: MplsLabel,
        source: LspSource,
        nexthop: &NexthopDescriptor,
    ) -> Result<()> {
        let key = NhlfeKey::new(source, nexthop.clone());
        let lsp = self
            .lsps
            .get_mut(&in_label)
            .ok_or(MplsError::LspNotFound(in_label))?;
        let idx = lsp
            .position(&key)
            .ok_or_else(|| MplsError::CandidateNotFound {
                in_label,
                nexthop: key.to_string(),
            })?;

        let nhlfe = &mut lsp.nhlfes[idx];
        if nhlfe.flags.deleted {
            return Ok(());
        }
        nhlfe.flags.deleted = true;
        nhlfe.flags.changed = true;
        debug!("LSP {}: NHLFE {} marked deleted", in_label, key);

        self.schedule(in_label);
        Ok(())
    }

    /// Removes an LSP and all its candidates immediately.
    ///
    /// A pending reconciliation for it is discarded. The caller owns any
    /// forwarding-plane cleanup for the returned LSP.
    pub fn delete_entry(&mut self, in_label: MplsLabel) -> Result<Lsp> {
        let lsp = self
            .lsps
            .remove(&in_label)
            .ok_or(MplsError::LspNotFound(in_label))?;
        self.work_queue.remove(&in_label);
        debug!("LSP {}: deleted", in_label);
        Ok(lsp)
    }

    /// Queues an LSP for reconciliation.
    ///
    /// Returns false if it was already queued (or does not exist); repeated
    /// triggers within one pass coalesce here.
    pub fn schedule(&mut self, in_label: MplsLabel) -> bool {
        let Some(lsp) = self.lsps.get_mut(&in_label) else {
            return false;
        };
        if lsp.state == LspState::Scheduled {
            return false;
        }
        lsp.state = LspState::Scheduled;
        self.work_queue.insert(in_label);
        true
    }

    /// Queues every LSP. Returns how many were newly queued.
    pub fn schedule_all(&mut self) -> usize {
        let labels: Vec<MplsLabel> = self.lsps.keys().copied().collect();
        labels.into_iter().filter(|l| self.schedule(*l)).count()
    }

    /// Queues every LSP with a live candidate using `nexthop`.
    pub fn schedule_nexthop(&mut self, nexthop: &NexthopDescriptor) -> usize {
        let labels: Vec<MplsLabel> = self
            .lsps
            .values()
            .filter(|lsp| lsp.live_nhlfes().any(|n| n.nexthop() == nexthop))
            .map(|lsp| lsp.in_label)
            .collect();
        labels.into_iter().filter(|l| self.schedule(*l)).count()
    }

    /// Takes the queued labels in key order.
    pub(crate) fn take_scheduled(&mut self) -> Vec<MplsLabel> {
        std::mem::take(&mut self.work_queue).into_iter().collect()
    }

    pub(crate) fn remove_lsp(&mut self, in_label: MplsLabel) -> Option<Lsp> {
        self.work_queue.remove(&in_label);
        self.lsps.remove(&in_label)
    }
}
