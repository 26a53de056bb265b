//! MplsOrch: static LSP configuration, label forwarding and reconciliation.

use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::MplsOrchConfig;
use crate::consumer::{LspConfigEntry, StaticLspAction, StaticLspConsumer};
use crate::display;
use crate::error::{MplsError, Result};
use crate::label::MplsLabel;
use crate::lsp::{CandidateChange, Lsp, LspSource, NhlfeKey};
use crate::nexthop::{AlwaysActive, NexthopDescriptor, NexthopResolver};
use crate::schedule::{
    self, build_request, Generations, InstallOp, InstallResult, LspInstaller, ReconcileStats,
};
use crate::static_lsp::{StaticChange, StaticLsp};
use crate::vrf::{MplsVrf, VrfId, DEFAULT_VRF};

/// MplsOrch statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MplsOrchStats {
    /// Static definitions added.
    pub static_adds: u64,
    /// Static definitions whose out label changed.
    pub static_updates: u64,
    /// Static definitions removed.
    pub static_removes: u64,
    /// Requests rejected by validation.
    pub validation_errors: u64,
    /// Configuration tasks applied.
    pub tasks_processed: u64,
    /// Configuration tasks that failed.
    pub task_errors: u64,
    /// Uninstall requests issued while tearing tables down.
    pub shutdown_uninstalls: u64,
    pub reconcile: ReconcileStats,
}

/// MPLS label forwarding orchestrator.
///
/// Owns one [`MplsVrf`] per initialized VRF. All mutation happens through
/// `&mut self`; the forwarding plane is reached only through the installer,
/// and its acknowledgements come back through
/// [`MplsOrch::handle_install_result`].
pub struct MplsOrch {
    config: MplsOrchConfig,
    vrfs: BTreeMap<VrfId, MplsVrf>,
    consumer: StaticLspConsumer,
    resolver: Arc<dyn NexthopResolver>,
    installer: Option<Arc<dyn LspInstaller>>,
    /// Request generations; survives entry and VRF teardown.
    generations: Generations,
    stats: MplsOrchStats,
}

impl MplsOrch {
    /// Creates the orchestrator and the tables of the default VRF and every
    /// VRF listed in the configuration.
    pub fn new(config: MplsOrchConfig) -> Result<Self> {
        config.validate()?;

        let mut orch = Self {
            config,
            vrfs: BTreeMap::new(),
            consumer: StaticLspConsumer::new(),
            resolver: Arc::new(AlwaysActive),
            installer: None,
            generations: Generations::default(),
            stats: MplsOrchStats::default(),
        };

        orch.init_tables(DEFAULT_VRF)?;
        for vrf in orch.config.vrfs.clone() {
            if !orch.has_vrf(vrf) {
                orch.init_tables(vrf)?;
            }
        }

        info!(
            "MplsOrch: static label range {}-{}, static distance {}",
            orch.config.label_range.min, orch.config.label_range.max, orch.config.static_distance
        );
        Ok(orch)
    }

    /// Sets the forwarding-plane installer.
    pub fn set_installer(&mut self, installer: Arc<dyn LspInstaller>) {
        self.installer = Some(installer);
    }

    /// Sets the nexthop resolver.
    pub fn set_resolver(&mut self, resolver: Arc<dyn NexthopResolver>) {
        self.resolver = resolver;
    }

    pub fn config(&self) -> &MplsOrchConfig {
        &self.config
    }

    pub fn stats(&self) -> &MplsOrchStats {
        &self.stats
    }

    /// Creates empty tables for a VRF.
    pub fn init_tables(&mut self, vrf: VrfId) -> Result<()> {
        if self.vrfs.contains_key(&vrf) {
            return Err(MplsError::VrfExists(vrf));
        }
        self.vrfs.insert(vrf, MplsVrf::new(vrf));
        info!("MplsOrch: initialized tables for VRF {}", vrf);
        Ok(())
    }

    /// Returns true if tables exist for the VRF.
    pub fn has_vrf(&self, vrf: VrfId) -> bool {
        self.vrfs.contains_key(&vrf)
    }

    /// VRFs with tables, in id order.
    pub fn vrf_ids(&self) -> impl Iterator<Item = VrfId> + '_ {
        self.vrfs.keys().copied()
    }

    /// Returns the tables of a VRF.
    pub fn vrf(&self, vrf: VrfId) -> Result<&MplsVrf> {
        self.vrfs.get(&vrf).ok_or(MplsError::VrfNotFound(vrf))
    }

    fn vrf_mut(&mut self, vrf: VrfId) -> Result<&mut MplsVrf> {
        self.vrfs.get_mut(&vrf).ok_or(MplsError::VrfNotFound(vrf))
    }

    /// Returns a forwarding entry.
    pub fn lsp(&self, vrf: VrfId, in_label: MplsLabel) -> Option<&Lsp> {
        self.vrfs.get(&vrf)?.lsps().get(in_label)
    }

    /// Returns a static binding.
    pub fn static_lsp(&self, vrf: VrfId, in_label: MplsLabel) -> Option<&StaticLsp> {
        self.vrfs.get(&vrf)?.static_lsps().get(in_label)
    }

    fn distance_for(&self, source: LspSource) -> u8 {
        match source {
            LspSource::Static => self.config.static_distance,
            other => other.default_distance(),
        }
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_validation() {
                self.stats.validation_errors += 1;
            }
        }
        result
    }

    /// Checks whether a static definition would keep the binding and its
    /// forwarding entry consistent. Never mutates. False if the VRF has no
    /// tables.
    pub fn validate_consistency(
        &self,
        vrf: VrfId,
        in_label: MplsLabel,
        out_label: MplsLabel,
        nexthop: &NexthopDescriptor,
    ) -> bool {
        let Some(mplsvrf) = self.vrfs.get(&vrf) else {
            return false;
        };
        let key = NhlfeKey::new(LspSource::Static, nexthop.clone());
        mplsvrf.static_lsps().check(in_label, out_label, nexthop).is_ok()
            && mplsvrf
                .lsps()
                .check_candidate(in_label, &key, out_label)
                .is_ok()
    }

    /// Adds a static definition, or updates its out label in place.
    ///
    /// Both the binding store and the forwarding table are validated before
    /// either is modified.
    pub fn add_static_lsp(
        &mut self,
        vrf: VrfId,
        in_label: MplsLabel,
        out_label: MplsLabel,
        nexthop: &NexthopDescriptor,
    ) -> Result<StaticChange> {
        let result = self.try_add_static_lsp(vrf, in_label, out_label, nexthop);
        let change = self.record(result)?;
        match change {
            StaticChange::Added => self.stats.static_adds += 1,
            StaticChange::Updated => self.stats.static_updates += 1,
            StaticChange::Unchanged => {}
        }
        Ok(change)
    }

    fn try_add_static_lsp(
        &mut self,
        vrf: VrfId,
        in_label: MplsLabel,
        out_label: MplsLabel,
        nexthop: &NexthopDescriptor,
    ) -> Result<StaticChange> {
        self.config.label_range.check(in_label)?;
        let distance = self.distance_for(LspSource::Static);
        let (statics, lsps) = self.vrf_mut(vrf)?.tables_mut();

        statics.check(in_label, out_label, nexthop)?;
        let key = NhlfeKey::new(LspSource::Static, nexthop.clone());
        lsps.check_candidate(in_label, &key, out_label)?;

        let change = statics.add(in_label, out_label, nexthop)?;
        lsps.upsert_candidate(in_label, LspSource::Static, nexthop, out_label, distance)?;

        if change != StaticChange::Unchanged {
            info!(
                "MplsOrch: VRF {} static LSP {} via {} out-label {} ({:?})",
                vrf, in_label, nexthop, out_label, change
            );
        }
        Ok(change)
    }

    /// Removes a static definition and withdraws its candidate.
    pub fn remove_static_lsp(
        &mut self,
        vrf: VrfId,
        in_label: MplsLabel,
        nexthop: &NexthopDescriptor,
    ) -> Result<()> {
        let (statics, lsps) = self.vrf_mut(vrf)?.tables_mut();
        statics.remove(in_label, nexthop)?;
        if let Err(e) = lsps.remove_candidate(in_label, LspSource::Static, nexthop) {
            warn!(
                "MplsOrch: VRF {} static LSP {} via {} had no candidate: {}",
                vrf, in_label, nexthop, e
            );
        }

        self.stats.static_removes += 1;
        info!(
            "MplsOrch: VRF {} static LSP {} via {} removed",
            vrf, in_label, nexthop
        );
        Ok(())
    }

    /// Adds or updates a candidate from any source.
    ///
    /// The distance comes from the source; static candidates use the
    /// configured static distance.
    pub fn upsert_candidate(
        &mut self,
        vrf: VrfId,
        in_label: MplsLabel,
        source: LspSource,
        nexthop: &NexthopDescriptor,
        out_label: MplsLabel,
    ) -> Result<CandidateChange> {
        let distance = self.distance_for(source);
        let result = self
            .vrf_mut(vrf)
            .and_then(|v| v.lsps_mut().upsert_candidate(in_label, source, nexthop, out_label, distance));
        self.record(result)
    }

    /// Marks a candidate deleted.
    pub fn remove_candidate(
        &mut self,
        vrf: VrfId,
        in_label: MplsLabel,
        source: LspSource,
        nexthop: &NexthopDescriptor,
    ) -> Result<()> {
        self.vrf_mut(vrf)?
            .lsps_mut()
            .remove_candidate(in_label, source, nexthop)
    }

    fn submit_uninstall(&mut self, vrf: VrfId, lsp: &Lsp) -> bool {
        if !(lsp.in_fib() || lsp.is_pending()) {
            return false;
        }
        match &self.installer {
            Some(installer) => {
                let generation = self.generations.next();
                let request = build_request(vrf, lsp, InstallOp::Uninstall, generation);
                installer.submit(request);
                true
            }
            None => {
                warn!(
                    "MplsOrch: VRF {} LSP {} left in forwarding plane, no installer",
                    vrf,
                    lsp.in_label()
                );
                false
            }
        }
    }

    /// Removes a forwarding entry and all its candidates immediately.
    ///
    /// A pending reconciliation is discarded. If the forwarding plane may
    /// hold the entry, an uninstall is issued for it.
    pub fn delete_lsp(&mut self, vrf: VrfId, in_label: MplsLabel) -> Result<()> {
        let lsp = self.vrf_mut(vrf)?.lsps_mut().delete_entry(in_label)?;
        self.submit_uninstall(vrf, &lsp);
        Ok(())
    }

    /// Marks every forwarding entry of the VRF SCHEDULED.
    pub fn reschedule_all(&mut self, vrf: VrfId) -> Result<usize> {
        let count = self.vrf_mut(vrf)?.lsps_mut().schedule_all();
        debug!("MplsOrch: VRF {} rescheduled {} LSP(s)", vrf, count);
        Ok(count)
    }

    /// Reschedules entries using a nexthop whose resolution changed.
    pub fn nexthop_changed(&mut self, vrf: VrfId, nexthop: &NexthopDescriptor) -> Result<usize> {
        let count = self.vrf_mut(vrf)?.lsps_mut().schedule_nexthop(nexthop);
        debug!(
            "MplsOrch: VRF {} nexthop {} changed, {} LSP(s) rescheduled",
            vrf, nexthop, count
        );
        Ok(count)
    }

    /// Runs one reconciliation pass over every VRF.
    ///
    /// Without an installer nothing is processed and scheduled entries stay
    /// scheduled. Returns the number of entries reconciled.
    pub fn run_reconciliation(&mut self) -> usize {
        let Some(installer) = self.installer.clone() else {
            debug!("MplsOrch: installer not set");
            return 0;
        };

        let mut processed = 0;
        for (vrf, mplsvrf) in self.vrfs.iter_mut() {
            processed += schedule::reconcile_table(
                *vrf,
                mplsvrf.lsps_mut(),
                self.resolver.as_ref(),
                installer.as_ref(),
                &mut self.generations,
                &mut self.stats.reconcile,
            );
        }
        processed
    }

    /// Applies a forwarding-plane acknowledgement.
    ///
    /// Returns false if the VRF or entry no longer exists.
    pub fn handle_install_result(&mut self, result: &InstallResult) -> bool {
        match self.vrfs.get_mut(&result.vrf) {
            Some(mplsvrf) => {
                schedule::apply_result(mplsvrf.lsps_mut(), result, &mut self.stats.reconcile)
            }
            None => {
                debug!(
                    "MplsOrch: result for LSP {} in unknown VRF {} ignored",
                    result.in_label, result.vrf
                );
                false
            }
        }
    }

    /// Queues configuration entries.
    pub fn add_task(&mut self, entries: Vec<LspConfigEntry>) {
        self.consumer.add_to_sync(entries);
    }

    /// Returns true if configuration entries are waiting.
    pub fn has_pending_tasks(&self) -> bool {
        self.consumer.has_pending()
    }

    /// Pending configuration entries, for debugging.
    pub fn dump_pending_tasks(&self) -> Vec<String> {
        self.consumer.dump()
    }

    /// Applies all queued configuration, then runs a reconciliation pass.
    ///
    /// A failing entry is logged and counted; the rest of the batch is
    /// still applied.
    pub fn do_task(&mut self) -> usize {
        for entry in self.consumer.drain() {
            match self.apply_entry(&entry) {
                Ok(()) => self.stats.tasks_processed += 1,
                Err(e) => {
                    self.stats.task_errors += 1;
                    warn!("MplsOrch: failed to apply {} {:?}: {}", entry.key, entry.op, e);
                }
            }
        }
        self.run_reconciliation()
    }

    fn apply_entry(&mut self, entry: &LspConfigEntry) -> Result<()> {
        let task = self.record(entry.to_task())?;
        let key = &task.key;
        match task.action {
            StaticLspAction::Set { out_label } => self
                .add_static_lsp(key.vrf, key.in_label, out_label, &key.nexthop)
                .map(|_| ()),
            StaticLspAction::Del => self.remove_static_lsp(key.vrf, key.in_label, &key.nexthop),
        }
    }

    /// Detailed text for one forwarding entry.
    pub fn print_entry(&self, vrf: VrfId, in_label: MplsLabel) -> Result<String> {
        let lsp = self
            .vrf(vrf)?
            .lsps()
            .get(in_label)
            .ok_or(MplsError::LspNotFound(in_label))?;
        Ok(display::format_lsp(lsp))
    }

    /// Tabular text for a VRF's forwarding table.
    pub fn print_table(&self, vrf: VrfId) -> Result<String> {
        Ok(display::format_table(self.vrf(vrf)?))
    }

    /// JSON view of a VRF's forwarding table.
    pub fn table_json(&self, vrf: VrfId) -> Result<serde_json::Value> {
        Ok(display::table_json(self.vrf(vrf)?)?)
    }

    /// Static configuration of a VRF, one `mpls lsp` line per definition.
    pub fn dump_static_config(&self, vrf: VrfId) -> Result<String> {
        let lines = display::static_config_lines(self.vrf(vrf)?);
        Ok(lines.into_iter().map(|l| l + "\n").collect())
    }

    /// Tears down a VRF: every entry the forwarding plane may hold gets an
    /// uninstall request, then the tables are dropped.
    ///
    /// Returns the number of uninstall requests issued.
    pub fn shutdown_tables(&mut self, vrf: VrfId) -> Result<usize> {
        let mplsvrf = self.vrfs.remove(&vrf).ok_or(MplsError::VrfNotFound(vrf))?;
        let mut count = 0;
        for lsp in mplsvrf.lsps().iter() {
            if self.submit_uninstall(vrf, lsp) {
                count += 1;
            }
        }
        self.stats.shutdown_uninstalls += count as u64;
        info!(
            "MplsOrch: VRF {} shut down, {} LSP(s) uninstalled, {} static binding(s) dropped",
            vrf,
            count,
            mplsvrf.static_lsps().len()
        );
        Ok(count)
    }

    /// Tears down every VRF. Returns the number of uninstall requests.
    pub fn shutdown_all(&mut self) -> usize {
        let vrfs: Vec<VrfId> = self.vrfs.keys().copied().collect();
        vrfs.into_iter()
            .filter_map(|vrf| self.shutdown_tables(vrf).ok())
            .sum()
    }
}
