//! Integration tests for MplsOrch with a mock forwarding plane
//!
//! These tests drive the orchestrator through its public API and check the
//! requests it hands to the forwarding plane.

use pretty_assertions::assert_eq;
use sonic_mplsorch::config::parse_static_config_line;
use sonic_mplsorch::{
    InstallOp, InstallRequest, InstallResult, LspConfigEntry, LspInstaller, LspSource, MplsError,
    MplsLabel, MplsOrch, MplsOrchConfig, MplsdConfig, NexthopDescriptor, NexthopResolver, VrfId,
    DEFAULT_VRF,
};
use std::collections::HashSet;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Mock forwarding plane that records every request.
#[derive(Default)]
pub struct MockFib {
    requests: Mutex<Vec<InstallRequest>>,
}

impl MockFib {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Takes the requests recorded so far.
    pub fn take(&self) -> Vec<InstallRequest> {
        std::mem::take(&mut *self.requests.lock().unwrap())
    }
}

impl LspInstaller for MockFib {
    fn submit(&self, request: InstallRequest) {
        self.requests.lock().unwrap().push(request);
    }
}

/// Mock nexthop tracking with a set of unreachable nexthops.
#[derive(Default)]
pub struct MockResolver {
    down: Mutex<HashSet<NexthopDescriptor>>,
}

impl MockResolver {
    pub fn set_down(&self, nexthop: &NexthopDescriptor, down: bool) {
        let mut set = self.down.lock().unwrap();
        if down {
            set.insert(nexthop.clone());
        } else {
            set.remove(nexthop);
        }
    }
}

impl NexthopResolver for MockResolver {
    fn is_active(&self, _vrf: VrfId, nexthop: &NexthopDescriptor) -> bool {
        !self.down.lock().unwrap().contains(nexthop)
    }
}

fn label(v: u32) -> MplsLabel {
    MplsLabel::new(v).unwrap()
}

fn nh(s: &str) -> NexthopDescriptor {
    s.parse().unwrap()
}

fn setup(config: MplsOrchConfig) -> (MplsOrch, Arc<MockFib>, Arc<MockResolver>) {
    let mut orch = MplsOrch::new(config).unwrap();
    let fib = MockFib::new();
    let resolver = Arc::new(MockResolver::default());
    orch.set_installer(fib.clone());
    orch.set_resolver(resolver.clone());
    (orch, fib, resolver)
}

/// Runs a pass and acknowledges everything it issued.
fn reconcile_and_ack(orch: &mut MplsOrch, fib: &MockFib) -> Vec<InstallRequest> {
    orch.run_reconciliation();
    let requests = fib.take();
    for request in &requests {
        orch.handle_install_result(&InstallResult::for_request(request, true));
    }
    requests
}

#[test]
fn test_ecmp_scenario() {
    let (mut orch, fib, _resolver) = setup(MplsOrchConfig::default());
    let a = nh("10.0.0.1");
    let b = nh("10.0.0.2");

    orch.add_static_lsp(DEFAULT_VRF, label(100), label(200), &a).unwrap();
    orch.add_static_lsp(DEFAULT_VRF, label(100), label(200), &b).unwrap();
    let requests = reconcile_and_ack(&mut orch, &fib);
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].op, InstallOp::Install);

    let lsp = orch.lsp(DEFAULT_VRF, label(100)).unwrap();
    assert_eq!(lsp.num_ecmp(), 2);
    assert!(lsp.nhlfes().iter().all(|n| n.is_selected()));
    assert!(lsp.is_installed());

    // A third path that pops instead of swapping is rejected.
    let before = lsp.clone();
    let static_before = orch.static_lsp(DEFAULT_VRF, label(100)).unwrap().clone();
    let err = orch
        .add_static_lsp(
            DEFAULT_VRF,
            label(100),
            MplsLabel::IMPLICIT_NULL,
            &nh("10.0.0.3"),
        )
        .unwrap_err();
    assert!(matches!(err, MplsError::InconsistentLabelOp { .. }));
    assert_eq!(orch.lsp(DEFAULT_VRF, label(100)).unwrap(), &before);
    assert_eq!(
        orch.static_lsp(DEFAULT_VRF, label(100)).unwrap(),
        &static_before
    );

    orch.remove_static_lsp(DEFAULT_VRF, label(100), &a).unwrap();
    let requests = reconcile_and_ack(&mut orch, &fib);
    assert_eq!(requests[0].op, InstallOp::Update);
    assert_eq!(requests[0].nexthops.len(), 1);

    let lsp = orch.lsp(DEFAULT_VRF, label(100)).unwrap();
    assert_eq!(lsp.num_ecmp(), 1);
    assert_eq!(lsp.best_nhlfe().unwrap().nexthop(), &b);
    assert_eq!(lsp.nhlfes().len(), 1);
}

#[test]
fn test_best_is_stable_across_passes() {
    let (mut orch, fib, _resolver) = setup(MplsOrchConfig::default());
    for gate in ["10.0.0.3", "10.0.0.1", "10.0.0.2"] {
        orch.add_static_lsp(DEFAULT_VRF, label(100), label(200), &nh(gate))
            .unwrap();
    }
    reconcile_and_ack(&mut orch, &fib);
    let best = orch
        .lsp(DEFAULT_VRF, label(100))
        .unwrap()
        .best_key()
        .cloned();

    for _ in 0..3 {
        orch.reschedule_all(DEFAULT_VRF).unwrap();
        assert!(reconcile_and_ack(&mut orch, &fib).is_empty());
        assert_eq!(
            orch.lsp(DEFAULT_VRF, label(100)).unwrap().best_key().cloned(),
            best
        );
    }
    assert_eq!(best.unwrap().nexthop, nh("10.0.0.3"));
}

#[test]
fn test_triggers_coalesce_into_one_reconcile() {
    let (mut orch, fib, _resolver) = setup(MplsOrchConfig::default());
    let a = nh("10.0.0.1");
    orch.add_static_lsp(DEFAULT_VRF, label(100), label(200), &a).unwrap();
    orch.add_static_lsp(DEFAULT_VRF, label(100), label(201), &a).unwrap();
    orch.add_static_lsp(DEFAULT_VRF, label(100), label(202), &nh("10.0.0.2"))
        .unwrap();
    orch.reschedule_all(DEFAULT_VRF).unwrap();
    orch.nexthop_changed(DEFAULT_VRF, &a).unwrap();

    assert_eq!(orch.run_reconciliation(), 1);
    let requests = fib.take();
    assert_eq!(requests.len(), 1);
    assert_eq!(orch.lsp(DEFAULT_VRF, label(100)).unwrap().reconcile_count(), 1);

    // Nothing left to do.
    assert_eq!(orch.run_reconciliation(), 0);
}

#[test]
fn test_nexthop_down_and_up() {
    let (mut orch, fib, resolver) = setup(MplsOrchConfig::default());
    let a = nh("10.0.0.1");
    let b = nh("10.0.0.2");
    orch.add_static_lsp(DEFAULT_VRF, label(100), label(200), &a).unwrap();
    orch.add_static_lsp(DEFAULT_VRF, label(100), label(200), &b).unwrap();
    reconcile_and_ack(&mut orch, &fib);

    resolver.set_down(&a, true);
    assert_eq!(orch.nexthop_changed(DEFAULT_VRF, &a).unwrap(), 1);
    let requests = reconcile_and_ack(&mut orch, &fib);
    assert_eq!(requests[0].op, InstallOp::Update);
    assert_eq!(requests[0].nexthops[0].nexthop, b);
    let lsp = orch.lsp(DEFAULT_VRF, label(100)).unwrap();
    assert_eq!(lsp.num_ecmp(), 1);
    assert!(!lsp.nhlfes()[0].is_installed());

    resolver.set_down(&b, true);
    orch.nexthop_changed(DEFAULT_VRF, &b).unwrap();
    let requests = reconcile_and_ack(&mut orch, &fib);
    assert_eq!(requests[0].op, InstallOp::Uninstall);
    let lsp = orch.lsp(DEFAULT_VRF, label(100)).unwrap();
    assert!(!lsp.in_fib());
    assert_eq!(lsp.nhlfes().len(), 2);

    resolver.set_down(&a, false);
    resolver.set_down(&b, false);
    orch.reschedule_all(DEFAULT_VRF).unwrap();
    let requests = reconcile_and_ack(&mut orch, &fib);
    assert_eq!(requests[0].op, InstallOp::Install);
    assert_eq!(requests[0].nexthops.len(), 2);
}

#[test]
fn test_remove_last_binding_removes_everything() {
    let (mut orch, fib, _resolver) = setup(MplsOrchConfig::default());
    let a = nh("10.0.0.1");
    orch.add_static_lsp(DEFAULT_VRF, label(100), label(200), &a).unwrap();
    reconcile_and_ack(&mut orch, &fib);

    orch.remove_static_lsp(DEFAULT_VRF, label(100), &a).unwrap();
    assert!(orch.static_lsp(DEFAULT_VRF, label(100)).is_none());

    let requests = reconcile_and_ack(&mut orch, &fib);
    assert_eq!(requests[0].op, InstallOp::Uninstall);
    assert!(orch.lsp(DEFAULT_VRF, label(100)).is_none());

    assert!(orch
        .remove_static_lsp(DEFAULT_VRF, label(100), &a)
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_failed_install_is_retried() {
    let (mut orch, fib, _resolver) = setup(MplsOrchConfig::default());
    orch.add_static_lsp(DEFAULT_VRF, label(100), label(200), &nh("10.0.0.1"))
        .unwrap();
    orch.run_reconciliation();
    let requests = fib.take();
    orch.handle_install_result(&InstallResult::for_request(&requests[0], false));
    assert!(orch.lsp(DEFAULT_VRF, label(100)).unwrap().is_scheduled());

    let retry = reconcile_and_ack(&mut orch, &fib);
    assert_eq!(retry.len(), 1);
    assert_eq!(retry[0].op, InstallOp::Install);
    assert!(orch.lsp(DEFAULT_VRF, label(100)).unwrap().is_installed());
    assert_eq!(orch.stats().reconcile.failures, 1);
}

/// Installs 100 via BGP, deletes it and re-creates it before any of the
/// three requests is acknowledged. Returns (install, uninstall, reinstall).
fn delete_and_recreate(
    orch: &mut MplsOrch,
    fib: &MockFib,
) -> (InstallRequest, InstallRequest, InstallRequest) {
    let gate = nh("10.0.0.9");
    orch.upsert_candidate(DEFAULT_VRF, label(100), LspSource::Bgp, &gate, label(900))
        .unwrap();
    orch.run_reconciliation();
    let install = fib.take().remove(0);

    orch.delete_lsp(DEFAULT_VRF, label(100)).unwrap();
    let uninstall = fib.take().remove(0);
    assert_eq!(uninstall.op, InstallOp::Uninstall);

    orch.upsert_candidate(DEFAULT_VRF, label(100), LspSource::Bgp, &gate, label(900))
        .unwrap();
    orch.run_reconciliation();
    let reinstall = fib.take().remove(0);
    assert_eq!(reinstall.op, InstallOp::Install);

    assert!(install.generation < uninstall.generation);
    assert!(uninstall.generation < reinstall.generation);
    (install, uninstall, reinstall)
}

#[test]
fn test_recreated_lsp_ignores_predecessor_acks() {
    let (mut orch, fib, _resolver) = setup(MplsOrchConfig::default());
    let (install, uninstall, reinstall) = delete_and_recreate(&mut orch, &fib);

    orch.handle_install_result(&InstallResult::for_request(&install, true));
    orch.handle_install_result(&InstallResult::for_request(&uninstall, true));
    let lsp = orch.lsp(DEFAULT_VRF, label(100)).unwrap();
    assert!(!lsp.is_installed());
    assert!(!lsp.in_fib());
    assert!(lsp.is_pending());
    assert_eq!(orch.stats().reconcile.stale_acks, 2);

    orch.handle_install_result(&InstallResult::for_request(&reinstall, true));
    let lsp = orch.lsp(DEFAULT_VRF, label(100)).unwrap();
    assert!(lsp.is_installed());
    assert!(lsp.in_fib());
    assert!(!lsp.is_pending());
}

#[test]
fn test_late_uninstall_ack_forces_reinstall() {
    let (mut orch, fib, _resolver) = setup(MplsOrchConfig::default());
    let (install, uninstall, reinstall) = delete_and_recreate(&mut orch, &fib);

    orch.handle_install_result(&InstallResult::for_request(&install, true));
    orch.handle_install_result(&InstallResult::for_request(&reinstall, true));
    assert!(orch.lsp(DEFAULT_VRF, label(100)).unwrap().is_installed());

    // The uninstall lands last and empties the forwarding plane.
    orch.handle_install_result(&InstallResult::for_request(&uninstall, true));
    let lsp = orch.lsp(DEFAULT_VRF, label(100)).unwrap();
    assert!(!lsp.is_installed());
    assert!(!lsp.in_fib());
    assert!(lsp.is_scheduled());

    let requests = reconcile_and_ack(&mut orch, &fib);
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].op, InstallOp::Install);
    assert!(requests[0].generation > reinstall.generation);
    assert!(orch.lsp(DEFAULT_VRF, label(100)).unwrap().is_installed());
}

#[test]
fn test_generations_survive_vrf_shutdown() {
    let (mut orch, fib, _resolver) = setup(MplsOrchConfig::default());
    orch.add_static_lsp(DEFAULT_VRF, label(100), label(200), &nh("10.0.0.1"))
        .unwrap();
    orch.run_reconciliation();
    let install = fib.take().remove(0);

    orch.shutdown_tables(DEFAULT_VRF).unwrap();
    let uninstall = fib.take().remove(0);
    assert!(uninstall.generation > install.generation);

    orch.init_tables(DEFAULT_VRF).unwrap();
    orch.add_static_lsp(DEFAULT_VRF, label(100), label(200), &nh("10.0.0.1"))
        .unwrap();
    orch.run_reconciliation();
    let reinstall = fib.take().remove(0);
    assert!(reinstall.generation > uninstall.generation);

    orch.handle_install_result(&InstallResult::for_request(&install, true));
    orch.handle_install_result(&InstallResult::for_request(&uninstall, true));
    assert!(!orch.lsp(DEFAULT_VRF, label(100)).unwrap().is_installed());
    orch.handle_install_result(&InstallResult::for_request(&reinstall, true));
    assert!(orch.lsp(DEFAULT_VRF, label(100)).unwrap().is_installed());
}

#[test]
fn test_static_and_bgp_candidates() {
    let (mut orch, fib, _resolver) = setup(MplsOrchConfig::default());
    orch.upsert_candidate(
        DEFAULT_VRF,
        label(100),
        LspSource::Bgp,
        &nh("10.0.0.9"),
        label(900),
    )
    .unwrap();
    let requests = reconcile_and_ack(&mut orch, &fib);
    assert_eq!(requests[0].nexthops[0].out_label, label(900));

    orch.add_static_lsp(DEFAULT_VRF, label(100), label(200), &nh("10.0.0.1"))
        .unwrap();
    let requests = reconcile_and_ack(&mut orch, &fib);
    assert_eq!(requests[0].op, InstallOp::Update);
    assert_eq!(requests[0].nexthops.len(), 1);
    assert_eq!(requests[0].nexthops[0].out_label, label(200));

    let lsp = orch.lsp(DEFAULT_VRF, label(100)).unwrap();
    assert_eq!(lsp.num_ecmp(), 1);
    assert_eq!(lsp.nhlfes().len(), 2);
    assert!(!lsp.nhlfes()[0].is_selected());
}

#[test]
fn test_dump_and_replay_round_trip() {
    let config = MplsOrchConfig {
        vrfs: vec![7],
        ..Default::default()
    };
    let (mut orch, _fib, _resolver) = setup(config.clone());
    orch.add_static_lsp(DEFAULT_VRF, label(100), label(200), &nh("10.0.0.1"))
        .unwrap();
    orch.add_static_lsp(DEFAULT_VRF, label(100), label(201), &nh("10.0.0.2@Ethernet0"))
        .unwrap();
    orch.add_static_lsp(
        DEFAULT_VRF,
        label(300),
        MplsLabel::IMPLICIT_NULL,
        &nh("2001:db8::1"),
    )
    .unwrap();
    orch.add_static_lsp(7, label(400), label(500), &nh("Ethernet8")).unwrap();
    // Rewritten in place; the replay only ever sees the final label.
    orch.add_static_lsp(DEFAULT_VRF, label(100), label(210), &nh("10.0.0.1"))
        .unwrap();

    let mut dump = String::new();
    for vrf in [DEFAULT_VRF, 7] {
        dump.push_str(&orch.dump_static_config(vrf).unwrap());
    }

    let (mut replayed, _fib2, _resolver2) = setup(config);
    let entries: Vec<LspConfigEntry> = dump
        .lines()
        .filter_map(|line| parse_static_config_line(line).unwrap())
        .collect();
    assert_eq!(entries.len(), 4);
    replayed.add_task(entries);
    replayed.do_task();
    assert_eq!(
        replayed.static_lsp(DEFAULT_VRF, label(100)).unwrap().nhlfes()[0].out_label(),
        label(210)
    );

    for vrf in [DEFAULT_VRF, 7] {
        assert_eq!(
            replayed.vrf(vrf).unwrap().static_lsps(),
            orch.vrf(vrf).unwrap().static_lsps()
        );
        assert_eq!(
            replayed.dump_static_config(vrf).unwrap(),
            orch.dump_static_config(vrf).unwrap()
        );
    }
}

#[test]
fn test_shutdown_every_vrf() {
    let config = MplsOrchConfig {
        vrfs: vec![7],
        ..Default::default()
    };
    let (mut orch, fib, _resolver) = setup(config);
    orch.add_static_lsp(DEFAULT_VRF, label(100), label(200), &nh("10.0.0.1"))
        .unwrap();
    orch.add_static_lsp(DEFAULT_VRF, label(101), label(201), &nh("10.0.0.1"))
        .unwrap();
    orch.add_static_lsp(7, label(100), label(200), &nh("10.1.0.1")).unwrap();
    reconcile_and_ack(&mut orch, &fib);

    // Scheduled but never installed: nothing to uninstall.
    orch.add_static_lsp(7, label(102), label(202), &nh("10.1.0.1")).unwrap();

    assert_eq!(orch.shutdown_all(), 3);
    let requests = fib.take();
    assert!(requests.iter().all(|r| r.op == InstallOp::Uninstall));
    assert_eq!(
        requests.iter().filter(|r| r.vrf == 7).count(),
        1
    );
    assert_eq!(orch.vrf_ids().count(), 0);

    // Late acknowledgements for dropped tables are ignored.
    for request in &requests {
        assert!(!orch.handle_install_result(&InstallResult::for_request(request, true)));
    }
}

#[test]
fn test_shutdown_single_vrf() {
    let config = MplsOrchConfig {
        vrfs: vec![7],
        ..Default::default()
    };
    let (mut orch, fib, _resolver) = setup(config);
    orch.add_static_lsp(7, label(100), label(200), &nh("10.1.0.1")).unwrap();
    reconcile_and_ack(&mut orch, &fib);

    assert_eq!(orch.shutdown_tables(7).unwrap(), 1);
    assert!(!orch.has_vrf(7));
    assert!(orch.has_vrf(DEFAULT_VRF));
    assert!(matches!(
        orch.shutdown_tables(7),
        Err(MplsError::VrfNotFound(7))
    ));
}

#[test]
fn test_load_config_and_apply() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "orch": {{ "static_distance": 1, "vrfs": [7] }},
            "static_lsps": [
                {{ "in_label": 100, "nexthop": "10.0.0.1", "out_label": "200" }},
                {{ "in_label": 100, "nexthop": "10.0.0.2", "out_label": "200" }},
                {{ "vrf": 7, "in_label": 16, "nexthop": "fe80::1@Ethernet4", "out_label": "explicit-null" }}
            ]
        }}"#
    )
    .unwrap();

    let config = MplsdConfig::load(file.path()).unwrap();
    let (mut orch, fib, _resolver) = setup(config.orch.clone());
    orch.add_task(config.entries().unwrap());
    assert_eq!(orch.do_task(), 2);
    assert_eq!(fib.take().len(), 2);

    let lsp = orch.lsp(7, label(16)).unwrap();
    assert_eq!(lsp.nhlfes()[0].out_label(), MplsLabel::IPV6_EXPLICIT_NULL);
    assert_eq!(orch.lsp(DEFAULT_VRF, label(100)).unwrap().num_ecmp(), 2);

    let json = orch.table_json(DEFAULT_VRF).unwrap();
    assert_eq!(json["lsps"][0]["state"], "Reconciled");
    assert!(orch.print_entry(DEFAULT_VRF, label(100)).unwrap().contains("via 10.0.0.2"));
}
