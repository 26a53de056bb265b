//! Human-readable and JSON views of the MPLS tables.

use serde::Serialize;
use std::fmt::Write;

use crate::config::format_static_config_line;
use crate::label::MplsLabel;
use crate::lsp::{Lsp, LspState, Nhlfe, NhlfeFlags};
use crate::nexthop::AddressFamily;
use crate::vrf::{MplsVrf, VrfId};

fn nhlfe_status(flags: &NhlfeFlags) -> String {
    let mut parts = Vec::new();
    if flags.selected {
        parts.push("selected");
    }
    if flags.multipath {
        parts.push("multipath");
    }
    if flags.installed {
        parts.push("installed");
    }
    if flags.deleted {
        parts.push("deleted");
    }
    parts.join(", ")
}

fn write_nhlfe(out: &mut String, lsp: &Lsp, nhlfe: &Nhlfe) {
    let best = if lsp.best_key() == Some(nhlfe.key()) { ">" } else { " " };
    let _ = writeln!(
        out,
        " {}type: {} remote label: {} distance: {}",
        best,
        nhlfe.source(),
        nhlfe.out_label(),
        nhlfe.distance()
    );
    let status = nhlfe_status(nhlfe.flags());
    if status.is_empty() {
        let _ = writeln!(out, "    via {}", nhlfe.nexthop());
    } else {
        let _ = writeln!(out, "    via {} ({})", nhlfe.nexthop(), status);
    }
}

/// Detailed view of one LSP.
pub fn format_lsp(lsp: &Lsp) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Local label: {} ({}{})",
        lsp.in_label(),
        lsp.state().as_str(),
        if lsp.in_fib() { ", in FIB" } else { "" }
    );
    for nhlfe in lsp.nhlfes() {
        write_nhlfe(&mut out, lsp, nhlfe);
    }
    out
}

/// Tabular view of a VRF's forwarding table, one row per selected nexthop.
///
/// LSPs with nothing selected are listed with `-` in the nexthop columns.
pub fn format_table(vrf: &MplsVrf) -> String {
    let mut rows: Vec<[String; 4]> = Vec::new();
    for lsp in vrf.lsps().iter() {
        let mut any = false;
        for nhlfe in lsp.selected_nhlfes() {
            any = true;
            rows.push([
                lsp.in_label().value().to_string(),
                nhlfe.source().to_string(),
                nhlfe.nexthop().to_string(),
                nhlfe.out_label().to_string(),
            ]);
        }
        if !any {
            rows.push([
                lsp.in_label().value().to_string(),
                "-".to_string(),
                "-".to_string(),
                "-".to_string(),
            ]);
        }
    }

    let header = ["Inbound Label", "Type", "Nexthop", "Outbound Label"];
    let mut widths = header.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "VRF {}", vrf.vrf());
    let _ = writeln!(
        out,
        " {:<w0$}  {:<w1$}  {:<w2$}  {:<w3$}",
        header[0],
        header[1],
        header[2],
        header[3],
        w0 = widths[0],
        w1 = widths[1],
        w2 = widths[2],
        w3 = widths[3]
    );
    let total = widths.iter().sum::<usize>() + 6;
    let _ = writeln!(out, " {}", "-".repeat(total));
    for row in &rows {
        let line = format!(
            " {:<w0$}  {:<w1$}  {:<w2$}  {:<w3$}",
            row[0],
            row[1],
            row[2],
            row[3],
            w0 = widths[0],
            w1 = widths[1],
            w2 = widths[2],
            w3 = widths[3]
        );
        let _ = writeln!(out, "{}", line.trim_end());
    }
    out
}

#[derive(Debug, Serialize)]
struct NhlfeView<'a> {
    source: &'a str,
    nexthop: String,
    out_label: MplsLabel,
    distance: u8,
    active: bool,
    best: bool,
    #[serde(flatten)]
    flags: NhlfeFlags,
}

#[derive(Debug, Serialize)]
struct LspView<'a> {
    in_label: MplsLabel,
    family: AddressFamily,
    state: LspState,
    in_fib: bool,
    num_ecmp: u32,
    generation: u64,
    reconcile_count: u64,
    nexthops: Vec<NhlfeView<'a>>,
}

#[derive(Debug, Serialize)]
struct TableView<'a> {
    vrf: VrfId,
    lsps: Vec<LspView<'a>>,
}

fn lsp_view(lsp: &Lsp) -> LspView<'_> {
    LspView {
        in_label: lsp.in_label(),
        family: lsp.family(),
        state: lsp.state(),
        in_fib: lsp.in_fib(),
        num_ecmp: lsp.num_ecmp(),
        generation: lsp.generation(),
        reconcile_count: lsp.reconcile_count(),
        nexthops: lsp
            .nhlfes()
            .iter()
            .map(|n| NhlfeView {
                source: n.source().as_str(),
                nexthop: n.nexthop().to_string(),
                out_label: n.out_label(),
                distance: n.distance(),
                active: n.is_active(),
                best: lsp.best_key() == Some(n.key()),
                flags: *n.flags(),
            })
            .collect(),
    }
}

/// JSON view of a VRF's forwarding table.
pub fn table_json(vrf: &MplsVrf) -> serde_json::Result<serde_json::Value> {
    let view = TableView {
        vrf: vrf.vrf(),
        lsps: vrf.lsps().iter().map(lsp_view).collect(),
    };
    serde_json::to_value(view)
}

/// Static configuration of a VRF as `mpls lsp` lines.
pub fn static_config_lines(vrf: &MplsVrf) -> Vec<String> {
    vrf.static_lsps()
        .iter()
        .flat_map(|slsp| {
            slsp.nhlfes().iter().map(move |snhlfe| {
                format_static_config_line(
                    vrf.vrf(),
                    slsp.in_label(),
                    snhlfe.nexthop(),
                    snhlfe.out_label(),
                )
            })
        })
        .collect()
}
