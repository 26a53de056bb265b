//! Best-path and ECMP selection for one LSP.
//!
//! Deleted candidates and candidates whose nexthop is not active are
//! skipped. The lowest distance wins and every candidate at that distance
//! joins the ECMP set, in insertion order. The first member is the best.

use log::trace;

use crate::lsp::Lsp;
use crate::nexthop::NexthopDescriptor;

/// Recomputes the selected set, multipath flags and best candidate.
///
/// Candidates whose selection flipped get their CHANGED flag set. Returns
/// true if the selected set or the best candidate changed, in which case
/// the LSP is marked changed as well.
pub fn select_best<F>(lsp: &mut Lsp, is_active: F) -> bool
where
    F: Fn(&NexthopDescriptor) -> bool,
{
    let in_label = lsp.in_label();
    let old_best = lsp.best_key().cloned();

    let mut lowest: Option<u8> = None;
    for nhlfe in lsp.nhlfes_mut().iter_mut() {
        let active = !nhlfe.is_deleted() && is_active(nhlfe.nexthop());
        nhlfe.set_active(active);
        if active {
            lowest = Some(lowest.map_or(nhlfe.distance(), |d| d.min(nhlfe.distance())));
        }
    }

    let mut num_ecmp = 0u32;
    let mut best = None;
    let mut selection_changed = false;
    for nhlfe in lsp.nhlfes_mut().iter_mut() {
        let was_selected = nhlfe.is_selected();
        let selected = nhlfe.is_active() && Some(nhlfe.distance()) == lowest;
        if selected {
            num_ecmp += 1;
            if best.is_none() {
                best = Some(nhlfe.key().clone());
            }
        }

        let flags = nhlfe.flags_mut();
        flags.selected = selected;
        if selected != was_selected {
            flags.changed = true;
            selection_changed = true;
        }
    }

    let multipath = num_ecmp > 1;
    for nhlfe in lsp.nhlfes_mut().iter_mut() {
        let flags = nhlfe.flags_mut();
        flags.multipath = multipath && flags.selected;
    }

    let changed = selection_changed || best != old_best;
    trace!(
        "LSP {}: selected {} nexthop(s), best {:?}, changed {}",
        in_label,
        num_ecmp,
        best,
        changed
    );
    lsp.set_selection(best, num_ecmp);
    if changed {
        lsp.set_changed(true);
    }
    changed
}
