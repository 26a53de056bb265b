//! Per-VRF MPLS tables.

use crate::lsp::LspTable;
use crate::static_lsp::StaticLspTable;

/// VRF identifier.
pub type VrfId = u32;

/// The default VRF.
pub const DEFAULT_VRF: VrfId = 0;

/// MPLS state of one VRF: the static binding store and the forwarding table.
#[derive(Debug, Clone, Default)]
pub struct MplsVrf {
    vrf: VrfId,
    static_lsps: StaticLspTable,
    lsps: LspTable,
}

impl MplsVrf {
    /// Creates empty tables for a VRF.
    pub fn new(vrf: VrfId) -> Self {
        Self {
            vrf,
            static_lsps: StaticLspTable::new(),
            lsps: LspTable::new(),
        }
    }

    pub fn vrf(&self) -> VrfId {
        self.vrf
    }

    /// Static binding store.
    pub fn static_lsps(&self) -> &StaticLspTable {
        &self.static_lsps
    }

    /// Forwarding table.
    pub fn lsps(&self) -> &LspTable {
        &self.lsps
    }

    pub(crate) fn lsps_mut(&mut self) -> &mut LspTable {
        &mut self.lsps
    }

    /// Borrows both tables mutably at once.
    pub(crate) fn tables_mut(&mut self) -> (&mut StaticLspTable, &mut LspTable) {
        (&mut self.static_lsps, &mut self.lsps)
    }
}
