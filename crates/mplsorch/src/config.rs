//! MPLS orchestration configuration.
//!
//! File format:
//! ```json
//! {
//!   "orch": {
//!     "static_distance": 1,
//!     "label_range": { "min": 16, "max": 1048575 },
//!     "vrfs": [0, 7]
//!   },
//!   "static_lsps": [
//!     { "in_label": 100, "nexthop": "10.0.0.1", "out_label": "200" },
//!     { "vrf": 7, "in_label": 101, "nexthop": "10.1.0.1@Ethernet4", "out_label": "implicit-null" }
//!   ]
//! }
//! ```

use log::info;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::consumer::{LspConfigEntry, StaticLspKey, StaticLspTask};
use crate::error::{MplsError, Result};
use crate::label::{LabelRange, MplsLabel};
use crate::lsp::STATIC_DISTANCE;
use crate::nexthop::NexthopDescriptor;
use crate::vrf::{VrfId, DEFAULT_VRF};

/// Keyword that starts a static LSP line in a configuration dump.
pub const STATIC_LSP_KEYWORD: &str = "mpls lsp";

/// Configuration for MplsOrch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MplsOrchConfig {
    /// Distance given to static candidates.
    pub static_distance: u8,
    /// Incoming labels accepted for static bindings.
    pub label_range: LabelRange,
    /// VRFs whose tables are created at startup, besides the default VRF.
    pub vrfs: Vec<VrfId>,
}

impl Default for MplsOrchConfig {
    fn default() -> Self {
        Self {
            static_distance: STATIC_DISTANCE,
            label_range: LabelRange::default(),
            vrfs: Vec::new(),
        }
    }
}

impl MplsOrchConfig {
    /// Checks field values.
    pub fn validate(&self) -> Result<()> {
        if self.static_distance == 0 {
            return Err(MplsError::invalid_config(
                "static_distance",
                "must be non-zero",
            ));
        }
        LabelRange::new(self.label_range.min, self.label_range.max)?;
        Ok(())
    }
}

/// One configured static LSP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticLspConfig {
    #[serde(default)]
    pub vrf: VrfId,
    pub in_label: MplsLabel,
    pub nexthop: NexthopDescriptor,
    /// Out label text: a number, `implicit-null` or `explicit-null`.
    pub out_label: String,
}

impl StaticLspConfig {
    /// Converts to a configuration SET entry.
    pub fn to_entry(&self) -> Result<LspConfigEntry> {
        let out_label = MplsLabel::parse_out_label(&self.out_label, self.nexthop.family())?;
        let key = StaticLspKey::new(self.vrf, self.in_label, self.nexthop.clone());
        Ok(StaticLspTask::set_entry(&key, out_label))
    }
}

/// Daemon configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MplsdConfig {
    pub orch: MplsOrchConfig,
    pub static_lsps: Vec<StaticLspConfig>,
}

impl MplsdConfig {
    /// Loads and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        config.orch.validate()?;
        info!(
            "Loaded {} static LSP(s) from {}",
            config.static_lsps.len(),
            path.display()
        );
        Ok(config)
    }

    /// Configuration entries for every static LSP.
    pub fn entries(&self) -> Result<Vec<LspConfigEntry>> {
        self.static_lsps.iter().map(StaticLspConfig::to_entry).collect()
    }
}

/// Formats a static definition as a configuration dump line.
pub fn format_static_config_line(
    vrf: VrfId,
    in_label: MplsLabel,
    nexthop: &NexthopDescriptor,
    out_label: MplsLabel,
) -> String {
    if vrf == DEFAULT_VRF {
        format!("{} {} {} {}", STATIC_LSP_KEYWORD, in_label.value(), nexthop, out_label)
    } else {
        format!(
            "{} vrf {} {} {} {}",
            STATIC_LSP_KEYWORD,
            vrf,
            in_label.value(),
            nexthop,
            out_label
        )
    }
}

/// Parses a configuration dump line back into a SET entry.
///
/// Accepts `mpls lsp [vrf <id>] <in_label> <nexthop> <out_label>`. Returns
/// `Ok(None)` for blank lines and `!`/`#` comments.
pub fn parse_static_config_line(line: &str) -> Result<Option<LspConfigEntry>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('!') || line.starts_with('#') {
        return Ok(None);
    }

    let rest = line
        .strip_prefix(STATIC_LSP_KEYWORD)
        .ok_or_else(|| MplsError::invalid_config("line", format!("unrecognized: {}", line)))?;
    let words: Vec<&str> = rest.split_whitespace().collect();

    let (vrf, words) = match words.as_slice() {
        ["vrf", id, tail @ ..] => {
            let vrf = id.parse::<VrfId>().map_err(|_| {
                MplsError::invalid_config("line", format!("invalid VRF id: {}", id))
            })?;
            (vrf, tail)
        }
        tail => (DEFAULT_VRF, tail),
    };

    let [in_label, nexthop, out_label] = words else {
        return Err(MplsError::invalid_config(
            "line",
            format!("expected <in_label> <nexthop> <out_label>: {}", line),
        ));
    };

    let nexthop: NexthopDescriptor = nexthop.parse()?;
    let out_label = MplsLabel::parse_out_label(out_label, nexthop.family())?;
    let key = StaticLspKey::new(vrf, in_label.parse()?, nexthop);
    Ok(Some(StaticLspTask::set_entry(&key, out_label)))
}
