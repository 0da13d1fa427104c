use crate::error::{Result, SchedError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const SCHED_DIR: &str = ".vmsched";

pub const CONFIG_FILE: &str = ".vmsched/config.yaml";
pub const INVENTORY_FILE: &str = ".vmsched/inventory.yaml";
pub const STORE_FILE: &str = ".vmsched/schedules.redb";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn sched_dir(root: &Path) -> PathBuf {
    root.join(SCHED_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn inventory_path(root: &Path) -> PathBuf {
    root.join(INVENTORY_FILE)
}

pub fn store_path(root: &Path) -> PathBuf {
    root.join(STORE_FILE)
}

// ---------------------------------------------------------------------------
// Resource id validation
// ---------------------------------------------------------------------------

static RESOURCE_ID_RE: OnceLock<Regex> = OnceLock::new();

fn resource_id_re() -> &'static Regex {
    RESOURCE_ID_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._:\-]*$").unwrap())
}

/// Instance ids are opaque, but must be non-empty and free of whitespace
/// since they double as store keys.
pub fn validate_resource_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > 255 || !resource_id_re().is_match(id) {
        return Err(SchedError::InvalidConfig(format!(
            "invalid resource id '{id}'"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
