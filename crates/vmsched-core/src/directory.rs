use crate::error::{Result, SchedError};
use crate::io::atomic_write;
use crate::paths;
use crate::types::{ActionDecision, LifecycleState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// ResourceSnapshot
// ---------------------------------------------------------------------------

/// Instance metadata as reported by the directory at describe time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub id: String,
    pub name: String,
    pub lifecycle_state: LifecycleState,
    #[serde(default)]
    pub freeform_tags: BTreeMap<String, String>,
    /// Namespace, then key.
    #[serde(default)]
    pub defined_tags: BTreeMap<String, BTreeMap<String, String>>,
}

impl ResourceSnapshot {
    /// Freeform tags win over defined tags; defined namespaces are searched in name order.
    pub fn tag_value(&self, key: &str) -> Option<&str> {
        if let Some(v) = self.freeform_tags.get(key) {
            return Some(v.as_str());
        }
        self.defined_tags
            .values()
            .find_map(|ns| ns.get(key))
            .map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// ResourceDirectory
// ---------------------------------------------------------------------------

/// Source of instance state and sink for start/stop requests.
pub trait ResourceDirectory: Send + Sync {
    fn describe(&self, id: &str) -> Result<ResourceSnapshot>;

    /// Request a lifecycle change. `ActionDecision::None` is a no-op.
    fn apply(&self, id: &str, action: ActionDecision) -> Result<()>;
}

// ---------------------------------------------------------------------------
// InventoryDirectory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub resources: Vec<ResourceSnapshot>,
}

/// Directory backed by `.vmsched/inventory.yaml`.
///
/// Applying an action records the state the instance settles in and rewrites
/// the file.
pub struct InventoryDirectory {
    path: PathBuf,
    inventory: Mutex<Inventory>,
}

impl InventoryDirectory {
    pub fn open(root: &Path) -> Result<Self> {
        let path = paths::inventory_path(root);
        if !path.exists() {
            return Err(SchedError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let inventory: Inventory = serde_yaml::from_str(&data)?;
        debug!(path = %path.display(), resources = inventory.resources.len(), "inventory loaded");
        Ok(Self {
            path,
            inventory: Mutex::new(inventory),
        })
    }

    /// Write an empty inventory unless one exists. Returns true if written.
    pub fn init(root: &Path) -> Result<bool> {
        let data = serde_yaml::to_string(&Inventory::default())?;
        crate::io::write_if_missing(&paths::inventory_path(root), data.as_bytes())
    }

    pub fn snapshot(&self) -> Result<Inventory> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inventory>> {
        self.inventory
            .lock()
            .map_err(|_| SchedError::Directory("inventory lock poisoned".to_string()))
    }
}

impl ResourceDirectory for InventoryDirectory {
    fn describe(&self, id: &str) -> Result<ResourceSnapshot> {
        self.lock()?
            .resources
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| SchedError::ResourceNotFound(id.to_string()))
    }

    fn apply(&self, id: &str, action: ActionDecision) -> Result<()> {
        let Some(target) = action.target_state() else {
            return Ok(());
        };
        let mut inventory = self.lock()?;
        let resource = inventory
            .resources
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| SchedError::ResourceNotFound(id.to_string()))?;
        if resource.lifecycle_state.is_terminal() {
            return Err(SchedError::Directory(format!(
                "cannot {action} '{id}' while {}",
                resource.lifecycle_state
            )));
        }
        resource.lifecycle_state = target;
        info!(resource = %resource.name, action = %action, state = %target, "action applied");

        let data = serde_yaml::to_string(&*inventory)?;
        atomic_write(&self.path, data.as_bytes())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const INVENTORY: &str = r#"
resources:
  - id: i-web
    name: web-1
    lifecycle_state: STOPPED
    freeform_tags:
      Schedule: "08To18|12345|UTC"
  - id: i-db
    name: db-1
    lifecycle_state: RUNNING
    defined_tags:
      Oracle-Tags:
        Schedule: "NA"
  - id: i-gone
    name: old-1
    lifecycle_state: TERMINATED
"#;

    fn open_tmp() -> (TempDir, InventoryDirectory) {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(paths::sched_dir(dir.path())).unwrap();
        std::fs::write(paths::inventory_path(dir.path()), INVENTORY).unwrap();
        let directory = InventoryDirectory::open(dir.path()).unwrap();
        (dir, directory)
    }

    #[test]
    fn describe_finds_resource() {
        let (_dir, directory) = open_tmp();
        let snap = directory.describe("i-web").unwrap();
        assert_eq!(snap.name, "web-1");
        assert_eq!(snap.lifecycle_state, LifecycleState::Stopped);
        assert_eq!(snap.tag_value("Schedule"), Some("08To18|12345|UTC"));
        assert_eq!(snap.tag_value("Owner"), None);
    }

    #[test]
    fn defined_tags_are_searched_after_freeform() {
        let (_dir, directory) = open_tmp();
        let mut snap = directory.describe("i-db").unwrap();
        assert_eq!(snap.tag_value("Schedule"), Some("NA"));
        snap.freeform_tags
            .insert("Schedule".to_string(), "To20|12345|IST".to_string());
        assert_eq!(snap.tag_value("Schedule"), Some("To20|12345|IST"));
    }

    #[test]
    fn describe_unknown_resource() {
        let (_dir, directory) = open_tmp();
        assert!(matches!(
            directory.describe("i-missing"),
            Err(SchedError::ResourceNotFound(_))
        ));
    }

    #[test]
    fn apply_persists_target_state() {
        let (dir, directory) = open_tmp();
        directory.apply("i-web", ActionDecision::Start).unwrap();
        directory.apply("i-db", ActionDecision::Stop).unwrap();

        let reopened = InventoryDirectory::open(dir.path()).unwrap();
        assert_eq!(
            reopened.describe("i-web").unwrap().lifecycle_state,
            LifecycleState::Running
        );
        assert_eq!(
            reopened.describe("i-db").unwrap().lifecycle_state,
            LifecycleState::Stopped
        );
    }

    #[test]
    fn apply_refuses_terminated_resource() {
        let (_dir, directory) = open_tmp();
        assert!(matches!(
            directory.apply("i-gone", ActionDecision::Start),
            Err(SchedError::Directory(_))
        ));
        directory.apply("i-gone", ActionDecision::None).unwrap();
    }

    #[test]
    fn open_requires_inventory() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            InventoryDirectory::open(dir.path()),
            Err(SchedError::NotInitialized)
        ));
        assert!(InventoryDirectory::init(dir.path()).unwrap());
        assert!(!InventoryDirectory::init(dir.path()).unwrap());
        let directory = InventoryDirectory::open(dir.path()).unwrap();
        assert!(directory.snapshot().unwrap().resources.is_empty());
    }
}
