use anyhow::Context;
use std::path::Path;
use vmsched_core::{
    config::SchedulerConfig, directory::InventoryDirectory, paths, store::RedbScheduleStore,
};

pub fn run(root: &Path) -> anyhow::Result<()> {
    println!("Initializing vmsched in: {}", root.display());

    // 1. Create .vmsched
    let dir = paths::sched_dir(root);
    std::fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    // 2. Write config.yaml if missing
    let config = if paths::config_path(root).exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
        SchedulerConfig::load(root).context("failed to load config")?
    } else {
        let cfg = SchedulerConfig::default();
        cfg.save(root).context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
        cfg
    };

    // 3. Write inventory.yaml if missing
    if InventoryDirectory::init(root).context("failed to write inventory.yaml")? {
        println!("  created: {}", paths::INVENTORY_FILE);
    } else {
        println!("  exists:  {}", paths::INVENTORY_FILE);
    }

    // 4. Open the store so the schedule table exists
    let existed = paths::store_path(root).exists();
    RedbScheduleStore::open_in(root, &config.scheduler.table_name)
        .context("failed to open schedule store")?;
    let verb = if existed { "exists: " } else { "created:" };
    println!(
        "  {verb} {} (table '{}')",
        paths::STORE_FILE,
        config.scheduler.table_name
    );

    Ok(())
}
