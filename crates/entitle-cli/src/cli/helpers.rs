use anyhow::Context;
use entitle_core::{Caller, EntitleConfig, LicensingService};
use serde::Serialize;

use super::args::GlobalArgs;

/// Load configuration (file, then environment, then `--db`) and open the
/// service.
pub fn open_service(global: &GlobalArgs) -> anyhow::Result<LicensingService> {
    let mut config = EntitleConfig::load(global.config.as_deref())?;
    if let Some(db) = &global.db {
        config = config.with_database_path(db);
    }
    tracing::debug!(db = %config.database_path.display(), "opening licensing store");
    LicensingService::open(config).context("failed to open licensing service")
}

pub fn caller(global: &GlobalArgs) -> Caller {
    if global.read_only {
        Caller::viewer(global.actor.as_str())
    } else {
        Caller::admin(global.actor.as_str())
    }
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
