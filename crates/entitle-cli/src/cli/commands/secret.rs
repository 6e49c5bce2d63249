use entitle_core::{Caller, LicensingService};

use crate::cli::helpers::print_json;
use crate::exit_codes::SUCCESS;

pub async fn regenerate(service: &LicensingService, caller: &Caller) -> anyhow::Result<i32> {
    let outcome = service.regenerate_secret(caller).await?;
    print_json(&outcome)?;
    Ok(SUCCESS)
}
