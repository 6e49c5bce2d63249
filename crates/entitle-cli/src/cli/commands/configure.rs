use entitle_core::{Caller, LicensingService};

use crate::cli::args::ConfigureArgs;
use crate::cli::helpers::print_json;
use crate::exit_codes::SUCCESS;

pub fn run(service: &LicensingService, caller: &Caller, args: ConfigureArgs) -> anyhow::Result<i32> {
    let outcome = service.save_configuration(caller, &args.base_url)?;
    print_json(&outcome)?;
    Ok(SUCCESS)
}
