use entitle_core::{Caller, LicensingService};

use crate::cli::args::{AuditArgs, AuditSub};
use crate::cli::helpers::print_json;
use crate::exit_codes::SUCCESS;

pub fn run(service: &LicensingService, caller: &Caller, args: AuditArgs) -> anyhow::Result<i32> {
    match args.cmd {
        AuditSub::Validations => print_json(&service.recent_validations(caller, args.limit)?)?,
        AuditSub::Config => print_json(&service.recent_config_changes(caller, args.limit)?)?,
        AuditSub::Modules => print_json(&service.recent_module_actions(caller, args.limit)?)?,
    }
    Ok(SUCCESS)
}
