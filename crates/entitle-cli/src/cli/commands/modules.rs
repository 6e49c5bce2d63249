use entitle_core::{Caller, LicensingService, ModuleAction};
use serde_json::json;

use crate::cli::args::ModulesSub;
use crate::cli::helpers::print_json;
use crate::exit_codes::{LICENSE_INVALID, SUCCESS};

pub fn run(service: &LicensingService, caller: &Caller, cmd: ModulesSub) -> anyhow::Result<i32> {
    match cmd {
        ModulesSub::List => {
            print_json(&service.list_modules(caller)?)?;
            Ok(SUCCESS)
        }
        ModulesSub::Usable(args) => {
            let usable = service.is_module_usable(caller, &args.key)?;
            print_json(&json!({ "key": args.key, "usable": usable }))?;
            Ok(if usable { SUCCESS } else { LICENSE_INVALID })
        }
        ModulesSub::Tables(args) => {
            let tables = service.get_module_data_tables(caller, &args.key)?;
            print_json(&json!({ "key": args.key, "tables": tables }))?;
            Ok(SUCCESS)
        }
        ModulesSub::Install(args) => transition(&args.key, service.install_module(caller, &args.key)?),
        ModulesSub::Enable(args) => transition(&args.key, service.enable_module(caller, &args.key)?),
        ModulesSub::Disable(args) => transition(&args.key, service.disable_module(caller, &args.key)?),
    }
}

fn transition(key: &str, action: Option<ModuleAction>) -> anyhow::Result<i32> {
    match action {
        Some(action) => print_json(&action)?,
        None => print_json(&json!({ "key": key, "changed": false }))?,
    }
    Ok(SUCCESS)
}
