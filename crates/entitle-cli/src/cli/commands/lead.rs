use entitle_client::LeadPayload;
use entitle_core::{Caller, LicensingService};

use crate::cli::args::LeadSubmitArgs;
use crate::cli::helpers::print_json;
use crate::exit_codes::SUCCESS;

pub async fn submit(
    service: &LicensingService,
    caller: &Caller,
    args: LeadSubmitArgs,
) -> anyhow::Result<i32> {
    let payload = LeadPayload {
        name: args.name,
        email: args.email,
        company: args.company,
        message: args.message,
        modules: args.modules,
    };
    let receipt = service.submit_contact_lead(caller, payload).await?;
    print_json(&receipt)?;
    Ok(SUCCESS)
}
