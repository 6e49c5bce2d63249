use entitle_core::{Caller, LicensingService, Origin, ValidationContext};

use crate::cli::args::ValidateArgs;
use crate::cli::helpers::print_json;
use crate::exit_codes;

pub async fn run(
    service: &LicensingService,
    caller: &Caller,
    args: ValidateArgs,
) -> anyhow::Result<i32> {
    let result = if args.scheduled {
        service.scheduled_refresh().await?
    } else {
        let context = ValidationContext::new(Origin::Cli).with_modules(args.modules);
        service.validate_license(caller, args.force, context).await?
    };

    if let Some(message) = &result.message {
        tracing::info!(source = ?result.source, "{}", message);
    }
    print_json(&result)?;
    Ok(exit_codes::for_license(&result))
}
