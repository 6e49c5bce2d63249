use super::super::args::*;
use super::super::helpers::{caller, open_service};

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let service = open_service(&cli.global)?;
    let caller = caller(&cli.global);

    match cli.cmd {
        Command::Configure(args) => super::configure::run(&service, &caller, args),
        Command::Validate(args) => super::validate::run(&service, &caller, args).await,
        Command::Secret(args) => match args.cmd {
            SecretSub::Regenerate => super::secret::regenerate(&service, &caller).await,
        },
        Command::Modules(args) => super::modules::run(&service, &caller, args.cmd),
        Command::Lead(args) => match args.cmd {
            LeadSub::Submit(submit) => super::lead::submit(&service, &caller, submit).await,
        },
        Command::Audit(args) => super::audit::run(&service, &caller, args),
    }
}
