use checks4shell_cli::Cli;
use checks4shell_cli::CliCommand;
use checks4shell_cli::logging;
use checks4shell_cli::run_cmd;
use checks4shell_cli::version_line;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.subcommand {
        CliCommand::Version => {
            println!("{}", version_line());
            Ok(())
        }
        CliCommand::Run(args) => {
            logging::init(args.debug);
            let code = run_cmd::run_main(args, &cli.credentials).await?;
            std::process::exit(code);
        }
    }
}
