mod cli;
mod paths;
mod run;
mod settings;

use anyhow::Result;
use cli::Command;
use paths::AppPaths;
use settings::Settings;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    let paths = AppPaths::discover()?;
    let settings = Settings::load_or_default(&paths.settings_file())?;
    tracing::debug!(
        config = %paths.config_dir().display(),
        data = %paths.data_dir().display(),
        "resolved xcpe paths"
    );

    match cli.command {
        Command::Pack(args) => run::pack(args, &paths, &settings),
        Command::Unpack(args) => run::unpack(args),
        Command::Inspect(args) => run::inspect(args),
        Command::Params(args) => run::params(args),
        Command::Lint(args) => run::lint(args),
        Command::Message(command) => run::message(command),
        Command::List(args) => run::list(args, &paths),
        Command::Config(args) => run::config(args, &paths, settings),
        Command::Where => {
            run::show_where(&paths, &settings);
            Ok(())
        }
    }
}
