use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "xcpe",
    author,
    version,
    about = "Pack, inspect and unpack .xcpe shader effect packages"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a package from an effect project (`effect.toml`).
    Pack(PackArgs),
    /// Verify a package and write its passes, parameters and images to a directory.
    Unpack(UnpackArgs),
    /// Verify a package and print its header, parameters and images.
    Inspect(InspectArgs),
    /// Print the parameter block as JSON without reading the rest of the package.
    Params(ParamsArgs),
    /// Check a parameter definition file and report every problem line.
    Lint(LintArgs),
    /// Print a render-process message as JSON.
    Message(MessageCommand),
    /// List the packages in a directory (the effects directory by default).
    List(ListArgs),
    /// Show or change persistent settings.
    Config(ConfigArgs),
    /// Print resolved directories and the settings file location.
    Where,
}

#[derive(Args, Debug, Clone, Default)]
pub struct KeyArgs {
    /// Passphrase for encrypting or decrypting shader and image blocks.
    #[arg(long, env = "XCPE_KEY", hide_env_values = true)]
    pub key: Option<String>,
}

#[derive(Args, Debug)]
pub struct PackArgs {
    /// Project directory or path to its `effect.toml`.
    #[arg(value_name = "PROJECT", default_value = ".")]
    pub project: PathBuf,

    /// Output file; defaults to `<id>.xcpe` in the configured output directory.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Fail when any parameter line is rejected.
    #[arg(long)]
    pub strict: bool,

    #[command(flatten)]
    pub key: KeyArgs,
}

#[derive(Args, Debug)]
pub struct UnpackArgs {
    #[arg(value_name = "PACKAGE")]
    pub package: PathBuf,

    /// Destination directory; defaults to the package path without its extension.
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub key: KeyArgs,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    #[arg(value_name = "PACKAGE")]
    pub package: PathBuf,

    /// Emit a JSON summary instead of text.
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub key: KeyArgs,
}

#[derive(Args, Debug)]
pub struct ParamsArgs {
    #[arg(value_name = "PACKAGE")]
    pub package: PathBuf,

    /// Print compact JSON on one line.
    #[arg(long)]
    pub compact: bool,
}

#[derive(Args, Debug)]
pub struct LintArgs {
    /// Parameter definition file.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Pass id recorded on the parsed parameters.
    #[arg(long, default_value_t = 1)]
    pub pass: i32,

    /// Print the parsed parameters and diagnostics as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct MessageCommand {
    #[command(subcommand)]
    pub action: MessageAction,

    /// Print compact JSON on one line.
    #[arg(long, global = true)]
    pub compact: bool,
}

#[derive(Subcommand, Debug)]
pub enum MessageAction {
    /// Add the effect stored in a package.
    Add {
        #[arg(value_name = "PACKAGE")]
        package: PathBuf,
        #[command(flatten)]
        key: KeyArgs,
    },
    /// Change one parameter of an effect in a package.
    Update {
        #[arg(value_name = "PACKAGE")]
        package: PathBuf,
        /// Parameter name.
        #[arg(value_name = "NAME")]
        name: String,
        /// New value, written as in a parameter definition (e.g. `(1, 0, 0)`).
        #[arg(value_name = "VALUE", allow_hyphen_values = true)]
        value: String,
        /// Pass id, needed when the name exists in several passes.
        #[arg(long)]
        pass: Option<i32>,
    },
    /// Remove an effect by id.
    Remove {
        #[arg(value_name = "ID")]
        id: String,
    },
    /// Remove every effect.
    Clear,
    /// Reorder effects.
    Sort {
        #[arg(value_name = "ID", required = true)]
        ids: Vec<String>,
    },
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(value_name = "DIR")]
    pub dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Default author for projects that leave it empty.
    #[arg(long)]
    pub author: Option<String>,

    /// Default output directory for `pack`.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Make `pack` fail on rejected parameter lines.
    #[arg(long, value_name = "BOOL")]
    pub strict_parameters: Option<bool>,
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_message_update_with_negative_value() {
        let cli = Cli::try_parse_from(["xcpe", "message", "update", "fx.xcpe", "speed", "-2"])
            .unwrap();
        match cli.command {
            Command::Message(MessageCommand {
                action: MessageAction::Update { name, value, .. },
                ..
            }) => {
                assert_eq!(name, "speed");
                assert_eq!(value, "-2");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn sort_requires_ids() {
        assert!(Cli::try_parse_from(["xcpe", "message", "sort"]).is_err());
    }
}
