use crate::config::plan::Directive;
use crate::config::profile::{Preset, Profile};
use crate::config::types::{CordonError, ErrorClass, PrivilegeModel, Result};
use crate::exec::launcher::ExecLauncher;
use crate::exec::preexec::{run_sandbox, SandboxConfig};
use crate::kernel::HostKernel;
use crate::utils::diagnostics;
use clap::parser::ValueSource;
use clap::{ArgAction, ArgMatches, CommandFactory, FromArgMatches, Parser, ValueEnum};
use std::ffi::OsString;
use std::path::PathBuf;

const AFTER_HELP: &str = "\
Within the container your real home directory is invisible, replaced by a
directory that starts out empty and persists across runs with the same NAME.
Directives are applied in the order given.

Example:
    cordon browser -w Downloads firefox
        Runs Firefox in a container but lets it save downloads in your real
        Downloads directory.";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ModelArg {
    /// setuid when running with effective uid 0, userns otherwise
    #[default]
    Auto,
    Setuid,
    Userns,
}

impl ModelArg {
    pub fn requested(self) -> Option<PrivilegeModel> {
        match self {
            ModelArg::Auto => None,
            ModelArg::Setuid => Some(PrivilegeModel::Setuid),
            ModelArg::Userns => Some(PrivilegeModel::UserNamespace),
        }
    }
}

/// Run COMMAND inside the home directory container called NAME.
#[derive(Parser, Debug)]
#[command(
    name = "cordon",
    version,
    disable_help_flag = true,
    after_help = AFTER_HELP
)]
struct Cli {
    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,

    /// Container name
    #[arg(index = 1)]
    name: String,

    /// Prevent executing files from any writable location; must come before
    /// -w, -r and -h
    #[arg(long)]
    nx: bool,

    /// Make <DIR> from your real home accessible with full access
    #[arg(short = 'w', long, value_name = "DIR")]
    writable: Vec<String>,

    /// Make <DIR> from your real home accessible read-only
    #[arg(short = 'r', long, value_name = "DIR")]
    readonly: Vec<String>,

    /// Hide <DIR>, a subdirectory of an earlier -w or -r
    #[arg(short = 'h', long, value_name = "DIR")]
    hide: Vec<String>,

    /// JSON profile applied before command-line directives
    #[arg(long, value_name = "FILE")]
    profile: Option<PathBuf>,

    /// Built-in profile applied before --profile
    #[arg(long, value_enum)]
    preset: Option<Preset>,

    /// How to obtain the privilege needed to build the mount tree
    #[arg(long, value_enum, default_value_t = ModelArg::Auto)]
    model: ModelArg,

    /// Program to run and its arguments
    #[arg(index = 2, value_name = "COMMAND", num_args = 1.., trailing_var_arg = true)]
    command: Vec<OsString>,
}

/// Options that may only follow NAME.
const OPTION_ARGS: [&str; 7] = [
    "nx", "writable", "readonly", "hide", "profile", "preset", "model",
];

/// NAME is the first argument; nothing that looks like a flag is a name.
fn check_name_first(matches: &ArgMatches) -> Result<()> {
    let name = matches.get_one::<String>("name").map(String::as_str).unwrap_or("");
    let name_index = matches.index_of("name").unwrap_or(0);
    let flag_first = OPTION_ARGS
        .iter()
        .filter(|id| matches.value_source(id) == Some(ValueSource::CommandLine))
        .filter_map(|id| matches.index_of(id))
        .any(|index| index < name_index);
    if flag_first || name.starts_with('-') {
        return Err(CordonError::Usage(
            "NAME must be the first argument".to_string(),
        ));
    }
    Ok(())
}

type DirectiveParser = fn(&str) -> Result<Directive>;

const DIRECTIVE_ARGS: [(&str, DirectiveParser); 3] = [
    ("writable", Directive::full),
    ("readonly", Directive::readonly),
    ("hide", Directive::hide),
];

/// Command-line directives in the order they were given.
fn ordered_directives(matches: &ArgMatches) -> Result<Vec<Directive>> {
    let mut given: Vec<(usize, DirectiveParser, &String)> = Vec::new();
    for (id, parse) in DIRECTIVE_ARGS {
        if let (Some(indices), Some(values)) =
            (matches.indices_of(id), matches.get_many::<String>(id))
        {
            given.extend(indices.zip(values).map(|(index, value)| (index, parse, value)));
        }
    }
    given.sort_by_key(|(index, _, _)| *index);

    if matches.value_source("nx") == Some(ValueSource::CommandLine) {
        if let (Some(nx), Some((first, _, _))) = (matches.index_of("nx"), given.first()) {
            if *first < nx {
                return Err(CordonError::Usage(
                    "--nx must be specified before other flags".to_string(),
                ));
            }
        }
    }

    given
        .into_iter()
        .map(|(_, parse, value)| parse(value))
        .collect()
}

/// Turn parsed arguments into a sandbox configuration. Every path is
/// validated here, before anything touches the system.
fn build_config(cli: Cli, matches: &ArgMatches) -> Result<SandboxConfig> {
    check_name_first(matches)?;
    let cli_directives = ordered_directives(matches)?;
    if cli.command.is_empty() {
        return Err(CordonError::Usage("missing command".to_string()));
    }

    let mut profile = cli.preset.map(Preset::profile).unwrap_or_default();
    if let Some(path) = &cli.profile {
        profile.extend(Profile::load(path)?);
    }

    let mut directives = profile.directives()?;
    directives.extend(cli_directives);

    let mut config = SandboxConfig::new(cli.name, cli.command);
    config.directives = directives;
    config.nx = cli.nx || profile.nx;
    config.model = cli.model.requested();
    Ok(config)
}

/// Parse `args` (program name first) into a sandbox configuration.
pub fn parse_from<I, T>(args: I) -> std::result::Result<Result<SandboxConfig>, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = Cli::command().try_get_matches_from(args)?;
    let cli = Cli::from_arg_matches(&matches)?;
    Ok(build_config(cli, &matches))
}

fn print_usage_and_exit(message: &str) -> ! {
    eprintln!("{}: {}", crate::config::types::TOOL_NAME, message);
    eprintln!("{}", Cli::command().render_usage());
    std::process::exit(1)
}

fn fail(error: CordonError) -> ! {
    match error.class() {
        ErrorClass::Usage => print_usage_and_exit(&error.to_string()),
        ErrorClass::Validation | ErrorClass::Precondition | ErrorClass::FatalSystem => {
            diagnostics::abort_with(&error)
        }
    }
}

pub fn run() -> anyhow::Result<()> {
    // Initialize logging; RUST_LOG selects verbosity and the audit target
    env_logger::init();

    let config = match parse_from(std::env::args_os()) {
        Ok(Ok(config)) => config,
        Ok(Err(e)) => fail(e),
        Err(e) => {
            let code = match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            e.print()?;
            std::process::exit(code);
        }
    };

    // Returns only on failure; success replaces the process image.
    if let Err(e) = run_sandbox(HostKernel::new(), config, &mut ExecLauncher) {
        fail(e);
    }
    Ok(())
}
