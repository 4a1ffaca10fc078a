//! Portcullis command line.
//!
//! Compiles the reference topology, templates the edge firewall policy and
//! renders the service manifests.

use std::fs;
use std::mem;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use portcullis_core::deployment::{self, Plan};
use portcullis_core::loader::{self, LoadedList, load_address_list, load_shared_lists};
use portcullis_core::settings::{Settings, load_settings};
use portcullis_core::{ConfigError, Error, ListKind, PolicyDocument};

/// Exit code for declarations that do not fit together.
const EXIT_CONFIG: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "portcullis")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the access groups of the reference deployment as JSON
    Groups(SettingsArgs),
    /// Write the finalized edge policy and the rendered manifests
    Render(RenderArgs),
}

#[derive(Args, Debug)]
struct SettingsArgs {
    /// Operator settings file
    #[arg(long, env = "PORTCULLIS_SETTINGS", default_value = "settings.json")]
    settings: PathBuf,
}

#[derive(Args, Debug)]
struct RenderArgs {
    #[command(flatten)]
    settings: SettingsArgs,

    /// Address list file holding `ipRatebased.allowList` and `ipRestriction.denyList`
    #[arg(long, env = "PORTCULLIS_WAF", default_value = "waf.json")]
    waf: PathBuf,

    /// Allow list file (default: `allowedIps` from settings if set, else --waf)
    #[arg(long, env = "PORTCULLIS_ALLOW_LIST")]
    allow_list: Option<PathBuf>,

    /// Deny list file (default: --waf)
    #[arg(long, env = "PORTCULLIS_DENY_LIST")]
    deny_list: Option<PathBuf>,

    /// Base policy template (default: the built-in template)
    #[arg(long, env = "PORTCULLIS_BASE_POLICY")]
    base_policy: Option<PathBuf>,

    /// Provisioning outputs (JSON) used to fill manifest placeholders
    #[arg(long, env = "PORTCULLIS_OUTPUTS", default_value = "cdk-outputs.json")]
    outputs: PathBuf,

    /// Directory holding the manifest templates
    #[arg(long, env = "PORTCULLIS_MANIFESTS", default_value = "templates")]
    manifests: PathBuf,

    /// Directory the results are written to
    #[arg(long, short = 'o', env = "PORTCULLIS_OUT", default_value = "out")]
    out: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Groups(args) => groups(args),
        Commands::Render(args) => render(args),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if is_config_error(&err) => {
            error!(event = "Exit", phase = "Config", "{err:#}");
            ExitCode::from(EXIT_CONFIG)
        }
        Err(err) => {
            error!(event = "Exit", phase = "Fatal", "{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn is_config_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause.downcast_ref::<ConfigError>().is_some()
            || matches!(cause.downcast_ref::<Error>(), Some(Error::Config(_)))
    })
}

fn groups(args: SettingsArgs) -> Result<()> {
    let settings = read_settings(&args.settings)?;
    let groups = deployment::reference_topology(&settings).compile()?;
    println!("{}", serde_json::to_string_pretty(&groups)?);
    Ok(())
}

fn render(args: RenderArgs) -> Result<()> {
    let settings = read_settings(&args.settings.settings)?;

    let (allow, deny, file_warnings) = address_lists(&args, &settings);

    let base = match &args.base_policy {
        Some(path) => loader::load_policy_document(path)
            .with_context(|| format!("loading base policy {}", path.display()))?,
        None => PolicyDocument::base()?,
    };

    let plan = deployment::plan(&settings, base, allow.list.as_ref(), deny.list.as_ref())?;
    report(&plan, &[&allow, &deny], file_warnings);

    let outputs: serde_json::Value = serde_json::from_str(&loader::read_file(&args.outputs)?)
        .with_context(|| format!("parsing provisioning outputs {}", args.outputs.display()))?;
    let bindings = plan.bindings(&settings, &outputs);

    fs::create_dir_all(&args.out)
        .with_context(|| format!("creating output directory {}", args.out.display()))?;
    write(
        &args.out.join("edge-policy.json"),
        &plan.policy.document.to_json_pretty()?,
    )?;

    for spec in deployment::manifests(&settings) {
        let template = loader::load_manifest(&args.manifests.join(spec.file))?;
        let manifest = plan
            .render_manifest(&spec, &template, &bindings)
            .with_context(|| format!("rendering {}", spec.file))?;
        write(&args.out.join(spec.file), &serde_yaml::to_string(&manifest)?)?;
    }

    info!(event = "Render", phase = "Done", out = %args.out.display(), groups = %plan.groups);
    Ok(())
}

fn read_settings(path: &Path) -> Result<Settings> {
    load_settings(path).with_context(|| format!("loading settings {}", path.display()))
}

/// Pick the source of each list. The shared `--waf` file is read at most once,
/// and a problem with it is counted once.
fn address_lists(args: &RenderArgs, settings: &Settings) -> (LoadedList, LoadedList, usize) {
    let allow_from_waf = args.allow_list.is_none() && settings.allowed_ips.is_empty();
    let deny_from_waf = args.deny_list.is_none();
    let mut shared = (allow_from_waf || deny_from_waf).then(|| load_shared_lists(&args.waf));
    let file_warnings = shared
        .as_ref()
        .map_or(0, |lists| usize::from(lists.warning.is_some()));

    let allow = match (&args.allow_list, &mut shared) {
        (Some(path), _) => load_address_list(path, ListKind::Allow),
        (None, Some(lists)) if allow_from_waf => mem::replace(&mut lists.allow, LoadedList::absent()),
        (None, _) => settings.allow_list(&args.settings.settings),
    };
    let deny = match (&args.deny_list, shared) {
        (Some(path), _) => load_address_list(path, ListKind::Deny),
        (None, Some(lists)) => lists.deny,
        (None, None) => LoadedList::absent(),
    };
    (allow, deny, file_warnings)
}

fn report(plan: &Plan, lists: &[&LoadedList], file_warnings: usize) {
    let degraded = lists.iter().filter(|l| l.warning.is_some()).count();
    let warnings = plan.policy.warnings() + degraded + file_warnings;
    if warnings > 0 {
        info!(event = "Render", phase = "Policy", warnings, "policy templated with warnings");
    }
}

fn write(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
    info!(event = "Render", phase = "Write", path = %path.display());
    Ok(())
}
