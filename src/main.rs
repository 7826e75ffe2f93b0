//! scanflow CLI - Crawl, bruteforce and audit web applications

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scanflow::{
    PluginType, Profile, Scan,
    output::{OutputConfig, OutputFormat, OutputSort, output_report},
};

/// Web application scanner - discovers request points and audits them with plugins
#[derive(Parser, Debug)]
#[command(name = "scanflow")]
#[command(version, about, long_about = None)]
struct Args {
    /// Target URLs
    targets: Vec<String>,

    /// Load targets, settings and plugins from a TOML profile
    #[arg(short = 'p', long = "profile")]
    profile: Option<PathBuf>,

    /// Discovery plugins (comma separated, `all` and `!name` accepted)
    #[arg(long, value_delimiter = ',')]
    discovery: Option<Vec<String>>,

    /// Audit plugins
    #[arg(long, value_delimiter = ',')]
    audit: Option<Vec<String>>,

    /// Bruteforce plugins
    #[arg(long, value_delimiter = ',')]
    bruteforce: Option<Vec<String>>,

    /// Grep plugins
    #[arg(long, value_delimiter = ',')]
    grep: Option<Vec<String>>,

    /// Auth plugins
    #[arg(long, value_delimiter = ',')]
    auth: Option<Vec<String>>,

    /// Discovery time budget in minutes
    #[arg(long = "max-discovery-time")]
    max_discovery_time: Option<u64>,

    /// Fail instead of enabling the plugins other plugins depend on
    #[arg(long = "no-auto-dependencies")]
    no_auto_dependencies: bool,

    /// Write the discovered request points to a CSV file
    #[arg(long = "export")]
    export: Option<PathBuf>,

    /// Output format
    #[arg(short = 'o', long = "output", default_value = "human", value_enum)]
    output_format: OutputFormatArg,

    /// Sort order for findings
    #[arg(long = "sort", default_value = "severity", value_enum)]
    sort: OutputSortArg,

    /// Allow scanning private/internal IP addresses (localhost, 192.168.x.x, etc.)
    #[arg(long = "allow-private")]
    allow_private: bool,

    /// List the available plugins and exit
    #[arg(long = "list-plugins")]
    list_plugins: bool,

    /// Save the resulting setup as a TOML profile
    #[arg(long = "save-profile")]
    save_profile: Option<PathBuf>,
}

/// Output format argument
#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormatArg {
    Human,
    Json,
    None,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Human => OutputFormat::Human,
            OutputFormatArg::Json => OutputFormat::Json,
            OutputFormatArg::None => OutputFormat::None,
        }
    }
}

/// Output sort argument
#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputSortArg {
    /// Most severe first, then by plugin and URL (default)
    Severity,
    /// By plugin, then by URL
    Plugin,
    /// By URL only
    Url,
}

impl From<OutputSortArg> for OutputSort {
    fn from(arg: OutputSortArg) -> Self {
        match arg {
            OutputSortArg::Severity => OutputSort::Severity,
            OutputSortArg::Plugin => OutputSort::Plugin,
            OutputSortArg::Url => OutputSort::Url,
        }
    }
}

/// Plugins used when neither a profile nor a selection flag is given
const DEFAULT_PLUGINS: &[(PluginType, &[&str])] = &[
    (PluginType::Discovery, &["web_spider", "robots_txt"]),
    (PluginType::Audit, &["all"]),
];

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scanflow=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    // Print banner for human output
    if matches!(args.output_format, OutputFormatArg::Human) && !args.list_plugins {
        print_banner();
    }

    let output_config = OutputConfig::new(args.output_format.into(), args.sort.into());

    match run_scan(&args, &output_config).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_scan(args: &Args, output_config: &OutputConfig) -> scanflow::Result<()> {
    let mut scan = Scan::builder().build()?;

    if args.list_plugins {
        list_plugins(&scan);
        return Ok(());
    }

    if let Some(path) = &args.profile {
        scan.use_profile(&override_profile(Profile::load(path)?, args.allow_private))?;
    }

    let config = scan.config_mut();
    config.allow_private |= args.allow_private;
    if let Some(minutes) = args.max_discovery_time {
        config.max_discovery_time = minutes;
    }
    if args.no_auto_dependencies {
        config.auto_dependencies = false;
    }
    if let Some(path) = &args.export {
        config.export_fuzzable_requests = Some(path.clone());
    }
    if !args.targets.is_empty() {
        scan.set_targets(&args.targets)?;
    }

    let flags = [
        (PluginType::Discovery, &args.discovery),
        (PluginType::Audit, &args.audit),
        (PluginType::Bruteforce, &args.bruteforce),
        (PluginType::Grep, &args.grep),
        (PluginType::Auth, &args.auth),
    ];
    if args.profile.is_none() && flags.iter().all(|(_, names)| names.is_none()) {
        for (plugin_type, names) in DEFAULT_PLUGINS {
            scan.set_plugins(*plugin_type, *names);
        }
    }
    for (plugin_type, names) in flags {
        let Some(names) = names else {
            continue;
        };
        for name in scan.set_plugins(plugin_type, names) {
            warn!("Unknown plugin: {}.{}", plugin_type, name);
        }
    }

    if let Some(path) = &args.save_profile {
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        scan.save_current_to_profile(path, &name, "")?;
        info!("Profile saved to {}", path.display());
    }

    scan.init_plugins()?;

    let handle = scan.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Stopping the scan...");
            handle.stop();
        }
    });

    scan.start().await?;

    let stdout = std::io::stdout();
    let mut writer = stdout.lock();
    output_report(&scan.report(), output_config, &mut writer)?;

    Ok(())
}

/// Command-line flags that must hold before the profile's targets are parsed
fn override_profile(mut profile: Profile, allow_private: bool) -> Profile {
    profile.settings.allow_private |= allow_private;
    profile
}

fn list_plugins(scan: &Scan) {
    for plugin_type in scan.plugin_types() {
        let names = scan.plugin_list(plugin_type);
        if names.is_empty() {
            continue;
        }
        println!("{}:", plugin_type);
        for name in names {
            let description = scan
                .plugin_instance(plugin_type, &name)
                .map(|plugin| plugin.description().to_string())
                .unwrap_or_default();
            println!("  {:<20} {}", name, description);
        }
    }
}

fn print_banner() {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    println!("scanflow v{}", VERSION);
    println!();
}
