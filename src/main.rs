//! bacreplay - serve captured BACnet devices as a virtual routed network.
//!
//! Provides both human-friendly and machine-readable (robot mode) output.
#![forbid(unsafe_code)]

use std::io::{self, IsTerminal};
use std::time::Duration;

use clap::Parser;
use console::style;
use serde::Serialize;
use tracing::{debug, info};

use bacreplay::cli::{self, Cli, Commands};
use bacreplay::config::{self, ReplaySettings};
use bacreplay::dump;
use bacreplay::error::{ReplayError, Result, ResultExt};
use bacreplay::logging::init_logging;
use bacreplay::network::{BipMode, LocalAddress, TopologyConfig, UdpTransport, VirtualNetworkTopology};
use bacreplay::service::EventLoop;
use bacreplay::store::{SnapshotFilter, SnapshotStore};

/// Build information embedded at compile time.
mod build_info {
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    pub fn git_sha() -> &'static str {
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown")
    }

    pub fn git_dirty() -> &'static str {
        option_env!("VERGEN_GIT_DIRTY").unwrap_or("false")
    }

    pub fn build_timestamp() -> &'static str {
        option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown")
    }

    pub fn rustc_semver() -> &'static str {
        option_env!("VERGEN_RUSTC_SEMVER").unwrap_or("unknown")
    }

    pub fn target() -> &'static str {
        option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or("unknown")
    }
}

fn main() {
    let cli = Cli::parse();

    if cli.no_color || !io::stdout().is_terminal() {
        console::set_colors_enabled(false);
    }
    if cli.no_color || !io::stderr().is_terminal() {
        console::set_colors_enabled_stderr(false);
    }

    init_logging(cli.robot, cli.verbose, cli.quiet);

    if let Err(e) = run(&cli) {
        output_error(&cli, &e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        None => {
            print_quick_start(cli);
            Ok(())
        }
        Some(Commands::Replay(args)) => cmd_replay(cli, args),
        Some(Commands::Dump(args)) => cmd_dump(cli, args),
        Some(Commands::Version) => {
            cmd_version(cli);
            Ok(())
        }
        Some(Commands::Completions(args)) => {
            cmd_completions(args);
            Ok(())
        }
    }
}

// === Quick Start ===

#[derive(Serialize)]
struct RobotQuickStart {
    tool: &'static str,
    version: &'static str,
    description: &'static str,
    commands: RobotCommands,
    output_modes: OutputModes,
}

#[derive(Serialize)]
struct RobotCommands {
    replay: &'static str,
    dump: &'static str,
    summary: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct OutputModes {
    human: &'static str,
    robot: &'static str,
    compact: &'static str,
}

fn print_quick_start(cli: &Cli) {
    if cli.use_json() {
        output_json(
            cli,
            &RobotQuickStart {
                tool: "bacreplay",
                version: build_info::VERSION,
                description: "Replay BACnet device snapshots as a virtual routed network",
                commands: RobotCommands {
                    replay: "bacreplay replay <DB> <ADDR> <NET1> <NET2> <DEVID>...",
                    dump: "bacreplay --robot dump <DB> [DEVID] [OBJID] [PROPID]",
                    summary: "bacreplay --robot dump <DB> --summary",
                    version: "bacreplay --robot version",
                },
                output_modes: OutputModes {
                    human: "--format=text (default)",
                    robot: "--robot or --format=json",
                    compact: "--format=json-compact",
                },
            },
        );
        return;
    }

    println!(
        "{} {} - BACnet snapshot replay\n",
        style("bacreplay").bold().cyan(),
        build_info::VERSION
    );
    println!("{}", style("QUICK START").bold().underlined());
    println!();
    println!(
        "  {}  Replay devices",
        style("bacreplay replay site.db 192.168.0.10/24 10 20 100 200").green()
    );
    println!("  {}  Print every record", style("bacreplay dump site.db").green());
    println!("  {}  One device", style("bacreplay dump site.db 200").green());
    println!("  {}  Rows per device", style("bacreplay dump site.db --summary").green());
    println!();
    println!("Run {} for full help", style("bacreplay --help").yellow());
}

// === Command Implementations ===

fn cmd_replay(cli: &Cli, args: &cli::ReplayArgs) -> Result<()> {
    let settings = config::resolve_settings(args.config.as_deref())?;
    let local_address: LocalAddress = args.addr.parse()?;
    let bip_mode = bip_mode(args, &settings)?;

    let store = SnapshotStore::open_read_only(&args.db)?;
    let topology = VirtualNetworkTopology::build(
        &store,
        TopologyConfig {
            local_address,
            local_network: args.net1,
            vlan_network: args.net2,
            device_ids: args.devids.clone(),
            bip_mode,
        },
        Box::new(UdpTransport::new()),
    )?;
    store.close()?;

    if !cli.quiet && !cli.use_json() {
        eprintln!(
            "{} device {} at {} routing {} -> {} ({} peers)",
            style("Replaying").green().bold(),
            topology.router().device_id(),
            local_address,
            args.net1,
            args.net2,
            topology.segment().len()
        );
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(serve(topology, &settings, !args.no_console));
    // Console input may still be parked on a blocking stdin read.
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

fn bip_mode(args: &cli::ReplayArgs, settings: &ReplaySettings) -> Result<BipMode> {
    if let Some(foreign) = &args.foreign {
        let bbmd: LocalAddress = foreign.parse()?;
        return Ok(BipMode::Foreign {
            bbmd: bbmd.socket,
            ttl: args.ttl.unwrap_or(settings.bip.ttl),
        });
    }
    if let Some(peers) = &args.bbmd {
        let peers = peers
            .iter()
            .map(|peer| peer.parse())
            .collect::<Result<Vec<LocalAddress>>>()?;
        return Ok(BipMode::Bbmd { peers });
    }
    Ok(BipMode::Simple)
}

async fn serve(topology: VirtualNetworkTopology, settings: &ReplaySettings, with_console: bool) -> Result<()> {
    let mut event_loop = EventLoop::new(topology).with_sleep(settings.event_loop.sleep());
    let indications = event_loop.indications();
    let scheduler = event_loop.scheduler();
    let mut loop_task = tokio::spawn(event_loop.run());

    if with_console {
        let input = tokio::io::BufReader::new(tokio::io::stdin());
        let console = bacreplay::console::run(
            scheduler,
            indications,
            &settings.console,
            input,
            tokio::io::stdout(),
        );
        tokio::select! {
            result = console => {
                result.map_err(|e| ReplayError::Other(format!("console: {e:#}")))?;
            }
            stopped = &mut loop_task => {
                debug!("Event loop stopped before the console");
                stopped.with_context(|| "event loop")?;
                return Ok(());
            }
        }
    } else {
        info!("Running without console, press Ctrl-C to stop");
        drop(indications);
    }

    loop_task.await.with_context(|| "event loop")?;
    Ok(())
}

fn cmd_dump(cli: &Cli, args: &cli::DumpArgs) -> Result<()> {
    let store = SnapshotStore::open_read_only(&args.db)?;

    if args.summary {
        let summary = dump::summarize(&store)?;
        if cli.use_json() {
            output_json(cli, &summary);
        } else {
            dump::write_summary(&mut io::stdout().lock(), &summary)?;
        }
    } else {
        let filter = SnapshotFilter::from_args(&args.devid, &args.objid, &args.propid);
        if cli.use_json() {
            output_json(cli, &dump::records(&store, &filter)?);
        } else {
            dump::dump(&store, &filter, &mut io::stdout().lock())?;
        }
    }

    store.close()
}

fn cmd_version(cli: &Cli) {
    if cli.use_json() {
        output_json(
            cli,
            &serde_json::json!({
                "version": build_info::VERSION,
                "git_sha": build_info::git_sha(),
                "git_dirty": build_info::git_dirty() == "true",
                "build_timestamp": build_info::build_timestamp(),
                "rustc_version": build_info::rustc_semver(),
                "target": build_info::target(),
            }),
        );
    } else {
        println!("bacreplay {}", build_info::VERSION);
        println!(
            "git: {}{}",
            build_info::git_sha(),
            if build_info::git_dirty() == "true" {
                " (dirty)"
            } else {
                ""
            }
        );
        println!("built: {}", build_info::build_timestamp());
        println!("rustc: {}", build_info::rustc_semver());
        println!("target: {}", build_info::target());
    }
}

fn cmd_completions(args: &cli::CompletionsArgs) {
    use clap::CommandFactory;
    clap_complete::generate(args.shell, &mut Cli::command(), "bacreplay", &mut io::stdout());
}

// === Utility Functions ===

fn output_json<T: Serialize>(cli: &Cli, data: &T) {
    let json = if cli.use_compact_json() {
        serde_json::to_string(data)
    } else {
        serde_json::to_string_pretty(data)
    };
    match json {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("{}: cannot serialize output: {e}", style("Error").red().bold()),
    }
}

fn output_error(cli: &Cli, error: &ReplayError) {
    if cli.use_json() {
        let json = serde_json::json!({
            "error": true,
            "message": error.to_string(),
            "suggestion": error.suggestion(),
            "recoverable": error.is_user_recoverable(),
        });
        eprintln!("{json}");
    } else {
        eprintln!("{}: {}", style("Error").red().bold(), error);
        if let Some(suggestion) = error.suggestion() {
            eprintln!("{}: {}", style("Hint").yellow(), suggestion);
        }
    }
}
