//! SONiC MPLS orchestration daemon entry point.
//!
//! Loads static LSP configuration, runs periodic reconciliation passes and
//! feeds forwarding-plane acknowledgements back into the orchestrator.

use clap::Parser;
use log::{debug, error, info, warn};
use sonic_mplsorch::config::parse_static_config_line;
use sonic_mplsorch::{
    InstallRequest, InstallResult, LspConfigEntry, LspInstaller, MplsOrch, MplsdConfig,
};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// SONiC MPLS Orchestration Agent
#[derive(Parser, Debug)]
#[command(name = "mplsorch")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Static configuration dump to replay (`mpls lsp ...` lines)
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Reconciliation interval in milliseconds
    #[arg(long, default_value = "1000")]
    reconcile_interval_ms: u64,

    /// Apply the configuration, print the tables and exit
    #[arg(long)]
    show: bool,
}

/// Installer that hands requests to the forwarding-plane task.
struct ChannelInstaller {
    tx: mpsc::UnboundedSender<InstallRequest>,
}

impl LspInstaller for ChannelInstaller {
    fn submit(&self, request: InstallRequest) {
        if self.tx.send(request).is_err() {
            warn!("Forwarding plane channel closed, request dropped");
        }
    }
}

/// Stand-in forwarding plane: logs each request and acknowledges it.
async fn run_forwarding_plane(
    mut requests: mpsc::UnboundedReceiver<InstallRequest>,
    acks: mpsc::UnboundedSender<InstallResult>,
) {
    while let Some(request) = requests.recv().await {
        info!(
            "FIB: {} VRF {} LSP {} gen {} -> [{}]",
            request.op,
            request.vrf,
            request.in_label,
            request.generation,
            request
                .nexthops
                .iter()
                .map(|n| format!("{} {}", n.nexthop, n.out_label))
                .collect::<Vec<_>>()
                .join(", ")
        );
        if acks.send(InstallResult::for_request(&request, true)).is_err() {
            break;
        }
    }
}

fn load_entries(args: &Args) -> sonic_mplsorch::Result<(MplsdConfig, Vec<LspConfigEntry>)> {
    let config = match &args.config {
        Some(path) => MplsdConfig::load(path)?,
        None => MplsdConfig::default(),
    };
    let mut entries = config.entries()?;

    if let Some(path) = &args.replay {
        let text = fs::read_to_string(path)?;
        for line in text.lines() {
            if let Some(entry) = parse_static_config_line(line)? {
                entries.push(entry);
            }
        }
        info!("Replaying static configuration from {}", path.display());
    }
    Ok((config, entries))
}

fn print_tables(orch: &MplsOrch) {
    for vrf in orch.vrf_ids() {
        if let Ok(table) = orch.print_table(vrf) {
            println!("{}", table);
        }
        if let Ok(dump) = orch.dump_static_config(vrf) {
            print!("{}", dump);
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    info!("Starting SONiC mplsorch");

    let (config, entries) = match load_entries(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut orch = match MplsOrch::new(config.orch) {
        Ok(orch) => orch,
        Err(e) => {
            error!("Failed to initialize MplsOrch: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let (req_tx, req_rx) = mpsc::unbounded_channel();
    let (ack_tx, mut ack_rx) = mpsc::unbounded_channel();
    orch.set_installer(Arc::new(ChannelInstaller { tx: req_tx }));
    let fib_handle = tokio::spawn(run_forwarding_plane(req_rx, ack_tx));

    info!("Applying {} static LSP entries", entries.len());
    orch.add_task(entries);
    orch.do_task();

    if args.show {
        // Let the forwarding plane answer everything issued so far.
        tokio::task::yield_now().await;
        while let Ok(Some(ack)) =
            tokio::time::timeout(Duration::from_millis(50), ack_rx.recv()).await
        {
            orch.handle_install_result(&ack);
        }
        print_tables(&orch);
        fib_handle.abort();
        return ExitCode::SUCCESS;
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(args.reconcile_interval_ms.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let reconciled = orch.do_task();
                if reconciled > 0 {
                    debug!("Reconciled {} LSP(s)", reconciled);
                }
            }
            Some(ack) = ack_rx.recv() => {
                orch.handle_install_result(&ack);
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!("Failed to listen for ctrl-c: {}", e);
                }
                warn!("Received SIGINT, shutting down gracefully...");
                let uninstalled = orch.shutdown_all();
                info!("Issued {} uninstall request(s)", uninstalled);
                break;
            }
        }
    }

    // Dropping the orchestrator closes the request channel once the
    // forwarding plane has drained it.
    drop(orch);
    if let Err(e) = fib_handle.await {
        error!("Forwarding plane task failed: {}", e);
    }

    info!("SONiC mplsorch shutdown complete");
    ExitCode::SUCCESS
}
