use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use gridrun::admin::AdminService;
use gridrun::config::{read_hosts, MasterConfig};
use gridrun::master::Master;
use gridrun::shutdown::install_shutdown_handler;
use gridrun::transport::{run_ping_receiver, TcpWorkerTransport};

#[derive(Parser, Debug)]
#[command(name = "gridrun")]
#[command(about = "Distributed script-execution master")]
struct Args {
    /// JSON config file; defaults apply when absent
    #[arg(long)]
    config: Option<PathBuf>,

    /// Hosts inventory: `host group cpu memory_mb` per line
    #[arg(long, default_value = "hosts")]
    hosts: PathBuf,

    /// Directory job description files are resolved against
    #[arg(long, default_value = ".")]
    jobs_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => MasterConfig::load(path)?,
        None => MasterConfig::default(),
    };
    let hosts = read_hosts(&args.hosts)?;

    tracing::info!(
        num_hosts = hosts.len(),
        admin_port = config.master_admin_port,
        udp_port = config.master_udp_port,
        "starting gridrun master"
    );

    let transport = Arc::new(TcpWorkerTransport::new(
        config.node_port,
        config.send_buffer_size,
    ));
    let master = Master::new(
        config.clone(),
        args.jobs_dir,
        transport.clone(),
        transport,
    );
    master.load_hosts(&hosts);

    let shutdown = install_shutdown_handler();
    master.start(shutdown.clone()).await;

    let udp_socket =
        Arc::new(tokio::net::UdpSocket::bind(("0.0.0.0", config.master_udp_port)).await?);
    for _ in 0..config.num_ping_receiver_thread.max(1) {
        tokio::spawn(run_ping_receiver(
            master.clone(),
            udp_socket.clone(),
            shutdown.clone(),
        ));
    }

    let admin_listener =
        tokio::net::TcpListener::bind(("0.0.0.0", config.master_admin_port)).await?;
    let admin = Arc::new(AdminService::new(master.clone()));
    tokio::spawn(admin.serve(admin_listener, shutdown.clone()));

    shutdown.cancelled().await;
    tracing::info!("stopped");
    Ok(())
}
