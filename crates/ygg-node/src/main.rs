mod executor;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use ygg_coordinator::{
    ApplierSettings, TopologyChangeAppliers, TopologyChangeCoordinator, TopologyChangeDriver,
};
use ygg_server::{
    serve_admin, AdminClient, TopologyManagementRequest, TopologyManagementRequestsHandler,
};
use ygg_storage::{FjallTopologyStore, TopologyStore};
use ygg_topology::ClusterTopology;
use ygg_types::{MemberId, PartitionId, Priority};

use crate::executor::{TracingMembershipExecutor, TracingPartitionExecutor};

#[derive(clap::Parser, Debug)]
#[command(name = "ygg-node", about = "Yggdrasil cluster topology node")]
struct Cli {
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,
    /// Admin address of the running node; defaults to `admin.listen_addr`
    #[arg(long, global = true)]
    admin_addr: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Bootstrap the topology if needed, then drive pending changes and serve
    /// admin requests until interrupted
    Run,
    /// Print the stored topology
    Topology,
    AddMembers {
        #[arg(required = true)]
        members: Vec<String>,
        #[arg(long)]
        dry_run: bool,
    },
    RemoveMembers {
        #[arg(required = true)]
        members: Vec<String>,
        #[arg(long)]
        dry_run: bool,
    },
    JoinPartition {
        member_id: String,
        partition_id: PartitionId,
        #[arg(long, default_value_t = 1)]
        priority: Priority,
        #[arg(long)]
        dry_run: bool,
    },
    LeavePartition {
        member_id: String,
        partition_id: PartitionId,
        #[arg(long)]
        dry_run: bool,
    },
    /// Redistribute partitions over exactly these members
    Reassign {
        #[arg(required = true)]
        members: Vec<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Make the cluster consist of exactly these members
    Scale {
        #[arg(required = true)]
        members: Vec<String>,
        #[arg(long)]
        dry_run: bool,
    },
    Cancel {
        change_id: u64,
    },
    /// Drop unreachable members without their cooperation
    ForceOverwrite {
        #[arg(required = true)]
        members_to_remove: Vec<String>,
    },
}

#[derive(Debug, Deserialize)]
struct ClusterConfig {
    member_id: String,
    initial_members: Vec<String>,
    partition_count: u32,
    replication_factor: usize,
}

#[derive(Debug, Deserialize)]
struct StorageConfig {
    data_dir: String,
}

#[derive(Debug, Deserialize)]
struct DriverConfig {
    poll_interval_ms: u64,
}

#[derive(Debug, Deserialize)]
struct AdminConfig {
    listen_addr: String,
}

#[derive(Debug, Deserialize)]
struct ObservabilityConfig {
    log_level: String,
    log_format: String,
}

#[derive(Debug, Deserialize)]
struct Config {
    cluster: ClusterConfig,
    storage: StorageConfig,
    driver: DriverConfig,
    admin: AdminConfig,
    observability: ObservabilityConfig,
}

fn member_ids(raw: Vec<String>) -> Vec<MemberId> {
    raw.into_iter().map(MemberId::from).collect()
}

impl Command {
    fn into_request(self) -> Option<TopologyManagementRequest> {
        let request = match self {
            Command::Run => return None,
            Command::Topology => TopologyManagementRequest::GetTopology,
            Command::AddMembers { members, dry_run } => {
                TopologyManagementRequest::AddMembers { members: member_ids(members), dry_run }
            }
            Command::RemoveMembers { members, dry_run } => {
                TopologyManagementRequest::RemoveMembers { members: member_ids(members), dry_run }
            }
            Command::JoinPartition { member_id, partition_id, priority, dry_run } => {
                TopologyManagementRequest::JoinPartition {
                    member_id: MemberId::from(member_id),
                    partition_id,
                    priority,
                    dry_run,
                }
            }
            Command::LeavePartition { member_id, partition_id, dry_run } => {
                TopologyManagementRequest::LeavePartition {
                    member_id: MemberId::from(member_id),
                    partition_id,
                    dry_run,
                }
            }
            Command::Reassign { members, dry_run } => TopologyManagementRequest::ReassignPartitions {
                members: member_ids(members),
                dry_run,
            },
            Command::Scale { members, dry_run } => {
                TopologyManagementRequest::Scale { members: member_ids(members), dry_run }
            }
            Command::Cancel { change_id } => TopologyManagementRequest::CancelChange { change_id },
            Command::ForceOverwrite { members_to_remove } => {
                TopologyManagementRequest::ForceOverwriteTopology {
                    members_to_remove: member_ids(members_to_remove),
                }
            }
        };
        Some(request)
    }
}

async fn bootstrap(store: &FjallTopologyStore, cluster: &ClusterConfig) -> anyhow::Result<()> {
    let members = member_ids(cluster.initial_members.clone());
    let partition_count = cluster.partition_count;
    let replication_factor = cluster.replication_factor;
    let topology = store
        .update_topology(move |current| {
            if current.is_uninitialized() {
                ClusterTopology::bootstrap(members, partition_count, replication_factor)
            } else {
                Ok(current.clone())
            }
        })
        .await
        .context("failed to bootstrap topology")?;
    tracing::info!(
        version = topology.version(),
        members = topology.members().len(),
        pending = topology.has_pending_changes(),
        "topology ready"
    );
    Ok(())
}

async fn run_node(config: Config) -> anyhow::Result<()> {
    let local_member = MemberId::from(config.cluster.member_id.clone());
    let admin_addr: SocketAddr = config
        .admin
        .listen_addr
        .parse()
        .with_context(|| format!("invalid admin listen_addr: {}", config.admin.listen_addr))?;
    tracing::info!(
        member_id = %local_member,
        data_dir = %config.storage.data_dir,
        %admin_addr,
        "node starting"
    );

    let store = Arc::new(
        FjallTopologyStore::open(Path::new(&config.storage.data_dir))
            .with_context(|| format!("failed to open topology store at {}", config.storage.data_dir))?,
    );
    bootstrap(&store, &config.cluster).await?;

    let settings = ApplierSettings {
        replication_factor: config.cluster.replication_factor,
        coordinator: Some(local_member.clone()),
    };
    let coordinator = Arc::new(TopologyChangeCoordinator::new(store.clone(), settings.clone()));
    let handler = Arc::new(TopologyManagementRequestsHandler::new(coordinator));
    let appliers = TopologyChangeAppliers::new(
        Arc::new(TracingPartitionExecutor { local_member }),
        Arc::new(TracingMembershipExecutor),
        settings,
    );
    let driver = TopologyChangeDriver::new(store, appliers);
    let listener = TcpListener::bind(admin_addr)
        .await
        .with_context(|| format!("failed to bind admin server to {admin_addr}"))?;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut driver_stop = shutdown_tx.subscribe();
    let mut admin_stop = shutdown_tx.subscribe();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
            return;
        }
        tracing::info!("shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let ((), served) = tokio::join!(
        driver.run(Duration::from_millis(config.driver.poll_interval_ms), async move {
            let _ = driver_stop.recv().await;
        }),
        serve_admin(listener, handler, async move {
            let _ = admin_stop.recv().await;
        }),
    );
    served
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;
    let cli = Cli::parse();

    let mut figment = Figment::new()
        .merge(Toml::string(include_str!("../../../config/default.toml")));

    if let Some(ref config_path) = cli.config {
        figment = figment.merge(Toml::file_exact(config_path));
    }

    let config: Config = figment
        .merge(Env::prefixed("YGGDRASIL_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    let log_format = config.observability.log_format.as_str();
    match log_format {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(&config.observability.log_level)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(&config.observability.log_level)
                .init();
        }
    }

    let Some(request) = cli.command.into_request() else {
        return run_node(config).await;
    };

    let addr = cli.admin_addr.unwrap_or(config.admin.listen_addr);
    let addr: SocketAddr =
        addr.parse().with_context(|| format!("invalid admin address: {addr}"))?;
    let mut client = AdminClient::connect(addr).await?;
    let response = client.request(&request).await?.context("request failed")?;
    print!("{response}");
    Ok(())
}
