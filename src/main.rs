use clap::{ArgGroup, Args, Parser, Subcommand};
use igd_portmap::{
    find_target, interface_ipv4, parse_port, MappingEntry, MappingMatcher, MappingWrapper,
    Protocol, Result, ServiceTag, WrapperOptions, DEFAULT_DESCRIPTION,
};
use std::process::ExitCode;
use std::time::Duration;
use tracing::instrument::WithSubscriber;
use tracing::Dispatch;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "igd-portmap", version, about = "UPnP port mapping control")]
struct Cli {
    /// Seconds to listen for SSDP answers
    #[arg(long, env = "IGD_SEARCH_TIMEOUT", default_value_t = 3, global = true)]
    search_timeout: u64,

    /// Seconds allowed for each action on each gateway
    #[arg(long, env = "IGD_ACTION_TIMEOUT", default_value_t = 5, global = true)]
    action_timeout: u64,

    /// Gateway description URL; skips SSDP discovery
    #[arg(long, env = "IGD_GATEWAY", global = true)]
    gateway: Option<String>,

    /// Service type URN to use instead of probing
    #[arg(long, global = true)]
    service: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List all port mappings (default)
    #[command(alias = "l")]
    List,
    /// Add a port mapping
    #[command(alias = "a")]
    Add(AddArgs),
    /// Delete port mappings by external or internal port
    #[command(alias = "d")]
    Delete(DeleteArgs),
    /// Look up port mappings by external port
    #[command(alias = "g")]
    Get(GetArgs),
    /// Report which gateway service type is available
    Probe,
}

#[derive(Args, Debug)]
struct AddArgs {
    /// TCP or UDP
    #[arg(long, default_value = "TCP", value_parser = protocol_arg)]
    proto: Protocol,
    /// Network interface whose IPv4 address receives the traffic
    #[arg(long, default_value = "eth0")]
    interface: String,
    /// External port
    #[arg(long, value_parser = port_arg)]
    eport: u16,
    /// Internal port
    #[arg(long, value_parser = port_arg)]
    iport: u16,
    #[arg(long, default_value = DEFAULT_DESCRIPTION)]
    description: String,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("ports").required(true).multiple(true).args(["eport", "iport"])))]
struct DeleteArgs {
    /// TCP or UDP
    #[arg(long, default_value = "TCP", value_parser = protocol_arg)]
    proto: Protocol,
    /// External port to delete; repeatable
    #[arg(long, value_parser = port_arg)]
    eport: Vec<u16>,
    /// Internal port whose mappings are deleted; repeatable
    #[arg(long, value_parser = port_arg)]
    iport: Vec<u16>,
}

#[derive(Args, Debug)]
struct GetArgs {
    /// TCP or UDP
    #[arg(long, default_value = "TCP", value_parser = protocol_arg)]
    proto: Protocol,
    /// External port to look up; repeatable
    #[arg(long, required = true, value_parser = port_arg)]
    eport: Vec<u16>,
}

fn protocol_arg(s: &str) -> std::result::Result<Protocol, String> {
    s.parse().map_err(|e| format!("{e}"))
}

fn port_arg(s: &str) -> std::result::Result<u16, String> {
    let port: u64 = s.parse().map_err(|e| format!("{e}"))?;
    parse_port(port).map_err(|e| e.to_string())
}

impl Cli {
    fn options(&self) -> WrapperOptions {
        WrapperOptions {
            search_timeout: Duration::from_secs(self.search_timeout),
            action_timeout: Duration::from_secs(self.action_timeout),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let dispatch = log_dispatch(cli.log_json);

    match run(&cli).with_subscriber(dispatch.clone()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::dispatcher::with_default(&dispatch, || {
                tracing::error!(error = %e, "igd-portmap failed");
            });
            ExitCode::FAILURE
        }
    }
}

/// Logging handle for this invocation, filtered by `RUST_LOG` (default `info`).
fn log_dispatch(json: bool) -> Dispatch {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        Dispatch::new(builder.json().finish())
    } else {
        Dispatch::new(builder.finish())
    }
}

async fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        None | Some(Command::List) => list(cli).await,
        Some(Command::Add(args)) => add(cli, args).await,
        Some(Command::Delete(args)) => delete(cli, args).await,
        Some(Command::Get(args)) => get(cli, args).await,
        Some(Command::Probe) => probe(cli).await,
    }
}

async fn open_wrapper(cli: &Cli) -> Result<MappingWrapper> {
    let options = cli.options();
    let service = cli.service.as_deref().map(str::parse::<ServiceTag>).transpose()?;
    let builder = MappingWrapper::builder().options(options);

    match (cli.gateway.as_deref(), service) {
        (Some(url), Some(tag)) => builder.connect(url, tag).await,
        (Some(url), None) => builder.connect_any(url).await,
        (None, Some(tag)) => builder.discover(tag).await,
        (None, None) => {
            let tag = find_target(options.search_timeout)
                .await
                .ok_or(igd_portmap::Error::NotFound)?;
            builder.discover(tag).await
        }
    }
}

fn log_mapping(entry: &MappingEntry) {
    tracing::info!(
        endpoint = %entry.endpoint,
        protocol = %entry.protocol,
        external_port = entry.external_port,
        internal_port = entry.internal_port,
        internal_client = %entry.internal_client,
        enabled = entry.enabled,
        description = %entry.description,
        lease_duration = entry.lease_duration,
        "mapping"
    );
}

async fn list(cli: &Cli) -> Result<()> {
    let wrapper = open_wrapper(cli).await?;
    let mappings = wrapper.list_all_mappings().await;
    for mapping in &mappings {
        log_mapping(mapping);
    }
    tracing::info!(
        service = %wrapper.tag(),
        clients = wrapper.client_count(),
        mappings = mappings.len(),
        "listed port mappings"
    );
    Ok(())
}

async fn add(cli: &Cli, args: &AddArgs) -> Result<()> {
    let internal_client = interface_ipv4(&args.interface)?;
    let wrapper = open_wrapper(cli).await?;

    let errors = wrapper
        .add_mapping(
            args.proto,
            args.eport,
            args.iport,
            internal_client,
            &args.description,
        )
        .await;
    if let Some(first) = errors.into_iter().next() {
        return Err(first);
    }
    tracing::info!(
        protocol = %args.proto,
        external_port = args.eport,
        internal_port = args.iport,
        internal_client = %internal_client,
        "port mapping added"
    );
    Ok(())
}

async fn delete(cli: &Cli, args: &DeleteArgs) -> Result<()> {
    let wrapper = open_wrapper(cli).await?;
    let matcher = MappingMatcher::new(args.proto)
        .with_external_ports(args.eport.iter().copied())
        .with_internal_ports(args.iport.iter().copied());

    let outcomes = wrapper.delete_matching(&matcher).await;
    if outcomes.is_empty() {
        tracing::info!(protocol = %args.proto, "no matching port mappings");
    }
    for outcome in &outcomes {
        let entry = &outcome.entry;
        match outcome.errors.first() {
            Some(e) => tracing::error!(
                protocol = %entry.protocol,
                external_port = entry.external_port,
                internal_port = entry.internal_port,
                internal_client = %entry.internal_client,
                error = %e,
                "port mapping delete failed"
            ),
            None => tracing::info!(
                protocol = %entry.protocol,
                external_port = entry.external_port,
                internal_port = entry.internal_port,
                internal_client = %entry.internal_client,
                "port mapping deleted"
            ),
        }
    }
    Ok(())
}

async fn get(cli: &Cli, args: &GetArgs) -> Result<()> {
    let wrapper = open_wrapper(cli).await?;
    let mappings = wrapper.get_specific_mappings(args.proto, &args.eport).await;
    for mapping in &mappings {
        log_mapping(mapping);
    }
    tracing::info!(requested = args.eport.len(), found = mappings.len(), "looked up port mappings");
    Ok(())
}

async fn probe(cli: &Cli) -> Result<()> {
    let tag = find_target(cli.options().search_timeout)
        .await
        .ok_or(igd_portmap::Error::NotFound)?;
    tracing::info!(service = %tag, "gateway service available");
    Ok(())
}
