use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use clap::{CommandFactory, Parser};
use monofleet::{
    cli::{AnsiStyles, MonofleetArgs, MonofleetSubcommand},
    config::FleetConfig,
    fleet::{FleetOptions, FleetSupervisor},
    log,
    machine::ProcessDriverFactory,
    server::{self, ServerState},
    MonofleetResult,
};
use tokio::{
    net::TcpListener,
    signal::unix::{signal, SignalKind},
};

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> MonofleetResult<()> {
    let _ = dotenvy::dotenv();

    let args = MonofleetArgs::parse();
    log::init(&args.log_level, args.log_format)?;

    let result = match args.subcommand {
        Some(MonofleetSubcommand::Server {
            host,
            port,
            config,
            shutdown_timeout_ms,
            exec_path,
            args,
        }) => {
            match load_config(config, shutdown_timeout_ms, exec_path, args).await {
                Ok(config) => run_server(SocketAddr::new(host, port), config).await,
                Err(e) => Err(e),
            }
        }
        Some(MonofleetSubcommand::Echo { host, port }) => {
            server::serve_echo(SocketAddr::new(host, port), shutdown_signal()).await
        }
        None => {
            MonofleetArgs::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{} {e}", "error:".error());
        std::process::exit(1);
    }

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Functions: *
//--------------------------------------------------------------------------------------------------

async fn load_config(
    path: Option<PathBuf>,
    shutdown_timeout_ms: Option<u64>,
    exec_path: Option<PathBuf>,
    args: Vec<String>,
) -> MonofleetResult<FleetConfig> {
    let mut config = match path {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading fleet configuration");
            FleetConfig::load(path).await?
        }
        None => FleetConfig::default(),
    };

    let machine = config.machine_mut();
    if let Some(ms) = shutdown_timeout_ms {
        machine.set_shutdown_timeout(Duration::from_millis(ms));
    }

    if let Some(exec_path) = exec_path {
        machine.set_exec_path(exec_path);
    }

    if !args.is_empty() {
        machine.set_args(args);
    }

    config.validate()?;
    Ok(config)
}

async fn run_server(addr: SocketAddr, config: FleetConfig) -> MonofleetResult<()> {
    let factory = ProcessDriverFactory::new(config.get_machine().clone());
    let fleet = Arc::new(FleetSupervisor::start(
        FleetOptions::builder()
            .config(config)
            .driver_factory(Arc::new(factory))
            .build(),
    )?);

    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(address = %local_addr, "fleet api listening");
    eprintln!(
        "{} listening on {}",
        "monofleet".header(),
        local_addr.to_string().literal()
    );

    let app = server::create_router(ServerState::new(fleet.clone()));
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    fleet.close().await;
    Ok(served?)
}

async fn shutdown_signal() {
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut term_signal) => {
                term_signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("received ctrl-c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
