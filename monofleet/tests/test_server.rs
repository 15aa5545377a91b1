mod common;

use std::{net::Ipv4Addr, sync::Arc};

use common::{
    eventually, fast_config, MockDriver, MockFactory, RecordingWorkloadClient, ScriptedProber,
    StartBehavior,
};
use monofleet::{
    fleet::{FleetOptions, FleetSupervisor, WorkloadResponse},
    machine::MachineId,
    probe::Signal,
    server::{self, HealthResponse, MachineStatus, RunResponse, ServerState, StandardError},
};
use reqwest::StatusCode;
use serde_json::json;
use tokio::net::TcpListener;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const M1_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_server_run_list_and_invoke() -> anyhow::Result<()> {
    let prober = Arc::new(ScriptedProber::default());
    let (fleet, base) = serve([Arc::new(MockDriver::new("m1", M1_IP))], prober.clone()).await?;
    let client = reqwest::Client::builder().no_proxy().build()?;

    let response = client.post(format!("{base}/vm/run")).send().await?;
    assert_eq!(response.status(), StatusCode::OK);
    let run: RunResponse = response.json().await?;
    assert_eq!(
        run,
        RunResponse {
            id: "m1".into(),
            ip: "10.0.0.2".into()
        }
    );

    let response = client
        .post(format!("{base}/service/invoke"))
        .json(&json!({ "httpMethod": "GET", "rawPath": "/" }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let error: StandardError = response.json().await?;
    assert_eq!(error.code, 503);
    assert!(error.message.starts_with("HTTP invocation error:"));

    prober.set(M1_IP, Signal::Ready);
    let ready = || {
        fleet
            .registry()
            .get(&MachineId::from("m1"))
            .is_some_and(|entry| *entry.get_ready())
    };
    assert!(eventually(ready).await);

    let machines: Vec<MachineStatus> = client.get(format!("{base}/vm")).send().await?.json().await?;
    assert_eq!(
        machines,
        vec![MachineStatus {
            id: "m1".into(),
            ip: "10.0.0.2".into(),
            ready: true
        }]
    );

    let response = client
        .post(format!("{base}/service/invoke"))
        .json(&json!({ "httpMethod": "GET", "rawPath": "/" }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let relayed: WorkloadResponse = response.json().await?;
    assert_eq!(relayed.status_code, 204);

    fleet.close().await;

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_server_run_failure_is_internal_error() -> anyhow::Result<()> {
    let driver = Arc::new(MockDriver::new("m1", M1_IP).with_start(StartBehavior::Fail));
    let (fleet, base) = serve([driver], Arc::new(ScriptedProber::default())).await?;
    let client = reqwest::Client::builder().no_proxy().build()?;

    let response = client.post(format!("{base}/vm/run")).send().await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error: StandardError = response.json().await?;
    assert_eq!(error.code, 500);
    assert!(fleet.registry().is_empty());

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_server_health_follows_supervisor() -> anyhow::Result<()> {
    let (fleet, base) = serve([], Arc::new(ScriptedProber::default())).await?;
    let client = reqwest::Client::builder().no_proxy().build()?;

    for path in ["/health/ready", "/health/alive"] {
        let response = client.get(format!("{base}{path}")).send().await?;
        assert_eq!(response.status(), StatusCode::OK);
        let health: HealthResponse = response.json().await?;
        assert_eq!(health.status, "ok");
    }

    fleet.close().await;

    for path in ["/health/ready", "/health/alive"] {
        let response = client.get(format!("{base}{path}")).send().await?;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Helpers
//--------------------------------------------------------------------------------------------------

async fn serve(
    drivers: impl IntoIterator<Item = Arc<MockDriver>>,
    prober: Arc<ScriptedProber>,
) -> anyhow::Result<(Arc<FleetSupervisor>, String)> {
    let client = Arc::new(RecordingWorkloadClient::new(WorkloadResponse {
        status_code: 204,
        is_base64_encoded: true,
        ..Default::default()
    }));

    let fleet = Arc::new(FleetSupervisor::start(
        FleetOptions::builder()
            .config(fast_config(5_000, 100))
            .driver_factory(Arc::new(MockFactory::new(drivers)))
            .prober(prober)
            .workload_client(client)
            .build(),
    )?);

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = server::create_router(ServerState::new(fleet.clone()));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Ok((fleet, format!("http://{addr}")))
}
