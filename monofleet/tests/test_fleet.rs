mod common;

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use common::{
    eventually, fast_config, MockDriver, MockFactory, RecordingWorkloadClient, ScriptedProber,
    ShutdownBehavior, StartBehavior,
};
use monofleet::{
    fleet::{FleetOptions, FleetSupervisor, RoundRobinSelector, WorkloadRequest, WorkloadResponse},
    machine::MachineId,
    probe::Signal,
    MonofleetError,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const M1_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

const M2_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 3);

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_fleet_start_probe_invoke_close() -> anyhow::Result<()> {
    let driver = Arc::new(MockDriver::new("m1", M1_IP));
    let fixture = Fixture::new([driver.clone()], 5_000);
    let fleet = &fixture.fleet;

    let metadata = fleet.start_machine().await?;
    assert_eq!(metadata.get_id().as_str(), "m1");
    assert_eq!(*metadata.get_address(), IpAddr::V4(M1_IP));

    let id = MachineId::from("m1");
    let entry = fleet.registry().get(&id).ok_or_else(|| anyhow::anyhow!("m1 missing"))?;
    assert!(!*entry.get_ready());

    assert!(matches!(
        fleet.invoke(WorkloadRequest::default()).await,
        Err(MonofleetError::NoReadyBackend)
    ));

    fixture.prober.set(M1_IP, Signal::Ready);
    assert!(eventually(|| is_ready(fleet, "m1")).await);

    let request = WorkloadRequest {
        http_method: "POST".into(),
        raw_path: "/jobs".into(),
        body: "work".into(),
        ..Default::default()
    };
    let response = fleet.invoke(request.clone()).await?;
    assert_eq!(response, canned_response());

    let requests = fixture.client.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, SocketAddr::new(IpAddr::V4(M1_IP), 8080));
    assert_eq!(requests[0].1, request);

    fleet.close().await;

    assert!(fleet.registry().is_empty());
    assert!(!fleet.health().is_accepting());
    assert_eq!(
        driver.calls(),
        vec!["start", "shutdown", "release_network"]
    );

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_fleet_start_failure_registers_nothing() -> anyhow::Result<()> {
    let driver = Arc::new(MockDriver::new("m1", M1_IP).with_start(StartBehavior::Fail));
    let fixture = Fixture::new([driver.clone()], 5_000);

    let result = fixture.fleet.start_machine().await;
    assert!(matches!(result, Err(MonofleetError::MachineStart(_))));
    assert!(fixture.fleet.registry().is_empty());
    assert_eq!(driver.calls(), vec!["start"]);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_fleet_driver_factory_failure_is_returned() -> anyhow::Result<()> {
    let fixture = Fixture::new([], 5_000);

    assert!(matches!(
        fixture.fleet.start_machine().await,
        Err(MonofleetError::MachineStart(_))
    ));
    assert!(fixture.fleet.registry().is_empty());

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_fleet_removes_machine_that_exits_on_its_own() -> anyhow::Result<()> {
    let driver = Arc::new(MockDriver::new("m1", M1_IP));
    let fixture = Fixture::new([driver.clone()], 5_000);
    let fleet = &fixture.fleet;

    fleet.start_machine().await?;
    fixture.prober.set(M1_IP, Signal::Ready);
    assert!(eventually(|| is_ready(fleet, "m1")).await);

    driver.exit(false);

    assert!(eventually(|| fleet.registry().is_empty()).await);
    assert!(eventually(|| driver.count("release_network") == 1).await);
    assert_eq!(driver.count("shutdown"), 0);
    assert!(matches!(
        fleet.invoke(WorkloadRequest::default()).await,
        Err(MonofleetError::NoReadyBackend)
    ));

    fleet.close().await;

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_fleet_start_timeout_shuts_late_machine_down() -> anyhow::Result<()> {
    let driver = Arc::new(
        MockDriver::new("m1", M1_IP).with_start(StartBehavior::Delay(Duration::from_millis(200))),
    );
    let fixture = Fixture::new([driver.clone()], 50);

    let result = fixture.fleet.start_machine().await;
    assert!(matches!(result, Err(MonofleetError::StartTimeout(_))));

    assert!(eventually(|| driver.count("release_network") == 1).await);
    assert_eq!(driver.count("shutdown"), 1);
    assert!(fixture.fleet.registry().is_empty());

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_fleet_close_kills_machine_that_ignores_shutdown() -> anyhow::Result<()> {
    let driver = Arc::new(MockDriver::new("m1", M1_IP).with_shutdown(ShutdownBehavior::Hang));
    let fixture = Fixture::new([driver.clone()], 5_000);

    fixture.fleet.start_machine().await?;
    fixture.fleet.close().await;

    assert!(fixture.fleet.registry().is_empty());
    assert_eq!(driver.count("shutdown"), 1);
    assert_eq!(driver.count("kill"), 1);
    assert_eq!(driver.count("release_network"), 1);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_fleet_routes_only_to_ready_machines() -> anyhow::Result<()> {
    let m1 = Arc::new(MockDriver::new("m1", M1_IP));
    let m2 = Arc::new(MockDriver::new("m2", M2_IP));
    let fixture = Fixture::new([m1, m2], 5_000);
    let fleet = &fixture.fleet;

    fleet.start_machine().await?;
    fleet.start_machine().await?;
    assert_eq!(fleet.registry().len(), 2);

    fixture.prober.set(M2_IP, Signal::Ready);
    assert!(eventually(|| is_ready(fleet, "m2")).await);

    for _ in 0..5 {
        fleet.invoke(WorkloadRequest::default()).await?;
    }

    let m2_address = SocketAddr::new(IpAddr::V4(M2_IP), 8080);
    let requests = fixture.client.requests();
    assert_eq!(requests.len(), 5);
    assert!(requests.iter().all(|(address, _)| *address == m2_address));

    fleet.close().await;

    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn test_fleet_machines_healthy_from_first_check_become_ready() -> anyhow::Result<()> {
    const MACHINES: u8 = 16;

    let drivers: Vec<_> = (0..MACHINES)
        .map(|i| Arc::new(MockDriver::new(&format!("m{i}"), Ipv4Addr::new(10, 0, 0, 2 + i))))
        .collect();
    let fixture = Arc::new(Fixture::new(drivers, 5_000));
    for i in 0..MACHINES {
        fixture.prober.set(Ipv4Addr::new(10, 0, 0, 2 + i), Signal::Ready);
    }

    let mut starts = Vec::new();
    for _ in 0..MACHINES {
        let fixture = fixture.clone();
        starts.push(tokio::spawn(async move {
            fixture.fleet.start_machine().await
        }));
    }
    for start in starts {
        start.await??;
    }

    let fleet = &fixture.fleet;
    assert_eq!(fleet.registry().len(), MACHINES as usize);
    assert!(eventually(|| fleet.registry().ready_entries().len() == MACHINES as usize).await);

    fleet.close().await;
    assert!(fleet.registry().is_empty());

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Helpers
//--------------------------------------------------------------------------------------------------

struct Fixture {
    fleet: FleetSupervisor,
    prober: Arc<ScriptedProber>,
    client: Arc<RecordingWorkloadClient>,
}

impl Fixture {
    fn new(drivers: impl IntoIterator<Item = Arc<MockDriver>>, start_timeout_ms: u64) -> Self {
        let prober = Arc::new(ScriptedProber::default());
        let client = Arc::new(RecordingWorkloadClient::new(canned_response()));

        let fleet = FleetSupervisor::start(
            FleetOptions::builder()
                .config(fast_config(start_timeout_ms, 100))
                .driver_factory(Arc::new(MockFactory::new(drivers)))
                .prober(prober.clone())
                .workload_client(client.clone())
                .selector(Arc::new(RoundRobinSelector::default()))
                .build(),
        )
        .expect("fleet supervisor should start");

        Self {
            fleet,
            prober,
            client,
        }
    }
}

fn canned_response() -> WorkloadResponse {
    WorkloadResponse {
        status_code: 202,
        body: "YWNjZXB0ZWQ=".into(),
        is_base64_encoded: true,
        ..Default::default()
    }
}

fn is_ready(fleet: &FleetSupervisor, id: &str) -> bool {
    fleet
        .registry()
        .get(&MachineId::from(id))
        .is_some_and(|entry| *entry.get_ready())
}
