//! Runs the bridge from a configuration file against simulated locks.

use std::sync::Arc;
use std::time::Duration;

use nubli_bridge::{Bridge, Config, SimulatedChange, Simulation, TracingHost};
use nubli_core::{DoorSensorState, LockAccessory, LockCurrentState, LockState, LockTargetState};
use tokio_util::sync::CancellationToken;

const CONFIG: &str = r#"
adapter_retry_secs = 1

[[locks]]
uuid = "54:D2:72:0D:EF:0A"
name = "Front Door"

[[locks]]
uuid = "54d2720def0b"
name = "Back Door"
"#;

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(30), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached");
}

#[tokio::test(start_paused = true)]
async fn test_simulated_bridge() {
    let temp = tempfile::tempdir().unwrap();
    let config_path = temp.path().join("bridge.toml");
    std::fs::write(&config_path, CONFIG).unwrap();

    let mut config = Config::load_validated(&config_path).unwrap();
    let credentials = temp.path().join("credentials");
    config.config_path = Some(credentials.clone());

    let simulation = Arc::new(Simulation::new(&config, &credentials));
    let host = Arc::new(TracingHost::new());
    let bridge = Arc::new(
        Bridge::new(
            &config,
            Arc::clone(simulation.transport()),
            host.clone(),
            CancellationToken::new(),
        )
        .unwrap(),
    );
    assert_eq!(host.accessories().len(), 2);

    simulation.announce_all();
    let task = tokio::spawn({
        let bridge = Arc::clone(&bridge);
        async move { bridge.run().await }
    });

    let engines = bridge.registry().engines().to_vec();
    wait_until(|| engines.iter().all(|e| e.is_attached())).await;
    assert_eq!(engines[0].lock_current_state(), LockCurrentState::Secured);

    simulation.apply(
        0,
        SimulatedChange::Activity {
            lock_state: LockState::Unlocked,
            door_sensor: DoorSensorState::DoorOpened,
            battery_critical: true,
        },
    );
    wait_until(|| engines[0].lock_current_state() == LockCurrentState::Unsecured).await;
    assert_eq!(engines[0].latch_current_state(), LockCurrentState::Unsecured);
    assert!(engines[0].status_low_battery());
    // The other accessory is untouched.
    assert_eq!(engines[1].lock_current_state(), LockCurrentState::Secured);

    simulation.apply(1, SimulatedChange::GoStale);
    wait_until(|| !engines[1].is_attached()).await;
    assert_eq!(engines[1].lock_current_state(), LockCurrentState::Unknown);
    assert_eq!(engines[1].lock_target_state(), LockTargetState::Secured);

    simulation.apply(1, SimulatedChange::Recover);
    wait_until(|| engines[1].is_attached()).await;
    assert_eq!(engines[1].lock_current_state(), LockCurrentState::Secured);

    bridge.shutdown_token().cancel();
    task.await.unwrap();
}
