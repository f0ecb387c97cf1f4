//! End-to-end scenarios over the preset mount/enclosure/pointing slice

use serde_json::json;
use std::time::Duration;
use tcs_runtime::config::RuntimeConfig;
use tcs_runtime::TcsRuntime;
use tcs_subsystems::pointing::{KernelError, MountDemand, PointingInput};
use tcs_subsystems::{serve, JsonTranslator, TelescopeSlice};
use tcs_types::{
    Command, CommandError, CommandSet, CommandStatus, OutcomeResult, Overall, RejectionReason,
    TopicKey,
};

/// Adds the target to the current mount position; refuses `dec > 90`
fn offset_kernel(input: &PointingInput) -> Result<MountDemand, KernelError> {
    if input.target_dec > 90.0 {
        return Err(KernelError::Unreachable(format!("dec {}", input.target_dec)));
    }
    Ok(MountDemand {
        mount_az: input.mount_az + input.target_ra,
        mount_el: input.mount_el + input.target_dec,
        m3_rotation: 1.5,
        m3_tilt: 0.5,
    })
}

async fn start() -> anyhow::Result<(TcsRuntime, TelescopeSlice)> {
    let runtime = TcsRuntime::bootstrap(RuntimeConfig::default()).await?;
    let slice = TelescopeSlice::start(&runtime, offset_kernel).await?;
    Ok((runtime, slice))
}

async fn wait_for_mount_az(runtime: &TcsRuntime, az: f64) {
    let topic = TopicKey::new("mcs");
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if runtime.snapshots().state(&topic).and_then(|s| s.double("az")) == Some(az) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("mount snapshot never updated");
}

#[tokio::test]
async fn test_move_then_set_target_uses_mount_snapshot() -> anyhow::Result<()> {
    let (runtime, slice) = start().await?;

    let slew = CommandSet::single("slew", Command::new("move").with("az", 10.0).with("el", 5.0));
    let status = slice.mount.submit_and_wait(slew).await?;
    assert_eq!(status.report().unwrap().overall, Overall::AllCompleted);
    wait_for_mount_az(&runtime, 10.0).await;

    let target = CommandSet::single(
        "target",
        Command::new("setTarget").with("ra", 1.0).with("dec", 2.0),
    );
    let status = slice.pointing.submit_and_wait(target).await?;
    let report = status.report().unwrap();
    assert_eq!(report.overall, Overall::AllCompleted);

    match &report.per_command[0].result {
        OutcomeResult::Completed(state) => {
            assert_eq!(state.source_key, TopicKey::new("pk"));
            assert_eq!(state.double("mount_az"), Some(11.0));
            assert_eq!(state.double("mount_el"), Some(7.0));
            assert_eq!(state.double("m3_rotation"), Some(1.5));
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    runtime.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_kernel_failure_is_reported_per_command() -> anyhow::Result<()> {
    let (runtime, slice) = start().await?;

    let target = CommandSet::single(
        "target",
        Command::new("setTarget").with("ra", 1.0).with("dec", 95.0),
    );
    let status = slice.pointing.submit_and_wait(target).await?;
    let report = status.report().unwrap();

    assert_eq!(report.overall, Overall::Incomplete);
    assert!(matches!(
        &report.per_command[0].result,
        OutcomeResult::Failed(CommandError::Execution(reason)) if reason.contains("dec 95")
    ));

    runtime.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_missing_parameter_fails_the_command() -> anyhow::Result<()> {
    let (runtime, slice) = start().await?;

    let set = CommandSet::single("slew", Command::new("move").with("az", 10.0));
    let status = slice.mount.submit_and_wait(set).await?;
    let failure = status.report().unwrap().failures().next().cloned().unwrap();
    assert!(matches!(
        failure.result,
        OutcomeResult::Failed(CommandError::InvalidParameter { ref name, .. }) if name == "el"
    ));

    runtime.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_enclosure_rejects_mount_only_keys() -> anyhow::Result<()> {
    let (runtime, slice) = start().await?;

    let set = CommandSet::single("nudge", Command::new("offset"));
    let submission = slice.enclosure.submit(set).await?;
    assert!(matches!(
        submission.status,
        CommandStatus::Rejected(RejectionReason::InvalidCommand(_))
    ));

    runtime.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_json_request_round_trip() -> anyhow::Result<()> {
    let (runtime, slice) = start().await?;

    let response = serve(
        &JsonTranslator,
        &slice.enclosure,
        &json!({
            "label": "open",
            "commands": [
                { "configKey": "move", "parameters": { "base": 30.0, "cap": 12.5 } },
                { "configKey": "follow" }
            ]
        }),
    )
    .await?;

    assert_eq!(response["status"], "completed");
    assert_eq!(response["allCompleted"], true);
    assert_eq!(response["commands"][0]["detail"]["cap"], 12.5);
    assert_eq!(response["commands"][1]["configKey"], "follow");

    let rejected = serve(&JsonTranslator, &slice.enclosure, &json!({ "configKey": "park" })).await?;
    assert_eq!(rejected["status"], "rejected");

    runtime.shutdown().await;
    Ok(())
}
