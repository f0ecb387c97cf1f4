//! Property tests: every accepted submission yields exactly one outcome per
//! command, in submission order, and is `AllCompleted` only when all succeed.

use async_trait::async_trait;
use proptest::prelude::*;
use tcs_runtime::config::{AssemblyConfig, DeviceConfig, RuntimeConfig};
use tcs_runtime::{CommandProcessor, ComponentContext, Initializable, RoutingTable, TcsRuntime};
use tcs_types::{
    Command, CommandError, CommandSet, ConfigKey, InitializationError, OutcomeResult, Overall,
    Parameters, RejectionReason,
};

// ---------------------------------------------------------------------------
// Helpers / Strategies
// ---------------------------------------------------------------------------

/// Succeeds on `ok`, fails on `fail`
struct Binary;

#[async_trait]
impl Initializable for Binary {
    async fn initialize(&mut self, _ctx: &ComponentContext) -> Result<(), InitializationError> {
        Ok(())
    }
}

#[async_trait]
impl CommandProcessor for Binary {
    fn recognizes(&self, key: &ConfigKey) -> bool {
        matches!(key.as_str(), "ok" | "fail")
    }

    async fn execute(
        &mut self,
        _ctx: &ComponentContext,
        command: &Command,
    ) -> Result<Parameters, CommandError> {
        match command.config_key.as_str() {
            "ok" => Ok(command.parameters.clone()),
            _ => Err(CommandError::Execution("scripted failure".into())),
        }
    }
}

/// A command set over two devices; `true` marks a command that will succeed
fn arb_plan() -> impl Strategy<Value = Vec<(bool, bool)>> {
    prop::collection::vec((any::<bool>(), any::<bool>()), 1..12)
}

fn assembly_config() -> AssemblyConfig {
    AssemblyConfig::new("tcs")
        .route("ok", "mcs")
        .route("fail", "mcs")
        .route_as("encOk", "enc", Some(ConfigKey::new("ok")))
        .route_as("encFail", "enc", Some(ConfigKey::new("fail")))
}

fn command_for(succeeds: bool, on_enclosure: bool, index: usize) -> Command {
    let key = match (succeeds, on_enclosure) {
        (true, false) => "ok",
        (false, false) => "fail",
        (true, true) => "encOk",
        (false, true) => "encFail",
    };
    Command::new(key).with("n", index as i64)
}

async fn submit_plan(plan: &[(bool, bool)]) -> tcs_types::CompletionReport {
    let runtime = TcsRuntime::bootstrap(RuntimeConfig::default()).await.unwrap();
    runtime
        .spawn_device(&DeviceConfig::new("mcs"), Binary)
        .await
        .unwrap();
    runtime
        .spawn_device(&DeviceConfig::new("enc"), Binary)
        .await
        .unwrap();
    let assembly = runtime.spawn_assembly(assembly_config()).await.unwrap();
    runtime.run_all().await;

    let set = plan
        .iter()
        .enumerate()
        .fold(CommandSet::new("plan"), |set, (i, (ok, enc))| {
            set.push(command_for(*ok, *enc, i))
        });
    let status = assembly.submit_and_wait(set).await.unwrap();
    runtime.shutdown().await;

    status.report().cloned().unwrap()
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn report_matches_submission(plan in arb_plan()) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let report = rt.block_on(submit_plan(&plan));

        prop_assert_eq!(report.per_command.len(), plan.len());
        for (i, outcome) in report.per_command.iter().enumerate() {
            prop_assert_eq!(outcome.index, i);
            let expected_ok = plan[i].0;
            prop_assert_eq!(outcome.succeeded(), expected_ok);
            if let OutcomeResult::Completed(state) = &outcome.result {
                prop_assert_eq!(state.get("n").and_then(|v| v.as_f64()), Some(i as f64));
            }
        }

        let all_ok = plan.iter().all(|(ok, _)| *ok);
        prop_assert_eq!(report.overall == Overall::AllCompleted, all_ok);
        let failing: Vec<usize> = report.failures().map(|o| o.index).collect();
        let expected: Vec<usize> = plan
            .iter()
            .enumerate()
            .filter(|(_, (ok, _))| !ok)
            .map(|(i, _)| i)
            .collect();
        prop_assert_eq!(failing, expected);
    }

    #[test]
    fn unknown_key_rejects_whole_set(
        keys in prop::collection::vec(prop_oneof![Just("ok"), Just("fail"), Just("encOk")], 0..6),
        position in 0usize..6,
    ) {
        let table = RoutingTable::from_config(&assembly_config());
        let mut commands: Vec<Command> = keys.iter().map(|k| Command::new(*k)).collect();
        let at = position.min(commands.len());
        commands.insert(at, Command::new("unrouted"));
        let set = commands
            .into_iter()
            .fold(CommandSet::new("mixed"), |set, c| set.push(c));

        prop_assert!(matches!(
            table.route(&set),
            Err(RejectionReason::InvalidCommand(_))
        ));
    }
}
