use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use hb_core::{BridgeError, Event, HookResult, VariableGraph};
use hb_runtime::{Bridge, HostTables, TableHost};

use crate::{
    load_options, load_session, resolve_scripts_dir, CheckArgs, CliError, ReplayArgs,
    SessionStep,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StepOutcome {
    pub(crate) kind: &'static str,
    pub(crate) outcome: String,
}

fn hook_outcome(result: HookResult, forwarded_damage: Option<i32>) -> String {
    match (result, forwarded_damage) {
        (HookResult::Absorbed, _) => "absorbed".to_string(),
        (HookResult::Forwarded, Some(damage)) => format!("forwarded:{}", damage),
        (HookResult::Forwarded, None) => "forwarded".to_string(),
    }
}

fn run_step(bridge: &Bridge, host: &TableHost, step: &SessionStep) -> String {
    match step {
        SessionStep::Damage(args) => {
            let forwarded = Cell::new(None);
            let result =
                bridge.player_damage(args.clone(), |args| forwarded.set(Some(args.damage)));
            hook_outcome(result, forwarded.get())
        }
        SessionStep::Killed(args) => {
            let forwarded = Cell::new(None);
            let result =
                bridge.player_killed(args.clone(), |args| forwarded.set(Some(args.damage)));
            hook_outcome(result, forwarded.get())
        }
        SessionStep::Command(command) => {
            hook_outcome(bridge.client_command(command, |_| {}), None)
        }
        SessionStep::Notify {
            name,
            client,
            arguments,
        } => {
            let entity = client.and_then(|num| host.entity(num));
            if client.is_some() && entity.is_none() {
                log::warn!("notify {} names an unknown client", name);
            }
            bridge.notify(&Event {
                name: name.clone(),
                entity,
                arguments: arguments.clone(),
            });
            "notified".to_string()
        }
        SessionStep::Frame { elapsed_ms } => {
            bridge.run_frame(Duration::from_millis(*elapsed_ms));
            format!("frame:{}", elapsed_ms)
        }
        SessionStep::Shutdown { free_scripts } => {
            bridge.shutdown_game(*free_scripts, |_| {});
            bridge.stop();
            "stopped".to_string()
        }
    }
}

/// Feeds every step to `bridge` in order.
pub(crate) fn replay_steps(
    bridge: &Bridge,
    host: &TableHost,
    steps: &[SessionStep],
) -> Vec<StepOutcome> {
    steps
        .iter()
        .map(|step| StepOutcome {
            kind: step.kind(),
            outcome: run_step(bridge, host, step),
        })
        .collect()
}

fn start_bridge(
    scripts_dir: &str,
    options_path: Option<&str>,
    tables: HostTables,
) -> Result<(Bridge, Rc<TableHost>), CliError> {
    let scripts_root = resolve_scripts_dir(scripts_dir)?;
    let options = load_options(options_path, &scripts_root)?;
    let graph = VariableGraph::new().shared();
    let host = Rc::new(TableHost::new(&graph, tables));
    let bridge = Bridge::new(host.clone(), graph, options)?;
    bridge.start()?;
    Ok((bridge, host))
}

fn failures_error(failures: &[BridgeError]) -> Option<CliError> {
    let first = failures.first()?;
    let message = failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    Some(CliError::new(first.code(), message))
}

pub(crate) fn run_check(args: CheckArgs) -> Result<i32, CliError> {
    let (bridge, _host) = start_bridge(
        &args.scripts_dir,
        args.options.as_deref(),
        HostTables::default(),
    )?;
    if let Some(error) = failures_error(&bridge.load_failures()) {
        return Err(error);
    }

    println!("RESULT:OK");
    println!("RUNTIMES:{}", bridge.runtime_count());
    for runtime in bridge.runtimes() {
        println!("RUNTIME:{}", runtime.name());
    }
    Ok(0)
}

pub(crate) fn run_replay(args: ReplayArgs) -> Result<i32, CliError> {
    let session = load_session(Path::new(&args.session))?;
    let (bridge, host) =
        start_bridge(&args.scripts_dir, args.options.as_deref(), session.tables)?;
    let load_failures = bridge.load_failures();
    let runtime_count = bridge.runtime_count();

    let outcomes = replay_steps(&bridge, &host, &session.steps);
    bridge.stop();

    println!("RESULT:OK");
    println!("RUNTIMES:{}", runtime_count);
    for error in load_failures {
        println!("LOAD_ERROR:{}", error.code());
    }
    for (index, outcome) in outcomes.iter().enumerate() {
        println!("STEP:{}|{}|{}", index, outcome.kind, outcome.outcome);
    }
    for (text, immediate) in host.commands() {
        println!(
            "COMMAND:{}|{}",
            immediate,
            serde_json::to_string(&text).unwrap_or_else(|_| "\"\"".to_string())
        );
    }
    Ok(0)
}
