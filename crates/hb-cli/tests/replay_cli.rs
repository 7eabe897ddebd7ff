use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("parent should be created");
    }
    fs::write(path, content).expect("file should be written");
}

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_hb-cli"))
        .args(args)
        .output()
        .expect("cli should execute")
}

fn stdout_lines(output: &Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect()
}

const GAMEMODE: &str = r#"
on_player_damage(|player, inflictor, attacker, damage, flags, means, weapon, point, dir, hit_loc| {
    if means == "MOD_FALLING" { 0 } else { damage }
});
on_event("say", |player, message| {
    if message == "help" {
        execute_command("tell " + player.id + " commands: help", true);
    }
});
on_timeout(|| execute_command("warmup over"), 100);
"#;

#[test]
fn check_lists_loaded_runtimes() {
    let root = tempfile::tempdir().expect("temp dir");
    write_file(&root.path().join("gamemode/__init__.rhai"), GAMEMODE);
    write_file(&root.path().join("admin/__init__.rhai"), "let ready = true;");

    let scripts_dir = root.path().to_string_lossy().to_string();
    let output = run(&["check", "--scripts-dir", &scripts_dir]);
    assert!(output.status.success(), "stdout: {:?}", stdout_lines(&output));
    assert_eq!(
        stdout_lines(&output),
        vec!["RESULT:OK", "RUNTIMES:2", "RUNTIME:admin", "RUNTIME:gamemode"]
    );
}

#[test]
fn check_fails_on_broken_entry_script() {
    let root = tempfile::tempdir().expect("temp dir");
    write_file(&root.path().join("broken/__init__.rhai"), "let = ;");

    let scripts_dir = root.path().to_string_lossy().to_string();
    let output = run(&["check", "--scripts-dir", &scripts_dir]);
    assert_eq!(output.status.code(), Some(1));
    let lines = stdout_lines(&output);
    assert_eq!(lines[0], "RESULT:ERROR");
    assert_eq!(lines[1], "ERROR_CODE:BRIDGE_SCRIPT_LOAD");
    assert!(lines[2].starts_with("ERROR_MSG_JSON:"));
}

#[test]
fn replay_prints_step_outcomes_and_commands() {
    let root = tempfile::tempdir().expect("temp dir");
    let scripts = root.path().join("scripts");
    write_file(&scripts.join("gamemode/__init__.rhai"), GAMEMODE);
    let session = root.path().join("session.json");
    write_file(
        &session,
        r#"{
          "schemaVersion": "hb-session.v1",
          "tables": {
            "meansOfDeath": ["MOD_UNKNOWN", "MOD_FALLING", "MOD_PISTOL_BULLET"],
            "hitLocations": ["none", "head"],
            "weapons": { "3": "iw5_deagle_mp" },
            "clients": 2
          },
          "steps": [
            { "kind": "damage", "target": 0, "inflictor": null, "attacker": null,
              "damage": 12, "means_of_death": 1, "weapon": 0, "hit_loc": 0 },
            { "kind": "damage", "target": 0, "inflictor": 1, "attacker": 1,
              "damage": 40, "means_of_death": 2, "weapon": 3, "hit_loc": 1 },
            { "kind": "command", "client_num": 1, "name": "say", "args": "/help" },
            { "kind": "command", "client_num": 1, "name": "kill" },
            { "kind": "frame", "elapsed_ms": 50 },
            { "kind": "frame", "elapsed_ms": 50 }
          ]
        }"#,
    );

    let scripts_dir = scripts.to_string_lossy().to_string();
    let session_path = session.to_string_lossy().to_string();
    let output = run(&["replay", "--scripts-dir", &scripts_dir, "--session", &session_path]);
    assert!(output.status.success(), "stdout: {:?}", stdout_lines(&output));

    // level is object 1, clients follow
    let player = 3;
    assert_eq!(
        stdout_lines(&output),
        vec![
            "RESULT:OK".to_string(),
            "RUNTIMES:1".to_string(),
            "STEP:0|damage|absorbed".to_string(),
            "STEP:1|damage|forwarded:40".to_string(),
            "STEP:2|command|absorbed".to_string(),
            "STEP:3|command|forwarded".to_string(),
            "STEP:4|frame|frame:50".to_string(),
            "STEP:5|frame|frame:50".to_string(),
            format!("COMMAND:true|\"tell {} commands: help\"", player),
            "COMMAND:false|\"warmup over\"".to_string(),
        ]
    );
}

#[test]
fn replay_rejects_unknown_session_schema() {
    let root = tempfile::tempdir().expect("temp dir");
    let session = root.path().join("session.json");
    write_file(&session, r#"{ "schemaVersion": "other" }"#);

    let scripts_dir = root.path().to_string_lossy().to_string();
    let session_path = session.to_string_lossy().to_string();
    let output = run(&["replay", "--scripts-dir", &scripts_dir, "--session", &session_path]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout_lines(&output)[1], "ERROR_CODE:CLI_SESSION_SCHEMA");
}

#[test]
fn options_file_changes_the_hidden_marker() {
    let root = tempfile::tempdir().expect("temp dir");
    let scripts = root.path().join("scripts");
    write_file(
        &scripts.join("chat/__init__.rhai"),
        r#"on_event("say", |player, message| execute_command("heard " + message));"#,
    );
    let options = root.path().join("options.json");
    write_file(&options, r#"{ "hiddenMarker": "!" }"#);
    let session = root.path().join("session.json");
    write_file(
        &session,
        r#"{
          "schemaVersion": "hb-session.v1",
          "tables": { "clients": 1 },
          "steps": [
            { "kind": "command", "client_num": 0, "name": "say", "args": "/visible" },
            { "kind": "command", "client_num": 0, "name": "say", "args": "!secret" },
            { "kind": "frame", "elapsed_ms": 0 }
          ]
        }"#,
    );

    let scripts_dir = scripts.to_string_lossy().to_string();
    let session_path = session.to_string_lossy().to_string();
    let options_path = options.to_string_lossy().to_string();
    let output = run(&[
        "replay",
        "--scripts-dir",
        &scripts_dir,
        "--session",
        &session_path,
        "--options",
        &options_path,
    ]);
    assert!(output.status.success(), "stdout: {:?}", stdout_lines(&output));
    let lines = stdout_lines(&output);
    assert!(lines.contains(&"STEP:0|command|forwarded".to_string()));
    assert!(lines.contains(&"STEP:1|command|absorbed".to_string()));
    assert!(lines.contains(&"COMMAND:false|\"heard /visible\"".to_string()));
    assert!(lines.contains(&"COMMAND:false|\"heard secret\"".to_string()));
}
