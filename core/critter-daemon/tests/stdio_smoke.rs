use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::{self, sleep};
use std::time::{Duration, Instant};
use tempfile::TempDir;

struct DaemonGuard {
    child: Child,
}

impl Drop for DaemonGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn spawn_daemon(home: &Path, watch: &Path) -> Child {
    Command::new(env!("CARGO_BIN_EXE_critter-daemon"))
        .env("HOME", home)
        .env_remove("RUST_LOG")
        .arg("--no-fs")
        .arg("--watch")
        .arg(watch)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to spawn critter-daemon")
}

fn wait_for_exit(child: &mut Child, timeout: Duration) -> std::process::ExitStatus {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Some(status) = child.try_wait().expect("Failed to poll daemon") {
            return status;
        }
        sleep(Duration::from_millis(25));
    }
    panic!("Timed out waiting for critter-daemon to exit");
}

#[test]
fn daemon_saves_and_exits_when_stdin_closes() {
    let home = TempDir::new().expect("Failed to create temp HOME");
    let project = TempDir::new().expect("Failed to create project dir");
    let child = spawn_daemon(home.path(), project.path());
    let mut guard = DaemonGuard { child };

    let mut stdout = guard.child.stdout.take().expect("stdout");
    let reader = thread::spawn(move || {
        let mut output = String::new();
        let _ = stdout.read_to_string(&mut output);
        output
    });

    {
        let mut stdin = guard.child.stdin.take().expect("stdin");
        stdin
            .write_all(b"not json at all\n")
            .expect("Failed to write line");
        stdin
            .write_all(
                b"{\"type\":\"save-requested\",\"snapshot\":{\"watchedPath\":\"/next/project\"}}\n",
            )
            .expect("Failed to write save request");
    }

    let status = wait_for_exit(&mut guard.child, Duration::from_secs(20));
    assert!(status.success(), "daemon exited with {:?}", status);

    let output = reader.join().expect("reader thread");
    let events: Vec<serde_json::Value> = output
        .lines()
        .map(|line| serde_json::from_str(line).expect("stdout line is JSON"))
        .collect();
    let vitals = events
        .iter()
        .find(|event| event["type"] == "vitals")
        .expect("vitals event on stdout");
    // No commit history at all: catch-up decay is unbounded.
    assert_eq!(vitals["snapshot"]["stage"], "GHOST");

    let save_path = home.path().join(".critter").join("save.json");
    let saved: serde_json::Value =
        serde_json::from_slice(&fs_err::read(&save_path).expect("save.json written"))
            .expect("save.json is JSON");
    assert_eq!(saved["watchedPath"], "/next/project");
    assert_eq!(saved["health"], 0);
    assert_eq!(saved["mood"], "DEAD");
    assert_eq!(saved["version"], 1);
    assert!(saved["activityLog"].is_array());
}

#[test]
fn malformed_config_prevents_start() {
    let home = TempDir::new().expect("Failed to create temp HOME");
    let project = TempDir::new().expect("Failed to create project dir");
    let critter_dir = home.path().join(".critter");
    fs_err::create_dir_all(&critter_dir).expect("mkdir");
    fs_err::write(critter_dir.join("config.toml"), "poll_interval_secs = [").expect("write");

    let child = spawn_daemon(home.path(), project.path());
    let mut guard = DaemonGuard { child };
    drop(guard.child.stdin.take());

    let status = wait_for_exit(&mut guard.child, Duration::from_secs(20));
    assert_eq!(status.code(), Some(1));
}
