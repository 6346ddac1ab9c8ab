// tests/condor_client.rs

use std::error::Error;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use condor_launcher::errors::LauncherError;
use condor_launcher::scheduler::condor::{extract_cluster_id, find_binary, invocation_constraint};
use condor_launcher::scheduler::{CondorBinaries, CondorClient, KillOutcome, SchedulerClient};
use condor_launcher_test_utils::builders::ConfigFileBuilder;
use condor_launcher_test_utils::{init_tracing, with_timeout};
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn Error>>;

const PATH_ENV: &str = "/usr/bin:/bin";
const CONDOR_CONFIG: &str = "/etc/condor/test_config";

fn write_stub(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A client whose three tools are the given shell snippets. Each stub records
/// its arguments, one per line, in `<name>.args`.
fn client(dir: &Path, submit: &str, remove: &str, queue: &str) -> CondorClient {
    let record = |name: &str| {
        format!(
            "for a in \"$@\"; do printf '%s\\n' \"$a\"; done > '{}'",
            dir.join(format!("{name}.args")).display()
        )
    };
    let binaries = CondorBinaries {
        submit: write_stub(dir, "condor_submit", &format!("{}\n{submit}", record("submit"))),
        remove: write_stub(dir, "condor_rm", &format!("{}\n{remove}", record("rm"))),
        queue: write_stub(dir, "condor_q", &format!("{}\n{queue}", record("q"))),
    };
    CondorClient::with_binaries(binaries, PATH_ENV.to_string(), CONDOR_CONFIG.to_string())
}

fn recorded_args(dir: &Path, name: &str) -> Vec<String> {
    fs::read_to_string(dir.join(format!("{name}.args")))
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn cluster_id_is_taken_from_submit_output() {
    assert_eq!(
        extract_cluster_id("Submitting job(s).\n1 job(s) submitted to cluster 42.\n"),
        Some("42".to_string())
    );
    assert_eq!(
        extract_cluster_id("...submitted to cluster (42)."),
        Some("42".to_string())
    );
    assert_eq!(extract_cluster_id("Submitting job(s).\n"), None);
}

#[test]
fn kill_constraint_quotes_the_invocation_id() {
    assert_eq!(invocation_constraint("X"), r#"IpcUuid =?= "X""#);
    assert_eq!(invocation_constraint(r#"a"b\c"#), r#"IpcUuid =?= "a\"b\\c""#);
}

#[tokio::test]
async fn submit_runs_in_the_workspace_and_returns_cluster_id() -> TestResult {
    init_tracing();
    let tools = TempDir::new()?;
    let workspace = TempDir::new()?;
    let pwd_file = tools.path().join("pwd");
    let client = client(
        tools.path(),
        &format!(
            "pwd > '{}'\necho 'Submitting job(s).'\necho '1 job(s) submitted to cluster 42.'",
            pwd_file.display()
        ),
        "exit 0",
        "exit 0",
    );
    let submit_file = workspace.path().join("iplant.cmd");
    fs::write(&submit_file, "queue\n")?;

    let id = with_timeout(client.submit(&submit_file)).await?;

    assert_eq!(id, "42");
    assert_eq!(recorded_args(tools.path(), "submit"), vec![submit_file.display().to_string()]);
    let pwd = fs::read_to_string(&pwd_file)?;
    assert_eq!(
        fs::canonicalize(pwd.trim())?,
        fs::canonicalize(workspace.path())?
    );
    Ok(())
}

#[tokio::test]
async fn submit_sees_only_path_and_condor_config() -> TestResult {
    init_tracing();
    let tools = TempDir::new()?;
    let env_file = tools.path().join("env");
    let client = client(
        tools.path(),
        &format!(
            "printf '%s|%s|%s\\n' \"$PATH\" \"$CONDOR_CONFIG\" \"${{HOME:-unset}}\" > '{}'\n\
             echo '1 job(s) submitted to cluster 7.'",
            env_file.display()
        ),
        "exit 0",
        "exit 0",
    );
    let submit_file = tools.path().join("iplant.cmd");
    fs::write(&submit_file, "queue\n")?;

    client.submit(&submit_file).await?;

    let env = fs::read_to_string(&env_file)?;
    assert_eq!(env.trim(), format!("{PATH_ENV}|{CONDOR_CONFIG}|unset"));
    Ok(())
}

#[tokio::test]
async fn submit_without_cluster_id_is_an_error() -> TestResult {
    let tools = TempDir::new()?;
    let client = client(tools.path(), "echo 'Submitting job(s).'", "exit 0", "exit 0");
    let submit_file = tools.path().join("iplant.cmd");
    fs::write(&submit_file, "queue\n")?;

    let err = client.submit(&submit_file).await.unwrap_err();

    assert!(matches!(err, LauncherError::JobIdMissing(ref out) if out.contains("Submitting")));
    Ok(())
}

#[tokio::test]
async fn failing_submit_carries_its_output() -> TestResult {
    let tools = TempDir::new()?;
    let client = client(
        tools.path(),
        "echo 'ERROR: Failed to connect to local queue manager' >&2\nexit 1",
        "exit 0",
        "exit 0",
    );
    let submit_file = tools.path().join("iplant.cmd");
    fs::write(&submit_file, "queue\n")?;

    let err = client.submit(&submit_file).await.unwrap_err();

    match err {
        LauncherError::SubmitFailed { output, .. } => {
            assert!(output.contains("Failed to connect to local queue manager"));
        }
        other => panic!("expected SubmitFailed, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn kill_selects_jobs_by_invocation_id() -> TestResult {
    let tools = TempDir::new()?;
    let client = client(
        tools.path(),
        "exit 0",
        "echo 'IpcUuid =?= \"X\" was stopped'",
        "exit 0",
    );

    let outcome = client.kill("X").await?;

    assert!(matches!(outcome, KillOutcome::Removed(ref out) if out.contains("was stopped")));
    assert_eq!(
        recorded_args(tools.path(), "rm"),
        vec!["-constraint".to_string(), r#"IpcUuid =?= "X""#.to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn killing_an_absent_job_is_not_found() -> TestResult {
    let tools = TempDir::new()?;
    let client = client(
        tools.path(),
        "exit 0",
        "echo 'Couldn'\"'\"'t find/remove all jobs matching constraint (IpcUuid =?= \"gone\")' >&2\nexit 1",
        "exit 0",
    );

    let outcome = client.kill("gone").await?;

    assert!(matches!(outcome, KillOutcome::NotFound(_)));
    Ok(())
}

#[tokio::test]
async fn other_kill_failures_are_errors() -> TestResult {
    let tools = TempDir::new()?;
    let client = client(
        tools.path(),
        "exit 0",
        "echo 'ERROR: Can'\"'\"'t find address for schedd' >&2\nexit 1",
        "exit 0",
    );

    let err = client.kill("Y").await.unwrap_err();

    assert!(matches!(err, LauncherError::KillFailed { ref invocation_id, .. } if invocation_id == "Y"));
    Ok(())
}

#[tokio::test]
async fn held_query_lists_one_id_per_line() -> TestResult {
    let tools = TempDir::new()?;
    let client = client(tools.path(), "exit 0", "exit 0", "printf 'held-1\\n\\nheld-2\\n'");

    let ids = client.held_invocation_ids().await?;

    assert_eq!(ids, vec!["held-1", "held-2"]);
    let args = recorded_args(tools.path(), "q");
    assert_eq!(args[0], "-constraint");
    assert_eq!(args[1], "JobStatus =?= 5");
    assert_eq!(args[2], "-format");
    assert_eq!(args.last().map(String::as_str), Some("IpcUuid"));
    Ok(())
}

#[tokio::test]
async fn long_query_is_parsed_into_entries() -> TestResult {
    let tools = TempDir::new()?;
    let client = client(
        tools.path(),
        "exit 0",
        "exit 0",
        "printf 'ClusterId = 3\\nIpcUuid = \"a\"\\nJobStatus = 5\\n\\nClusterId = 4\\nIpcUuid = \"b\"\\nJobStatus = 1\\n'",
    );

    let entries = client.queue_entries().await?;

    assert_eq!(recorded_args(tools.path(), "q"), vec!["-long"]);
    assert_eq!(entries.len(), 2);
    assert!(entries[0].held);
    assert_eq!(entries[1].invocation_id, "b");
    Ok(())
}

#[tokio::test]
async fn failed_query_is_an_error() -> TestResult {
    let tools = TempDir::new()?;
    let client = client(tools.path(), "exit 0", "exit 0", "echo 'no schedd' >&2\nexit 2");

    let err = client.held_invocation_ids().await.unwrap_err();

    assert!(matches!(err, LauncherError::QueryFailed { ref output, .. } if output.contains("no schedd")));
    Ok(())
}

#[test]
fn binaries_are_found_on_the_search_path() -> TestResult {
    let tools = TempDir::new()?;
    let stub = write_stub(tools.path(), "launcher_test_submit", "exit 0");
    let search = std::env::join_paths(["/nonexistent-dir", tools.path().to_str().unwrap()])?;

    assert_eq!(find_binary("launcher_test_submit", &search)?, stub);
    assert_eq!(find_binary(stub.to_str().unwrap(), &search)?, stub);
    assert!(matches!(
        find_binary("launcher_test_missing", &search),
        Err(LauncherError::BinaryNotFound(ref n)) if n == "launcher_test_missing"
    ));
    Ok(())
}

#[test]
fn locate_falls_back_to_the_configured_path() -> TestResult {
    let tools = TempDir::new()?;
    for name in ["lt_condor_submit", "lt_condor_rm", "lt_condor_q"] {
        write_stub(tools.path(), name, "exit 0");
    }
    let mut raw = ConfigFileBuilder::new("/condor/logs").raw();
    raw.condor.path_env_var = tools.path().display().to_string();
    raw.condor.submit_command = "lt_condor_submit".to_string();
    raw.condor.remove_command = "lt_condor_rm".to_string();
    raw.condor.queue_command = "lt_condor_q".to_string();

    let client = CondorClient::locate(&raw.condor)?;

    assert_eq!(client.binaries().submit, tools.path().join("lt_condor_submit"));
    assert_eq!(client.binaries().remove, tools.path().join("lt_condor_rm"));
    assert_eq!(client.binaries().queue, tools.path().join("lt_condor_q"));

    raw.condor.queue_command = "lt_condor_q_missing".to_string();
    assert!(matches!(
        CondorClient::locate(&raw.condor),
        Err(LauncherError::BinaryNotFound(_))
    ));
    Ok(())
}
