//! External processes: pipelines, redirections, here-documents, process
//! substitution and background jobs
//!
//! These tests spawn real programs (`cat`, `sort`, `sleep`, ...) found on
//! the host `PATH`.

use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use tidesh::{ExecResult, JobStatus, Shell};

fn shell_in(dir: &std::path::Path) -> Shell {
    let mut builder = Shell::builder().clear_env().cwd(dir);
    if let Ok(path) = std::env::var("PATH") {
        builder = builder.env("PATH", path);
    }
    builder.build()
}

async fn exec(script: &str) -> ExecResult {
    shell_in(&std::env::temp_dir()).exec(script).await.unwrap()
}

#[tokio::test]
async fn builtin_into_external() {
    let result = exec("echo hi | cat").await;
    assert_eq!(result.stdout, "hi\n");
    assert_eq!(result.exit_code, 0);
}

#[tokio::test]
async fn external_chain() {
    let result = exec("printf 'b\\na\\nc\\n' | sort | head -n 2").await;
    assert_eq!(result.stdout, "a\nb\n");
}

#[tokio::test]
async fn external_into_compound() {
    let result = exec("printf 'x\\ny\\n' | while false; do :; done; echo $?").await;
    assert_eq!(result.stdout, "0\n");
    let result = exec("echo data | { cat; echo tail; }").await;
    assert_eq!(result.stdout, "data\ntail\n");
}

#[tokio::test]
async fn pipefail_and_pipestatus() {
    let result = exec("false | true; echo $?; set -o pipefail; false | true; echo $?").await;
    assert_eq!(result.stdout, "0\n1\n");
    let result = exec("true | false | true; echo ${PIPESTATUS[@]}").await;
    assert_eq!(result.stdout, "0 1 0\n");
}

#[tokio::test]
async fn pipeline_stage_runs_in_subshell() {
    let result = exec("x=1; echo | x=2; echo $x").await;
    assert_eq!(result.stdout, "1\n");
}

#[tokio::test]
async fn large_output_through_pipe() {
    let result = exec("seq 1 20000 | tail -n 1").await;
    assert_eq!(result.stdout, "20000\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn in_process_writer_stops_when_reader_exits() {
    let run = exec("while :; do echo y; done | head -n 1; echo ${PIPESTATUS[@]}; echo done");
    let result = tokio::time::timeout(Duration::from_secs(10), run).await.unwrap();
    assert_eq!(result.stdout, "y\n141 0\ndone\n");
    assert_eq!(result.stderr, "");

    let run = exec("f() { for ((;;)); do echo y; done; }; f | head -n 1; echo $?");
    let result = tokio::time::timeout(Duration::from_secs(10), run).await.unwrap();
    assert_eq!(result.stdout, "y\n0\n");
}

#[tokio::test]
async fn xtrace_shows_external_stages() {
    let result = exec("set -x; Y=2 env | grep -c '^Y=2$'").await;
    assert_eq!(result.stdout, "1\n");
    let lines: Vec<&str> = result.stderr.lines().collect();
    assert!(lines.contains(&"+ Y=2 env"), "stderr: {}", result.stderr);
    assert!(lines.contains(&"+ grep -c ^Y=2$"), "stderr: {}", result.stderr);
}

#[tokio::test]
async fn command_not_found_is_127() {
    let result = exec("definitely-not-a-command-xyz; echo $?").await;
    assert_eq!(result.stdout, "127\n");
    assert!(result.stderr.contains("definitely-not-a-command-xyz: command not found"));
}

#[tokio::test]
async fn external_exit_status() {
    assert_eq!(exec("sh -c 'exit 5'; echo $?").await.stdout, "5\n");
}

#[tokio::test]
async fn exported_variables_reach_children() {
    let result = exec("export GREETING=hello; LOCAL_ONLY=x; PREFIX=p sh -c 'echo $GREETING-$LOCAL_ONLY-$PREFIX'; echo \"[$PREFIX]\"").await;
    assert_eq!(result.stdout, "hello--p\n[]\n");
}

#[tokio::test]
async fn output_and_append_redirects() {
    let dir = tempfile::tempdir().unwrap();
    let mut sh = shell_in(dir.path());
    let result = sh.exec("echo one > out.txt; echo two >> out.txt; cat < out.txt").await.unwrap();
    assert_eq!(result.stdout, "one\ntwo\n");
    assert_eq!(std::fs::read_to_string(dir.path().join("out.txt")).unwrap(), "one\ntwo\n");
}

#[tokio::test]
async fn stderr_redirects() {
    let dir = tempfile::tempdir().unwrap();
    let mut sh = shell_in(dir.path());
    let result = sh.exec("{ echo out; echo err >&2; } 2>&1 | cat").await.unwrap();
    assert_eq!(result.stdout, "out\nerr\n");

    let result = sh.exec("cat missing.txt 2> err.txt; echo $?").await.unwrap();
    assert_eq!(result.stdout, "1\n");
    assert!(!std::fs::read_to_string(dir.path().join("err.txt")).unwrap().is_empty());

    let result = sh.exec("echo both &> all.txt; cat all.txt; echo gone > /dev/null").await.unwrap();
    assert_eq!(result.stdout, "both\n");
}

#[tokio::test]
async fn missing_input_file_fails_command() {
    let dir = tempfile::tempdir().unwrap();
    let result = shell_in(dir.path()).exec("cat < nope.txt; echo $?").await.unwrap();
    assert_eq!(result.stdout, "1\n");
    assert!(result.stderr.contains("nope.txt: No such file or directory"));
}

#[tokio::test]
async fn noclobber() {
    let dir = tempfile::tempdir().unwrap();
    let mut sh = shell_in(dir.path());
    let result = sh.exec("set -C; echo a > f; echo b > f; echo $?; echo c >| f; cat f").await.unwrap();
    assert_eq!(result.stdout, "1\nc\n");
    assert!(result.stderr.contains("cannot overwrite existing file"));
}

#[tokio::test]
async fn redirect_on_compound_statement() {
    let dir = tempfile::tempdir().unwrap();
    let mut sh = shell_in(dir.path());
    let result = sh
        .exec("for i in 1 2 3; do echo $i; done > nums; { cat; echo end; } < nums")
        .await
        .unwrap();
    assert_eq!(result.stdout, "1\n2\n3\nend\n");
}

#[tokio::test]
async fn heredocs() {
    let script = "name=World\ncat <<EOF\nHello $name\nEOF\ncat <<'EOF'\nHello $name\nEOF\ncat <<-EOF\n\t\tindented\n\tEOF\n";
    let result = exec(script).await;
    assert_eq!(result.stdout, "Hello World\nHello $name\nindented\n");
}

#[tokio::test]
async fn here_string() {
    assert_eq!(exec("v=abc; cat <<< \"$v\"").await.stdout, "abc\n");
}

#[tokio::test]
async fn process_substitution() {
    assert_eq!(exec("cat <(echo from-sub)").await.stdout, "from-sub\n");
    assert_eq!(exec("echo data > >(cat)").await.stdout, "data\n");
}

#[tokio::test]
async fn background_job_lifecycle() {
    let mut sh = shell_in(&std::env::temp_dir());
    let start = Instant::now();
    let result = sh.exec("sleep 1 &").await.unwrap();
    assert!(start.elapsed() < Duration::from_millis(900), "background job blocked the caller");
    assert_eq!(result.exit_code, 0);
    assert!(result.stderr.starts_with("[1] "));

    let job = sh.jobs().get_job(1).unwrap();
    assert_eq!(job.status, JobStatus::Running);
    assert_eq!(job.command_line, "sleep 1");

    assert_eq!(sh.jobs().wait(1).await, Some(0));
    assert_eq!(sh.jobs().get_job(1).unwrap().status, JobStatus::Done);
}

#[tokio::test]
async fn sleep_zero_job_gets_first_id() {
    let mut sh = shell_in(&std::env::temp_dir());
    sh.exec("sleep 0 &").await.unwrap();
    assert!(sh.jobs().get_job(1).is_some());
    assert_eq!(sh.jobs().wait(1).await, Some(0));
    assert_eq!(sh.jobs().get_job(1).unwrap().status, JobStatus::Done);
}

#[tokio::test]
async fn wait_builtin_collects_status() {
    let result = exec("sh -c 'exit 3' & wait %1; echo $?; false & wait; echo $?").await;
    assert_eq!(result.stdout, "3\n0\n");
}

#[tokio::test]
async fn in_process_background_job() {
    let mut sh = shell_in(&std::env::temp_dir());
    let result = sh.exec("{ false; } &").await.unwrap();
    assert_eq!(result.stderr, "[1]\n");
    assert_eq!(sh.jobs().get_job(1).unwrap().pid, None);
    assert_eq!(sh.jobs().wait(1).await, Some(1));
    let listing = sh.exec("jobs").await.unwrap().stdout;
    assert!(listing.contains("Exit 1"), "listing: {listing}");
}

#[tokio::test]
async fn last_background_pid() {
    let result = exec("sleep 0 & echo $!; wait").await;
    let pid: u32 = result.stdout.trim().parse().unwrap();
    assert!(pid > 0);
}
