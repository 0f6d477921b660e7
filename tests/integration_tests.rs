//! Integration tests for the bridge CLI
//!
//! Each test builds a throwaway project and checks the command's output and
//! exit code. The planning agent is the default stub backend throughout.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const ENV_OVERRIDES: &[&str] = &[
    "BRIDGE_CONFIG_PATH",
    "BRIDGE_AGENT_BACKEND",
    "BRIDGE_AGENT_TIMEOUT",
    "BRIDGE_RETRY_COUNT",
    "BRIDGE_RETRY_DELAY",
    "BRIDGE_BACKOFF",
    "BRIDGE_CONTEXT_MAX_TOKENS",
    "BRIDGE_TRUNCATION_STRATEGY",
    "BRIDGE_STALENESS_HOURS",
    "RUST_LOG",
];

/// Helper to create a bridge Command running inside `dir`
fn bridge(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("bridge");
    cmd.current_dir(dir.path());
    for key in ENV_OVERRIDES {
        cmd.env_remove(key);
    }
    cmd
}

fn write(dir: &TempDir, relative: &str, content: &str) {
    let path = dir.path().join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

const MILESTONE_M1: &str = "# M1: Storage\n\n\
## Objective\nPersist notes locally.\n\n\
## Phases\n- [ ] Phase 1: Schema\n- [ ] Phase 2: Repository layer\n- [ ] Phase 3: Migrations\n\n\
## Success Criteria\n- Notes survive restart\n";

/// A project with architecture, roadmap and one milestone.
fn documented_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "docs/00_global/ARCHITECTURE.md",
        "# Architecture\n\n## 1. Overview\nA local-first notes app.\n",
    );
    write(&dir, "docs/00_global/ROADMAP.md", "# Roadmap\n\n- M1 Storage\n");
    write(&dir, "docs/01_milestones/M1_storage.md", MILESTONE_M1);
    dir
}

fn commit_all(dir: &Path, message: &str) {
    let repo = git2::Repository::init(dir).unwrap();
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
        .unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = git2::Signature::now("Test", "test@example.com").unwrap();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[])
        .unwrap();
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_bridge_help() {
        let dir = TempDir::new().unwrap();
        bridge(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("handoff"));
    }

    #[test]
    fn test_bridge_version() {
        let dir = TempDir::new().unwrap();
        bridge(&dir).arg("--version").assert().success();
    }

    #[test]
    fn test_project_dir_flag() {
        let dir = documented_project();
        let elsewhere = TempDir::new().unwrap();
        bridge(&elsewhere)
            .arg("--project-dir")
            .arg(dir.path())
            .args(["handoff"])
            .assert()
            .success()
            .stdout(predicate::str::contains("M1: Storage"));
    }
}

// =============================================================================
// Config Tests
// =============================================================================

mod config {
    use super::*;

    #[test]
    fn test_config_show_defaults() {
        let dir = TempDir::new().unwrap();
        bridge(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No bridge.toml found"))
            .stdout(predicate::str::contains("backend = \"stub\""));
    }

    #[test]
    fn test_config_init_refuses_overwrite_without_force() {
        let dir = TempDir::new().unwrap();
        bridge(&dir).args(["config", "init"]).assert().success();
        assert!(dir.path().join(".bridge/bridge.toml").exists());

        bridge(&dir)
            .args(["config", "init"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("--force"));

        bridge(&dir)
            .args(["config", "init", "--force"])
            .assert()
            .success();
    }

    #[test]
    fn test_config_validate_reports_warnings() {
        let dir = TempDir::new().unwrap();
        write(&dir, ".bridge/bridge.toml", "[agent]\ntimeout_secs = 0\n");
        bridge(&dir)
            .args(["config", "validate"])
            .assert()
            .code(1)
            .stdout(predicate::str::contains("timeout_secs is 0"));
    }

    #[test]
    fn test_invalid_config_exits_two() {
        let dir = TempDir::new().unwrap();
        write(&dir, ".bridge/bridge.toml", "[agent\nbackend = ");
        bridge(&dir)
            .args(["config", "show"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("[ERROR]"));
    }
}

// =============================================================================
// Ask Tests
// =============================================================================

mod ask {
    use super::*;

    #[test]
    fn test_ask_returns_framed_response() {
        let dir = documented_project();
        bridge(&dir)
            .args(["ask", "Which storage engine should I use?"])
            .assert()
            .success()
            .stdout(predicate::str::starts_with("[PLANNING AGENT RESPONSE]"))
            .stdout(predicate::str::contains("ARCHITECTURE.md"))
            .stdout(predicate::str::contains("[END RESPONSE]"));

        let audit = fs::read_to_string(dir.path().join(".bridge/logs/interactions.jsonl")).unwrap();
        assert_eq!(audit.lines().count(), 1);
        assert!(audit.contains("Which storage engine"));
    }

    #[test]
    fn test_ask_json_output() {
        let dir = documented_project();
        let output = bridge(&dir)
            .args(["ask", "How do I implement the schema?", "--format", "json"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(value["status"], "success");
        assert!(value["response"].as_str().unwrap().contains("STUB RESPONSE"));
        assert!(
            value["context_used"]
                .as_array()
                .unwrap()
                .iter()
                .any(|d| d == "M1_storage.md")
        );
    }

    #[test]
    fn test_empty_question_exits_two() {
        let dir = documented_project();
        bridge(&dir)
            .args(["ask", "  "])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("Invalid query"));
        assert!(!dir.path().join(".bridge/logs/interactions.jsonl").exists());
    }

    #[test]
    fn test_missing_critical_document_exits_three() {
        let dir = TempDir::new().unwrap();
        bridge(&dir)
            .args(["ask", "Which architecture pattern fits?", "--type", "architectural"])
            .assert()
            .code(3)
            .stderr(predicate::str::contains("Required document 'architecture'"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn test_unknown_milestone_exits_three() {
        let dir = documented_project();
        bridge(&dir)
            .args(["ask", "What next?", "--milestone", "M7"])
            .assert()
            .code(3);
    }
}

// =============================================================================
// Progress Tests
// =============================================================================

mod progress {
    use super::*;

    #[test]
    fn test_done_is_recorded_and_acknowledged() {
        let dir = documented_project();
        bridge(&dir)
            .args(["progress", "--phase", "1", "--status", "done", "-m", "schema merged"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[PROGRESS RECORDED]"))
            .stdout(predicate::str::contains("Milestone: M1"))
            .stdout(predicate::str::contains("[PLANNING AGENT ACKNOWLEDGMENT]"));

        let ledger = fs::read_to_string(dir.path().join(".bridge/progress.jsonl")).unwrap();
        let record: serde_json::Value = serde_json::from_str(ledger.lines().next().unwrap()).unwrap();
        assert_eq!(record["milestone"], "M1");
        assert_eq!(record["phase"], 1);
        assert_eq!(record["status"], "done");
        assert_eq!(record["message"], "schema merged");
    }

    #[test]
    fn test_blocked_requires_action_without_notify() {
        let dir = documented_project();
        bridge(&dir)
            .args(["progress", "--phase", "2", "--status", "blocked", "--no-notify"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Action Required"))
            .stdout(predicate::str::contains("ACKNOWLEDGMENT").not());
    }

    #[test]
    fn test_out_of_order_done_warns_but_records() {
        let dir = documented_project();
        bridge(&dir)
            .args(["progress", "--phase", "3", "--status", "done", "--no-notify"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Warning: out-of-order phase"));
    }

    #[test]
    fn test_non_positive_phase_exits_two() {
        let dir = documented_project();
        bridge(&dir)
            .args(["progress", "--phase", "0", "--status", "done"])
            .assert()
            .code(2);
        bridge(&dir)
            .args(["progress", "--phase", "-1", "--status", "done"])
            .assert()
            .code(2);
        assert!(!dir.path().join(".bridge/progress.jsonl").exists());
    }

    #[test]
    fn test_undefined_phase_exits_three() {
        let dir = documented_project();
        bridge(&dir)
            .args(["progress", "--phase", "9", "--status", "done"])
            .assert()
            .code(3)
            .stderr(predicate::str::contains("Phase 9 not found"));
    }

    #[test]
    fn test_no_milestones_exits_three() {
        let dir = TempDir::new().unwrap();
        bridge(&dir)
            .args(["progress", "--phase", "1", "--status", "done"])
            .assert()
            .code(3);
    }
}

// =============================================================================
// Status Tests
// =============================================================================

mod status {
    use super::*;

    #[test]
    fn test_missing_specification_is_misaligned() {
        let dir = TempDir::new().unwrap();
        commit_all(dir.path(), "initial");
        bridge(&dir)
            .arg("status")
            .assert()
            .code(2)
            .stdout(predicate::str::contains("[STATUS CHECK - MISALIGNED]"));
    }

    #[test]
    fn test_without_version_control_is_undetermined() {
        let dir = documented_project();
        bridge(&dir)
            .arg("status")
            .assert()
            .code(3)
            .stdout(predicate::str::contains("[STATUS CHECK - UNDETERMINED]"))
            .stdout(predicate::str::contains("version control state unavailable"));
    }

    #[test]
    fn test_clean_committed_project_is_aligned() {
        let dir = documented_project();
        commit_all(dir.path(), "Add M1 specification");
        bridge(&dir)
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("[STATUS CHECK - ALIGNED]"))
            .stdout(predicate::str::contains("Current Phase: 1 of 3"))
            .stdout(predicate::str::contains("Git Status: Clean"));
    }

    #[test]
    fn test_uncommitted_changes_warn() {
        let dir = documented_project();
        commit_all(dir.path(), "Add M1 specification");
        write(&dir, "src/main.rs", "fn main() {}\n");
        bridge(&dir)
            .args(["status", "--format", "json"])
            .assert()
            .code(1)
            .stdout(predicate::str::contains("\"verdict\": \"Warning\""));
    }

    #[test]
    fn test_oversized_staleness_is_rejected_not_a_crash() {
        let dir = documented_project();
        commit_all(dir.path(), "Add M1 specification");
        bridge(&dir)
            .env("BRIDGE_STALENESS_HOURS", u64::MAX.to_string())
            .arg("status")
            .assert()
            .code(3)
            .stderr(predicate::str::contains("drift.staleness_hours"));

        write(&dir, ".bridge/bridge.toml", "[drift]\nevidence_grace_minutes = 9223372036854775807\n");
        bridge(&dir)
            .args(["config", "show"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("drift.evidence_grace_minutes"));
    }

    #[test]
    fn test_verbose_includes_signals_and_validation() {
        let dir = documented_project();
        commit_all(dir.path(), "Add M1 specification");
        bridge(&dir)
            .args(["status", "--verbose"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[SIGNALS]"))
            .stdout(predicate::str::contains("[PLANNING AGENT VALIDATION]"));
    }
}

// =============================================================================
// Handoff Tests
// =============================================================================

mod handoff {
    use super::*;

    #[test]
    fn test_handoff_prints_context() {
        let dir = documented_project();
        bridge(&dir)
            .arg("handoff")
            .assert()
            .success()
            .stdout(predicate::str::contains("**Current Milestone:** M1: Storage (M1)"))
            .stdout(predicate::str::contains("## Architecture Summary"))
            .stdout(predicate::str::contains("Phase 1: Schema"));
    }

    #[test]
    fn test_compact_omits_architecture() {
        let dir = documented_project();
        bridge(&dir)
            .args(["handoff", "--compact"])
            .assert()
            .success()
            .stdout(predicate::str::contains("## Architecture Summary").not());
    }

    #[test]
    fn test_auto_writes_the_slot() {
        let dir = documented_project();
        bridge(&dir)
            .args(["handoff", "--auto"])
            .assert()
            .success()
            .stdout(predicate::str::contains("next_context.md"));

        let artifact = fs::read_to_string(dir.path().join(".bridge/next_context.md")).unwrap();
        assert!(artifact.starts_with("<!-- bridge-handoff milestone=M1 "));
    }

    #[test]
    fn test_output_file() {
        let dir = documented_project();
        bridge(&dir)
            .args(["handoff", "--output", "handoff.md"])
            .assert()
            .success();
        let text = fs::read_to_string(dir.path().join("handoff.md")).unwrap();
        assert!(text.contains("## Success Criteria"));
    }

    #[test]
    fn test_no_milestones_exits_one() {
        let dir = TempDir::new().unwrap();
        bridge(&dir).arg("handoff").assert().code(1);
    }

    #[test]
    fn test_unknown_milestone_exits_two() {
        let dir = documented_project();
        bridge(&dir)
            .args(["handoff", "--milestone", "M4"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("Milestone M4 not found"));
    }
}

// =============================================================================
// Loop Tests
// =============================================================================

#[cfg(unix)]
mod session_loop {
    use super::*;

    #[test]
    fn test_unattended_loop_stops_at_cycle_limit() {
        let dir = documented_project();
        write(
            &dir,
            ".bridge/bridge.toml",
            "[session]\ncommand = \"sh\"\nargs = [\"-c\", \"true\"]\ndefault_decision = \"restart\"\n",
        );
        bridge(&dir)
            .args(["loop", "--unattended", "--max-cycles", "2"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Loop ended after 2 session(s): cycle limit reached"));
    }

    #[test]
    fn test_handoff_artifact_is_consumed() {
        let dir = documented_project();
        write(
            &dir,
            ".bridge/bridge.toml",
            "[session]\ncommand = \"sh\"\nargs = [\"-c\", \"true\"]\n",
        );
        bridge(&dir).args(["handoff", "--auto"]).assert().success();
        assert!(dir.path().join(".bridge/next_context.md").exists());

        bridge(&dir)
            .args(["loop", "--unattended"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Loop ended after 1 session(s): quit"));
        assert!(!dir.path().join(".bridge/next_context.md").exists());
    }

    #[test]
    fn test_missing_command_fails_to_launch() {
        let dir = documented_project();
        write(
            &dir,
            ".bridge/bridge.toml",
            "[session]\ncommand = \"bridge-test-no-such-command\"\n",
        );
        bridge(&dir)
            .args(["loop", "--unattended"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Hint:"));
    }
}
