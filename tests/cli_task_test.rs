//! CLI integration tests for sprints, tasks, and the status state machine.

mod common;

use common::TestEnv;
use predicates::prelude::*;

fn setup_sprint(env: &TestEnv) {
    env.cox_json(&[
        "sprint", "create", "S1", "Sprint One", "--start", "2026-01-01", "--end", "2026-01-14",
    ]);
}

#[test]
fn test_system_init() {
    let env = TestEnv::new();
    let result = env.cox_json(&["system", "init", "--project-name", "Demo"]);
    assert_eq!(result["initialized"], true);

    let settings = env.cox_json(&["context", "settings"]);
    assert_eq!(settings["project_name"], "Demo");
    assert_eq!(settings["context_version"], 1);
}

#[test]
fn test_task_ids_are_sequential_per_sprint() {
    let env = TestEnv::new();
    setup_sprint(&env);

    let first = env.cox_json(&["task", "create", "S1", "First task"]);
    assert_eq!(first["id"], "S1-001");
    assert_eq!(first["status"], "todo");

    let second = env.cox_json(&["task", "create", "S1", "Second task"]);
    assert_eq!(second["id"], "S1-002");
}

#[test]
fn test_status_transitions_and_rejection() {
    let env = TestEnv::new();
    setup_sprint(&env);
    env.cox_json(&["task", "create", "S1", "First task"]);

    let task = env.cox_json(&["task", "status", "S1-001", "in-progress"]);
    assert_eq!(task["status"], "in-progress");
    assert!(task["started_at"].is_string());

    // in-progress -> done skips QA and is rejected with the valid next states.
    env.cox()
        .args(["task", "status", "S1-001", "done"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("in-progress"))
        .stderr(predicate::str::contains("todo, blocked, in-qa"));

    // The task is untouched by the failed transition.
    let task = env.cox_json(&["task", "show", "S1-001"]);
    assert_eq!(task["status"], "in-progress");

    let task = env.cox_json(&["task", "status", "S1-001", "in-qa"]);
    assert_eq!(task["status"], "in-qa");
    let task = env.cox_json(&["task", "status", "S1-001", "done"]);
    assert_eq!(task["status"], "done");
    assert!(task["completed_at"].is_string());
}

#[test]
fn test_unknown_task_is_not_found() {
    let env = TestEnv::new();
    env.cox()
        .args(["task", "show", "S9-001"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_assign_and_workload() {
    let env = TestEnv::new();
    setup_sprint(&env);
    env.cox_json(&["task", "create", "S1", "First task"]);
    env.cox_json(&[
        "agent",
        "register",
        "backend-dev",
        "Backend Developer",
        "--max-concurrent",
        "1",
    ]);

    let task = env.cox_json(&["task", "assign", "S1-001", "backend-dev"]);
    assert_eq!(task["assigned_agent"], "backend-dev");

    let workload = env.cox_json(&["agent", "workload", "backend-dev"]);
    assert_eq!(workload["current_tasks"], 1);
    assert_eq!(workload["available_capacity"], 0);
    assert_eq!(workload["at_capacity"], true);

    // Assigning to an unregistered agent fails.
    env.cox()
        .args(["task", "assign", "S1-001", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_task_list_filters() {
    let env = TestEnv::new();
    setup_sprint(&env);
    env.cox_json(&["task", "create", "S1", "Urgent", "--priority", "1"]);
    env.cox_json(&["task", "create", "S1", "Later", "--priority", "200"]);
    env.cox_json(&["task", "status", "S1-001", "in-progress"]);

    let all = env.cox_json(&["task", "list", "--sprint", "S1"]);
    let all = all.as_array().unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0]["id"], "S1-001"); // lower priority number first

    let in_progress = env.cox_json(&["task", "list", "--status", "in-progress"]);
    assert_eq!(in_progress.as_array().unwrap().len(), 1);
}

#[test]
fn test_task_history_audit_trail() {
    let env = TestEnv::new();
    setup_sprint(&env);
    env.cox_json(&["task", "create", "S1", "First task"]);
    env.cox_json(&[
        "task",
        "status",
        "S1-001",
        "in-progress",
        "--actor",
        "backend-dev",
        "--comment",
        "starting now",
    ]);

    let history = env.cox_json(&["task", "history", "S1-001"]);
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 2); // created + status change
    assert_eq!(history[1]["field_changed"], "status");
    assert_eq!(history[1]["old_value"], "todo");
    assert_eq!(history[1]["new_value"], "in-progress");
    assert_eq!(history[1]["changed_by"], "backend-dev");
}

#[test]
fn test_dependency_cycle_rejected() {
    let env = TestEnv::new();
    setup_sprint(&env);
    env.cox_json(&["task", "create", "S1", "A"]);
    env.cox_json(&["task", "create", "S1", "B", "--depends-on", "S1-001"]);

    // A task cannot depend on itself.
    env.cox()
        .args(["task", "create", "S1", "C", "--depends-on", "S1-003"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("depend on itself"));
}

#[test]
fn test_sprint_metrics() {
    let env = TestEnv::new();
    setup_sprint(&env);
    env.cox_json(&["task", "create", "S1", "A", "--estimate", "4"]);
    env.cox_json(&["task", "create", "S1", "B", "--estimate", "2"]);
    env.cox_json(&["task", "status", "S1-001", "in-progress"]);
    env.cox_json(&["task", "status", "S1-001", "in-qa"]);
    env.cox_json(&["task", "status", "S1-001", "done"]);

    let metrics = env.cox_json(&["sprint", "metrics", "S1"]);
    assert_eq!(metrics["total_tasks"], 2);
    assert_eq!(metrics["completed_tasks"], 1);
    assert_eq!(metrics["completion_rate"], 50.0);
    assert_eq!(metrics["total_estimated_hours"], 6.0);

    let summary = env.cox_json(&["sprint", "show", "S1"]);
    assert_eq!(summary["total_tasks"], 2);
    assert_eq!(summary["task_counts"]["done"], 1);
}
