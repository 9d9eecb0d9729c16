//! Full-text search over tasks and subtasks.
//!
//! The filter is a case-insensitive substring match across every text field
//! of a task (title, description, details, test strategy, status, priority)
//! plus the decimal renderings of its id and dependency ids. Subtasks are
//! searched the same way (with parent task id instead of priority). A task
//! is retained when it or any of its subtasks matches; retained tasks keep
//! their full subtask list.

use crate::model::{Subtask, Task, TaskFile};

/// Filter a task list, keeping tasks where the task itself or any subtask
/// matches `term`. An empty term keeps everything.
pub fn filter_tasks(tasks: &[Task], term: &str) -> Vec<Task> {
    if term.is_empty() {
        return tasks.to_vec();
    }
    let lower = term.to_lowercase();
    tasks
        .iter()
        .filter(|task| task_matches(task, term, &lower))
        .cloned()
        .collect()
}

/// Apply [`filter_tasks`] to every tag group in a document, in place.
/// Tags are kept even when all of their tasks are filtered out, so the
/// tag list stays stable while searching.
pub fn filter_file(file: &mut TaskFile, term: &str) {
    if term.is_empty() {
        return;
    }
    for group in file.values_mut() {
        group.tasks = filter_tasks(&group.tasks, term);
    }
}

fn task_matches(task: &Task, term: &str, lower: &str) -> bool {
    if matches_task_fields(task, term, lower) {
        return true;
    }
    task.subtasks
        .as_deref()
        .unwrap_or_default()
        .iter()
        .any(|s| matches_subtask_fields(s, term, lower))
}

fn matches_task_fields(task: &Task, term: &str, lower: &str) -> bool {
    text_contains(&task.title, lower)
        || text_contains(&task.description, lower)
        || text_contains(&task.details, lower)
        || text_contains(&task.test_strategy, lower)
        || text_contains(&task.status, lower)
        || text_contains(&task.priority, lower)
        || id_contains(task.id, term)
        || task.dependencies.iter().any(|dep| id_contains(*dep, term))
}

fn matches_subtask_fields(subtask: &Subtask, term: &str, lower: &str) -> bool {
    text_contains(&subtask.title, lower)
        || text_contains(&subtask.description, lower)
        || text_contains(&subtask.details, lower)
        || text_contains(&subtask.test_strategy, lower)
        || text_contains(&subtask.status, lower)
        || id_contains(subtask.id, term)
        || subtask.dependencies.iter().any(|dep| id_contains(*dep, term))
        || subtask.parent_task_id.is_some_and(|p| id_contains(p, term))
}

fn text_contains(text: &str, lower_term: &str) -> bool {
    text.to_lowercase().contains(lower_term)
}

/// Ids match on their decimal rendering, so "2" also finds id 12.
fn id_contains(id: i64, term: &str) -> bool {
    id.to_string().contains(term)
}
