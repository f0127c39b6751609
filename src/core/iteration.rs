use super::task::SubTask;
use std::cmp::Ordering;

/// Why the research loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    IterationCap,
    Sufficient,
    Exhausted,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::IterationCap => "iteration limit reached",
            StopReason::Sufficient => "findings judged sufficient",
            StopReason::Exhausted => "no pending subtasks left",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NextAction {
    Research(SubTask),
    GenerateReport(StopReason),
}

/// Decides what the research state does next.
///
/// Precedence is fixed: the hard iteration cap first, then the sufficiency
/// signal, then subtask availability. Callers pass `sufficient = false` when
/// no result has been gathered yet.
pub fn next_action(
    sub_tasks: &[SubTask],
    iteration_count: u32,
    max_iterations: u32,
    sufficient: bool,
) -> NextAction {
    if iteration_count >= max_iterations {
        return NextAction::GenerateReport(StopReason::IterationCap);
    }
    if sufficient {
        return NextAction::GenerateReport(StopReason::Sufficient);
    }
    match next_task(sub_tasks) {
        Some(sub_task) => NextAction::Research(sub_task.clone()),
        None => NextAction::GenerateReport(StopReason::Exhausted),
    }
}

/// Pending subtask with the smallest `(priority, id)`; unset priorities sort last
pub fn next_task(sub_tasks: &[SubTask]) -> Option<&SubTask> {
    sub_tasks
        .iter()
        .filter(|t| t.is_pending())
        .min_by(|a, b| compare_priority(a.priority, b.priority).then(a.id.cmp(&b.id)))
}

fn compare_priority(a: Option<i32>, b: Option<i32>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::SubTaskStatus;

    fn sub_task(id: u32, priority: Option<i32>, status: SubTaskStatus) -> SubTask {
        SubTask {
            id,
            description: format!("subtask {}", id),
            search_queries: vec![format!("query {}", id)],
            sources: Default::default(),
            status,
            priority,
        }
    }

    #[test]
    fn priority_ties_are_broken_by_id() {
        let mut tasks = vec![
            sub_task(2, Some(1), SubTaskStatus::Pending),
            sub_task(1, Some(1), SubTaskStatus::Pending),
            sub_task(3, Some(2), SubTaskStatus::Completed),
        ];
        assert_eq!(next_task(&tasks).map(|t| t.id), Some(1));
        tasks[1].status = SubTaskStatus::Completed;
        assert_eq!(next_task(&tasks).map(|t| t.id), Some(2));
        tasks[0].status = SubTaskStatus::Completed;
        assert!(next_task(&tasks).is_none());
    }

    #[test]
    fn unset_priority_sorts_last() {
        let tasks = vec![
            sub_task(1, None, SubTaskStatus::Pending),
            sub_task(7, Some(9), SubTaskStatus::Pending),
        ];
        assert_eq!(next_task(&tasks).map(|t| t.id), Some(7));
    }

    #[test]
    fn cap_takes_precedence_over_everything() {
        let tasks = vec![sub_task(1, Some(1), SubTaskStatus::Pending)];
        assert_eq!(
            next_action(&tasks, 2, 2, true),
            NextAction::GenerateReport(StopReason::IterationCap)
        );
        assert_eq!(
            next_action(&tasks, 1, 2, true),
            NextAction::GenerateReport(StopReason::Sufficient)
        );
        assert!(matches!(
            next_action(&tasks, 1, 2, false),
            NextAction::Research(t) if t.id == 1
        ));
        assert_eq!(
            next_action(&[], 0, 2, false),
            NextAction::GenerateReport(StopReason::Exhausted)
        );
    }
}
