use super::task::{ApprovalDecision, TaskRecord};
use super::task_state::TaskStatus;
use crate::db::{Patch, TaskRepository};
use crate::errors::GateError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

/// How a suspended approval wait ended
#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalOutcome {
    Decided(ApprovalDecision),
    Timeout,
    Cancelled,
}

/// What `decide` did with a decision
#[derive(Debug, Clone, PartialEq)]
pub enum DecideOutcome {
    /// Durably recorded; no waiter in this process
    Recorded,
    /// Recorded and a waiter in this process was woken
    Woken,
    /// Not applicable (stale round, already decided, finished task)
    Ignored(&'static str),
}

#[derive(Debug, Default)]
struct WaitSlot {
    notify: Notify,
    cancelled: AtomicBool,
}

/// Suspend/resume primitive gating a task on a human decision.
///
/// Decisions are always written to the task store first, so a waiter in any
/// process observes them: in-process waiters are woken through a `Notify`,
/// others find the decision on their next poll of the store.
#[derive(Debug)]
pub struct ApprovalGate {
    store: TaskRepository,
    waits: Mutex<HashMap<String, Arc<WaitSlot>>>,
    poll_interval: Duration,
}

/// The single outstanding wait of a task; dropping it unregisters the wait
#[derive(Debug)]
pub struct ApprovalHandle {
    gate: Arc<ApprovalGate>,
    task_id: String,
    slot: Arc<WaitSlot>,
    deadline: Instant,
}

impl ApprovalHandle {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }
}

impl Drop for ApprovalHandle {
    fn drop(&mut self) {
        let mut waits = self.gate.lock_waits();
        if waits
            .get(&self.task_id)
            .is_some_and(|slot| Arc::ptr_eq(slot, &self.slot))
        {
            waits.remove(&self.task_id);
        }
    }
}

impl ApprovalGate {
    pub fn new(store: TaskRepository, poll_interval: Duration) -> Self {
        ApprovalGate {
            store,
            waits: Mutex::new(HashMap::new()),
            poll_interval,
        }
    }

    fn lock_waits(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<WaitSlot>>> {
        self.waits.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Registers the wait of `task_id`, expiring after `timeout`
    ///
    /// # Errors
    ///
    /// `GateError::AlreadyWaiting` if a wait is already registered for the task
    pub fn register(
        self: &Arc<Self>,
        task_id: &str,
        timeout: Duration,
    ) -> Result<ApprovalHandle, GateError> {
        let mut waits = self.lock_waits();
        if waits.contains_key(task_id) {
            return Err(GateError::AlreadyWaiting(task_id.to_string()));
        }
        let slot = Arc::new(WaitSlot::default());
        waits.insert(task_id.to_string(), slot.clone());
        debug!("Registered approval wait for task {} ({:?})", task_id, timeout);

        Ok(ApprovalHandle {
            gate: self.clone(),
            task_id: task_id.to_string(),
            slot,
            deadline: Instant::now() + timeout,
        })
    }

    pub fn is_waiting(&self, task_id: &str) -> bool {
        self.lock_waits().contains_key(task_id)
    }

    /// Suspends until a decision for the open round exists, the task is
    /// cancelled, or the handle's deadline passes
    pub async fn wait(&self, handle: &ApprovalHandle) -> Result<ApprovalOutcome, GateError> {
        loop {
            let record = self.store.get(&handle.task_id)?;
            if handle.slot.cancelled.load(Ordering::SeqCst)
                || record.status == TaskStatus::Cancelled
            {
                info!("Approval wait of task {} cancelled", handle.task_id);
                return Ok(ApprovalOutcome::Cancelled);
            }
            if let Some(decision) = record.pending_decision() {
                info!(
                    "Approval decision for task {} received: approved={}",
                    handle.task_id, decision.approved
                );
                return Ok(ApprovalOutcome::Decided(decision.clone()));
            }

            let now = Instant::now();
            if now >= handle.deadline {
                info!("Approval wait of task {} timed out", handle.task_id);
                return Ok(ApprovalOutcome::Timeout);
            }
            let nap = self.poll_interval.min(handle.deadline - now);
            tokio::select! {
                _ = handle.slot.notify.notified() => {}
                _ = sleep(nap) => {}
            }
        }
    }

    /// Records a decision for `task_id` and wakes its waiter, if any.
    ///
    /// Safe to call before `register` (the waiter finds the recorded decision)
    /// and concurrently with it. The first decision for a round wins; later
    /// ones, and decisions for consumed rounds, are ignored.
    pub fn decide(
        &self,
        task_id: &str,
        decision: ApprovalDecision,
    ) -> Result<DecideOutcome, GateError> {
        let current = self.store.get(task_id)?;
        let round = decision
            .round
            .unwrap_or_else(|| current.decision_target_round());
        if let Some(reason) = ignore_reason(&current, round) {
            debug!("Ignoring decision for task {}: {}", task_id, reason);
            return Ok(DecideOutcome::Ignored(reason));
        }

        let decision = ApprovalDecision {
            round: Some(round),
            ..decision
        };
        let mut patch = Patch::new().set("decision", &decision);
        patch = if decision.approved {
            patch.set("plan_approved", &true).set_null("user_feedback")
        } else {
            patch.set("user_feedback", &decision.feedback)
        };

        let mut rejected = None;
        let written = self.store.put_guarded(task_id, &patch, |latest| {
            rejected = ignore_reason(latest, round);
            rejected.is_none()
        })?;
        if written.is_none() {
            let reason = rejected.unwrap_or("task changed concurrently");
            debug!("Ignoring decision for task {}: {}", task_id, reason);
            return Ok(DecideOutcome::Ignored(reason));
        }

        info!(
            "Recorded decision for task {} round {}: approved={}",
            task_id, round, decision.approved
        );
        Ok(if self.wake(task_id) {
            DecideOutcome::Woken
        } else {
            DecideOutcome::Recorded
        })
    }

    /// Moves a non-terminal task to `Cancelled` and wakes its waiter with a
    /// cancellation outcome. Returns `false` when the task had already ended.
    pub fn cancel(&self, task_id: &str) -> Result<bool, GateError> {
        let patch = Patch::new().set("status", &TaskStatus::Cancelled);
        let cancelled = self
            .store
            .put_guarded(task_id, &patch, |current| !current.status.is_terminal())?
            .is_some();

        if let Some(slot) = self.lock_waits().get(task_id) {
            slot.cancelled.store(true, Ordering::SeqCst);
            slot.notify.notify_one();
        }
        if cancelled {
            info!("Task {} cancelled", task_id);
        }
        Ok(cancelled)
    }

    /// Wakes the local waiter of `task_id` so it re-reads the store
    pub fn wake(&self, task_id: &str) -> bool {
        match self.lock_waits().get(task_id) {
            Some(slot) => {
                slot.notify.notify_one();
                true
            }
            None => false,
        }
    }
}

fn ignore_reason(record: &TaskRecord, round: u32) -> Option<&'static str> {
    if record.status.is_terminal() {
        return Some("task already finished");
    }
    if record.plan_approved {
        return Some("plan already approved");
    }
    if round <= record.consumed_round || round < record.approval_round {
        return Some("approval round already consumed");
    }
    if round > record.decision_target_round() {
        return Some("approval round not open yet");
    }
    if record
        .decision
        .as_ref()
        .is_some_and(|d| d.round == Some(round))
    {
        return Some("decision already recorded for this round");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::{NewTask, OutputFormat};
    use crate::db::test_support::{reopen, temp_database};

    fn setup() -> (tempfile::TempDir, TaskRepository, Arc<ApprovalGate>) {
        let (dir, db) = temp_database();
        let store = TaskRepository::new(db);
        let record = TaskRecord::new(
            "t".to_string(),
            NewTask {
                query: "q".to_string(),
                max_iterations: 2,
                output_format: OutputFormat::Markdown,
                auto_approve: false,
                approval_timeout_secs: 2,
            },
        );
        store.create(&record).unwrap();
        let gate = Arc::new(ApprovalGate::new(store.clone(), Duration::from_millis(200)));
        (dir, store, gate)
    }

    fn open_round(store: &TaskRepository, round: u32) {
        store
            .put(
                "t",
                &Patch::new()
                    .set("status", &TaskStatus::AwaitingApproval)
                    .set("approval_round", &round),
            )
            .unwrap();
    }

    #[tokio::test]
    async fn decision_before_register_is_observed_immediately() {
        let (_dir, store, gate) = setup();
        assert_eq!(
            gate.decide("t", ApprovalDecision::approve()).unwrap(),
            DecideOutcome::Recorded
        );

        open_round(&store, 1);
        let handle = gate.register("t", Duration::from_secs(3600)).unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(5), gate.wait(&handle))
            .await
            .expect("wait must not block")
            .unwrap();
        assert!(matches!(outcome, ApprovalOutcome::Decided(d) if d.approved));
    }

    #[tokio::test]
    async fn second_register_fails_until_first_is_dropped() {
        let (_dir, _store, gate) = setup();
        let first = gate.register("t", Duration::from_secs(1)).unwrap();
        assert!(matches!(
            gate.register("t", Duration::from_secs(1)),
            Err(GateError::AlreadyWaiting(_))
        ));
        drop(first);
        assert!(!gate.is_waiting("t"));
        assert!(gate.register("t", Duration::from_secs(1)).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out_without_decision() {
        let (_dir, store, gate) = setup();
        open_round(&store, 1);
        let handle = gate.register("t", Duration::from_secs(2)).unwrap();
        let started = Instant::now();
        assert_eq!(gate.wait(&handle).await.unwrap(), ApprovalOutcome::Timeout);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn decide_wakes_registered_waiter() {
        let (_dir, store, gate) = setup();
        open_round(&store, 1);
        let handle = gate.register("t", Duration::from_secs(60)).unwrap();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait(&handle).await })
        };
        tokio::task::yield_now().await;
        let outcome = gate
            .decide("t", ApprovalDecision::reject("add benchmarks"))
            .unwrap();
        assert!(matches!(
            outcome,
            DecideOutcome::Woken | DecideOutcome::Recorded
        ));

        let decided = waiter.await.unwrap().unwrap();
        match decided {
            ApprovalOutcome::Decided(d) => {
                assert!(!d.approved);
                assert_eq!(d.feedback.as_deref(), Some("add benchmarks"));
                assert_eq!(d.round, Some(1));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(
            store.get("t").unwrap().user_feedback.as_deref(),
            Some("add benchmarks")
        );
    }

    #[tokio::test]
    async fn first_decision_per_round_wins_and_consumed_rounds_are_ignored() {
        let (_dir, store, gate) = setup();
        open_round(&store, 1);
        gate.decide("t", ApprovalDecision::reject("first")).unwrap();
        assert!(matches!(
            gate.decide("t", ApprovalDecision::approve()).unwrap(),
            DecideOutcome::Ignored(_)
        ));

        // the engine consumes round 1 and opens round 2
        store
            .put(
                "t",
                &Patch::new()
                    .set("consumed_round", &1u32)
                    .set_null("decision")
                    .set("approval_round", &2u32),
            )
            .unwrap();
        assert!(matches!(
            gate.decide("t", ApprovalDecision::approve().for_round(1))
                .unwrap(),
            DecideOutcome::Ignored(_)
        ));
        assert_eq!(
            gate.decide("t", ApprovalDecision::approve().for_round(2))
                .unwrap(),
            DecideOutcome::Recorded
        );
        assert!(store.get("t").unwrap().plan_approved);
    }

    #[tokio::test]
    async fn cancel_wakes_waiter_with_cancellation() {
        let (_dir, store, gate) = setup();
        open_round(&store, 1);
        let handle = gate.register("t", Duration::from_secs(60)).unwrap();
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait(&handle).await })
        };
        tokio::task::yield_now().await;

        assert!(gate.cancel("t").unwrap());
        assert_eq!(waiter.await.unwrap().unwrap(), ApprovalOutcome::Cancelled);
        assert_eq!(store.get("t").unwrap().status, TaskStatus::Cancelled);
        assert!(!gate.cancel("t").unwrap());
    }

    #[tokio::test]
    async fn decision_written_by_another_process_is_found_by_polling() {
        let (dir, store, gate) = setup();
        open_round(&store, 1);
        let handle = gate.register("t", Duration::from_secs(60)).unwrap();

        let api_gate = ApprovalGate::new(
            TaskRepository::new(reopen(&dir)),
            Duration::from_millis(200),
        );
        assert_eq!(
            api_gate.decide("t", ApprovalDecision::approve()).unwrap(),
            DecideOutcome::Recorded
        );

        let outcome = tokio::time::timeout(Duration::from_secs(5), gate.wait(&handle))
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(outcome, ApprovalOutcome::Decided(d) if d.approved));
    }
}
