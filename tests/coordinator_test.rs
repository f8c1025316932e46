mod common;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use course_planner::client::{ApiError, EnrollmentApi, ErrorKind};
use course_planner::models::{MoveEnrollmentRequest, NewEnrollmentRequest, ScheduledCourse, Slot};
use course_planner::retry::RetryPolicy;
use course_planner::schedule::{
    DragSurface, LoadState, MoveIntent, MoveOutcome, Notice, NoticeReceiver, Notifier,
    RemoveOutcome, ScheduleView, SubmitError,
};

use common::scheduled;

type Reply = oneshot::Sender<Result<ScheduledCourse, ApiError>>;

/// Each move waits until the test answers it, so responses can be reordered.
#[derive(Default)]
struct ManualApi {
    listing: Mutex<Vec<ScheduledCourse>>,
    list_failures: Mutex<VecDeque<ApiError>>,
    list_calls: AtomicUsize,
    moves: Mutex<VecDeque<(MoveEnrollmentRequest, Reply)>>,
    move_calls: AtomicUsize,
    delete_results: Mutex<VecDeque<Result<(), ApiError>>>,
    /// When set, the next delete waits until the test releases it.
    delete_gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl ManualApi {
    fn with_listing(listing: Vec<ScheduledCourse>) -> Arc<Self> {
        Arc::new(Self {
            listing: Mutex::new(listing),
            ..Default::default()
        })
    }

    /// Wait until the coordinator has sent a move and hand it to the test.
    async fn next_move(&self) -> (MoveEnrollmentRequest, Reply) {
        for _ in 0..1000 {
            if let Some(entry) = self.moves.lock().unwrap().pop_front() {
                return entry;
            }
            tokio::task::yield_now().await;
        }
        panic!("no move request was sent");
    }
}

#[async_trait]
impl EnrollmentApi for ManualApi {
    async fn list_enrollments(&self) -> Result<Vec<ScheduledCourse>, ApiError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.list_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(self.listing.lock().unwrap().clone())
    }

    async fn create_enrollment(
        &self,
        req: &NewEnrollmentRequest,
    ) -> Result<ScheduledCourse, ApiError> {
        Ok(scheduled(&req.course_id, "NEW100", req.slot()))
    }

    async fn move_enrollment(
        &self,
        req: &MoveEnrollmentRequest,
    ) -> Result<ScheduledCourse, ApiError> {
        self.move_calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.moves.lock().unwrap().push_back((req.clone(), tx));
        rx.await
            .unwrap_or_else(|_| Err(ApiError::NetworkUnreachable("dropped".to_string())))
    }

    async fn delete_enrollment(&self, _enrollment_id: &str) -> Result<(), ApiError> {
        let gate = self.delete_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.delete_results.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

fn cs101() -> ScheduledCourse {
    scheduled("c1", "CS101", Slot::new(7, 1))
}

fn at(course: &ScheduledCourse, slot: Slot) -> ScheduledCourse {
    let mut record = course.clone();
    record.set_slot(slot);
    record
}

fn intent(course_id: &str, from: Slot, to: Slot) -> MoveIntent {
    MoveIntent {
        course_id: course_id.to_string(),
        from,
        to,
    }
}

fn conflict(message: &str) -> ApiError {
    ApiError::ServerRejected {
        status: 409,
        message: message.to_string(),
    }
}

async fn open_view(api: Arc<ManualApi>) -> (ScheduleView, NoticeReceiver) {
    let (notifier, rx) = Notifier::channel();
    let mut view = ScheduleView::open(api, notifier, RetryPolicy::no_retry());
    assert_eq!(view.sync().await, &LoadState::Ready);
    (view, rx)
}

fn slot_of(view: &ScheduleView, course_id: &str) -> Slot {
    view.snapshot()
        .expect("view should be ready")
        .get(course_id)
        .expect("course should be cached")
        .slot()
}

#[tokio::test]
async fn move_is_visible_before_request_and_confirmed_after() {
    let api = ManualApi::with_listing(vec![cs101()]);
    let (view, mut notices) = open_view(api.clone()).await;
    let coordinator = view.coordinator();

    let pending = coordinator
        .submit(intent("c1", Slot::new(7, 1), Slot::new(9, 1)))
        .expect("submit should succeed");

    // 楽観的に即反映、まだ通信していない
    assert_eq!(slot_of(&view, "c1"), Slot::new(9, 1));
    assert_eq!(api.move_calls.load(Ordering::SeqCst), 0);
    assert!(coordinator.is_pending("c1"));

    let task = tokio::spawn(pending.settle());
    let (req, reply) = api.next_move().await;
    assert_eq!(req.slot(), Slot::new(9, 1));
    assert_eq!(slot_of(&view, "c1"), Slot::new(9, 1));

    reply.send(Ok(at(&cs101(), Slot::new(9, 1)))).unwrap();
    assert_eq!(task.await.unwrap(), MoveOutcome::Confirmed(Slot::new(9, 1)));
    assert_eq!(slot_of(&view, "c1"), Slot::new(9, 1));
    assert!(!coordinator.is_pending("c1"));
    assert!(notices.try_recv().is_err());
}

#[tokio::test]
async fn conflict_reverts_with_specific_message() {
    let api = ManualApi::with_listing(vec![cs101()]);
    let (view, mut notices) = open_view(api.clone()).await;

    let pending = view
        .coordinator()
        .submit(intent("c1", Slot::new(7, 1), Slot::new(9, 1)))
        .unwrap();
    let task = tokio::spawn(pending.settle());
    let (_, reply) = api.next_move().await;
    reply
        .send(Err(conflict("CS101 is not offered in term 9")))
        .unwrap();

    match task.await.unwrap() {
        MoveOutcome::Reverted { restored, error } => {
            assert_eq!(restored, Slot::new(7, 1));
            assert_eq!(error.kind(), ErrorKind::Conflict);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(slot_of(&view, "c1"), Slot::new(7, 1));

    match notices.try_recv().unwrap() {
        Notice::Toast { kind, message } => {
            assert_eq!(kind, ErrorKind::Conflict);
            assert!(message.contains("CS101 is not offered in term 9"));
        }
        other => panic!("unexpected notice: {:?}", other),
    }
}

#[tokio::test]
async fn server_slot_wins_over_optimistic_guess() {
    let api = ManualApi::with_listing(vec![cs101()]);
    let (view, _notices) = open_view(api.clone()).await;

    let pending = view
        .coordinator()
        .submit(intent("c1", Slot::new(7, 1), Slot::new(8, 2)))
        .unwrap();
    let task = tokio::spawn(pending.settle());
    let (_, reply) = api.next_move().await;
    reply.send(Ok(at(&cs101(), Slot::new(8, 1)))).unwrap();

    assert_eq!(task.await.unwrap(), MoveOutcome::Confirmed(Slot::new(8, 1)));
    assert_eq!(slot_of(&view, "c1"), Slot::new(8, 1));
}

#[tokio::test]
async fn stale_response_does_not_overwrite_newer_move() {
    let api = ManualApi::with_listing(vec![cs101()]);
    let (view, _notices) = open_view(api.clone()).await;
    let coordinator = view.coordinator();

    let a = coordinator
        .submit(intent("c1", Slot::new(7, 1), Slot::new(8, 1)))
        .unwrap();
    let task_a = tokio::spawn(a.settle());
    let (_, reply_a) = api.next_move().await;

    let b = coordinator
        .submit(intent("c1", Slot::new(8, 1), Slot::new(9, 1)))
        .unwrap();
    let task_b = tokio::spawn(b.settle());
    let (_, reply_b) = api.next_move().await;

    // A の応答が B の楽観的更新の後に届く
    reply_a.send(Ok(at(&cs101(), Slot::new(8, 1)))).unwrap();
    assert_eq!(task_a.await.unwrap(), MoveOutcome::Superseded);
    assert_eq!(slot_of(&view, "c1"), Slot::new(9, 1));

    reply_b.send(Ok(at(&cs101(), Slot::new(9, 1)))).unwrap();
    assert_eq!(task_b.await.unwrap(), MoveOutcome::Confirmed(Slot::new(9, 1)));
    assert_eq!(slot_of(&view, "c1"), Slot::new(9, 1));
}

#[tokio::test]
async fn late_stale_response_after_confirmation_is_ignored() {
    let api = ManualApi::with_listing(vec![cs101()]);
    let (view, _notices) = open_view(api.clone()).await;
    let coordinator = view.coordinator();

    let task_a = tokio::spawn(
        coordinator
            .submit(intent("c1", Slot::new(7, 1), Slot::new(8, 1)))
            .unwrap()
            .settle(),
    );
    let (_, reply_a) = api.next_move().await;
    let task_b = tokio::spawn(
        coordinator
            .submit(intent("c1", Slot::new(8, 1), Slot::new(9, 1)))
            .unwrap()
            .settle(),
    );
    let (_, reply_b) = api.next_move().await;

    reply_b.send(Ok(at(&cs101(), Slot::new(9, 1)))).unwrap();
    assert_eq!(task_b.await.unwrap(), MoveOutcome::Confirmed(Slot::new(9, 1)));

    reply_a.send(Ok(at(&cs101(), Slot::new(8, 1)))).unwrap();
    assert_eq!(task_a.await.unwrap(), MoveOutcome::Superseded);
    assert_eq!(slot_of(&view, "c1"), Slot::new(9, 1));
}

#[tokio::test]
async fn revert_falls_back_to_slot_confirmed_by_older_move() {
    let api = ManualApi::with_listing(vec![cs101()]);
    let (view, _notices) = open_view(api.clone()).await;
    let coordinator = view.coordinator();

    let task_a = tokio::spawn(
        coordinator
            .submit(intent("c1", Slot::new(7, 1), Slot::new(8, 1)))
            .unwrap()
            .settle(),
    );
    let (_, reply_a) = api.next_move().await;
    let task_b = tokio::spawn(
        coordinator
            .submit(intent("c1", Slot::new(8, 1), Slot::new(9, 1)))
            .unwrap()
            .settle(),
    );
    let (_, reply_b) = api.next_move().await;

    reply_a.send(Ok(at(&cs101(), Slot::new(8, 1)))).unwrap();
    assert_eq!(task_a.await.unwrap(), MoveOutcome::Superseded);

    reply_b.send(Err(ApiError::Timeout)).unwrap();
    assert_eq!(
        task_b.await.unwrap(),
        MoveOutcome::Reverted {
            restored: Slot::new(8, 1),
            error: ApiError::Timeout,
        }
    );
    assert_eq!(slot_of(&view, "c1"), Slot::new(8, 1));
}

#[tokio::test]
async fn stale_success_after_revert_follows_server() {
    let api = ManualApi::with_listing(vec![cs101()]);
    let (view, _notices) = open_view(api.clone()).await;
    let coordinator = view.coordinator();

    let task_a = tokio::spawn(
        coordinator
            .submit(intent("c1", Slot::new(7, 1), Slot::new(8, 1)))
            .unwrap()
            .settle(),
    );
    let (_, reply_a) = api.next_move().await;
    let task_b = tokio::spawn(
        coordinator
            .submit(intent("c1", Slot::new(8, 1), Slot::new(9, 1)))
            .unwrap()
            .settle(),
    );
    let (_, reply_b) = api.next_move().await;

    reply_b.send(Err(conflict("term 9 is full"))).unwrap();
    assert!(matches!(task_b.await.unwrap(), MoveOutcome::Reverted { .. }));
    assert_eq!(slot_of(&view, "c1"), Slot::new(7, 1));

    reply_a.send(Ok(at(&cs101(), Slot::new(8, 1)))).unwrap();
    assert_eq!(task_a.await.unwrap(), MoveOutcome::Superseded);
    assert_eq!(slot_of(&view, "c1"), Slot::new(8, 1));
}

#[tokio::test]
async fn moves_of_different_courses_are_independent() {
    let ma201 = scheduled("c2", "MA201", Slot::new(7, 2));
    let api = ManualApi::with_listing(vec![cs101(), ma201.clone()]);
    let (view, _notices) = open_view(api.clone()).await;
    let coordinator = view.coordinator();

    let task_1 = tokio::spawn(
        coordinator
            .submit(intent("c1", Slot::new(7, 1), Slot::new(9, 1)))
            .unwrap()
            .settle(),
    );
    let (_, reply_1) = api.next_move().await;
    let task_2 = tokio::spawn(
        coordinator
            .submit(intent("c2", Slot::new(7, 2), Slot::new(8, 2)))
            .unwrap()
            .settle(),
    );
    let (_, reply_2) = api.next_move().await;

    reply_2
        .send(Err(ApiError::NetworkUnreachable("connection refused".to_string())))
        .unwrap();
    reply_1.send(Ok(at(&cs101(), Slot::new(9, 1)))).unwrap();

    assert!(matches!(task_2.await.unwrap(), MoveOutcome::Reverted { .. }));
    assert_eq!(task_1.await.unwrap(), MoveOutcome::Confirmed(Slot::new(9, 1)));
    assert_eq!(slot_of(&view, "c1"), Slot::new(9, 1));
    assert_eq!(slot_of(&view, "c2"), Slot::new(7, 2));
}

#[tokio::test]
async fn no_op_and_cancelled_drags_never_reach_the_network() {
    let api = ManualApi::with_listing(vec![cs101()]);
    let (view, _notices) = open_view(api.clone()).await;
    let before = view.snapshot().unwrap();
    let mut drag = DragSurface::grid(1..=12, 1..=6);

    drag.begin("c1", Slot::new(7, 1));
    let result = drag.drop_on(Some(Slot::new(7, 1)));
    assert!(view.submit_drop(result).is_none());

    drag.begin("c1", Slot::new(7, 1));
    let result = drag.drop_on(None);
    assert!(view.submit_drop(result).is_none());

    tokio::task::yield_now().await;
    assert_eq!(api.move_calls.load(Ordering::SeqCst), 0);
    assert_eq!(view.snapshot().unwrap(), before);
}

#[tokio::test]
async fn drop_on_new_slot_goes_through_coordinator() {
    let api = ManualApi::with_listing(vec![cs101()]);
    let (view, _notices) = open_view(api.clone()).await;
    let mut drag = DragSurface::grid(1..=12, 1..=6);

    drag.begin("c1", Slot::new(7, 1));
    drag.hover(Some(Slot::new(9, 1)));
    let pending = view
        .submit_drop(drag.drop_on(Some(Slot::new(9, 1))))
        .expect("drop should produce a move");
    assert_eq!(slot_of(&view, "c1"), Slot::new(9, 1));

    let task = tokio::spawn(pending.settle());
    let (_, reply) = api.next_move().await;
    reply.send(Ok(at(&cs101(), Slot::new(9, 1)))).unwrap();
    assert_eq!(task.await.unwrap(), MoveOutcome::Confirmed(Slot::new(9, 1)));
}

#[tokio::test]
async fn submit_rejects_before_any_request() {
    let api = ManualApi::with_listing(vec![cs101()]);
    let (view, _notices) = open_view(api.clone()).await;
    let coordinator = view.coordinator();

    assert_eq!(
        coordinator.submit(intent("c1", Slot::new(7, 1), Slot::new(7, 1))).err(),
        Some(SubmitError::Unchanged)
    );
    assert!(matches!(
        coordinator.submit(intent("c1", Slot::new(7, 1), Slot::new(0, 1))).err(),
        Some(SubmitError::InvalidSlot(_))
    ));
    assert_eq!(
        coordinator.submit(intent("zz", Slot::new(7, 1), Slot::new(8, 1))).err(),
        Some(SubmitError::UnknownCourse("zz".to_string()))
    );
    assert_eq!(api.move_calls.load(Ordering::SeqCst), 0);
    assert_eq!(slot_of(&view, "c1"), Slot::new(7, 1));
}

#[tokio::test]
async fn timeout_and_network_failures_have_different_messages() {
    let api = ManualApi::with_listing(vec![cs101()]);
    let (view, mut notices) = open_view(api.clone()).await;
    let coordinator = view.coordinator();

    let mut messages = Vec::new();
    for error in [
        ApiError::Timeout,
        ApiError::NetworkUnreachable("connection refused".to_string()),
    ] {
        let task = tokio::spawn(
            coordinator
                .submit(intent("c1", Slot::new(7, 1), Slot::new(9, 1)))
                .unwrap()
                .settle(),
        );
        let (_, reply) = api.next_move().await;
        reply.send(Err(error)).unwrap();
        assert!(matches!(task.await.unwrap(), MoveOutcome::Reverted { .. }));
        assert_eq!(slot_of(&view, "c1"), Slot::new(7, 1));

        match notices.try_recv().unwrap() {
            Notice::Toast { kind, message } => {
                assert_eq!(kind, ErrorKind::Transient);
                messages.push(message);
            }
            other => panic!("unexpected notice: {:?}", other),
        }
    }
    assert_ne!(messages[0], messages[1]);
}

#[tokio::test]
async fn auth_failure_redirects_to_login() {
    let api = ManualApi::with_listing(vec![cs101()]);
    let (view, mut notices) = open_view(api.clone()).await;

    let task = tokio::spawn(
        view.coordinator()
            .submit(intent("c1", Slot::new(7, 1), Slot::new(9, 1)))
            .unwrap()
            .settle(),
    );
    let (_, reply) = api.next_move().await;
    reply
        .send(Err(ApiError::ServerRejected {
            status: 401,
            message: "Authentication required".to_string(),
        }))
        .unwrap();

    assert!(matches!(task.await.unwrap(), MoveOutcome::Reverted { .. }));
    assert_eq!(notices.try_recv().unwrap(), Notice::LoginRequired);
}

#[tokio::test]
async fn response_after_view_closed_is_dropped_safely() {
    let api = ManualApi::with_listing(vec![cs101()]);
    let (view, mut notices) = open_view(api.clone()).await;
    let coordinator = view.coordinator();

    let task = tokio::spawn(
        coordinator
            .submit(intent("c1", Slot::new(7, 1), Slot::new(9, 1)))
            .unwrap()
            .settle(),
    );
    let (_, reply) = api.next_move().await;
    drop(view);

    reply.send(Ok(at(&cs101(), Slot::new(9, 1)))).unwrap();
    assert_eq!(task.await.unwrap(), MoveOutcome::Abandoned);
    assert!(notices.try_recv().is_err());
    assert_eq!(
        coordinator.submit(intent("c1", Slot::new(9, 1), Slot::new(8, 1))).err(),
        Some(SubmitError::ViewClosed)
    );
}

#[tokio::test]
async fn view_shows_nothing_until_synced() {
    let api = ManualApi::with_listing(vec![cs101(), scheduled("c2", "MA201", Slot::new(8, 1))]);
    let (notifier, _rx) = Notifier::channel();
    let mut view = ScheduleView::open(api.clone(), notifier, RetryPolicy::no_retry());

    assert_eq!(view.state(), &LoadState::Loading);
    assert!(view.snapshot().is_none());
    assert_eq!(api.list_calls.load(Ordering::SeqCst), 0);

    view.sync().await;
    let snapshot = view.snapshot().unwrap();
    assert_eq!(snapshot.len(), 2);

    // 再同期はサーバーの一覧で丸ごと置き換える
    *api.listing.lock().unwrap() = vec![scheduled("c3", "PH110", Slot::new(1, 1))];
    view.sync().await;
    let snapshot = view.snapshot().unwrap();
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot.get("c1").is_none());
    assert!(snapshot.get("c3").is_some());
}

#[tokio::test]
async fn sync_retries_transient_failures() {
    let api = ManualApi::with_listing(vec![cs101()]);
    api.list_failures
        .lock()
        .unwrap()
        .extend([ApiError::Timeout, ApiError::NetworkUnreachable("down".to_string())]);

    let (notifier, _rx) = Notifier::channel();
    let policy = RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        multiplier: 2.0,
    };
    let mut view = ScheduleView::open(api.clone(), notifier, policy);

    assert_eq!(view.sync().await, &LoadState::Ready);
    assert_eq!(api.list_calls.load(Ordering::SeqCst), 3);
    assert_eq!(view.snapshot().unwrap().len(), 1);
}

#[tokio::test]
async fn sync_failure_is_visible() {
    let api = ManualApi::with_listing(vec![cs101()]);
    api.list_failures.lock().unwrap().push_back(ApiError::ServerRejected {
        status: 500,
        message: "Database error occurred".to_string(),
    });

    let (notifier, mut notices) = Notifier::channel();
    let mut view = ScheduleView::open(api.clone(), notifier, RetryPolicy::default());

    assert!(matches!(view.sync().await, LoadState::Failed(_)));
    assert!(view.snapshot().is_none());
    assert_eq!(api.list_calls.load(Ordering::SeqCst), 1);
    assert!(matches!(
        notices.try_recv().unwrap(),
        Notice::Toast { kind: ErrorKind::Unexpected, .. }
    ));
}

#[tokio::test]
async fn remove_restores_entry_when_server_refuses() {
    let api = ManualApi::with_listing(vec![cs101()]);
    let (view, mut notices) = open_view(api.clone()).await;
    let coordinator = view.coordinator();

    api.delete_results.lock().unwrap().push_back(Err(ApiError::ServerRejected {
        status: 403,
        message: "Not allowed to modify this enrollment".to_string(),
    }));
    let outcome = coordinator.remove_course("e-c1").await;
    assert!(matches!(outcome, RemoveOutcome::Restored(_)));
    assert!(view.snapshot().unwrap().get("c1").is_some());
    assert!(matches!(
        notices.try_recv().unwrap(),
        Notice::Toast { kind: ErrorKind::Forbidden, .. }
    ));

    api.delete_results.lock().unwrap().push_back(Err(ApiError::ServerRejected {
        status: 404,
        message: "Enrollment not found".to_string(),
    }));
    assert_eq!(coordinator.remove_course("e-c1").await, RemoveOutcome::Removed);
    assert!(view.snapshot().unwrap().is_empty());

    assert_eq!(coordinator.remove_course("e-c1").await, RemoveOutcome::Missing);
}

#[tokio::test]
async fn add_course_inserts_server_record() {
    let api = ManualApi::with_listing(vec![]);
    let (view, _notices) = open_view(api.clone()).await;

    let record = view
        .coordinator()
        .add_course("c5", Slot::new(2, 3))
        .await
        .unwrap();
    assert_eq!(record.slot(), Slot::new(2, 3));
    assert_eq!(slot_of(&view, "c5"), Slot::new(2, 3));

    let invalid = view.coordinator().add_course("c6", Slot::new(2, 0)).await;
    assert!(matches!(invalid, Err(ApiError::Invalid(_))));
}

#[tokio::test]
async fn dropped_pending_move_rolls_back() {
    let api = ManualApi::with_listing(vec![cs101()]);
    let (view, mut notices) = open_view(api.clone()).await;
    let coordinator = view.coordinator();

    let pending = coordinator
        .submit(intent("c1", Slot::new(7, 1), Slot::new(9, 1)))
        .unwrap();
    assert_eq!(slot_of(&view, "c1"), Slot::new(9, 1));
    drop(pending);

    assert_eq!(slot_of(&view, "c1"), Slot::new(7, 1));
    assert_eq!(api.move_calls.load(Ordering::SeqCst), 0);
    assert!(!coordinator.is_pending("c1"));
    assert!(notices.try_recv().is_err());
}

#[tokio::test]
async fn aborted_settle_rolls_back() {
    let api = ManualApi::with_listing(vec![cs101()]);
    let (view, _notices) = open_view(api.clone()).await;
    let coordinator = view.coordinator();

    let task = tokio::spawn(
        coordinator
            .submit(intent("c1", Slot::new(7, 1), Slot::new(9, 1)))
            .unwrap()
            .settle(),
    );
    let (_, _reply) = api.next_move().await;

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());
    assert_eq!(slot_of(&view, "c1"), Slot::new(7, 1));
    assert!(!coordinator.is_pending("c1"));
}

#[tokio::test]
async fn resync_during_move_sets_revert_target() {
    let api = ManualApi::with_listing(vec![cs101()]);
    let (mut view, _notices) = open_view(api.clone()).await;

    let task = tokio::spawn(
        view.coordinator()
            .submit(intent("c1", Slot::new(7, 1), Slot::new(9, 1)))
            .unwrap()
            .settle(),
    );
    let (_, reply) = api.next_move().await;

    // 別の端末で (5,2) に移動された
    *api.listing.lock().unwrap() = vec![at(&cs101(), Slot::new(5, 2))];
    assert_eq!(view.sync().await, &LoadState::Ready);
    assert_eq!(slot_of(&view, "c1"), Slot::new(5, 2));

    reply.send(Err(ApiError::Timeout)).unwrap();
    assert_eq!(
        task.await.unwrap(),
        MoveOutcome::Reverted {
            restored: Slot::new(5, 2),
            error: ApiError::Timeout,
        }
    );
    assert_eq!(slot_of(&view, "c1"), Slot::new(5, 2));
}

#[tokio::test]
async fn restored_entry_keeps_slot_settled_during_delete() {
    let api = ManualApi::with_listing(vec![cs101()]);
    let (view, _notices) = open_view(api.clone()).await;
    let coordinator = view.coordinator();

    let move_task = tokio::spawn(
        coordinator
            .submit(intent("c1", Slot::new(7, 1), Slot::new(8, 2)))
            .unwrap()
            .settle(),
    );
    let (_, reply) = api.next_move().await;

    let (release, gate) = oneshot::channel();
    *api.delete_gate.lock().unwrap() = Some(gate);
    api.delete_results.lock().unwrap().push_back(Err(conflict("Enrollment is locked")));
    let remover = coordinator.clone();
    let remove_task = tokio::spawn(async move { remover.remove_course("e-c1").await });
    for _ in 0..1000 {
        if view.snapshot().unwrap().get("c1").is_none() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(view.snapshot().unwrap().get("c1").is_none());

    // 削除待ちの間にサーバーが (8,1) に正規化して確定
    reply.send(Ok(at(&cs101(), Slot::new(8, 1)))).unwrap();
    assert_eq!(move_task.await.unwrap(), MoveOutcome::Confirmed(Slot::new(8, 1)));

    release.send(()).unwrap();
    assert!(matches!(remove_task.await.unwrap(), RemoveOutcome::Restored(_)));
    assert_eq!(slot_of(&view, "c1"), Slot::new(8, 1));
}
