//! Queue guarantees checked against any backend
//!
//! Each check drives a [`QueueService`] through its public operations only,
//! so the memory and postgres suites share the same assertions.

use clinic_queue::{
    models::{EntryStatus, QueueEntry},
    queue::ClaimOutcome,
    services::{EnqueueRequest, QueueService},
    Error,
};
use std::collections::HashSet;
use std::sync::Arc;

pub fn enqueue_request(patient_ref: &str, department: &str, priority: i32) -> EnqueueRequest {
    EnqueueRequest {
        patient_ref: patient_ref.to_string(),
        department: department.to_string(),
        priority: priority.into(),
        service_type: None,
        encounter_ref: None,
    }
}

async fn claimed(queue: &QueueService, department: &str, caller: &str) -> QueueEntry {
    match queue.claim_next(department, caller, None).await {
        Ok(ClaimOutcome::Claimed(entry)) => entry,
        other => panic!("expected a claimed entry for {caller}, got {other:?}"),
    }
}

/// M waiting entries, N > M concurrent claimers
pub async fn at_most_once_claim(queue: Arc<QueueService>, waiting: usize, claimers: usize) {
    let department = "Radiology";
    let mut enqueued = HashSet::new();
    for i in 0..waiting {
        let entry = queue
            .enqueue(enqueue_request(&format!("claim-{i}"), department, 3))
            .await
            .expect("enqueue");
        enqueued.insert(entry.id);
    }

    let handles: Vec<_> = (0..claimers)
        .map(|i| {
            let queue = queue.clone();
            tokio::spawn(async move {
                let caller = format!("staff-{i}");
                let outcome = queue
                    .claim_next(department, &caller, None)
                    .await
                    .expect("claim_next");
                (caller, outcome)
            })
        })
        .collect();

    let mut winners = Vec::new();
    let mut empty_handed = 0;
    for handle in handles {
        let (caller, outcome) = handle.await.expect("claimer task");
        match outcome {
            ClaimOutcome::Claimed(entry) => {
                assert_eq!(entry.status, EntryStatus::Called);
                assert_eq!(entry.claimed_by.as_deref(), Some(caller.as_str()));
                winners.push(entry.id);
            }
            ClaimOutcome::NoOneWaiting => empty_handed += 1,
        }
    }

    let expected = waiting.min(claimers);
    assert_eq!(winners.len(), expected, "claimed entries");
    assert_eq!(empty_handed, claimers - expected, "NoOneWaiting outcomes");

    let distinct: HashSet<_> = winners.iter().copied().collect();
    assert_eq!(distinct.len(), winners.len(), "an entry was handed out twice");
    assert!(distinct.is_subset(&enqueued));

    for id in &winners {
        let stored = queue.get(*id).await.expect("get");
        assert_eq!(stored.status, EntryStatus::Called);
        assert!(stored.claimed_by.is_some());
    }
    assert!(queue.list_waiting(department).await.expect("waiting").is_empty());
}

/// Priorities [3, 1, 2] plus a second priority-2 entry
pub async fn ordering_stability(queue: Arc<QueueService>) {
    let department = "Cardiology";
    let low = queue.enqueue(enqueue_request("order-low", department, 3)).await.expect("enqueue");
    let urgent = queue.enqueue(enqueue_request("order-urgent", department, 1)).await.expect("enqueue");
    let first_mid = queue.enqueue(enqueue_request("order-mid-1", department, 2)).await.expect("enqueue");
    let second_mid = queue.enqueue(enqueue_request("order-mid-2", department, 2)).await.expect("enqueue");

    let waiting: Vec<_> = queue
        .list_waiting(department)
        .await
        .expect("waiting")
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(waiting, vec![urgent.id, first_mid.id, second_mid.id, low.id]);

    let mut order = Vec::new();
    for i in 0..4 {
        order.push(claimed(&queue, department, &format!("staff-{i}")).await.id);
    }
    assert_eq!(order, waiting);
}

/// N concurrent enqueues into one department
pub async fn sequence_monotonicity(queue: Arc<QueueService>, count: usize) {
    let department = "Pediatrics";
    let handles: Vec<_> = (0..count)
        .map(|i| {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue
                    .enqueue(enqueue_request(&format!("seq-{i}"), department, 4))
                    .await
                    .expect("enqueue")
            })
        })
        .collect();

    let mut sequences = Vec::new();
    for handle in handles {
        sequences.push(handle.await.expect("enqueue task").sequence);
    }
    sequences.sort_unstable();

    let distinct: HashSet<_> = sequences.iter().copied().collect();
    assert_eq!(distinct.len(), count, "duplicate ticket numbers: {sequences:?}");
    assert!(sequences.windows(2).all(|w| w[0] < w[1]));
    assert!(sequences[0] >= 1);
}

/// Every target is refused once an entry is completed
pub async fn terminal_finality(queue: Arc<QueueService>) {
    let department = "Dermatology";
    let entry = queue
        .enqueue(enqueue_request("final-1", department, 2))
        .await
        .expect("enqueue");
    claimed(&queue, department, "staff-1").await;
    queue
        .transition(entry.id, EntryStatus::InProgress, "staff-1", None)
        .await
        .expect("start");
    let completed = queue
        .transition(entry.id, EntryStatus::Completed, "staff-1", None)
        .await
        .expect("complete");
    assert!(completed.ended_at.is_some());

    let targets = [
        EntryStatus::Waiting,
        EntryStatus::Called,
        EntryStatus::InProgress,
        EntryStatus::Completed,
        EntryStatus::NoShow,
        EntryStatus::Cancelled,
    ];
    for target in targets {
        let err = queue
            .transition(entry.id, target, "staff-2", None)
            .await
            .expect_err("terminal entry accepted a transition");
        assert!(
            matches!(err, Error::EntryFinalized { status: EntryStatus::Completed, .. }),
            "target {target}: unexpected error {err:?}"
        );
    }

    let stored = queue.get(entry.id).await.expect("get");
    assert_eq!(stored.status, EntryStatus::Completed);
    assert_eq!(stored.claimed_by.as_deref(), Some("staff-1"));
}

/// Same patient twice while active, then again after completion
pub async fn no_duplicate_active_membership(queue: Arc<QueueService>) {
    let first = queue
        .enqueue(enqueue_request("dup-1", "General", 3))
        .await
        .expect("enqueue");

    let err = queue
        .enqueue(enqueue_request("dup-1", "Radiology", 1))
        .await
        .expect_err("duplicate while waiting");
    assert!(matches!(err, Error::DuplicateActiveEntry { .. }), "{err:?}");

    claimed(&queue, "General", "staff-1").await;
    let err = queue
        .enqueue(enqueue_request("dup-1", "General", 3))
        .await
        .expect_err("duplicate while called");
    assert!(matches!(err, Error::DuplicateActiveEntry { .. }), "{err:?}");

    queue
        .transition(first.id, EntryStatus::InProgress, "staff-1", None)
        .await
        .expect("start");
    queue
        .transition(first.id, EntryStatus::Completed, "staff-1", None)
        .await
        .expect("complete");

    let again = queue
        .enqueue(enqueue_request("dup-1", "General", 3))
        .await
        .expect("enqueue after completion");
    assert_ne!(again.id, first.id);
    assert_eq!(again.status, EntryStatus::Waiting);
}

/// A (priority 3) then B (priority 1); B is served first
pub async fn two_patient_scenario(queue: Arc<QueueService>) {
    let a = queue
        .enqueue(enqueue_request("patient-a", "General", 3))
        .await
        .expect("enqueue A");
    assert_eq!(a.sequence, 1);
    assert_eq!(a.status, EntryStatus::Waiting);

    let b = queue
        .enqueue(enqueue_request("patient-b", "General", 1))
        .await
        .expect("enqueue B");
    assert_eq!(b.sequence, 2);

    let first = claimed(&queue, "General", "staff1").await;
    assert_eq!(first.id, b.id);
    assert_eq!(first.status, EntryStatus::Called);

    let second = claimed(&queue, "General", "staff2").await;
    assert_eq!(second.id, a.id);

    let third = queue
        .claim_next("General", "staff3", None)
        .await
        .expect("claim_next");
    assert_eq!(third, ClaimOutcome::NoOneWaiting);
}
