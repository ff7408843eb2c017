// tests/property_job.rs

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use proptest::prelude::*;
use cyclerun::clock::ManualClock;
use cyclerun::context::KeepWaiting;
use cyclerun::errors::JobError;
use cyclerun::fs::mock::MockFileSystem;
use cyclerun::job::{
    JobHandle, JobServices, JobView, Resolution, StatusResolver, WaitTiming, supervise,
};
use cyclerun::types::Status;
use cyclerun_test_utils::builders::DescriptorBuilder;
use cyclerun_test_utils::fakes::RecordingClient;

/// Replays a fixed list of statuses, then keeps reporting the last one.
#[derive(Debug)]
struct Replay(Mutex<VecDeque<Status>>);

impl StatusResolver for Replay {
    fn resolve(&self, _job: &JobView<'_>) -> Resolution {
        let mut q = self.0.lock().unwrap();
        let status = if q.len() > 1 {
            q.pop_front().unwrap_or(Status::Unknown)
        } else {
            q.front().copied().unwrap_or(Status::Unknown)
        };
        Resolution::plain(status)
    }
}

fn status_strategy() -> impl Strategy<Value = Status> {
    prop_oneof![
        Just(Status::Pending),
        Just(Status::Running),
        Just(Status::Unknown),
        Just(Status::Done),
        Just(Status::Error),
        Just(Status::PartialFailure),
    ]
}

fn rank(status: Status) -> u8 {
    if status.is_terminal() {
        2
    } else if status == Status::Running {
        1
    } else {
        0
    }
}

fn handle(statuses: Vec<Status>, budget: u32) -> (JobHandle, Arc<RecordingClient>) {
    let client = RecordingClient::new(1);
    let fs = MockFileSystem::new();
    let services = JobServices {
        client: client.clone(),
        resolver: Arc::new(Replay(Mutex::new(statuses.into()))),
        fs: Arc::new(fs),
        clock: Arc::new(ManualClock::starting_now()),
        keep_waiting: KeepWaiting::new(),
        timing: WaitTiming::default(),
    };
    let descriptor = DescriptorBuilder::new("wrf")
        .walltime_minutes(1)
        .retry_budget(budget)
        .build();
    let job = JobHandle::submit(descriptor, "/run/wrf1", services).unwrap();
    (job, client)
}

proptest! {
    #[test]
    fn status_never_moves_backwards(statuses in proptest::collection::vec(status_strategy(), 1..20)) {
        let n = statuses.len();
        let (mut job, _) = handle(statuses, 1);

        let mut last = job.current_status();
        for _ in 0..n + 2 {
            let now = job.status();
            prop_assert!(rank(now) >= rank(last), "{last} -> {now}");
            if last.is_terminal() {
                prop_assert_eq!(now, last);
            }
            last = now;
        }
    }

    #[test]
    fn tries_never_exceed_retry_budget(budget in 1u32..5, failures in 0usize..6) {
        let mut statuses = vec![Status::Error; failures];
        statuses.push(Status::Done);
        let (mut job, client) = handle(statuses, budget);

        let result = supervise(&mut job, Duration::from_secs(60));

        prop_assert!(job.numtry() <= budget);
        prop_assert_eq!(client.submissions().len() as u32, job.numtry());
        if failures < budget as usize {
            prop_assert!(result.is_ok());
            prop_assert_eq!(job.numtry() as usize, failures + 1);
        } else {
            let exhausted = matches!(result, Err(JobError::RetryBudgetExhausted { .. }));
            prop_assert!(exhausted);
            prop_assert_eq!(job.numtry(), budget);
        }
    }
}
