// tests/job_lifecycle.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, SystemTime};

use cyclerun::clock::ManualClock;
use cyclerun::context::{KeepWaiting, SubmissionCounter};
use cyclerun::errors::{JobError, SubmitError};
use cyclerun::exec::CommandOutput;
use cyclerun::fs::FileSystem;
use cyclerun::fs::mock::MockFileSystem;
use cyclerun::job::sentinel::{self, Sentinel};
use cyclerun::job::{
    JobHandle, JobId, JobServices, SchedulerQueryResolver, SentinelFileResolver, WaitTiming,
    supervise,
};
use cyclerun::scheduler::{SlurmClient, SlurmQuery, SlurmSettings};
use cyclerun::types::Status;
use cyclerun_test_utils::builders::DescriptorBuilder;
use cyclerun_test_utils::fakes::{FnRunner, RecordingClient, TimelineQuery};
use cyclerun_test_utils::init_tracing;

fn slurm_runner(clock: ManualClock) -> Arc<FnRunner> {
    FnRunner::new(move |program, _args| {
        let elapsed = clock.elapsed().as_secs();
        Ok(match program {
            "sbatch" => CommandOutput::ok("Submitted batch job 4242\n"),
            "squeue" if elapsed < 25 => CommandOutput::ok("      4242 PD\n"),
            "squeue" if elapsed < 35 => CommandOutput::ok("      4242  R\n"),
            "squeue" => CommandOutput::ok(""),
            "sacct" => CommandOutput::ok("4242         COMPLETED \n"),
            other => CommandOutput::failed(127, format!("{other}: not found")),
        })
    })
}

#[test]
fn batch_job_is_followed_from_queue_to_completion() {
    init_tracing();
    let fs = MockFileSystem::new();
    let clock = ManualClock::starting_now();
    let runner = slurm_runner(clock.clone());
    let keep = KeepWaiting::new();

    let client = SlurmClient::new(
        SlurmSettings::default(),
        runner.clone(),
        Arc::new(fs.clone()),
        SubmissionCounter::new(),
    );
    let query = SlurmQuery::new(
        SlurmSettings::default(),
        runner.clone(),
        Arc::new(clock.clone()),
        keep.clone(),
    );
    let services = JobServices {
        client: Arc::new(client),
        resolver: Arc::new(SchedulerQueryResolver::new(Arc::new(query))),
        fs: Arc::new(fs.clone()),
        clock: Arc::new(clock.clone()),
        keep_waiting: keep,
        timing: WaitTiming::default(),
    };

    let mut job = JobHandle::submit(DescriptorBuilder::new("wrf").build(), "/run/wrf1", services).unwrap();
    assert_eq!(job.id(), Some(&JobId::new("4242")));
    assert!(fs.exists(Path::new("/run/wrf1/wrf.slurm")));

    let status = job.wait(Duration::from_secs(600)).unwrap();
    assert_eq!(status, Status::Done);
    assert_eq!(clock.elapsed(), Duration::from_secs(35));
    // One line while queued (20s), one while running (10s after start).
    assert_eq!(job.progress_lines(), 2);
    assert_eq!(runner.programs().last().map(String::as_str), Some("sacct"));
}

#[test]
fn refused_submission_reports_missing_job_id() {
    let fs = MockFileSystem::new();
    let runner = FnRunner::new(|_, _| Ok(CommandOutput::failed(1, "sbatch: error: invalid partition")));
    let client = SlurmClient::new(
        SlurmSettings::default(),
        runner,
        Arc::new(fs.clone()),
        SubmissionCounter::new(),
    );
    let clock = ManualClock::starting_now();
    let services = JobServices {
        client: Arc::new(client),
        resolver: Arc::new(SentinelFileResolver::new(Arc::new(fs.clone()))),
        fs: Arc::new(fs),
        clock: Arc::new(clock),
        keep_waiting: KeepWaiting::new(),
        timing: WaitTiming::default(),
    };

    let err = JobHandle::submit(DescriptorBuilder::new("geogrid").build(), "/run/geo1", services).unwrap_err();
    match err {
        SubmitError::NoJobId { job, output, .. } => {
            assert_eq!(job, "geogrid");
            assert!(output.contains("invalid partition"));
        }
        other => panic!("expected NoJobId, got {other:?}"),
    }
}

#[test]
fn partially_failed_ensemble_reruns_only_failed_member() {
    init_tracing();
    let fs = MockFileSystem::new();
    let clock = ManualClock::starting_now();
    let client = RecordingClient::new(500);
    let base = PathBuf::from("/run/wrf1");
    let t0 = SystemTime::UNIX_EPOCH;

    let first = JobId::new("500");
    for task in 0..3 {
        fs.add_file(sentinel::task_path(Sentinel::Start, &base, "wrf", &first, task), "", t0);
    }
    for task in [0, 2] {
        fs.add_file(sentinel::task_path(Sentinel::Done, &base, "wrf", &first, task), "", t0);
    }
    fs.add_file(sentinel::task_path(Sentinel::Error, &base, "wrf", &first, 1), "", t0);

    // The rerun of member 1 finishes as soon as anybody polls.
    let rerun_done = sentinel::task_path(Sentinel::Done, &base, "wrf", &JobId::new("501"), 1);
    let hook_fs = fs.clone();
    clock.on_sleep(move |now| hook_fs.add_file(&rerun_done, "", now));

    let services = JobServices {
        client: client.clone(),
        resolver: Arc::new(SentinelFileResolver::new(Arc::new(fs.clone()))),
        fs: Arc::new(fs.clone()),
        clock: Arc::new(clock.clone()),
        keep_waiting: KeepWaiting::new(),
        timing: WaitTiming::default(),
    };
    let descriptor = DescriptorBuilder::new("wrf").ensemble(2).retry_budget(2).build();
    let mut job = JobHandle::submit(descriptor, base.clone(), services).unwrap();

    supervise(&mut job, Duration::from_secs(600)).unwrap();

    assert_eq!(job.current_status(), Status::Done);
    assert_eq!(job.numtry(), 2);
    assert_eq!(job.id(), Some(&JobId::new("501")));
    let tasks: Vec<_> = client.submissions().into_iter().map(|s| s.tasks).collect();
    assert_eq!(tasks, vec![None, Some(vec![1])]);
    assert!(!fs.exists(&sentinel::task_path(Sentinel::Error, &base, "wrf", &first, 1)));
    assert!(fs.exists(&sentinel::task_path(Sentinel::Done, &base, "wrf", &first, 2)));
}

#[test]
fn scheduler_reported_member_failure_reruns_that_member() {
    init_tracing();
    let fs = MockFileSystem::new();
    let clock = ManualClock::starting_now();
    let next_id = Arc::new(AtomicU32::new(4242));
    let runner = FnRunner::new(move |program, args| {
        let id = args.last().cloned().unwrap_or_default();
        Ok(match program {
            "sbatch" => {
                let id = next_id.fetch_add(1, Ordering::SeqCst);
                CommandOutput::ok(format!("Submitted batch job {id}\n"))
            }
            "squeue" => CommandOutput::ok(""),
            "sacct" if id == "4242" => CommandOutput::ok(
                "4242_0 COMPLETED\n4242_0.batch COMPLETED\n4242_1 FAILED\n4242_1.batch FAILED\n4242_2 COMPLETED\n",
            ),
            "sacct" if id == "4243" => CommandOutput::ok("4243_1 COMPLETED\n4243_1.batch COMPLETED\n"),
            other => CommandOutput::failed(127, format!("{other}: not found")),
        })
    });
    let keep = KeepWaiting::new();
    let services = JobServices {
        client: Arc::new(SlurmClient::new(
            SlurmSettings::default(),
            runner.clone(),
            Arc::new(fs.clone()),
            SubmissionCounter::new(),
        )),
        resolver: Arc::new(SchedulerQueryResolver::new(Arc::new(SlurmQuery::new(
            SlurmSettings::default(),
            runner.clone(),
            Arc::new(clock.clone()),
            keep.clone(),
        )))),
        fs: Arc::new(fs),
        clock: Arc::new(clock),
        keep_waiting: keep,
        timing: WaitTiming::default(),
    };
    let descriptor = DescriptorBuilder::new("wrf").ensemble(2).retry_budget(2).build();
    let mut job = JobHandle::submit(descriptor, "/run/wrf1", services).unwrap();

    assert_eq!(job.wait(Duration::from_secs(600)).unwrap(), Status::PartialFailure);
    assert_eq!(job.failed_tasks(), &[1]);

    supervise(&mut job, Duration::from_secs(600)).unwrap();
    assert_eq!(job.current_status(), Status::Done);
    assert_eq!(job.numtry(), 2);
    assert_eq!(job.id(), Some(&JobId::new("4243")));

    let arrays: Vec<String> = runner
        .calls()
        .into_iter()
        .filter(|(program, _)| program == "sbatch")
        .map(|(_, args)| args[1].clone())
        .collect();
    assert_eq!(arrays, vec!["0-2".to_string(), "1".to_string()]);
}

#[test]
fn failed_job_without_retries_left_stops_supervision() {
    let fs = MockFileSystem::new();
    let clock = ManualClock::starting_now();
    let client = RecordingClient::new(7);
    let query = TimelineQuery::new(clock.clone(), &[(0, Status::Pending), (10, Status::Error)]);
    let services = JobServices {
        client: client.clone(),
        resolver: Arc::new(SchedulerQueryResolver::new(query)),
        fs: Arc::new(fs),
        clock: Arc::new(clock.clone()),
        keep_waiting: KeepWaiting::new(),
        timing: WaitTiming::default(),
    };
    let mut job = JobHandle::submit(DescriptorBuilder::new("real").build(), "/run/real1", services).unwrap();

    let err = supervise(&mut job, Duration::from_secs(600)).unwrap_err();
    assert!(matches!(err, JobError::RetryBudgetExhausted { tries: 1, .. }));
    assert_eq!(client.submissions().len(), 1);
    assert_eq!(clock.elapsed(), Duration::from_secs(10));
}
