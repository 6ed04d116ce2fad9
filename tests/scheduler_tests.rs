
use gridrun::job::JobEvent;
use gridrun::proto::{NODE_JOB_COMPLETION_NOT_FOUND, NODE_OK};
use gridrun::worker::{Availability, WorkerCommand, WorkerTask};
use test_support::{collect_events, job_with, make_job, Fixture};

fn complete_ok(fx: &Fixture, job_id: i64, task_id: u32, ip: &str) {
    fx.scheduler
        .on_task_completion(NODE_OK, 5, WorkerTask::new(job_id, task_id), ip);
}

#[test]
fn happy_path_two_workers() {
    let fx = Fixture::new();
    fx.add_worker("w1", 2);
    fx.add_worker("w2", 2);

    let job = make_job(1, 4);
    let events = collect_events(&job);
    fx.submit(job, 0);

    let (batch1, ip1, job1) = fx.scheduler.get_task_to_send().unwrap();
    assert_eq!(job1.id(), 1);
    assert_eq!(ip1, "w1");
    assert_eq!(batch1.total_tasks(), 2);

    let (batch2, ip2, _) = fx.scheduler.get_task_to_send().unwrap();
    assert_eq!(ip2, "w2");
    assert_eq!(batch2.total_tasks(), 2);

    assert!(fx.scheduler.get_task_to_send().is_none());

    for task in batch1.iter() {
        complete_ok(&fx, task.job_id, task.task_id, "w1");
    }
    for task in batch2.iter() {
        complete_ok(&fx, task.job_id, task.task_id, "w2");
    }

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    match &events[0] {
        JobEvent::Completed { job_id, status, .. } => {
            assert_eq!(*job_id, 1);
            assert_eq!(status, "success");
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert_eq!(fx.scheduler.num_active_jobs(), 0);
}

#[test]
fn every_planned_task_is_dispatched_exactly_once() {
    let fx = Fixture::new();
    fx.add_worker("w1", 2);
    fx.add_worker("w2", 2);

    let job = make_job(1, 4);
    fx.submit(job, 0);

    let mut seen = Vec::new();
    while let Some((batch, _ip, _job)) = fx.scheduler.get_task_to_send() {
        for task in batch.iter() {
            seen.push(task.task_id);
        }
    }
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 1, 2, 3]);
    assert_eq!(fx.scheduler.num_tasks_to_send(1), 0);
}

#[test]
fn worker_lost_midflight_reschedules_to_survivor() {
    let fx = Fixture::new();
    let w1 = fx.add_worker("w1", 2);
    fx.add_worker("w2", 2);

    let job = job_with(1, |p| {
        p.limits.num_exec = 4;
        p.limits.max_failed_nodes = 2;
    });
    let events = collect_events(&job);
    fx.submit(job, 0);

    let (batch1, ip1, _) = fx.scheduler.get_task_to_send().unwrap();
    assert_eq!(ip1, "w1");
    let (batch2, ip2, _) = fx.scheduler.get_task_to_send().unwrap();
    assert_eq!(ip2, "w2");

    w1.set_availability(Availability::NotAvail);
    fx.scheduler.on_changed_worker_state(&[w1.clone()]);

    assert_eq!(fx.scheduler.num_need_reschedule(), 2);
    let (busy, assigned) = fx.scheduler.node_snapshot("w1").unwrap();
    assert_eq!(busy, 0);
    assert!(assigned.is_empty());

    // w2 is saturated until its first batch completes
    assert!(fx.scheduler.get_task_to_send().is_none());
    for task in batch2.iter() {
        complete_ok(&fx, task.job_id, task.task_id, "w2");
    }

    let (rebatch, ip, _) = fx.scheduler.get_task_to_send().unwrap();
    assert_eq!(ip, "w2");
    let mut expected: Vec<u32> = batch1.iter().map(|t| t.task_id).collect();
    let mut got: Vec<u32> = rebatch.iter().map(|t| t.task_id).collect();
    expected.sort_unstable();
    got.sort_unstable();
    assert_eq!(got, expected);

    for task in rebatch.iter() {
        complete_ok(&fx, task.job_id, task.task_id, "w2");
    }

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(
        matches!(&events[0], JobEvent::Completed { status, .. } if status == "success"),
        "got {:?}",
        events[0]
    );
}

#[test]
fn max_failed_nodes_aborts_job() {
    let fx = Fixture::new();
    fx.add_worker("w1", 1);
    let w2 = fx.add_worker("w2", 1);

    let job = job_with(1, |p| {
        p.limits.num_exec = 2;
        p.limits.max_failed_nodes = 1;
    });
    let events = collect_events(&job);
    fx.submit(job, 0);

    let (_b1, ip1, _) = fx.scheduler.get_task_to_send().unwrap();
    let (_b2, ip2, _) = fx.scheduler.get_task_to_send().unwrap();
    assert_eq!((ip1.as_str(), ip2.as_str()), ("w1", "w2"));

    fx.scheduler
        .on_task_completion(13, 0, WorkerTask::new(1, 0), "w1");

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        JobEvent::Completed { status, .. } if status == "max failed nodes limit exceeded"
    ));

    // the other holder was told to stop and its capacity was returned
    assert_eq!(w2.num_pending_commands(), 1);
    let (busy, _) = fx.scheduler.node_snapshot("w2").unwrap();
    assert_eq!(busy, 0);
    assert_eq!(fx.scheduler.num_active_jobs(), 0);
    assert_eq!(fx.scheduler.num_need_reschedule(), 0);
}

#[test]
fn dag_successor_waits_for_predecessor() {
    let fx = Fixture::new();
    fx.add_worker("w1", 1);

    let a = make_job(1, 1);
    let b = make_job(2, 1);
    let (_group, sorted) = gridrun::job::build_job_group(&[a, b], &[vec![0, 1]]).unwrap();
    fx.queue.push_all(sorted, 0);
    fx.scheduler.on_new_job();

    let (_batch, ip, job) = fx.scheduler.get_task_to_send().unwrap();
    assert_eq!(job.id(), 1);
    assert_eq!(fx.queue.len(), 1, "successor must stay queued");

    complete_ok(&fx, 1, 0, &ip);

    // predecessor done: the next placement round plans and serves b
    assert!(fx.scheduler.get_task_to_send().is_none());
    let (_batch, _ip, job) = fx.scheduler.get_task_to_send().unwrap();
    assert_eq!(job.id(), 2);
}

#[test]
fn exclusive_job_runs_alone() {
    let fx = Fixture::new();
    fx.add_worker("w1", 4);

    let x = job_with(1, |p| {
        p.limits.num_exec = 2;
        p.exclusive = true;
    });
    let y = make_job(2, 2);
    let x_events = collect_events(&x);
    fx.submit(x, 0);
    fx.submit(y, 1);

    let (batch, _ip, job) = fx.scheduler.get_task_to_send().unwrap();
    assert_eq!(job.id(), 1);
    assert_eq!(batch.total_tasks(), 2);

    // y may not share the worker while x holds it
    assert!(fx.scheduler.get_task_to_send().is_none());

    for task in batch.iter() {
        complete_ok(&fx, task.job_id, task.task_id, "w1");
    }
    assert_eq!(x_events.lock().unwrap().len(), 1);

    let (batch, _ip, job) = fx.scheduler.get_task_to_send().unwrap();
    assert_eq!(job.id(), 2);
    assert_eq!(batch.total_tasks(), 2);
}

#[test]
fn normal_job_blocks_incoming_exclusive() {
    let fx = Fixture::new();
    fx.add_worker("w1", 4);

    let x = make_job(1, 1);
    let y = job_with(2, |p| {
        p.limits.num_exec = 1;
        p.exclusive = true;
    });
    fx.submit(x, 0);
    fx.submit(y, 1);

    let (_batch, _ip, job) = fx.scheduler.get_task_to_send().unwrap();
    assert_eq!(job.id(), 1);
    assert!(fx.scheduler.get_task_to_send().is_none());

    complete_ok(&fx, 1, 0, "w1");
    let (_batch, _ip, job) = fx.scheduler.get_task_to_send().unwrap();
    assert_eq!(job.id(), 2);
}

#[test]
fn duplicate_completion_decrements_once() {
    let fx = Fixture::new();
    fx.add_worker("w1", 2);

    let job = make_job(7, 2);
    let events = collect_events(&job);
    fx.submit(job, 0);

    let (_batch, _ip, _job) = fx.scheduler.get_task_to_send().unwrap();

    complete_ok(&fx, 7, 0, "w1");
    complete_ok(&fx, 7, 0, "w1");
    assert_eq!(fx.scheduler.num_active_jobs(), 1, "duplicate must not count");

    complete_ok(&fx, 7, 1, "w1");
    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], JobEvent::Completed { status, .. } if status == "success"));
}

#[test]
fn completion_not_found_is_ignored() {
    let fx = Fixture::new();
    fx.add_worker("w1", 1);

    let job = make_job(1, 1);
    fx.submit(job, 0);
    let (_batch, _ip, _job) = fx.scheduler.get_task_to_send().unwrap();

    fx.scheduler.on_task_completion(
        NODE_JOB_COMPLETION_NOT_FOUND,
        0,
        WorkerTask::new(1, 0),
        "w1",
    );

    let (busy, assigned) = fx.scheduler.node_snapshot("w1").unwrap();
    assert_eq!(busy, 1);
    assert!(assigned.has_task(1, 0));
    assert_eq!(fx.scheduler.num_active_jobs(), 1);
}

#[test]
fn no_worker_is_oversubscribed() {
    let fx = Fixture::new();
    fx.add_worker("w1", 2);

    let job = make_job(1, 8);
    fx.submit(job, 0);

    let (batch, _ip, _job) = fx.scheduler.get_task_to_send().unwrap();
    assert_eq!(batch.total_tasks(), 2);
    assert!(fx.scheduler.get_task_to_send().is_none());

    let (busy, _) = fx.scheduler.node_snapshot("w1").unwrap();
    assert_eq!(busy, 2);
}

#[test]
fn failed_worker_never_gets_the_job_again() {
    let fx = Fixture::new();
    fx.add_worker("w1", 1);
    fx.add_worker("w2", 1);

    let job = job_with(1, |p| {
        p.limits.num_exec = 2;
        p.limits.max_failed_nodes = 2;
    });
    fx.submit(job, 0);

    let (_b1, ip1, _) = fx.scheduler.get_task_to_send().unwrap();
    assert_eq!(ip1, "w1");
    let (b2, ip2, _) = fx.scheduler.get_task_to_send().unwrap();
    assert_eq!(ip2, "w2");

    // w1 reports a task error: blocklisted, its task queued for reschedule
    fx.scheduler
        .on_task_completion(99, 0, WorkerTask::new(1, 0), "w1");
    assert_eq!(fx.scheduler.num_need_reschedule(), 1);

    // w1 has free CPU but must not receive the task back
    assert!(fx.scheduler.get_task_to_send().is_none());

    for task in b2.iter() {
        complete_ok(&fx, task.job_id, task.task_id, "w2");
    }
    let (rebatch, ip, _) = fx.scheduler.get_task_to_send().unwrap();
    assert_eq!(ip, "w2");
    assert_eq!(rebatch.total_tasks(), 1);
}

#[test]
fn per_host_cap_limits_tasks() {
    let fx = Fixture::new();
    fx.add_worker("w1", 4);

    let job = job_with(1, |p| {
        p.limits.num_exec = 4;
        p.limits.max_cpu_per_host = 1;
    });
    fx.submit(job, 0);

    let (batch, _ip, _job) = fx.scheduler.get_task_to_send().unwrap();
    assert_eq!(batch.total_tasks(), 1);
    assert!(fx.scheduler.get_task_to_send().is_none());

    let (busy, _) = fx.scheduler.node_snapshot("w1").unwrap();
    assert_eq!(busy, 1);
}

#[test]
fn send_failure_reschedules_elsewhere() {
    let fx = Fixture::new();
    fx.add_worker("w1", 2);
    fx.add_worker("w2", 2);

    let job = job_with(1, |p| {
        p.limits.num_exec = 2;
        p.limits.max_failed_nodes = 2;
    });
    fx.submit(job, 0);

    let (batch, ip, _) = fx.scheduler.get_task_to_send().unwrap();
    assert_eq!(ip, "w1");

    fx.scheduler.on_task_send_completion(false, &batch, "w1");
    let (busy, assigned) = fx.scheduler.node_snapshot("w1").unwrap();
    assert_eq!(busy, 0);
    assert!(assigned.is_empty());

    let (rebatch, ip, _) = fx.scheduler.get_task_to_send().unwrap();
    assert_eq!(ip, "w2");
    assert_eq!(rebatch.total_tasks(), 2);
}

#[test]
fn send_success_needs_no_bookkeeping() {
    let fx = Fixture::new();
    fx.add_worker("w1", 2);

    let job = make_job(1, 2);
    fx.submit(job, 0);
    let (batch, ip, _) = fx.scheduler.get_task_to_send().unwrap();

    fx.scheduler.on_task_send_completion(true, &batch, &ip);
    let (busy, assigned) = fx.scheduler.node_snapshot("w1").unwrap();
    assert_eq!(busy, 2);
    assert_eq!(assigned.total_tasks(), 2);
}

#[test]
fn no_reschedule_job_abandons_failed_tasks() {
    let fx = Fixture::new();
    fx.add_worker("w1", 2);

    let job = job_with(1, |p| {
        p.limits.num_exec = 2;
        p.limits.max_failed_nodes = 5;
        p.no_reschedule = true;
    });
    let events = collect_events(&job);
    fx.submit(job, 0);

    let (_batch, _ip, _job) = fx.scheduler.get_task_to_send().unwrap();
    fx.scheduler
        .on_task_completion(42, 0, WorkerTask::new(1, 0), "w1");

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(
        matches!(&events[0], JobEvent::Completed { status, .. } if status == "failed (2 tasks abandoned)"),
        "got {:?}",
        events[0]
    );
    assert_eq!(fx.scheduler.num_need_reschedule(), 0);
}

#[test]
fn task_timeout_stops_and_reschedules() {
    let fx = Fixture::new();
    let w1 = fx.add_worker("w1", 1);

    let job = job_with(1, |p| {
        p.limits.num_exec = 1;
        p.limits.max_failed_nodes = 2;
        p.timeouts.task_timeout = 30;
    });
    fx.submit(job, 0);
    let (_batch, _ip, _job) = fx.scheduler.get_task_to_send().unwrap();

    // dispatch armed a per-task timeout
    assert_eq!(fx.timeouts.task_timeouts.lock().unwrap().len(), 1);

    fx.scheduler.on_task_timeout(WorkerTask::new(1, 0), "w1");

    assert_eq!(w1.num_pending_commands(), 1);
    assert!(matches!(
        w1.pop_command().unwrap().command,
        WorkerCommand::StopTask {
            job_id: 1,
            task_id: 0
        }
    ));
    let (busy, _) = fx.scheduler.node_snapshot("w1").unwrap();
    assert_eq!(busy, 0);
    assert_eq!(fx.scheduler.num_need_reschedule(), 1);

    // a second timeout for the same task is a no-op
    fx.scheduler.on_task_timeout(WorkerTask::new(1, 0), "w1");
    assert_eq!(fx.scheduler.num_need_reschedule(), 1);
}

#[test]
fn job_timeout_aborts_and_stops_holders() {
    let fx = Fixture::new();
    let w1 = fx.add_worker("w1", 2);

    let job = make_job(1, 2);
    let events = collect_events(&job);
    fx.submit(job, 0);
    let (_batch, _ip, _job) = fx.scheduler.get_task_to_send().unwrap();

    fx.scheduler.on_job_timeout(1);

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], JobEvent::Completed { status, .. } if status == "timeout"));
    assert_eq!(w1.num_pending_commands(), 2);
    let (busy, _) = fx.scheduler.node_snapshot("w1").unwrap();
    assert_eq!(busy, 0);

    // already removed: a second timeout does nothing
    fx.scheduler.on_job_timeout(1);
}

#[test]
fn stop_job_deletes_queued_job() {
    let fx = Fixture::new();
    // no workers: the job stays queued
    let job = make_job(1, 1);
    let events = collect_events(&job);
    fx.submit(job, 0);

    assert!(fx.scheduler.stop_job(1));
    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], JobEvent::Deleted { job_id: 1, .. }));
}

#[test]
fn stop_job_aborts_active_job() {
    let fx = Fixture::new();
    fx.add_worker("w1", 1);

    let job = make_job(1, 1);
    let events = collect_events(&job);
    fx.submit(job, 0);
    let (_batch, _ip, _job) = fx.scheduler.get_task_to_send().unwrap();

    assert!(fx.scheduler.stop_job(1));
    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], JobEvent::Completed { status, .. } if status == "stopped"));

    assert!(!fx.scheduler.stop_job(1));
}

#[test]
fn stop_all_jobs_clears_everything_and_broadcasts() {
    let fx = Fixture::new();
    let w1 = fx.add_worker("w1", 1);

    let active = make_job(1, 1);
    let queued = make_job(2, 1);
    fx.submit(active, 0);
    let (_batch, _ip, _job) = fx.scheduler.get_task_to_send().unwrap();
    fx.queue.push(queued, 1);

    fx.scheduler.stop_all_jobs();

    assert_eq!(fx.scheduler.num_active_jobs(), 0);
    assert!(fx.queue.is_empty());

    let mut saw_stop_all = false;
    while let Some(pending) = w1.pop_command() {
        if pending.command == WorkerCommand::StopAllJobs {
            saw_stop_all = true;
        }
    }
    assert!(saw_stop_all);
}

#[test]
fn stop_job_group_stops_queued_and_active() {
    let fx = Fixture::new();
    fx.add_worker("w1", 1);

    let active = make_job(1, 1);
    let queued = make_job(2, 1);
    fx.submit(active, 5);
    let (_batch, _ip, _job) = fx.scheduler.get_task_to_send().unwrap();
    fx.queue.push(queued, 5);

    fx.scheduler.stop_job_group(5);
    assert_eq!(fx.scheduler.num_active_jobs(), 0);
    assert!(fx.queue.is_empty());
}

#[test]
fn host_allow_set_is_respected() {
    let fx = Fixture::new();
    fx.add_worker("w1", 1);
    fx.add_worker("w2", 1);

    let job = job_with(1, |p| {
        p.limits.num_exec = 1;
        p.hosts.insert("w2".to_string());
    });
    fx.submit(job, 0);

    let (_batch, ip, _job) = fx.scheduler.get_task_to_send().unwrap();
    assert_eq!(ip, "w2");
}

#[test]
fn group_allow_set_is_respected() {
    let fx = Fixture::new();
    fx.add_worker_in_group("w1", "cpu", 1, 1024);
    fx.add_worker_in_group("w2", "gpu", 1, 1024);

    let job = job_with(1, |p| {
        p.limits.num_exec = 1;
        p.groups.insert("gpu".to_string());
    });
    fx.submit(job, 0);

    let (_batch, ip, _job) = fx.scheduler.get_task_to_send().unwrap();
    assert_eq!(ip, "w2");
}

#[test]
fn placement_prefers_most_free_cpu_then_memory() {
    let fx = Fixture::new();
    fx.add_worker_in_group("small", "all", 1, 4096);
    fx.add_worker_in_group("big", "all", 4, 1024);

    let job = make_job(1, 1);
    fx.submit(job, 0);

    let (_batch, ip, _job) = fx.scheduler.get_task_to_send().unwrap();
    assert_eq!(ip, "big");

    // equal free CPU: more memory wins
    let fx2 = Fixture::new();
    fx2.add_worker_in_group("lean", "all", 2, 512);
    fx2.add_worker_in_group("fat", "all", 2, 8192);
    fx2.submit(make_job(2, 1), 0);
    let (_batch, ip, _job) = fx2.scheduler.get_task_to_send().unwrap();
    assert_eq!(ip, "fat");
}

#[test]
fn planned_exec_derives_from_cluster_cpu() {
    let fx = Fixture::new();
    fx.add_worker("w1", 2);
    fx.add_worker("w2", 2);

    // num_exec unset: cluster CPU capped by max_cluster_cpu
    let job = job_with(1, |p| {
        p.limits.num_exec = 0;
        p.limits.max_cluster_cpu = 3;
    });
    fx.submit(job.clone(), 0);
    assert_eq!(job.planned_exec(), 3);

    // unlimited: the whole cluster
    let job2 = job_with(2, |p| p.limits.num_exec = 0);
    fx.submit(job2.clone(), 1);
    assert_eq!(job2.planned_exec(), 4);
}

#[test]
fn delete_worker_blocklists_and_reschedules() {
    let fx = Fixture::new();
    let w1 = fx.add_worker("w1", 2);
    fx.add_worker("w2", 2);

    let job = job_with(1, |p| {
        p.limits.num_exec = 2;
        p.limits.max_failed_nodes = 2;
    });
    fx.submit(job, 0);
    let (_batch, ip, _job) = fx.scheduler.get_task_to_send().unwrap();
    assert_eq!(ip, "w1");

    fx.scheduler.delete_worker("w1");

    assert!(fx.registry.get_worker_by_ip("w1").is_none());
    assert!(fx.scheduler.node_snapshot("w1").is_none());
    assert_eq!(w1.num_pending_commands(), 2);
    assert_eq!(fx.scheduler.num_need_reschedule(), 2);

    let (rebatch, ip, _job) = fx.scheduler.get_task_to_send().unwrap();
    assert_eq!(ip, "w2");
    assert_eq!(rebatch.total_tasks(), 2);
}

#[test]
fn failed_predecessor_keeps_dag_successors_gated() {
    let fx = Fixture::new();
    fx.add_worker("w1", 1);

    let a = make_job(1, 1);
    let b = make_job(2, 1);
    let (_group, sorted) = gridrun::job::build_job_group(&[a, b.clone()], &[vec![0, 1]]).unwrap();
    fx.queue.push_all(sorted, 0);
    fx.scheduler.on_new_job();

    let (_batch, _ip, job) = fx.scheduler.get_task_to_send().unwrap();
    assert_eq!(job.id(), 1);

    // the predecessor times out; its failure must not unblock b
    fx.scheduler.on_job_timeout(1);
    assert_eq!(b.num_depends(), 1);
    assert_eq!(fx.queue.len(), 1, "successor stays queued");
    assert!(fx.scheduler.get_task_to_send().is_none());
    assert_eq!(fx.scheduler.num_active_jobs(), 0);
}

#[test]
fn task_error_blacklists_worker_for_all_held_jobs() {
    let fx = Fixture::new();
    fx.add_worker("w1", 2);

    let a = job_with(1, |p| {
        p.limits.num_exec = 1;
        p.limits.max_failed_nodes = 2;
    });
    let b = job_with(2, |p| {
        p.limits.num_exec = 1;
        p.limits.max_failed_nodes = 2;
    });
    fx.submit(a, 0);
    fx.submit(b, 1);

    // one batch per job: the worker ends up holding tasks of both
    let (_b1, _ip, job) = fx.scheduler.get_task_to_send().unwrap();
    assert_eq!(job.id(), 1);
    let (_b2, _ip, job) = fx.scheduler.get_task_to_send().unwrap();
    assert_eq!(job.id(), 2);

    // one task of job 2 errors: the whole assignment is rescheduled, so
    // the worker is failed for job 1 as well
    fx.scheduler
        .on_task_completion(55, 0, WorkerTask::new(2, 0), "w1");

    assert_eq!(fx.scheduler.num_need_reschedule(), 2);
    let (busy, assigned) = fx.scheduler.node_snapshot("w1").unwrap();
    assert_eq!(busy, 0);
    assert!(assigned.is_empty());

    // free CPU on w1, but neither job may return to it
    assert!(fx.scheduler.get_task_to_send().is_none());
    assert_eq!(fx.scheduler.num_need_reschedule(), 2);
}

#[test]
fn statistics_reports_fleet_counters() {
    let fx = Fixture::new();
    fx.add_worker("w1", 2);
    fx.add_worker("w2", 2);

    let job = make_job(1, 2);
    fx.submit(job, 0);
    let (_batch, _ip, _job) = fx.scheduler.get_task_to_send().unwrap();

    let stat = fx.scheduler.statistics();
    assert!(stat.contains("busy workers = 1"), "{}", stat);
    assert!(stat.contains("free workers = 1"), "{}", stat);
    assert!(stat.contains("executing jobs: {1}"), "{}", stat);

    let info = fx.scheduler.job_info(1);
    assert!(info.contains("busy cpu's = 2"), "{}", info);
    assert!(fx.scheduler.job_info(99).contains("isn't executing"));
}
