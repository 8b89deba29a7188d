//! 生命周期调度：到期计算、通知幂等、批处理护栏与到期擦除。

mod support;

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use erasure_core::lifecycle::{
    AutoConfirm, NotificationStateStore, SweepEvent, SweepObserver, SweepParams,
};
use erasure_core::test_stubs::handlers::RecordingHandler;
use erasure_core::test_stubs::lifecycle::{FixedProbe, RecordingNotifier};
use erasure_core::{
    IdentityStore, IneligibilityReason, LifecycleSettings, NotifyError, PolicyAction,
    PolicyRegistry, UserId, UserRecord, WipeError,
};
use proptest::prelude::*;
use support::{Harness, at};

#[test]
fn due_users_at_thirty_day_boundary() {
    let harness = Harness::new();
    harness.add_user("a", Some("2019-05-01T00:00:00Z"));
    harness.add_user("b", Some("2019-05-02T00:00:00Z"));
    harness.add_user("c", Some("2019-05-03T00:00:00Z"));
    harness.add_user("d", None);
    let notifier = RecordingNotifier::new();
    let (scheduler, _) = harness.scheduler(&notifier);

    let due = scheduler.due_user_ids(at("2019-06-01T00:00:00Z")).unwrap();

    assert_eq!(due, ["a", "b", "d"].map(UserId::from));
}

#[test]
fn wiped_users_are_never_due() {
    let harness = Harness::new();
    let user = harness.add_user("a", Some("2019-01-01T00:00:00Z"));
    harness.identity.disable_login(&user).unwrap();
    let (scheduler, _) = harness.scheduler(&RecordingNotifier::new());

    assert!(scheduler.due_user_ids(at("2019-06-01T00:00:00Z")).unwrap().is_empty());
}

#[test]
fn notify_is_idempotent_within_a_window() {
    let harness = Harness::new();
    let user = harness.add_user("a", Some("2019-04-01T00:00:00Z"));
    let notifier = RecordingNotifier::new();
    let (scheduler, state) = harness.scheduler(&notifier);
    let when = at("2019-06-15T00:00:00Z");

    scheduler.notify_user(&user, when).unwrap();
    let err = scheduler.notify_user(&user, when).unwrap_err();

    assert!(matches!(err, NotifyError::AlreadyNotified { ref user_id, .. } if *user_id == user));
    assert_eq!(notifier.sent(), [(user.clone(), when)]);
    let record = state.get(&user).unwrap().unwrap();
    assert_eq!(record.reference, at("2019-04-01T00:00:00Z"));
    assert_eq!(record.notified_at, at("2019-06-01T00:00:00Z"));
}

#[test]
fn renewed_activity_opens_a_new_window() {
    let harness = Harness::new();
    let user = harness.add_user("a", Some("2019-04-01T00:00:00Z"));
    let notifier = RecordingNotifier::new();
    let (scheduler, _) = harness.scheduler(&notifier);

    scheduler.notify_user(&user, at("2019-06-15T00:00:00Z")).unwrap();
    harness.identity.touch(&user, at("2019-06-10T00:00:00Z")).unwrap();

    let later = at("2019-08-01T00:00:00Z");
    scheduler.notify_user(&user, later).unwrap();
    assert_eq!(notifier.sent().len(), 2);
}

#[test]
fn notify_refuses_users_not_due_by_the_promised_date() {
    let harness = Harness::new();
    let user = harness.add_user("a", Some("2019-05-31T00:00:00Z"));
    let notifier = RecordingNotifier::new();
    let (scheduler, state) = harness.scheduler(&notifier);

    let err = scheduler.notify_user(&user, at("2019-06-15T00:00:00Z")).unwrap_err();

    assert!(matches!(err, NotifyError::Ineligible(IneligibilityReason::NotYetDue { .. })));
    assert!(notifier.sent().is_empty());
    assert!(state.all().unwrap().is_empty());
}

#[test]
fn failed_delivery_can_be_retried() {
    let harness = Harness::new();
    let user = harness.add_user("a", Some("2019-04-01T00:00:00Z"));
    let notifier = RecordingNotifier::new();
    let (scheduler, state) = harness.scheduler(&notifier);
    let when = at("2019-06-15T00:00:00Z");

    notifier.fail_next();
    assert!(matches!(scheduler.notify_user(&user, when), Err(NotifyError::Delivery(_))));
    assert!(state.get(&user).unwrap().is_none());

    scheduler.notify_user(&user, when).unwrap();
    assert_eq!(notifier.sent().len(), 1);
}

/// 拒绝指定用户并记录收到的事件种类。
#[derive(Default)]
struct ScriptedObserver {
    decline: Vec<UserId>,
    events: Vec<String>,
}

impl SweepObserver for ScriptedObserver {
    fn confirm(&mut self, user: &UserRecord, _when: DateTime<Utc>) -> bool {
        !self.decline.contains(&user.id)
    }

    fn on_event(&mut self, event: &SweepEvent<'_>) {
        let label = match event {
            SweepEvent::Notified { user } => format!("notified:{}", user.id),
            SweepEvent::WouldNotify { user } => format!("would:{}", user.id),
            SweepEvent::AlreadyNotified { user_id, .. } => format!("already:{user_id}"),
            SweepEvent::Ineligible { user_id, reason } => format!("ineligible:{user_id}:{}", reason.code()),
            SweepEvent::Declined { user_id } => format!("declined:{user_id}"),
            SweepEvent::Failed { user_id, .. } => format!("failed:{user_id}"),
            SweepEvent::LowMemory { .. } => "low-memory".to_owned(),
        };
        self.events.push(label);
    }
}

#[test]
fn sweep_counts_every_outcome() {
    let harness = Harness::new();
    for id in ["a", "b", "c", "d"] {
        harness.add_user(id, Some("2019-04-01T00:00:00Z"));
    }
    harness.add_user("fresh", Some("2019-05-31T00:00:00Z"));
    let notifier = RecordingNotifier::new();
    let guard = harness.guard().with_protected([UserId::from("d")]);
    let (scheduler, _) = harness.scheduler_with_guard(guard, &notifier);
    let when = at("2019-06-15T00:00:00Z");

    scheduler.notify_user(&UserId::from("a"), when).unwrap();
    let mut observer = ScriptedObserver {
        decline: vec![UserId::from("c")],
        ..ScriptedObserver::default()
    };
    let summary = scheduler
        .run_notify_sweep(SweepParams { when, dry_run: false }, &mut observer)
        .unwrap();

    assert_eq!(summary.found, 4);
    assert_eq!(summary.already_notified, 1);
    assert_eq!(summary.notified, 1);
    assert_eq!(summary.declined, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.cannot_notify(), 2);
    assert_eq!(summary.failed, 0);
    assert!(!summary.stopped_early);
    assert_eq!(
        observer.events,
        ["already:a", "notified:b", "declined:c", "ineligible:d:protected_account"]
    );
    assert_eq!(notifier.sent().len(), 2);
}

#[test]
fn dry_run_sweep_sends_and_records_nothing() {
    let harness = Harness::new();
    harness.add_user("a", Some("2019-04-01T00:00:00Z"));
    harness.add_user("b", None);
    let notifier = RecordingNotifier::new();
    let (scheduler, state) = harness.scheduler(&notifier);
    let mut observer = ScriptedObserver::default();

    let summary = scheduler
        .run_notify_sweep(
            SweepParams {
                when: at("2019-06-15T00:00:00Z"),
                dry_run: true,
            },
            &mut observer,
        )
        .unwrap();

    assert_eq!((summary.found, summary.notified), (2, 2));
    assert_eq!(observer.events, ["would:a", "would:b"]);
    assert!(notifier.sent().is_empty());
    assert!(state.all().unwrap().is_empty());
}

#[test]
fn low_memory_stops_the_sweep_early() {
    let harness = Harness::new();
    for id in ["a", "b", "c"] {
        harness.add_user(id, Some("2019-04-01T00:00:00Z"));
    }
    let notifier = RecordingNotifier::new();
    let (scheduler, _) = harness.scheduler(&notifier);
    let scheduler = scheduler
        .with_probe(Arc::new(FixedProbe::degrading(1, 64 << 20, 1 << 20)))
        .with_settings(LifecycleSettings::default());
    let mut observer = ScriptedObserver::default();

    let summary = scheduler
        .run_notify_sweep(
            SweepParams {
                when: at("2019-06-15T00:00:00Z"),
                dry_run: false,
            },
            &mut observer,
        )
        .unwrap();

    assert!(summary.stopped_early);
    assert_eq!(summary.found, 3);
    assert_eq!(summary.notified, 1);
    assert_eq!(observer.events, ["notified:a", "low-memory"]);
}

#[test]
fn wipe_due_wipes_notified_users_once_the_date_arrives() {
    let harness = Harness::new();
    let a = harness.add_user("a", Some("2019-04-01T00:00:00Z"));
    let b = harness.add_user("b", Some("2019-04-01T00:00:00Z"));
    let notifier = RecordingNotifier::new();
    let (scheduler, state) = harness.scheduler(&notifier);
    scheduler.notify_user(&a, at("2019-06-15T00:00:00Z")).unwrap();
    scheduler.notify_user(&b, at("2019-07-01T00:00:00Z")).unwrap();

    let profile = RecordingHandler::new(["email"]);
    let mut builder = PolicyRegistry::builder();
    builder.register("profile", PolicyAction::Erase, profile.clone()).unwrap();
    let engine = harness.engine(builder.build());

    assert!(scheduler.wipe_due(&engine, at("2019-06-01T00:00:00Z")).unwrap().is_empty());

    harness.clock.set(at("2019-06-15T00:00:00Z"));
    let results = scheduler.wipe_due(&engine, at("2019-06-15T00:00:00Z")).unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].user_id, a);
    assert!(results[0].outcome.as_ref().unwrap().entry_id.is_some());
    assert!(harness.identity.get_user(&a).unwrap().wiped);
    assert!(!harness.identity.get_user(&b).unwrap().wiped);
    assert_eq!(profile.mutations(), [a.clone()]);
    assert!(state.get(&a).unwrap().is_none());
    assert!(state.get(&b).unwrap().is_some());

    let status = scheduler.status(at("2019-06-15T00:00:00Z")).unwrap();
    assert_eq!(status.notified, 1);
    assert_eq!(status.awaiting_wipe, 0);
    assert_eq!(status.next_wipe_at, Some(at("2019-07-01T00:00:00Z")));
}

#[test]
fn wipe_due_withdraws_notices_of_users_active_again() {
    let harness = Harness::new();
    let a = harness.add_user("a", Some("2019-04-01T00:00:00Z"));
    let notifier = RecordingNotifier::new();
    let (scheduler, state) = harness.scheduler(&notifier);
    scheduler.notify_user(&a, at("2019-06-15T00:00:00Z")).unwrap();
    harness.identity.touch(&a, at("2019-06-10T00:00:00Z")).unwrap();

    let profile = RecordingHandler::new(["email"]);
    let mut builder = PolicyRegistry::builder();
    builder.register("profile", PolicyAction::Erase, profile.clone()).unwrap();
    let engine = harness.engine(builder.build());
    harness.clock.set(at("2019-06-15T00:00:00Z"));

    let results = scheduler.wipe_due(&engine, at("2019-06-15T00:00:00Z")).unwrap();

    assert_eq!(results.len(), 1);
    assert!(results[0].withdrawn);
    assert!(matches!(
        results[0].outcome,
        Err(WipeError::Ineligible(IneligibilityReason::NotYetDue { .. }))
    ));
    assert!(!harness.identity.get_user(&a).unwrap().wiped);
    assert!(profile.mutations().is_empty());
    assert!(state.get(&a).unwrap().is_none());
    let status = scheduler.status(at("2019-06-15T00:00:00Z")).unwrap();
    assert_eq!(status.notified, 0);
    assert_eq!(status.awaiting_wipe, 0);
    assert!(scheduler.wipe_due(&engine, at("2019-06-15T00:00:00Z")).unwrap().is_empty());
}

#[test]
fn auto_confirm_notifies_everyone_due() {
    let harness = Harness::new();
    harness.add_user("a", Some("2019-04-01T00:00:00Z"));
    let notifier = RecordingNotifier::new();
    let (scheduler, _) = harness.scheduler(&notifier);

    let summary = scheduler
        .run_notify_sweep(
            SweepParams {
                when: at("2019-06-01T00:00:00Z"),
                dry_run: false,
            },
            &mut AutoConfirm,
        )
        .unwrap();

    assert_eq!(summary.notified, 1);
    assert_eq!(notifier.sent().len(), 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// 参考时间之后满 30 天（含边界）即到期，否则不到期。
    #[test]
    fn due_exactly_when_interval_has_elapsed(seconds_ago in 0i64..(120 * 86_400)) {
        let harness = Harness::new();
        let as_of = at("2019-06-01T00:00:00Z");
        let mut record = support::user("p", None);
        record.last_activity = Some(as_of - TimeDelta::seconds(seconds_ago));
        harness.identity.insert(record, false);
        let (scheduler, _) = harness.scheduler(&RecordingNotifier::new());

        let due = scheduler.due_user_ids(as_of).unwrap();

        prop_assert_eq!(due.contains(&UserId::from("p")), seconds_ago >= 30 * 86_400);
    }
}
