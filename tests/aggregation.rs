use chrono::{DateTime, TimeDelta, Utc};
use interaction_throttle::application::ports::Clock;
use interaction_throttle::infrastructure::mocks::MockClock;
use interaction_throttle::{
    render_message, EventAggregator, EventError, NotificationEvent, NotificationKind,
    NotificationRecord, ShardedStorage, Storage,
};
use std::sync::Arc;
use std::time::Duration;

fn aggregator(clock: &MockClock) -> EventAggregator {
    EventAggregator::builder()
        .with_clock(Arc::new(clock.clone()))
        .build()
        .unwrap()
}

fn event(
    kind: NotificationKind,
    actor: &str,
    name: &str,
    target: Option<&str>,
    at: DateTime<Utc>,
) -> NotificationEvent {
    let event = NotificationEvent::new(kind, actor, name, "u1", at);
    match target {
        Some(target) => event.with_target(target),
        None => event,
    }
}

fn ingest(aggregator: &EventAggregator, event: NotificationEvent) -> NotificationRecord {
    aggregator
        .ingest(&event)
        .expect("valid event")
        .expect("not a self-action")
}

#[test]
fn test_two_likes_ten_minutes_apart() {
    let clock = MockClock::new(Utc::now());
    let aggregator = aggregator(&clock);
    let t = clock.now();

    ingest(&aggregator, event(NotificationKind::Like, "u2", "Ada", Some("d1"), t));
    let record = ingest(
        &aggregator,
        event(NotificationKind::Like, "u3", "Grace", Some("d1"), t + TimeDelta::minutes(10)),
    );

    assert_eq!(record.aggregate_count, 2);
    assert_eq!(record.message(), "Grace and 1 others liked your design");
}

#[test]
fn test_two_likes_sixty_one_minutes_apart() {
    let clock = MockClock::new(Utc::now());
    let aggregator = aggregator(&clock);
    let t = clock.now();

    let first = ingest(&aggregator, event(NotificationKind::Like, "u2", "Ada", Some("d1"), t));
    let second = ingest(
        &aggregator,
        event(NotificationKind::Like, "u3", "Grace", Some("d1"), t + TimeDelta::minutes(61)),
    );

    assert_ne!(first.id, second.id);
    assert_eq!(first.aggregate_count, 1);
    assert_eq!(second.aggregate_count, 1);
    assert_eq!(second.message(), "Grace liked your design");
}

#[test]
fn test_self_like_produces_nothing() {
    let clock = MockClock::new(Utc::now());
    let aggregator = aggregator(&clock);

    let own = NotificationEvent::new(NotificationKind::Like, "u1", "Me", "u1", clock.now())
        .with_target("d1");

    assert_eq!(aggregator.ingest(&own), Ok(None));
    assert!(aggregator.open_groups().is_empty());
}

#[test]
fn test_five_comments_make_five_records() {
    let clock = MockClock::new(Utc::now());
    let aggregator = aggregator(&clock);

    let records: Vec<NotificationRecord> = (0..5)
        .map(|i| {
            ingest(
                &aggregator,
                event(
                    NotificationKind::Comment,
                    &format!("u{}", i + 2),
                    "Ada",
                    Some("d1"),
                    clock.now() + TimeDelta::seconds(i),
                ),
            )
        })
        .collect();

    assert!(records.iter().all(|r| r.aggregate_count == 1));
    assert!(records.iter().all(|r| r.message() == "Ada commented on your design"));
    assert!(records.windows(2).all(|pair| pair[0].id < pair[1].id));
}

#[test]
fn test_each_kind_renders_through_ingest() {
    let clock = MockClock::new(Utc::now());
    let aggregator = aggregator(&clock);
    let t = clock.now();

    let cases = [
        (NotificationKind::Reply, Some("c1"), "Ada replied to your comment"),
        (NotificationKind::NewDesign, Some("d9"), "Ada published a new design"),
        (NotificationKind::CommentLike, Some("c1"), "Ada liked your comment"),
        (NotificationKind::Follow, None, "Ada started following you"),
        (NotificationKind::BadgeEarned, None, "You earned a new badge!"),
    ];

    for (kind, target, expected) in cases {
        let record = ingest(&aggregator, event(kind, "u2", "Ada", target, t));
        assert_eq!(record.message(), expected, "{}", kind);
    }
}

#[test]
fn test_rejected_events() {
    let clock = MockClock::new(Utc::now());
    let aggregator = aggregator(&clock);
    let t = clock.now();

    assert_eq!(
        aggregator.ingest(&event(NotificationKind::Comment, "u2", "Ada", None, t)),
        Err(EventError::MissingTarget(NotificationKind::Comment))
    );
    assert_eq!(
        aggregator.ingest(&event(NotificationKind::Follow, "u2", "  ", None, t)),
        Err(EventError::MissingActorName(NotificationKind::Follow))
    );
    assert_eq!(aggregator.metrics().rejected(), 2);
    assert_eq!(aggregator.metrics().snapshot().accepted_events(), 0);
}

#[test]
fn test_kind_parsed_from_wire_string() {
    let kind: NotificationKind = "comment_like".parse().unwrap();
    assert_eq!(render_message(kind, "Ada", 4), "Ada and 3 others liked your comment");

    assert_eq!(
        "mention".parse::<NotificationKind>(),
        Err(EventError::UnknownKind("mention".to_string()))
    );
}

#[test]
fn test_acknowledge_then_prune() {
    let clock = MockClock::new(Utc::now());
    let aggregator = aggregator(&clock);
    let t = clock.now();

    let follow = ingest(&aggregator, event(NotificationKind::Follow, "u2", "Ada", None, t));
    ingest(&aggregator, event(NotificationKind::Like, "u3", "Grace", Some("d1"), t));

    assert!(aggregator.acknowledge(&follow));
    assert_eq!(aggregator.prune(), 1);

    let next = ingest(
        &aggregator,
        event(NotificationKind::Follow, "u4", "Linus", None, t + TimeDelta::minutes(1)),
    );
    assert_eq!(next.aggregate_count, 1);

    clock.advance(Duration::from_secs(2 * 60 * 60));
    assert_eq!(aggregator.prune(), 2);
    assert!(aggregator.is_empty());
}

#[test]
fn test_custom_storage_and_window() {
    let clock = MockClock::new(Utc::now());
    let storage = Arc::new(ShardedStorage::new());
    let aggregator = EventAggregator::builder()
        .with_clock(Arc::new(clock.clone()))
        .with_group_window(Duration::from_secs(5 * 60))
        .build_with(Arc::clone(&storage))
        .unwrap();
    let t = clock.now();

    ingest(&aggregator, event(NotificationKind::Like, "u2", "Ada", Some("d1"), t));
    let record = ingest(
        &aggregator,
        event(NotificationKind::Like, "u3", "Grace", Some("d1"), t + TimeDelta::minutes(6)),
    );

    assert_eq!(record.aggregate_count, 1);
    assert_eq!(storage.len(), 1);
}

#[test]
fn test_concurrent_likes_and_follows() {
    use std::thread;

    let clock = MockClock::new(Utc::now());
    let aggregator = aggregator(&clock);
    let t = clock.now();
    let mut handles = vec![];

    for i in 0..6 {
        let aggregator_clone = aggregator.clone();
        handles.push(thread::spawn(move || {
            for j in 0..50 {
                let actor = format!("u{}-{}", i, j);
                let kind = if j % 2 == 0 {
                    NotificationKind::Like
                } else {
                    NotificationKind::Follow
                };
                let target = (kind == NotificationKind::Like).then_some("d1");
                aggregator_clone
                    .ingest(&event(kind, &actor, "Ada", target, t))
                    .unwrap();
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let groups = aggregator.open_groups();
    assert_eq!(groups.len(), 2);
    assert!(groups.iter().all(|g| g.aggregate_count == 150));
}
