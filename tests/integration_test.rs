//! End-to-end lifecycle scenarios
//!
//! Exercises the public API the way a deployment drives it: a store, a
//! dispatcher over a capturing transport, and MissionControl on top.

use aeromed::auth::{Actor, Identity, Role};
use aeromed::mission::{MissionControl, MissionDraft, MissionStatus, Party};
use aeromed::notify::{Dispatcher, EmailAddress, MailTransport, MemoryTransport, NotificationLog};
use aeromed::retry::RetryConfig;
use aeromed::store::{AppendOutcome, MissionStore, SqliteStore, TransitionRecord};
use aeromed::AeromedError;
use chrono::Utc;
use std::sync::{Arc, Barrier};

struct World {
    control: MissionControl,
    store: Arc<SqliteStore>,
    transport: Arc<MemoryTransport>,
}

fn world() -> World {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let transport = Arc::new(MemoryTransport::new());
    let transport_dyn: Arc<dyn MailTransport> = transport.clone();
    let log: Arc<dyn NotificationLog> = store.clone();
    let mission_store: Arc<dyn MissionStore> = store.clone();
    let dispatcher = Dispatcher::new(
        transport_dyn,
        EmailAddress::new("no-reply@aeromed.example").unwrap(),
    )
    .with_retry(RetryConfig {
        max_retries: 1,
        initial_backoff: std::time::Duration::from_millis(1),
        jitter: false,
        ..RetryConfig::default()
    })
    .with_log(log);

    let control = MissionControl::new(mission_store, Arc::new(dispatcher));
    World {
        control,
        store,
        transport,
    }
}

fn patient() -> Actor {
    Actor::new(
        Identity::new("u-100", "Amara").with_email(EmailAddress::new("amara@example.sl").unwrap()),
        Role::Patient,
    )
}

fn clinic() -> Actor {
    Actor::new(
        Identity::new("c-7", "Kissy Clinic")
            .with_email(EmailAddress::new("clinic@example.sl").unwrap()),
        Role::Clinic,
    )
}

fn admin() -> Actor {
    Actor::new(Identity::new("a-1", "Ops"), Role::Admin)
}

fn system() -> Actor {
    Actor::new(Identity::new("groundstation", "Ground Station"), Role::System)
}

fn kissy_road_draft(actor: &Actor) -> MissionDraft {
    MissionDraft::new(Party::from(actor), "insulin, 2 vials", "12 Kissy Rd")
}

#[tokio::test]
async fn test_kissy_road_success_scenario() {
    let w = world();
    let patient = patient();
    let clinic = clinic();
    let admin = admin();
    let system = system();

    // Patient creates the mission
    let mission = w
        .control
        .request(&patient, kissy_road_draft(&patient))
        .await
        .unwrap();
    assert_eq!(mission.status, MissionStatus::Requested);
    assert_eq!(mission.delivery_address, "12 Kissy Rd");

    // Clinic accepts; the patient is notified
    let before_accept = w.transport.sent_count();
    let mission = w.control.accept(&clinic, mission.id).await.unwrap();
    assert_eq!(mission.status, MissionStatus::Accepted);
    assert_eq!(w.transport.sent_count(), before_accept + 1);
    assert_eq!(
        w.transport.sent().last().unwrap().to.to_string(),
        "amara@example.sl"
    );

    // Admin assigns drone D1
    let d1 = w.store.add_drone("D1").unwrap();
    let mission = w.control.assign(&admin, mission.id, d1.id).await.unwrap();
    assert_eq!(mission.status, MissionStatus::Assigned);
    assert_eq!(mission.drone_id, Some(d1.id));

    // Telemetry confirms launch
    let mission = w.control.confirm_launch(&system, mission.id).await.unwrap();
    assert_eq!(mission.status, MissionStatus::InTransit);

    // Delivery confirmed: terminal
    let mission = w.control.confirm_delivery(&system, mission.id).await.unwrap();
    assert_eq!(mission.status, MissionStatus::Delivered);
    assert!(mission.archived_at.is_some());

    // Any further transition fails with MissionClosed, regardless of actor
    for err in [
        w.control.accept(&clinic, mission.id).await.unwrap_err(),
        w.control.confirm_launch(&system, mission.id).await.unwrap_err(),
        w.control
            .fail(&admin, mission.id, "post-hoc".into())
            .await
            .unwrap_err(),
    ] {
        assert!(matches!(err, AeromedError::MissionClosed { .. }));
    }
}

#[tokio::test]
async fn test_audit_log_is_monotonic_and_matches_the_graph() {
    let w = world();
    let patient = patient();
    let clinic = clinic();
    let system = system();

    let mission = w
        .control
        .request(&patient, kissy_road_draft(&patient))
        .await
        .unwrap();
    let mission = w.control.accept(&clinic, mission.id).await.unwrap();
    let drone = w.store.add_drone("D1").unwrap();
    let mission = w.control.assign(&clinic, mission.id, drone.id).await.unwrap();
    let mission = w.control.confirm_launch(&system, mission.id).await.unwrap();
    let mission = w.control.confirm_delivery(&system, mission.id).await.unwrap();

    let audit = w.control.audit_log(mission.id).unwrap();

    // Creation event plus one entry per transition
    assert_eq!(audit.len() as u64, mission.version + 1);
    assert_eq!(audit[0].seq, 0);
    assert_eq!(audit[0].status, MissionStatus::Requested);

    // Monotonic, contiguous, and every recorded step is a graph edge
    for pair in audit.windows(2) {
        assert_eq!(pair[1].seq, pair[0].seq + 1);
        assert!(pair[0].occurred_at <= pair[1].occurred_at);
        assert!(
            pair[0].status.can_become(pair[1].status),
            "audit recorded an illegal transition {} -> {}",
            pair[0].status,
            pair[1].status
        );
    }
}

#[tokio::test]
async fn test_rejection_scenario_is_terminal() {
    let w = world();
    let patient = patient();
    let clinic = clinic();

    let mission = w
        .control
        .request(&patient, kissy_road_draft(&patient))
        .await
        .unwrap();
    let mission = w
        .control
        .reject(&clinic, mission.id, Some("out of stock".into()))
        .await
        .unwrap();
    assert_eq!(mission.status, MissionStatus::Rejected);
    assert!(mission.is_closed());

    // The same mission id cannot be revived; a new request makes a new id
    let err = w.control.accept(&clinic, mission.id).await.unwrap_err();
    assert!(matches!(err, AeromedError::MissionClosed { .. }));

    let fresh = w
        .control
        .request(&patient, kissy_road_draft(&patient))
        .await
        .unwrap();
    assert_ne!(fresh.id, mission.id);
    assert_eq!(fresh.status, MissionStatus::Requested);
}

#[test]
fn test_concurrent_transitions_exactly_one_commits() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let requester = Party::new("u-100", "Amara");
    let draft = MissionDraft::new(requester, "insulin, 2 vials", "12 Kissy Rd");
    let mission = store.create(&draft, Utc::now()).unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let mut handles = Vec::new();

    // Both writers observed version 0; the store must reject one
    for actor_id in ["c-7", "c-8"] {
        let store = Arc::clone(&store);
        let barrier = Arc::clone(&barrier);
        let mission_id = mission.id;
        handles.push(std::thread::spawn(move || {
            let actor = Actor::new(
                Identity::new(actor_id, "Clinic"),
                Role::Clinic,
            );
            barrier.wait();
            store.append_transition(
                mission_id,
                0,
                TransitionRecord::new(MissionStatus::Accepted, &actor, Utc::now()),
            )
        }));
    }

    let outcomes: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap())
        .collect();

    let committed = outcomes
        .iter()
        .filter(|o| matches!(o, AppendOutcome::Committed(_)))
        .count();
    let conflicts = outcomes
        .iter()
        .filter(|o| matches!(o, AppendOutcome::Conflict))
        .count();
    assert_eq!(committed, 1);
    assert_eq!(conflicts, 1);

    // One transition, one audit entry beyond creation
    let current = store.get(mission.id).unwrap();
    assert_eq!(current.version, 1);
    assert_eq!(store.audit_log(mission.id).unwrap().len(), 2);
}

#[tokio::test]
async fn test_dispatch_failure_never_reverts_a_committed_transition() {
    let w = world();
    let patient = patient();
    let clinic = clinic();

    let mission = w
        .control
        .request(&patient, kissy_road_draft(&patient))
        .await
        .unwrap();

    // Force every delivery attempt for the acceptance notification to fail
    w.transport.fail_unreachable(10);

    let accepted = w.control.accept(&clinic, mission.id).await.unwrap();
    assert_eq!(accepted.status, MissionStatus::Accepted);

    // Re-read from the store: the commit stands
    let current = w.store.get(mission.id).unwrap();
    assert_eq!(current.status, MissionStatus::Accepted);
    assert_eq!(current.version, 1);
}

#[tokio::test]
async fn test_only_the_transition_table_is_ever_recorded() {
    let w = world();
    let patient = patient();
    let clinic = clinic();
    let admin = admin();
    let system = system();

    // Drive a mix of legal and illegal attempts across several missions
    let m1 = w
        .control
        .request(&patient, kissy_road_draft(&patient))
        .await
        .unwrap();
    let _ = w.control.confirm_delivery(&system, m1.id).await.unwrap_err();
    let _ = w.control.assign(&admin, m1.id, 1).await.unwrap_err();
    w.control.accept(&clinic, m1.id).await.unwrap();

    let m2 = w
        .control
        .request(&patient, kissy_road_draft(&patient))
        .await
        .unwrap();
    w.control
        .fail(&admin, m2.id, "weather hold exceeded".into())
        .await
        .unwrap();
    let _ = w.control.accept(&clinic, m2.id).await.unwrap_err();

    for mission in [m1, m2] {
        let audit = w.store.audit_log(mission.id).unwrap();
        for pair in audit.windows(2) {
            assert!(pair[0].status.can_become(pair[1].status));
        }
    }
}
