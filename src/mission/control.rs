//! MissionControl - the mission state machine
//!
//! Central orchestrator for lifecycle transitions. Every operation follows
//! the same sequence: load the mission, check it is still open, check the
//! actor's capability, check the edge exists in the status graph, check the
//! operation's precondition, then persist status + audit (+ drone and clinic
//! attachments) as one optimistic append. Only after the commit is durable
//! are the affected parties notified; a notification failure is logged and
//! recorded but never unwinds the transition.
//!
//! Callers that receive `ConcurrentModification` lost a race and must
//! re-read and decide again; MissionControl does not retry for them.

use super::roles::{allowed, TransitionAction};
use super::{Mission, MissionDraft, MissionId, MissionStatus, Party};
use crate::auth::Actor;
use crate::config::FleetConfig;
use crate::notify::{Dispatcher, EmailAddress, Template};
use crate::store::{AppendOutcome, MissionStore, TransitionRecord};
use crate::{AeromedError, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

/// The mission state machine
pub struct MissionControl {
    store: Arc<dyn MissionStore>,
    dispatcher: Arc<Dispatcher>,
    clinic_capacity: u32,
    intake_broadcast: Vec<EmailAddress>,
}

impl MissionControl {
    pub fn new(store: Arc<dyn MissionStore>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            store,
            dispatcher,
            clinic_capacity: FleetConfig::default().clinic_capacity,
            intake_broadcast: Vec::new(),
        }
    }

    /// Apply fleet settings (clinic capacity, intake broadcast list)
    pub fn with_fleet(mut self, fleet: &FleetConfig) -> Self {
        self.clinic_capacity = fleet.clinic_capacity;
        self.intake_broadcast = fleet.intake_broadcast.clone();
        self
    }

    /// Patient submits a new delivery request
    ///
    /// The draft's requester must be the authenticated caller; missions are
    /// always created on the patient's own behalf.
    pub async fn request(&self, actor: &Actor, draft: MissionDraft) -> Result<Mission> {
        self.check_capability(actor, TransitionAction::Request)?;
        if draft.requester.id != actor.id() {
            return Err(AeromedError::Validation(
                "requester must be the authenticated caller".into(),
            ));
        }

        let mission = self.store.create(&draft, Utc::now())?;
        info!(mission = mission.id, patient = actor.id(), "Mission requested");

        self.notify_parties(&mission, None).await;
        self.notify_intake(&mission).await;
        Ok(mission)
    }

    /// Clinic takes ownership of a requested mission
    pub async fn accept(&self, actor: &Actor, id: MissionId) -> Result<Mission> {
        let mission = self.store.get(id)?;
        self.authorize(actor, TransitionAction::Accept, &mission)?;

        let active = self.store.active_clinic_missions(actor.id())?;
        if active >= u64::from(self.clinic_capacity) {
            return Err(AeromedError::ClinicAtCapacity {
                clinic: actor.id().to_string(),
                active,
                limit: self.clinic_capacity,
            });
        }

        let clinic = Party::from(actor);
        let record = TransitionRecord::new(MissionStatus::Accepted, actor, Utc::now())
            .with_clinic(&clinic);
        let mission = self.commit(id, mission.version, record)?;

        let detail = format!("Your request was accepted by {}.", clinic.name);
        self.notify_parties(&mission, Some(detail)).await;
        Ok(mission)
    }

    /// Clinic declines a requested mission
    pub async fn reject(
        &self,
        actor: &Actor,
        id: MissionId,
        reason: Option<String>,
    ) -> Result<Mission> {
        let mission = self.store.get(id)?;
        self.authorize(actor, TransitionAction::Reject, &mission)?;

        let mut record = TransitionRecord::new(MissionStatus::Rejected, actor, Utc::now());
        if let Some(reason) = &reason {
            record = record.with_note(reason.clone());
        }
        let mission = self.commit(id, mission.version, record)?;

        self.notify_parties(&mission, reason).await;
        Ok(mission)
    }

    /// Reserve an available drone for an accepted mission
    pub async fn assign(&self, actor: &Actor, id: MissionId, drone_id: i64) -> Result<Mission> {
        let mission = self.store.get(id)?;
        self.authorize(actor, TransitionAction::Assign, &mission)?;

        // Availability is re-checked inside the transaction; this early read
        // exists to produce DroneNotFound before the version is consumed and
        // to put the drone's name in the notification.
        let drone = self.store.get_drone(drone_id)?;

        let record = TransitionRecord::new(MissionStatus::Assigned, actor, Utc::now())
            .with_drone(drone_id);
        let mission = self.commit(id, mission.version, record)?;

        let detail = format!("Drone {} has been reserved for your delivery.", drone.name);
        self.notify_parties(&mission, Some(detail)).await;
        Ok(mission)
    }

    /// External launch confirmation moves the mission in transit
    pub async fn confirm_launch(&self, actor: &Actor, id: MissionId) -> Result<Mission> {
        let mission = self.store.get(id)?;
        self.authorize(actor, TransitionAction::Launch, &mission)?;

        let record = TransitionRecord::new(MissionStatus::InTransit, actor, Utc::now());
        let mission = self.commit(id, mission.version, record)?;

        self.notify_parties(&mission, None).await;
        Ok(mission)
    }

    /// Delivery confirmation closes the mission successfully
    pub async fn confirm_delivery(&self, actor: &Actor, id: MissionId) -> Result<Mission> {
        let mission = self.store.get(id)?;
        self.authorize(actor, TransitionAction::Deliver, &mission)?;

        let record = TransitionRecord::new(MissionStatus::Delivered, actor, Utc::now())
            .releasing_drone();
        let mission = self.commit(id, mission.version, record)?;

        self.notify_parties(&mission, None).await;
        Ok(mission)
    }

    /// An irrecoverable fault closes the mission from any non-terminal state
    pub async fn fail(&self, actor: &Actor, id: MissionId, reason: String) -> Result<Mission> {
        let mission = self.store.get(id)?;
        self.authorize(actor, TransitionAction::Fail, &mission)?;

        let mut record = TransitionRecord::new(MissionStatus::Failed, actor, Utc::now())
            .with_note(reason.clone());
        if mission.drone_id.is_some() {
            record = record.releasing_drone();
        }
        let mission = self.commit(id, mission.version, record)?;

        self.notify_parties(&mission, Some(reason)).await;
        Ok(mission)
    }

    /// Fetch a mission
    pub fn get(&self, id: MissionId) -> Result<Mission> {
        self.store.get(id)
    }

    /// A mission's audit trail
    pub fn audit_log(&self, id: MissionId) -> Result<Vec<crate::mission::AuditEntry>> {
        self.store.audit_log(id)
    }

    // Terminal beats everything: a closed mission answers MissionClosed to
    // any actor, before capability or edge checks.
    fn authorize(
        &self,
        actor: &Actor,
        action: TransitionAction,
        mission: &Mission,
    ) -> Result<()> {
        if mission.status.is_terminal() {
            return Err(AeromedError::MissionClosed {
                status: mission.status,
            });
        }
        self.check_capability(actor, action)?;

        let target = action.target();
        if !mission.status.can_become(target) {
            return Err(AeromedError::InvalidTransition {
                from: mission.status,
                to: target,
            });
        }
        Ok(())
    }

    fn check_capability(&self, actor: &Actor, action: TransitionAction) -> Result<()> {
        if !allowed(actor.role, action) {
            return Err(AeromedError::Unauthorized {
                role: actor.role.to_string(),
                action: action.to_string(),
            });
        }
        Ok(())
    }

    fn commit(
        &self,
        id: MissionId,
        expected_version: u64,
        record: TransitionRecord<'_>,
    ) -> Result<Mission> {
        match self.store.append_transition(id, expected_version, record)? {
            AppendOutcome::Committed(mission) => {
                info!(
                    mission = id,
                    status = %mission.status,
                    version = mission.version,
                    "Mission transition committed"
                );
                Ok(mission)
            }
            AppendOutcome::Conflict => Err(AeromedError::ConcurrentModification(id)),
        }
    }

    /// Notify the parties affected by the mission's current status. Runs
    /// strictly after the commit; outcomes are recorded by the dispatcher
    /// and intentionally not propagated.
    async fn notify_parties(&self, mission: &Mission, detail: Option<String>) {
        for party in status_recipients(mission) {
            let Some(email) = &party.email else {
                continue;
            };
            let template = Template::StatusChange {
                recipient_name: party.name.clone(),
                mission_id: mission.id,
                status: mission.status,
                items: mission.items.clone(),
                delivery_address: mission.delivery_address.clone(),
                detail: detail.clone(),
            };
            let _ = self.dispatcher.send(Some(mission.id), email, &template).await;
        }
    }

    /// Announce a new request to the configured clinic intake addresses
    async fn notify_intake(&self, mission: &Mission) {
        for address in &self.intake_broadcast {
            let template = Template::StatusChange {
                recipient_name: "Clinic Intake".into(),
                mission_id: mission.id,
                status: mission.status,
                items: mission.items.clone(),
                delivery_address: mission.delivery_address.clone(),
                detail: Some("A new delivery request is awaiting review.".into()),
            };
            let _ = self.dispatcher.send(Some(mission.id), address, &template).await;
        }
    }
}

/// Which parties hear about a mission entering its current status
fn status_recipients(mission: &Mission) -> Vec<&Party> {
    let mut recipients = vec![&mission.requester];
    let clinic_too = matches!(
        mission.status,
        MissionStatus::Assigned | MissionStatus::Delivered | MissionStatus::Failed
    );
    if clinic_too {
        if let Some(clinic) = &mission.clinic {
            recipients.push(clinic);
        }
    }
    recipients
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Identity, Role};
    use crate::notify::{MailTransport, MemoryTransport, NotificationLog};
    use crate::retry::RetryConfig;
    use crate::store::SqliteStore;

    struct Harness {
        control: MissionControl,
        transport: Arc<MemoryTransport>,
        store: Arc<SqliteStore>,
    }

    fn harness() -> Harness {
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
        Harness {
            control,
            transport,
            store,
        }
    }

    fn patient() -> Actor {
        Actor::new(
            Identity::new("u-100", "Amara")
                .with_email(EmailAddress::new("amara@example.sl").unwrap()),
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

    fn draft(actor: &Actor) -> MissionDraft {
        MissionDraft::new(
            Party::from(actor),
            "insulin, 2 vials",
            "12 Kissy Rd, Freetown",
        )
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let h = harness();
        let patient = patient();
        let clinic = clinic();
        let system = system();

        let mission = h.control.request(&patient, draft(&patient)).await.unwrap();
        assert_eq!(mission.status, MissionStatus::Requested);

        let mission = h.control.accept(&clinic, mission.id).await.unwrap();
        assert_eq!(mission.status, MissionStatus::Accepted);
        assert_eq!(mission.clinic.as_ref().unwrap().id, "c-7");

        let drone = h.store.add_drone("SW-Alpha").unwrap();
        let mission = h.control.assign(&clinic, mission.id, drone.id).await.unwrap();
        assert_eq!(mission.status, MissionStatus::Assigned);
        assert_eq!(mission.drone_id, Some(drone.id));

        let mission = h.control.confirm_launch(&system, mission.id).await.unwrap();
        assert_eq!(mission.status, MissionStatus::InTransit);

        let mission = h.control.confirm_delivery(&system, mission.id).await.unwrap();
        assert_eq!(mission.status, MissionStatus::Delivered);
        assert!(mission.is_closed());
        assert!(mission.archived_at.is_some());

        // requested(1) + accepted(1) + assigned(2) + in_transit(1) + delivered(2)
        assert_eq!(h.transport.sent_count(), 7);

        let audit = h.control.audit_log(mission.id).unwrap();
        assert_eq!(audit.len(), 6);
        assert_eq!(audit.last().unwrap().status, MissionStatus::Delivered);
    }

    #[tokio::test]
    async fn test_request_requires_patient_role() {
        let h = harness();
        let clinic = clinic();
        let err = h.control.request(&clinic, draft(&clinic)).await.unwrap_err();
        assert!(matches!(err, AeromedError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn test_request_must_be_self() {
        let h = harness();
        let patient = patient();
        let other = Party::new("u-999", "Someone Else");
        let draft = MissionDraft::new(other, "bandages", "7 Wilkinson Rd");
        let err = h.control.request(&patient, draft).await.unwrap_err();
        assert!(matches!(err, AeromedError::Validation(_)));
    }

    #[tokio::test]
    async fn test_patient_cannot_accept() {
        let h = harness();
        let patient = patient();
        let mission = h.control.request(&patient, draft(&patient)).await.unwrap();

        let err = h.control.accept(&patient, mission.id).await.unwrap_err();
        assert!(matches!(err, AeromedError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn test_launch_from_requested_is_invalid() {
        let h = harness();
        let patient = patient();
        let mission = h.control.request(&patient, draft(&patient)).await.unwrap();

        let err = h.control.confirm_launch(&admin(), mission.id).await.unwrap_err();
        assert!(matches!(
            err,
            AeromedError::InvalidTransition {
                from: MissionStatus::Requested,
                to: MissionStatus::InTransit,
            }
        ));
    }

    #[tokio::test]
    async fn test_closed_mission_rejects_everyone() {
        let h = harness();
        let patient = patient();
        let clinic = clinic();
        let mission = h.control.request(&patient, draft(&patient)).await.unwrap();
        h.control.reject(&clinic, mission.id, None).await.unwrap();

        // Regardless of actor, including ones whose role would otherwise
        // never pass the capability check
        let err = h.control.accept(&clinic, mission.id).await.unwrap_err();
        assert!(matches!(err, AeromedError::MissionClosed { .. }));
        let err = h
            .control
            .fail(&admin(), mission.id, "too late".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AeromedError::MissionClosed { .. }));
        let err = h.control.accept(&patient, mission.id).await.unwrap_err();
        assert!(matches!(err, AeromedError::MissionClosed { .. }));
    }

    #[tokio::test]
    async fn test_clinic_capacity_precondition() {
        let h = harness();
        let store_dyn: Arc<dyn MissionStore> = h.store.clone();
        let transport_dyn: Arc<dyn MailTransport> = h.transport.clone();
        let control = MissionControl::new(
            store_dyn,
            Arc::new(Dispatcher::new(
                transport_dyn,
                EmailAddress::new("no-reply@aeromed.example").unwrap(),
            )),
        )
        .with_fleet(&FleetConfig {
            clinic_capacity: 1,
            intake_broadcast: Vec::new(),
        });
        let patient = patient();
        let clinic = clinic();

        let first = control.request(&patient, draft(&patient)).await.unwrap();
        let second = control.request(&patient, draft(&patient)).await.unwrap();

        control.accept(&clinic, first.id).await.unwrap();
        let err = control.accept(&clinic, second.id).await.unwrap_err();
        assert!(matches!(
            err,
            AeromedError::ClinicAtCapacity { active: 1, limit: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_assign_requires_known_available_drone() {
        let h = harness();
        let patient = patient();
        let clinic = clinic();
        let mission = h.control.request(&patient, draft(&patient)).await.unwrap();
        let mission = h.control.accept(&clinic, mission.id).await.unwrap();

        let err = h.control.assign(&clinic, mission.id, 99).await.unwrap_err();
        assert!(matches!(err, AeromedError::DroneNotFound(99)));

        let drone = h.store.add_drone("SW-Alpha").unwrap();
        h.store
            .set_drone_status(drone.id, crate::drone::DroneStatus::Maintenance)
            .unwrap();
        let err = h
            .control
            .assign(&clinic, mission.id, drone.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AeromedError::DroneUnavailable { .. }));

        // The failed precondition consumed nothing
        let current = h.control.get(mission.id).unwrap();
        assert_eq!(current.status, MissionStatus::Accepted);
        assert_eq!(current.version, 1);
    }

    #[tokio::test]
    async fn test_fail_releases_assigned_drone() {
        let h = harness();
        let patient = patient();
        let clinic = clinic();
        let mission = h.control.request(&patient, draft(&patient)).await.unwrap();
        h.control.accept(&clinic, mission.id).await.unwrap();
        let drone = h.store.add_drone("SW-Alpha").unwrap();
        h.control.assign(&clinic, mission.id, drone.id).await.unwrap();

        h.control
            .fail(&admin(), mission.id, "battery fault on pad".into())
            .await
            .unwrap();

        assert_eq!(
            h.store.get_drone(drone.id).unwrap().status,
            crate::drone::DroneStatus::Available
        );
        let audit = h.control.audit_log(mission.id).unwrap();
        assert_eq!(
            audit.last().unwrap().note.as_deref(),
            Some("battery fault on pad")
        );
    }

    #[tokio::test]
    async fn test_dispatch_failure_never_reverts_a_commit() {
        let h = harness();
        let patient = patient();
        let clinic = clinic();
        let mission = h.control.request(&patient, draft(&patient)).await.unwrap();

        // Every delivery attempt for the acceptance notification will fail
        h.transport.fail_unreachable(10);

        let accepted = h.control.accept(&clinic, mission.id).await.unwrap();
        assert_eq!(accepted.status, MissionStatus::Accepted);

        // The commit stands in the store as well
        let current = h.control.get(mission.id).unwrap();
        assert_eq!(current.status, MissionStatus::Accepted);
        assert_eq!(current.version, 1);
    }

    #[tokio::test]
    async fn test_no_notification_without_commit() {
        let h = harness();
        let patient = patient();
        let admin = admin();
        let mission = h.control.request(&patient, draft(&patient)).await.unwrap();
        let sent_after_request = h.transport.sent_count();

        // Invalid transition: nothing is dispatched
        let _ = h.control.confirm_launch(&admin, mission.id).await.unwrap_err();
        assert_eq!(h.transport.sent_count(), sent_after_request);
    }

    #[tokio::test]
    async fn test_intake_broadcast_on_request() {
        let h = harness();
        let store_dyn: Arc<dyn MissionStore> = h.store.clone();
        let transport_dyn: Arc<dyn MailTransport> = h.transport.clone();
        let control = MissionControl::new(
            store_dyn,
            Arc::new(Dispatcher::new(
                transport_dyn,
                EmailAddress::new("no-reply@aeromed.example").unwrap(),
            )),
        )
        .with_fleet(&FleetConfig {
            clinic_capacity: 5,
            intake_broadcast: vec![
                EmailAddress::new("intake@clinic-one.example.sl").unwrap(),
                EmailAddress::new("intake@clinic-two.example.sl").unwrap(),
            ],
        });
        let patient = patient();

        control.request(&patient, draft(&patient)).await.unwrap();

        // patient confirmation + two intake notices
        assert_eq!(h.transport.sent_count(), 3);
    }
}
