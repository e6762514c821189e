//! End-to-end batch behaviour against the in-memory stores and a scripted
//! oracle.

use std::sync::Arc;

use chrono::Duration;

use robert_core::codec::Ebid;
use robert_core::error::{RobertError, StoreError};
use robert_core::oracle::{ScriptedAnswer, ScriptedOracle};
use robert_core::pipeline::{BatchMode, BatchStep, RiskBatch};
use robert_core::storage::{
    Contact, ContactRepository, HelloMessageDetail, InMemoryContactRepository,
    InMemoryRegistrationRepository, PermanentIdentifier, Registration, RegistrationRepository,
};
use robert_core::validation::DiscardReason;
use robert_core::{RobertClock, RobertConfig, RobertInstant};

const EPOCH: i32 = 5000;

struct Harness {
    config: RobertConfig,
    clock: RobertClock,
    oracle: Arc<ScriptedOracle>,
    registrations: Arc<InMemoryRegistrationRepository>,
    contacts: Arc<InMemoryContactRepository>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(RobertConfig::default())
    }

    fn with_config(config: RobertConfig) -> Self {
        robert_core::init_logger();
        Self {
            clock: config.clock().unwrap(),
            config,
            oracle: Arc::new(ScriptedOracle::new()),
            registrations: Arc::new(InMemoryRegistrationRepository::new()),
            contacts: Arc::new(InMemoryContactRepository::new()),
        }
    }

    fn batch(&self) -> RiskBatch {
        RiskBatch::new(
            &self.config,
            self.oracle.clone(),
            self.registrations.clone(),
            self.contacts.clone(),
        )
        .unwrap()
    }

    fn register(&self, id: &[u8]) -> PermanentIdentifier {
        let id = PermanentIdentifier::new(id.to_vec()).unwrap();
        self.registrations.save(Registration::new(id.clone())).unwrap();
        id
    }

    fn registration(&self, id: &PermanentIdentifier) -> Registration {
        self.registrations.find_by_id(id).unwrap().unwrap()
    }

    fn store(&self, registration: Registration) {
        self.registrations.save(registration).unwrap();
    }

    fn pending(&self, ebid: u8, messages: Vec<HelloMessageDetail>) {
        let contact = Contact::new(&[ebid; 8], &[0x21], messages).unwrap();
        self.contacts.save_all(vec![contact]).unwrap();
    }

    /// Fifteen strong messages, one per minute from the start of `epoch`.
    fn close_contact(&self, ebid: u8, id: &[u8], epoch: i32) {
        self.oracle.resolve(Ebid([ebid; 8]), id, 33, epoch);
        let start = self.clock.at_epoch(epoch);
        let messages = (0..15)
            .map(|minute| message(minute as u8 + 1, start.plus(Duration::minutes(minute)), 0))
            .collect();
        self.pending(ebid, messages);
    }
}

/// A HELLO received at `received` and sent `drift` seconds earlier.
fn message(mac: u8, received: RobertInstant, drift: i64) -> HelloMessageDetail {
    let sent = received.minus(Duration::seconds(drift));
    HelloMessageDetail::new(
        vec![mac; 5],
        sent.as_16_less_significant_bits(),
        received.as_ntp_timestamp(),
        -20,
    )
    .unwrap()
}

#[test]
fn every_contact_is_consumed_exactly_once() {
    let harness = Harness::new();
    harness.register(b"known");
    harness.close_contact(1, b"known", EPOCH);
    harness.close_contact(2, b"missing", EPOCH);
    harness.pending(3, Vec::new());
    harness.oracle.script(Ebid([4; 8]), ScriptedAnswer::Unavailable);
    harness.pending(4, vec![message(1, harness.clock.at_epoch(EPOCH), 0)]);

    let now = harness.clock.at_epoch(EPOCH + 8);
    let report = harness.batch().run_at(now).unwrap();

    assert_eq!(harness.contacts.count().unwrap(), 0);
    assert_eq!(report.metrics.contacts_processed, 4);
    assert_eq!(report.metrics.contacts_accepted, 1);
    assert_eq!(
        report.metrics.contacts_discarded[DiscardReason::UnknownIdentity.as_str()],
        1
    );
    assert_eq!(
        report.metrics.contacts_discarded[DiscardReason::NoMessages.as_str()],
        1
    );
    assert_eq!(
        report.metrics.contacts_discarded[DiscardReason::AuthenticationFailure.as_str()],
        1
    );

    // A second run finds nothing left to score.
    let rerun = harness.batch().run_at(now).unwrap();
    assert_eq!(rerun.step(BatchStep::ContactScoring).unwrap().processed, 0);
    assert_eq!(harness.oracle.call_count(), 3);
}

#[test]
fn contact_keeps_its_valid_messages() {
    let harness = Harness::new();
    let id = harness.register(b"user");
    harness.oracle.resolve(Ebid([1; 8]), b"user", 33, EPOCH);
    let start = harness.clock.at_epoch(EPOCH);
    harness.pending(
        1,
        vec![
            message(1, start, 0),
            message(2, start.plus(Duration::minutes(1)), 181),
            message(3, start.plus(Duration::minutes(2)), 10),
            message(4, start.plus(Duration::minutes(3)), -181),
        ],
    );

    let report = harness.batch().run_at(start.plus_epochs(4)).unwrap();

    assert_eq!(harness.contacts.count().unwrap(), 0);
    assert_eq!(report.metrics.messages_time_tolerance_exceeded, 2);
    assert_eq!(report.metrics.contacts_accepted, 1);
    let registration = harness.registration(&id);
    assert_eq!(registration.exposed_epochs.len(), 1);
    assert_eq!(registration.exposed_epochs[0].epoch_id, EPOCH);
}

#[test]
fn drift_beyond_tolerance_records_nothing() {
    let harness = Harness::new();
    let id = harness.register(b"user");
    harness.oracle.resolve(Ebid([1; 8]), b"user", 33, EPOCH);
    let received = harness.clock.at_epoch(EPOCH);
    let tolerance = harness.config.hello_message_timestamp_tolerance as i64;
    harness.pending(1, vec![message(1, received, tolerance + 1)]);

    let report = harness.batch().run_at(received.plus_epochs(4)).unwrap();

    assert_eq!(harness.oracle.call_count(), 1);
    assert_eq!(harness.contacts.count().unwrap(), 0);
    assert!(harness.registration(&id).exposed_epochs.is_empty());
    assert_eq!(
        report.metrics.contacts_discarded[DiscardReason::NoValidMessages.as_str()],
        1
    );
}

#[test]
fn receive_time_beyond_wire_width_is_discarded() {
    let harness = Harness::new();
    let id = harness.register(b"user");
    harness.oracle.resolve(Ebid([1; 8]), b"user", 33, EPOCH);
    let received = harness.clock.at_epoch(EPOCH);
    let corrupt = HelloMessageDetail {
        mac: vec![1; 5],
        time_from_hello_message: received.as_16_less_significant_bits(),
        time_collected_on_device: 0xFFFF_FFFF_FFFF,
        rssi_calibrated: -20,
    };
    harness.pending(1, vec![corrupt]);

    let report = harness.batch().run_at(received.plus_epochs(4)).unwrap();

    assert_eq!(harness.contacts.count().unwrap(), 0);
    assert!(harness.registration(&id).exposed_epochs.is_empty());
    assert_eq!(report.metrics.messages_timestamp_out_of_range, 1);
    assert_eq!(
        report.metrics.contacts_discarded[DiscardReason::NoValidMessages.as_str()],
        1
    );

    let rerun = harness.batch().run_at(received.plus_epochs(4)).unwrap();
    assert_eq!(rerun.step(BatchStep::ContactScoring).unwrap().processed, 0);
}

#[test]
fn unplaceable_last_contact_is_reset() {
    let harness = Harness::new();
    let id = harness.register(b"user");
    let mut registration = harness.registration(&id);
    registration.at_risk = true;
    registration.is_notified = true;
    registration.notified_for_current_risk = true;
    registration.last_contact_timestamp = Some(0xFFFF_FFFF_FFFF);
    harness.store(registration);

    let report = harness.batch().run_at(harness.clock.at_epoch(EPOCH)).unwrap();

    assert_eq!(report.metrics.risk_resets_notified, 1);
    let registration = harness.registration(&id);
    assert!(!registration.at_risk);
    assert!(registration.is_notified);
}

#[test]
fn two_contacts_in_one_epoch_put_user_at_risk() {
    let harness = Harness::new();
    let id = harness.register(b"user");
    harness.close_contact(1, b"user", EPOCH);
    harness.close_contact(2, b"user", EPOCH);

    harness.batch().run_at(harness.clock.at_epoch(EPOCH + 8)).unwrap();

    let registration = harness.registration(&id);
    assert_eq!(registration.exposed_epochs.len(), 1);
    assert_eq!(registration.exposed_epochs[0].exposition_scores.len(), 2);
    assert!(registration.at_risk);
    assert!(!registration.is_notified);
}

#[test]
fn never_notified_risk_is_reset() {
    let harness = Harness::new();
    let id = harness.register(b"user");
    let now = harness.clock.at_epoch(EPOCH);
    let mut registration = harness.registration(&id);
    registration.at_risk = true;
    registration.latest_risk_epoch = EPOCH - 10;
    registration.last_contact_timestamp = Some(now.truncated_to_day().as_ntp_timestamp());
    harness.store(registration);

    let report = harness.batch().run_at(now).unwrap();

    let registration = harness.registration(&id);
    assert!(!registration.at_risk);
    assert!(!registration.is_notified);
    assert_eq!(report.metrics.risk_resets_never_notified, 1);
}

#[test]
fn notified_risk_is_kept_for_the_retention_period() {
    for (days_ago, expect_reset) in [(8, true), (7, false), (6, false)] {
        let harness = Harness::new();
        let id = harness.register(b"user");
        let now = harness.clock.at_epoch(EPOCH).plus(Duration::hours(3));
        let mut registration = harness.registration(&id);
        registration.at_risk = true;
        registration.is_notified = true;
        registration.notified_for_current_risk = true;
        registration.last_contact_timestamp =
            Some(now.minus_days(days_ago).truncated_to_day().as_ntp_timestamp());
        harness.store(registration);

        let report = harness.batch().run_at(now).unwrap();

        let registration = harness.registration(&id);
        assert_eq!(registration.at_risk, !expect_reset, "{} days ago", days_ago);
        assert!(registration.is_notified);
        assert_eq!(registration.notified_for_current_risk, !expect_reset);
        assert_eq!(report.metrics.risk_resets_notified, u64::from(expect_reset));
    }
}

#[test]
fn expositions_past_the_contagious_period_are_purged() {
    let harness = Harness::new();
    let id = harness.register(b"user");
    let current = EPOCH + 2000;
    let per_day = harness.clock.epochs_per_day();
    let days = harness.config.contagious_period_days as i32;
    let boundary = current - days * per_day;
    let recent = current - (days - 1) * per_day;

    let mut registration = harness.registration(&id);
    registration.add_exposure_scores(boundary, &[1.0]);
    registration.add_exposure_scores(recent, &[1.0]);
    harness.store(registration);

    let now = harness.clock.at_epoch(current);
    let report = harness.batch().run_at(now).unwrap();
    let epochs: Vec<i32> = harness
        .registration(&id)
        .exposed_epochs
        .iter()
        .map(|e| e.epoch_id)
        .collect();
    assert_eq!(epochs, vec![recent]);
    assert_eq!(report.metrics.expositions_purged, 1);

    let again = harness.batch().run_at(now).unwrap();
    assert_eq!(again.metrics.expositions_purged, 0);
    assert_eq!(harness.registration(&id).exposed_epochs.len(), 1);
}

#[test]
fn evaluated_epochs_are_not_counted_twice() {
    let harness = Harness::with_config(RobertConfig {
        batch_mode: BatchMode::FullRegistrationScanComputeRisk,
        ..Default::default()
    });
    let id = harness.register(b"user");
    let mut registration = harness.registration(&id);
    registration.add_exposure_scores(EPOCH, &[28.0]);
    harness.store(registration);

    let now = harness.clock.at_epoch(EPOCH + 8);
    let first = harness.batch().run_at(now).unwrap();
    assert_eq!(first.metrics.risks_detected, 1);
    assert_eq!(harness.registration(&id).latest_risk_epoch, EPOCH);

    // Scores below the threshold on their own, above it with EPOCH included.
    let mut registration = harness.registration(&id);
    registration.add_exposure_scores(EPOCH + 1, &[2.0]);
    harness.store(registration);

    let second = harness.batch().run_at(now).unwrap();
    assert_eq!(second.metrics.risks_detected, 0);
    assert_eq!(harness.registration(&id).latest_risk_epoch, EPOCH);
}

#[test]
fn last_contact_never_moves_backwards() {
    let harness = Harness::new();
    let id = harness.register(b"user");
    let now = harness.clock.at_epoch(EPOCH + 8);
    let mut registration = harness.registration(&id);
    registration.at_risk = true;
    registration.is_notified = true;
    registration.latest_risk_epoch = EPOCH - 3 * harness.clock.epochs_per_day();
    registration.last_contact_timestamp = Some(now.truncated_to_day().as_ntp_timestamp());
    harness.store(registration);

    // Older exposure, strong enough to raise the risk again.
    let older = EPOCH - 2 * harness.clock.epochs_per_day();
    harness.close_contact(1, b"user", older);
    harness.close_contact(2, b"user", older);

    harness.batch().run_at(now).unwrap();

    let registration = harness.registration(&id);
    assert!(registration.at_risk);
    assert_eq!(
        registration.last_contact_timestamp,
        Some(now.truncated_to_day().as_ntp_timestamp())
    );
}

#[test]
fn store_outage_aborts_the_batch() {
    let harness = Harness::new();
    harness.register(b"user");
    harness.close_contact(1, b"user", EPOCH);
    harness.contacts.set_unavailable(true);

    let result = harness.batch().run_at(harness.clock.at_epoch(EPOCH + 8));
    assert!(matches!(
        result,
        Err(RobertError::Store(StoreError::Unavailable(_)))
    ));
    assert_eq!(harness.oracle.call_count(), 0);
}
