use super::*;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use shared::{
    domain::{AppointmentId, DoctorId, ScheduleId},
    protocol::{CreateAppointmentRequest, DoctorOption, ScheduleOption},
};
use tokio::sync::oneshot;

use crate::error::TransportError;

type DoctorsResult = Result<Vec<DoctorOption>, TransportError>;
type SchedulesResult = Result<Vec<ScheduleOption>, TransportError>;
type SubmitResult = Result<CreateAppointmentResponse, TransportError>;

#[derive(Default)]
struct FakeTransport {
    doctors: Mutex<HashMap<NaiveDate, DoctorsResult>>,
    schedules: Mutex<HashMap<(NaiveDate, DoctorId), SchedulesResult>>,
    submit_results: Mutex<Vec<SubmitResult>>,
    doctor_gates: Mutex<HashMap<NaiveDate, oneshot::Receiver<()>>>,
    submit_gate: Mutex<Option<oneshot::Receiver<()>>>,
    doctor_calls: Mutex<Vec<NaiveDate>>,
    schedule_calls: Mutex<Vec<(NaiveDate, DoctorId)>>,
    submissions: Mutex<Vec<CreateAppointmentRequest>>,
}

impl FakeTransport {
    async fn with_doctors(&self, date: NaiveDate, result: DoctorsResult) {
        self.doctors.lock().await.insert(date, result);
    }

    async fn with_schedules(&self, date: NaiveDate, doctor: DoctorId, result: SchedulesResult) {
        self.schedules.lock().await.insert((date, doctor), result);
    }

    async fn queue_submit(&self, result: SubmitResult) {
        self.submit_results.lock().await.push(result);
    }

    async fn gate_doctors(&self, date: NaiveDate) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.doctor_gates.lock().await.insert(date, rx);
        tx
    }

    async fn gate_submit(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.submit_gate.lock().await = Some(rx);
        tx
    }

    async fn submission_count(&self) -> usize {
        self.submissions.lock().await.len()
    }
}

#[async_trait]
impl AppointmentTransport for FakeTransport {
    async fn available_doctors(&self, date: NaiveDate) -> DoctorsResult {
        self.doctor_calls.lock().await.push(date);
        let gate = self.doctor_gates.lock().await.remove(&date);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.doctors
            .lock()
            .await
            .get(&date)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn available_schedules(&self, date: NaiveDate, doctor_id: DoctorId) -> SchedulesResult {
        self.schedule_calls.lock().await.push((date, doctor_id));
        self.schedules
            .lock()
            .await
            .get(&(date, doctor_id))
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn create_appointment(&self, request: &CreateAppointmentRequest) -> SubmitResult {
        self.submissions.lock().await.push(request.clone());
        let gate = self.submit_gate.lock().await.take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        let mut results = self.submit_results.lock().await;
        if results.is_empty() {
            return Err(TransportError::Network("no response configured".to_string()));
        }
        results.remove(0)
    }
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, day).expect("date")
}

fn doctor(id: i64, name: &str) -> DoctorOption {
    DoctorOption {
        doctor_id: DoctorId(id),
        name: name.to_string(),
        specialization: None,
    }
}

fn schedule(id: i64, hour: u32) -> ScheduleOption {
    ScheduleOption {
        schedule_id: ScheduleId(id),
        start_time: NaiveTime::from_hms_opt(hour, 0, 0).expect("time"),
        end_time: NaiveTime::from_hms_opt(hour, 30, 0).expect("time"),
        remaining_slots: None,
    }
}

fn created(id: i64) -> CreateAppointmentResponse {
    CreateAppointmentResponse {
        appointment_id: AppointmentId(id),
        redirect_to: Some(format!("/appointments/{id}")),
        message: Some("Appointment created.".to_string()),
    }
}

/// Transport with three doctors on Jan 10 and two schedules for doctor 7.
async fn clinic() -> Arc<FakeTransport> {
    let transport = Arc::new(FakeTransport::default());
    transport
        .with_doctors(
            date(10),
            Ok(vec![
                doctor(3, "Dr. Ayu"),
                doctor(7, "Dr. Rina"),
                doctor(9, "Dr. Bayu"),
            ]),
        )
        .await;
    transport
        .with_schedules(date(10), DoctorId(7), Ok(vec![schedule(1, 9), schedule(2, 10)]))
        .await;
    transport
}

async fn fill_through_schedule(controller: &Arc<BookingController<Arc<FakeTransport>>>) {
    let handle = controller
        .set_field(AppointmentField::Date, "2025-01-10")
        .await
        .expect("date")
        .expect("doctor refresh");
    assert_eq!(handle.wait().await, RefreshOutcome::Applied { candidates: 3 });
    let handle = controller
        .set_field(AppointmentField::Doctor, "7")
        .await
        .expect("doctor")
        .expect("schedule refresh");
    assert_eq!(handle.wait().await, RefreshOutcome::Applied { candidates: 2 });
    let none = controller
        .set_field(AppointmentField::Schedule, "2")
        .await
        .expect("schedule");
    assert!(none.is_none());
}

#[tokio::test]
async fn full_booking_sends_exactly_one_write() {
    let transport = clinic().await;
    transport.queue_submit(Ok(created(15))).await;
    let controller = BookingController::new(Arc::clone(&transport));

    fill_through_schedule(&controller).await;
    controller
        .set_field(AppointmentField::ChiefComplaint, "toothache")
        .await
        .expect("complaint");
    assert_eq!(controller.current_step().await, 4);

    let intent = controller.submit().await.expect("submit");
    assert_eq!(
        intent,
        NavigationIntent {
            path: "/appointments/15".to_string(),
            flash: Some("Appointment created.".to_string()),
        }
    );

    let submissions = transport.submissions.lock().await;
    assert_eq!(submissions.len(), 1);
    assert_eq!(
        serde_json::to_value(&submissions[0]).expect("json"),
        serde_json::json!({
            "date": "2025-01-10",
            "doctor_id": 7,
            "schedule_id": 2,
            "chief_complaint": "toothache",
        })
    );

    let snapshot = controller.snapshot().await;
    assert!(!snapshot.submitting);
    assert_eq!(snapshot.general_error, None);
}

#[tokio::test]
async fn submit_with_missing_fields_never_calls_the_server() {
    let transport = clinic().await;
    let controller = BookingController::new(Arc::clone(&transport));

    let handle = controller
        .set_field(AppointmentField::Date, "2025-01-10")
        .await
        .expect("date")
        .expect("refresh");
    handle.wait().await;
    let handle = controller
        .set_field(AppointmentField::Doctor, "7")
        .await
        .expect("doctor")
        .expect("refresh");
    handle.wait().await;

    let err = controller.submit().await.expect_err("incomplete");
    let FormError::MissingFields { labels } = &err else {
        panic!("expected missing fields, got {err:?}");
    };
    assert_eq!(labels, &vec!["Schedule", "Chief complaint"]);
    assert_eq!(transport.submission_count().await, 0);

    let snapshot = controller.snapshot().await;
    let banner = snapshot.general_error.expect("banner");
    assert!(banner.contains("Schedule, Chief complaint"), "{banner}");
    assert!(!snapshot.submitting);
}

#[tokio::test]
async fn empty_form_submit_lists_every_field() {
    let transport = Arc::new(FakeTransport::default());
    let controller = BookingController::new(Arc::clone(&transport));

    let err = controller.submit().await.expect_err("empty");
    assert_eq!(
        err.to_string(),
        "Please fill in the required fields: Date, Doctor, Schedule, Chief complaint"
    );
    assert_eq!(transport.submission_count().await, 0);
}

#[tokio::test]
async fn doctor_fetch_failure_leaves_field_empty_with_banner() {
    let transport = Arc::new(FakeTransport::default());
    transport
        .with_doctors(
            date(10),
            Err(TransportError::Status {
                status: 500,
                message: "database unavailable".to_string(),
            }),
        )
        .await;
    let controller = BookingController::new(Arc::clone(&transport));

    let handle = controller
        .set_field(AppointmentField::Date, "2025-01-10")
        .await
        .expect("date")
        .expect("refresh");
    let outcome = handle.wait().await;
    assert!(matches!(outcome, RefreshOutcome::Failed { .. }));

    let snapshot = controller.snapshot().await;
    let doctor = snapshot.field(AppointmentField::Doctor);
    assert!(doctor.options.is_empty());
    assert!(!doctor.loading);
    assert_eq!(doctor.phase, FieldPhase::Empty);
    let banner = snapshot.general_error.expect("banner");
    assert!(banner.contains("database unavailable"), "{banner}");
}

#[tokio::test]
async fn failed_option_load_can_be_retried() {
    let transport = Arc::new(FakeTransport::default());
    transport
        .with_doctors(
            date(10),
            Err(TransportError::Network("connection reset".to_string())),
        )
        .await;
    let controller = BookingController::new(Arc::clone(&transport));
    controller
        .set_field(AppointmentField::Date, "2025-01-10")
        .await
        .expect("date")
        .expect("refresh")
        .wait()
        .await;

    transport
        .with_doctors(date(10), Ok(vec![doctor(7, "Dr. Rina")]))
        .await;
    let outcome = controller
        .refresh_options(AppointmentField::Doctor)
        .await
        .expect("retry");
    assert_eq!(outcome, RefreshOutcome::Applied { candidates: 1 });

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.general_error, None);
    assert_eq!(snapshot.field(AppointmentField::Doctor).phase, FieldPhase::Ready);
    assert_eq!(transport.doctor_calls.lock().await.len(), 2);
}

#[tokio::test]
async fn late_response_for_previous_date_is_discarded() {
    let transport = Arc::new(FakeTransport::default());
    transport
        .with_doctors(date(10), Ok(vec![doctor(1, "Dr. Old")]))
        .await;
    transport
        .with_doctors(
            date(11),
            Ok(vec![doctor(2, "Dr. New"), doctor(3, "Dr. Newer")]),
        )
        .await;
    let release_first = transport.gate_doctors(date(10)).await;
    let controller = BookingController::new(Arc::clone(&transport));

    let first = controller
        .set_field(AppointmentField::Date, "2025-01-10")
        .await
        .expect("date a")
        .expect("refresh a");
    let second = controller
        .set_field(AppointmentField::Date, "2025-01-11")
        .await
        .expect("date b")
        .expect("refresh b");
    assert_eq!(second.wait().await, RefreshOutcome::Applied { candidates: 2 });

    release_first.send(()).expect("release");
    assert_eq!(first.wait().await, RefreshOutcome::Stale);

    let snapshot = controller.snapshot().await;
    let values: Vec<_> = snapshot
        .field(AppointmentField::Doctor)
        .options
        .iter()
        .map(|o| o.value.as_str())
        .collect();
    assert_eq!(values, vec!["2", "3"]);
    assert_eq!(snapshot.field(AppointmentField::Date).value.as_deref(), Some("2025-01-11"));
}

#[tokio::test]
async fn changing_date_clears_doctor_schedule_and_complaint() {
    let transport = clinic().await;
    transport
        .with_doctors(date(12), Ok(vec![doctor(9, "Dr. Bayu")]))
        .await;
    let controller = BookingController::new(Arc::clone(&transport));
    fill_through_schedule(&controller).await;
    controller
        .set_field(AppointmentField::ChiefComplaint, "toothache")
        .await
        .expect("complaint");

    let release = transport.gate_doctors(date(12)).await;
    let handle = controller
        .set_field(AppointmentField::Date, "2025-01-12")
        .await
        .expect("date")
        .expect("refresh");
    let snapshot = controller.snapshot().await;
    for field in [
        AppointmentField::Doctor,
        AppointmentField::Schedule,
        AppointmentField::ChiefComplaint,
    ] {
        assert_eq!(snapshot.field(field).value, None, "{field:?}");
    }
    assert!(snapshot.field(AppointmentField::Schedule).options.is_empty());
    assert!(snapshot.field(AppointmentField::Doctor).loading);
    assert!(!snapshot.field(AppointmentField::Doctor).enabled);
    assert_eq!(snapshot.current_step, 1);

    release.send(()).expect("release");
    handle.wait().await;
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.field(AppointmentField::Doctor).options.len(), 1);
}

#[tokio::test]
async fn changing_doctor_reloads_schedules_and_clears_choice() {
    let transport = clinic().await;
    transport
        .with_schedules(date(10), DoctorId(3), Ok(vec![schedule(8, 14)]))
        .await;
    let controller = BookingController::new(Arc::clone(&transport));
    fill_through_schedule(&controller).await;

    let handle = controller
        .set_field(AppointmentField::Doctor, "3")
        .await
        .expect("doctor")
        .expect("refresh");
    assert_eq!(handle.field(), AppointmentField::Schedule);
    handle.wait().await;

    let snapshot = controller.snapshot().await;
    let schedule_field = snapshot.field(AppointmentField::Schedule);
    assert_eq!(schedule_field.value, None);
    assert_eq!(schedule_field.options.len(), 1);
    assert_eq!(schedule_field.options[0].value, "8");
    assert_eq!(
        transport.schedule_calls.lock().await.last().copied(),
        Some((date(10), DoctorId(3)))
    );
}

#[tokio::test]
async fn rejected_value_is_reported_on_the_field() {
    let transport = clinic().await;
    let controller = BookingController::new(Arc::clone(&transport));
    controller
        .set_field(AppointmentField::Date, "2025-01-10")
        .await
        .expect("date")
        .expect("refresh")
        .wait()
        .await;

    let err = controller
        .set_field(AppointmentField::Doctor, "42")
        .await
        .expect_err("not offered");
    assert!(matches!(err, SelectionError::NotAnOption { .. }));
    let snapshot = controller.snapshot().await;
    assert!(snapshot.field(AppointmentField::Doctor).error.is_some());
    assert_eq!(snapshot.field(AppointmentField::Doctor).value, None);

    let err = controller
        .set_field(AppointmentField::ChiefComplaint, "toothache")
        .await
        .expect_err("upstream empty");
    assert!(matches!(err, SelectionError::UpstreamEmpty { .. }));

    let err = controller
        .set_field(AppointmentField::Date, "tomorrow")
        .await
        .expect_err("bad date");
    assert!(matches!(err, SelectionError::InvalidValue { .. }));
}

#[tokio::test]
async fn server_validation_errors_populate_fields_until_edited() {
    let transport = clinic().await;
    let mut field_errors = BTreeMap::new();
    field_errors.insert(
        "chief_complaint".to_string(),
        "The chief complaint must be at least 5 characters.".to_string(),
    );
    transport
        .queue_submit(Err(TransportError::Validation {
            message: "The given data was invalid.".to_string(),
            field_errors,
        }))
        .await;
    transport.queue_submit(Ok(created(16))).await;
    let controller = BookingController::new(Arc::clone(&transport));
    fill_through_schedule(&controller).await;
    controller
        .set_field(AppointmentField::ChiefComplaint, "ow")
        .await
        .expect("complaint");

    let err = controller.submit().await.expect_err("rejected");
    assert!(matches!(err, FormError::SubmissionValidation { .. }));
    let snapshot = controller.snapshot().await;
    assert!(!snapshot.submitting);
    assert_eq!(
        snapshot.field(AppointmentField::ChiefComplaint).error.as_deref(),
        Some("The chief complaint must be at least 5 characters.")
    );
    assert_eq!(
        snapshot.general_error.as_deref(),
        Some("The given data was invalid.")
    );

    controller
        .set_field(AppointmentField::ChiefComplaint, "sharp toothache")
        .await
        .expect("edit");
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.field(AppointmentField::ChiefComplaint).error, None);
    assert_eq!(snapshot.general_error, None);

    controller.submit().await.expect("resubmit");
    assert_eq!(transport.submission_count().await, 2);
}

#[tokio::test]
async fn transport_failure_on_submit_sets_banner_only() {
    let transport = clinic().await;
    transport
        .queue_submit(Err(TransportError::Status {
            status: 502,
            message: "bad gateway".to_string(),
        }))
        .await;
    let controller = BookingController::new(Arc::clone(&transport));
    fill_through_schedule(&controller).await;
    controller
        .set_field(AppointmentField::ChiefComplaint, "toothache")
        .await
        .expect("complaint");

    let err = controller.submit().await.expect_err("gateway");
    assert!(matches!(err, FormError::SubmissionTransport(_)));

    let snapshot = controller.snapshot().await;
    assert!(!snapshot.submitting);
    assert!(snapshot.fields.iter().all(|f| f.error.is_none()));
    assert_eq!(snapshot.field(AppointmentField::Schedule).value.as_deref(), Some("2"));
    let banner = snapshot.general_error.clone().expect("banner");
    assert!(banner.contains("bad gateway"), "{banner}");
}

#[tokio::test]
async fn second_submit_while_in_flight_is_refused() {
    let transport = clinic().await;
    transport.queue_submit(Ok(created(17))).await;
    let release = transport.gate_submit().await;
    let controller = BookingController::new(Arc::clone(&transport));
    fill_through_schedule(&controller).await;
    controller
        .set_field(AppointmentField::ChiefComplaint, "toothache")
        .await
        .expect("complaint");

    let mut events = controller.subscribe();
    let in_flight = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.submit().await })
    };

    loop {
        match events.recv().await.expect("event") {
            FormEvent::StateChanged(snapshot) if snapshot.submitting => break,
            _ => continue,
        }
    }
    assert!(controller.snapshot().await.submitting);
    let err = controller.submit().await.expect_err("duplicate");
    assert!(matches!(err, FormError::AlreadySubmitting));

    release.send(()).expect("release");
    let intent = in_flight.await.expect("join").expect("submit");
    assert_eq!(intent.path, "/appointments/17");
    assert_eq!(transport.submission_count().await, 1);
    assert!(!controller.snapshot().await.submitting);
}

#[tokio::test]
async fn edits_are_refused_while_submitting() {
    let transport = clinic().await;
    transport.queue_submit(Ok(created(19))).await;
    let release = transport.gate_submit().await;
    let controller = BookingController::new(Arc::clone(&transport));
    fill_through_schedule(&controller).await;
    controller
        .set_field(AppointmentField::ChiefComplaint, "toothache")
        .await
        .expect("complaint");

    let mut events = controller.subscribe();
    let in_flight = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.submit().await })
    };
    loop {
        match events.recv().await.expect("event") {
            FormEvent::StateChanged(snapshot) if snapshot.submitting => {
                assert!(snapshot.fields.iter().all(|f| !f.enabled));
                break;
            }
            _ => continue,
        }
    }

    let err = controller
        .set_field(AppointmentField::ChiefComplaint, "swollen gum")
        .await
        .expect_err("locked");
    assert_eq!(err, SelectionError::Submitting);
    let err = controller
        .refresh_options(AppointmentField::Doctor)
        .await
        .expect_err("locked");
    assert_eq!(err, SelectionError::Submitting);

    release.send(()).expect("release");
    in_flight.await.expect("join").expect("submit");
    let submitted = transport.submissions.lock().await;
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].chief_complaint, "toothache");
    drop(submitted);
    assert_eq!(
        controller
            .snapshot()
            .await
            .field(AppointmentField::ChiefComplaint)
            .value
            .as_deref(),
        Some("toothache")
    );
}

#[tokio::test]
async fn state_changes_are_published_to_subscribers() {
    let transport = clinic().await;
    transport.queue_submit(Ok(CreateAppointmentResponse {
        appointment_id: AppointmentId(18),
        redirect_to: None,
        message: None,
    }))
    .await;
    let controller = BookingController::new(Arc::clone(&transport));
    let mut events = controller.subscribe();

    let handle = controller
        .set_field(AppointmentField::Date, "2025-01-10")
        .await
        .expect("date")
        .expect("refresh");
    let FormEvent::StateChanged(loading) = events.recv().await.expect("event") else {
        panic!("expected state change");
    };
    assert!(loading.field(AppointmentField::Doctor).loading);
    assert_eq!(loading.current_step, 1);

    handle.wait().await;
    let FormEvent::StateChanged(ready) = events.recv().await.expect("event") else {
        panic!("expected state change");
    };
    assert_eq!(ready.field(AppointmentField::Doctor).phase, FieldPhase::Ready);
    assert!(ready.field(AppointmentField::Doctor).enabled);
    assert!(!ready.field(AppointmentField::Schedule).enabled);

    let handle = controller
        .set_field(AppointmentField::Doctor, "7")
        .await
        .expect("doctor")
        .expect("refresh");
    handle.wait().await;
    controller
        .set_field(AppointmentField::Schedule, "1")
        .await
        .expect("schedule");
    controller
        .set_field(AppointmentField::ChiefComplaint, "loose filling")
        .await
        .expect("complaint");
    controller.submit().await.expect("submit");

    let mut submitted = None;
    while let Ok(event) = events.try_recv() {
        if let FormEvent::Submitted(intent) = event {
            submitted = Some(intent);
        }
    }
    assert_eq!(
        submitted,
        Some(NavigationIntent {
            path: "/appointments".to_string(),
            flash: None,
        })
    );
}
