use std::{collections::BTreeMap, sync::Arc};

use serde::Serialize;
use shared::protocol::CreateAppointmentResponse;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    appointment::{build_request, doctor_item, schedule_item, AppointmentField, OptionQuery},
    chain::{
        ChainField, FieldPhase, OptionItem, RefreshOutcome, RefreshTicket, SelectionChain,
    },
    error::{FormError, SelectionError},
    transport::AppointmentTransport,
};

const DEFAULT_REDIRECT: &str = "/appointments";
const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationIntent {
    pub path: String,
    pub flash: Option<String>,
}

impl NavigationIntent {
    fn after_create(response: &CreateAppointmentResponse) -> Self {
        let path = response
            .redirect_to
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_REDIRECT)
            .to_string();
        Self {
            path,
            flash: response.message.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum FormEvent {
    StateChanged(FormSnapshot),
    Submitted(NavigationIntent),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSnapshot {
    pub field: AppointmentField,
    pub label: &'static str,
    pub value: Option<String>,
    pub phase: FieldPhase,
    pub options: Vec<OptionItem>,
    pub loading: bool,
    /// Reachable in the progressive form and not blocked by a request.
    pub enabled: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormSnapshot {
    pub fields: Vec<FieldSnapshot>,
    pub current_step: usize,
    pub submitting: bool,
    pub general_error: Option<String>,
}

impl FormSnapshot {
    pub fn field(&self, field: AppointmentField) -> &FieldSnapshot {
        &self.fields[field.index()]
    }

    pub fn is_complete(&self) -> bool {
        self.current_step >= self.fields.len()
    }
}

struct BookingState {
    chain: SelectionChain<AppointmentField>,
    field_errors: BTreeMap<String, String>,
    general_error: Option<String>,
    submitting: bool,
}

impl BookingState {
    fn snapshot(&self) -> FormSnapshot {
        let current_step = self.chain.current_step();
        let fields = AppointmentField::ORDER
            .iter()
            .map(|&field| {
                let loading = self.chain.is_loading(field);
                FieldSnapshot {
                    field,
                    label: field.label(),
                    value: self.chain.value(field).map(str::to_string),
                    phase: self.chain.phase(field),
                    options: self.chain.options(field).to_vec(),
                    loading,
                    enabled: field.index() <= current_step && !loading && !self.submitting,
                    error: self.field_errors.get(field.wire_name()).cloned(),
                }
            })
            .collect();

        FormSnapshot {
            fields,
            current_step,
            submitting: self.submitting,
            general_error: self.general_error.clone(),
        }
    }
}

#[derive(Debug)]
pub struct RefreshHandle {
    field: AppointmentField,
    task: JoinHandle<RefreshOutcome>,
}

impl RefreshHandle {
    pub fn field(&self) -> AppointmentField {
        self.field
    }

    pub async fn wait(self) -> RefreshOutcome {
        self.task
            .await
            .unwrap_or_else(|err| RefreshOutcome::Failed {
                reason: format!("option refresh task ended early: {err}"),
            })
    }
}

pub struct BookingController<T: AppointmentTransport + 'static> {
    transport: T,
    inner: Mutex<BookingState>,
    events: broadcast::Sender<FormEvent>,
}

impl<T: AppointmentTransport + 'static> BookingController<T> {
    pub fn new(transport: T) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            transport,
            inner: Mutex::new(BookingState {
                chain: SelectionChain::new(),
                field_errors: BTreeMap::new(),
                general_error: None,
                submitting: false,
            }),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FormEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> FormSnapshot {
        self.inner.lock().await.snapshot()
    }

    pub async fn current_step(&self) -> usize {
        self.inner.lock().await.chain.current_step()
    }

    /// Stores `value` for `field`, clearing every dependent field. When the
    /// next field loads its options from the values above it, the refresh
    /// starts immediately and its handle is returned.
    pub async fn set_field(
        self: &Arc<Self>,
        field: AppointmentField,
        value: impl Into<String>,
    ) -> Result<Option<RefreshHandle>, SelectionError> {
        let value = value.into();
        let ticket = {
            let mut guard = self.inner.lock().await;
            if guard.submitting {
                return Err(SelectionError::Submitting);
            }
            guard.field_errors.remove(field.wire_name());
            guard.general_error = None;

            match guard.chain.set(field, Some(value)) {
                Ok(cleared) => {
                    if !cleared.is_empty() {
                        debug!(field = field.wire_name(), ?cleared, "cleared dependent fields");
                    }
                }
                Err(err) => {
                    guard
                        .field_errors
                        .insert(field.wire_name().to_string(), err.to_string());
                    self.publish(&guard);
                    return Err(err);
                }
            }

            let next = AppointmentField::ORDER.get(field.index() + 1).copied();
            let ticket = match next {
                Some(next) if next.has_options() && guard.chain.value(field).is_some() => {
                    Some(guard.chain.begin_refresh(next)?)
                }
                _ => None,
            };
            self.publish(&guard);
            ticket
        };

        Ok(ticket.map(|ticket| self.spawn_refresh(ticket)))
    }

    pub async fn refresh_options(
        &self,
        field: AppointmentField,
    ) -> Result<RefreshOutcome, SelectionError> {
        let ticket = {
            let mut guard = self.inner.lock().await;
            if guard.submitting {
                return Err(SelectionError::Submitting);
            }
            let ticket = guard.chain.begin_refresh(field)?;
            guard.general_error = None;
            self.publish(&guard);
            ticket
        };
        Ok(self.run_refresh(ticket).await)
    }

    pub async fn submit(&self) -> Result<NavigationIntent, FormError> {
        let request = {
            let mut guard = self.inner.lock().await;
            if guard.submitting {
                return Err(FormError::AlreadySubmitting);
            }
            match build_request(&guard.chain) {
                Ok(request) => {
                    guard.submitting = true;
                    guard.general_error = None;
                    self.publish(&guard);
                    request
                }
                Err(err) => {
                    info!(%err, "appointment not submitted");
                    guard.general_error = Some(err.to_string());
                    self.publish(&guard);
                    return Err(err);
                }
            }
        };

        let result = self.transport.create_appointment(&request).await;

        let mut guard = self.inner.lock().await;
        guard.submitting = false;
        match result {
            Ok(response) => {
                guard.field_errors.clear();
                guard.general_error = None;
                let intent = NavigationIntent::after_create(&response);
                info!(
                    appointment_id = response.appointment_id.0,
                    path = %intent.path,
                    "appointment created"
                );
                self.publish(&guard);
                let _ = self.events.send(FormEvent::Submitted(intent.clone()));
                Ok(intent)
            }
            Err(err) => {
                let err = FormError::from(err);
                if let FormError::SubmissionValidation { field_errors, .. } = &err {
                    for key in field_errors
                        .keys()
                        .filter(|key| AppointmentField::from_wire_name(key).is_none())
                    {
                        debug!(field = %key, "server reported an error outside the form fields");
                    }
                    guard.field_errors = field_errors.clone();
                }
                guard.general_error = Some(err.to_string());
                warn!(%err, "appointment submission rejected");
                self.publish(&guard);
                Err(err)
            }
        }
    }

    fn spawn_refresh(self: &Arc<Self>, ticket: RefreshTicket<AppointmentField>) -> RefreshHandle {
        let field = ticket.field;
        let this = Arc::clone(self);
        let task = tokio::spawn(async move { this.run_refresh(ticket).await });
        RefreshHandle { field, task }
    }

    async fn run_refresh(&self, ticket: RefreshTicket<AppointmentField>) -> RefreshOutcome {
        let result = match OptionQuery::for_field(ticket.field, &ticket.upstream) {
            Ok(query) => self.fetch_options(query).await,
            Err(reason) => Err(reason),
        };

        let mut guard = self.inner.lock().await;
        let outcome = guard.chain.complete_refresh(&ticket, result);
        match &outcome {
            RefreshOutcome::Applied { candidates } => {
                debug!(field = ticket.field.wire_name(), candidates, "options loaded");
            }
            RefreshOutcome::Failed { reason } => {
                warn!(field = ticket.field.wire_name(), %reason, "failed to load options");
                guard.general_error = Some(
                    FormError::OptionFetch {
                        field: ticket.field.label(),
                        reason: reason.clone(),
                    }
                    .to_string(),
                );
            }
            RefreshOutcome::Stale => {
                debug!(
                    field = ticket.field.wire_name(),
                    upstream = ?ticket.upstream,
                    "discarded options for a superseded request"
                );
                return outcome;
            }
        }
        self.publish(&guard);
        outcome
    }

    async fn fetch_options(&self, query: OptionQuery) -> Result<Vec<OptionItem>, String> {
        let items = match query {
            OptionQuery::Doctors { date } => self
                .transport
                .available_doctors(date)
                .await
                .map(|doctors| doctors.iter().map(doctor_item).collect()),
            OptionQuery::Schedules { date, doctor_id } => self
                .transport
                .available_schedules(date, doctor_id)
                .await
                .map(|schedules| schedules.iter().map(schedule_item).collect()),
        };
        items.map_err(|err| err.to_string())
    }

    fn publish(&self, state: &BookingState) {
        let _ = self
            .events
            .send(FormEvent::StateChanged(state.snapshot()));
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
