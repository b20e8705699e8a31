pub mod appointment;
pub mod chain;
pub mod controller;
pub mod error;
pub mod render;
pub mod transport;

pub use appointment::AppointmentField;
pub use chain::{ChainField, FieldPhase, OptionItem, RefreshOutcome, SelectionChain};
pub use controller::{
    BookingController, FieldSnapshot, FormEvent, FormSnapshot, NavigationIntent, RefreshHandle,
};
pub use error::{FormError, SelectionError, TransportError};
pub use render::{FormRenderer, PageContext, TextFormRenderer};
pub use transport::{AppointmentTransport, HttpTransport};
