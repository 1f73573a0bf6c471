//! Prompt/response orchestration over a shared interaction event stream:
//! one-shot waiters, paginated views and resumable draft wizards.

pub mod config;
pub mod correlator;
pub mod error;
pub mod events;
pub mod pagination;
pub mod responder;
pub mod wizard;

pub use correlator::{AwaitOptions, Correlator, Suspension, WaiterId};
pub use error::FlowError;
pub use events::{EventHub, Listener};
pub use pagination::{
    ControlAction, Page, PageRenderer, PageSource, Paginator, PaginatorOptions, ViewOutcome,
};
pub use responder::{
    AckLedger, DeliveryError, DraftFormatter, Publisher, Responder, ResponderError, SideChannel,
};
pub use wizard::{
    resolve_next, NextStep, StopReason, Wizard, WizardContext, WizardFlow, WizardOutcome,
    WizardTimeouts,
};

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod tests_support;
