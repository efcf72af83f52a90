// Checkout session: state machine, card form, views

pub mod card_form;
pub mod controller;
pub mod metrics;
pub mod state;
pub mod success;
pub mod view;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{CheckoutController, SubmitOutcome};
pub use state::{CheckoutState, ErrorKind, Navigation, Phase};
pub use view::CheckoutView;
