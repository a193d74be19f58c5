pub mod error;
pub mod number;
pub mod ledger;
pub mod cancellation;
pub mod draft;

pub use error::{BookingError, BookingResult};
pub use number::BookingNumberGenerator;
pub use ledger::{BookingLedger, ConfirmedDraft, LegSelection, Purchase};
pub use cancellation::{CancellationCoordinator, CancellationOutcome, LinkedLegOutcome};
pub use draft::{DraftController, DraftState, DraftStep, ResolvedSearch, SearchRequest, TripType};
