use ulid::Ulid;

use crate::model::{BookingStatus, Ms};

#[derive(Debug)]
pub enum EngineError {
    /// Malformed interval (`start >= end`). Rejected at the boundary,
    /// before any availability state is read.
    InvalidInterval { start: Ms, end: Ms },
    /// Overall or aspect rating outside 1..=5.
    InvalidRating(u8),
    /// The requested interval overlaps a block or an active booking.
    /// A routine outcome of concurrent use, not a failure.
    AvailabilityConflict(Ulid),
    /// The booking is not in a status that permits this transition.
    WrongState { have: BookingStatus },
    /// Actor is not the property owner.
    NotOwner(Ulid),
    /// Actor is not the booking's renter.
    NotRenter(Ulid),
    /// Actor is not the review's author.
    NotAuthor(Ulid),
    /// The booking is not completed, or belongs to a different renter.
    NotEligible(Ulid),
    /// The booking already has a review.
    AlreadyReviewed(Ulid),
    /// This user already reported this review.
    AlreadyReported(Ulid),
    /// The owner response has already been set.
    AlreadyResponded(Ulid),
    /// Cancellation attempted inside the 48-hour window before start.
    CancellationWindowPassed { starts_at: Ms },
    NotFound(Ulid),
    AlreadyExists(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    /// Conflict-class errors are expected under concurrent use and are
    /// surfaced to callers as a normal negative result, never logged as
    /// failures.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            EngineError::AvailabilityConflict(_)
                | EngineError::AlreadyReviewed(_)
                | EngineError::AlreadyReported(_)
        )
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInterval { start, end } => {
                write!(f, "invalid interval [{start}, {end})")
            }
            EngineError::InvalidRating(r) => write!(f, "rating {r} outside 1..=5"),
            EngineError::AvailabilityConflict(id) => {
                write!(f, "interval not available: conflicts with {id}")
            }
            EngineError::WrongState { have } => {
                write!(f, "transition not allowed from status {have:?}")
            }
            EngineError::NotOwner(id) => write!(f, "{id} is not the property owner"),
            EngineError::NotRenter(id) => write!(f, "{id} is not the booking renter"),
            EngineError::NotAuthor(id) => write!(f, "{id} is not the review author"),
            EngineError::NotEligible(id) => {
                write!(f, "booking {id} is not eligible for review")
            }
            EngineError::AlreadyReviewed(id) => {
                write!(f, "booking {id} already has a review")
            }
            EngineError::AlreadyReported(id) => {
                write!(f, "review {id} already reported by this user")
            }
            EngineError::AlreadyResponded(id) => {
                write!(f, "review {id} already has an owner response")
            }
            EngineError::CancellationWindowPassed { starts_at } => {
                write!(f, "cancellation window passed for booking starting at {starts_at}")
            }
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
