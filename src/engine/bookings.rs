use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::{check_no_conflict, now_ms, validate_interval};
use super::pricing::price;
use super::{Engine, EngineError};

impl Engine {
    /// Admit a new booking. The availability check and the insert happen
    /// under the same property write lock: of N concurrent overlapping
    /// requests, at most one is admitted — the rest observe
    /// `AvailabilityConflict`.
    ///
    /// The amount is priced once here and never silently recomputed.
    pub async fn create_booking(
        &self,
        id: Ulid,
        property_id: Ulid,
        renter_id: Ulid,
        start: Ms,
        end: Ms,
        booking_type: BookingType,
    ) -> Result<Booking, EngineError> {
        let span = validate_interval(start, end)?;
        let ps = self
            .get_property(&property_id)
            .ok_or(EngineError::NotFound(property_id))?;
        let mut guard = ps.write().await;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_PROPERTY {
            return Err(EngineError::LimitExceeded("too many bookings on property"));
        }

        let total_amount = price(&guard.rates, &guard.discounts, &span, booking_type);

        if let Err(e) = check_no_conflict(&guard, &span, None) {
            metrics::counter!(crate::observability::ADMISSION_CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let event = Event::BookingCreated {
            id,
            property_id,
            renter_id,
            span,
            booking_type,
            total_amount,
            at: now_ms(),
        };
        self.persist_and_apply(property_id, &mut guard, &event).await?;
        metrics::counter!(crate::observability::ADMISSIONS_TOTAL).increment(1);

        Ok(guard.booking(&id).expect("booking just inserted").clone())
    }

    /// Owner accepts a pending request. Availability is re-validated under
    /// the lock (time has passed since admission; the owner may have
    /// confirmed an overlapping pending request in between), excluding the
    /// booking itself.
    pub async fn confirm_booking(&self, id: Ulid, actor: Ulid) -> Result<Booking, EngineError> {
        let (property_id, mut guard) = self.resolve_entity_write(&id).await?;
        if guard.owner_id != actor {
            return Err(EngineError::NotOwner(actor));
        }
        let booking = guard.booking(&id).ok_or(EngineError::NotFound(id))?;
        if booking.status != BookingStatus::Pending {
            return Err(EngineError::WrongState { have: booking.status });
        }

        let span = booking.span;
        if let Err(e) = check_no_conflict(&guard, &span, Some(id)) {
            metrics::counter!(crate::observability::ADMISSION_CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let event = Event::BookingConfirmed { id, property_id, at: now_ms() };
        self.persist_and_apply(property_id, &mut guard, &event).await?;
        Ok(guard.booking(&id).expect("booking present").clone())
    }

    /// Owner declines a pending request. Terminal.
    pub async fn reject_booking(
        &self,
        id: Ulid,
        actor: Ulid,
        reason: String,
    ) -> Result<Booking, EngineError> {
        if reason.len() > MAX_REASON_LEN {
            return Err(EngineError::LimitExceeded("reject reason too long"));
        }
        let (property_id, mut guard) = self.resolve_entity_write(&id).await?;
        if guard.owner_id != actor {
            return Err(EngineError::NotOwner(actor));
        }
        let booking = guard.booking(&id).ok_or(EngineError::NotFound(id))?;
        if booking.status != BookingStatus::Pending {
            return Err(EngineError::WrongState { have: booking.status });
        }

        let event = Event::BookingRejected { id, property_id, reason, at: now_ms() };
        self.persist_and_apply(property_id, &mut guard, &event).await?;
        Ok(guard.booking(&id).expect("booking present").clone())
    }

    /// Renter backs out of a confirmed booking, allowed only until 48 hours
    /// before the interval starts.
    pub async fn cancel_booking(&self, id: Ulid, actor: Ulid) -> Result<Booking, EngineError> {
        let (property_id, mut guard) = self.resolve_entity_write(&id).await?;
        let booking = guard.booking(&id).ok_or(EngineError::NotFound(id))?;
        if booking.renter_id != actor {
            return Err(EngineError::NotRenter(actor));
        }
        if booking.status != BookingStatus::Confirmed {
            return Err(EngineError::WrongState { have: booking.status });
        }
        let starts_at = booking.span.start;
        if now_ms() >= starts_at - CANCELLATION_WINDOW_MS {
            return Err(EngineError::CancellationWindowPassed { starts_at });
        }

        let event = Event::BookingCancelled { id, property_id, at: now_ms() };
        self.persist_and_apply(property_id, &mut guard, &event).await?;
        Ok(guard.booking(&id).expect("booking present").clone())
    }

    /// Flip an elapsed confirmed booking to completed. Idempotent so the
    /// periodic sweep can drive it without an exact-once scheduler: an
    /// already-completed booking is a no-op, and a confirmed booking whose
    /// interval has not elapsed yet is left untouched without error.
    pub async fn complete_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        let (property_id, mut guard) = self.resolve_entity_write(&id).await?;
        let booking = guard.booking(&id).ok_or(EngineError::NotFound(id))?;
        match booking.status {
            BookingStatus::Completed => {
                return Ok(booking.clone());
            }
            BookingStatus::Confirmed => {}
            other => {
                return Err(EngineError::WrongState { have: other });
            }
        }
        let now = now_ms();
        if now < booking.span.end {
            return Ok(booking.clone());
        }

        let event = Event::BookingCompleted { id, property_id, at: now };
        self.persist_and_apply(property_id, &mut guard, &event).await?;
        metrics::counter!(crate::observability::BOOKINGS_COMPLETED_TOTAL).increment(1);
        Ok(guard.booking(&id).expect("booking present").clone())
    }

    /// Confirmed bookings whose interval has elapsed, ready for the sweep.
    pub fn collect_elapsed(&self, now: Ms) -> Vec<(Ulid, Ulid)> {
        let mut elapsed = Vec::new();
        for entry in self.state.iter() {
            let ps = entry.value().clone();
            if let Ok(guard) = ps.try_read() {
                for booking in &guard.bookings {
                    if booking.status == BookingStatus::Confirmed && booking.span.end <= now {
                        elapsed.push((booking.id, guard.id));
                    }
                }
            }
        }
        elapsed
    }
}
