use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::{self, check_no_conflict, validate_interval};
use super::pricing::price;
use super::{Engine, EngineError};

impl Engine {
    /// Quote an amount without creating anything. Same pure computation a
    /// real admission uses.
    pub async fn price_quote(
        &self,
        property_id: Ulid,
        start: Ms,
        end: Ms,
        booking_type: BookingType,
    ) -> Result<i64, EngineError> {
        let span = validate_interval(start, end)?;
        let ps = self
            .get_property(&property_id)
            .ok_or(EngineError::NotFound(property_id))?;
        let guard = ps.read().await;
        Ok(price(&guard.rates, &guard.discounts, &span, booking_type))
    }

    /// Advisory availability check for search-result display. Must be
    /// re-verified by the admission protocol at booking time — a true answer
    /// here can be stale by the time the renter submits.
    pub async fn check_availability(
        &self,
        property_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<bool, EngineError> {
        let span = validate_interval(start, end)?;
        let Some(ps) = self.get_property(&property_id) else {
            return Ok(false);
        };
        let guard = ps.read().await;
        Ok(check_no_conflict(&guard, &span, None).is_ok())
    }

    /// Free sub-spans of a query window, for calendar display.
    pub async fn free_intervals(
        &self,
        property_id: Ulid,
        query_start: Ms,
        query_end: Ms,
        min_duration_ms: Option<Ms>,
    ) -> Result<Vec<Span>, EngineError> {
        let query = validate_interval(query_start, query_end)?;
        if query.duration_ms() > MAX_QUERY_WINDOW_MS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        let Some(ps) = self.get_property(&property_id) else {
            return Ok(Vec::new());
        };
        let guard = ps.read().await;

        let mut free = availability::free_intervals(&guard, &query);
        if let Some(min_dur) = min_duration_ms {
            free.retain(|span| span.duration_ms() >= min_dur);
        }
        Ok(free)
    }

    pub fn list_properties(&self) -> Vec<PropertyInfo> {
        self.state
            .iter()
            .map(|entry| {
                let ps = entry.value().clone();
                let guard = ps.try_read().expect("list_properties: uncontended read");
                PropertyInfo {
                    id: guard.id,
                    owner_id: guard.owner_id,
                    status: guard.status,
                    rates: guard.rates,
                    discounts: guard.discounts,
                    hours: guard.hours,
                }
            })
            .collect()
    }

    pub async fn get_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        let property_id = self
            .property_for_entity(&id)
            .ok_or(EngineError::NotFound(id))?;
        let ps = self
            .get_property(&property_id)
            .ok_or(EngineError::NotFound(property_id))?;
        let guard = ps.read().await;
        guard.booking(&id).cloned().ok_or(EngineError::NotFound(id))
    }

    pub async fn get_bookings(&self, property_id: Ulid) -> Result<Vec<Booking>, EngineError> {
        let Some(ps) = self.get_property(&property_id) else {
            return Ok(Vec::new());
        };
        let guard = ps.read().await;
        Ok(guard.bookings.clone())
    }

    pub async fn get_blocks(&self, property_id: Ulid) -> Result<Vec<BlockInfo>, EngineError> {
        let Some(ps) = self.get_property(&property_id) else {
            return Ok(Vec::new());
        };
        let guard = ps.read().await;
        Ok(guard
            .blocks
            .iter()
            .map(|b| BlockInfo {
                id: b.id,
                property_id,
                start: b.span.start,
                end: b.span.end,
                reason: b.reason.clone(),
            })
            .collect())
    }

    pub async fn get_review(&self, id: Ulid) -> Result<Review, EngineError> {
        let property_id = self
            .property_for_entity(&id)
            .ok_or(EngineError::NotFound(id))?;
        let ps = self
            .get_property(&property_id)
            .ok_or(EngineError::NotFound(property_id))?;
        let guard = ps.read().await;
        guard.review(&id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Active reviews for a property, creation order.
    pub async fn get_reviews(&self, property_id: Ulid) -> Result<Vec<Review>, EngineError> {
        let Some(ps) = self.get_property(&property_id) else {
            return Ok(Vec::new());
        };
        let guard = ps.read().await;
        Ok(guard
            .reviews
            .iter()
            .filter(|r| r.status == ReviewStatus::Active)
            .cloned()
            .collect())
    }

    /// The cached aggregate — always equal to the fold over active reviews.
    pub async fn rating_aggregate(&self, property_id: Ulid) -> Result<RatingAggregate, EngineError> {
        let ps = self
            .get_property(&property_id)
            .ok_or(EngineError::NotFound(property_id))?;
        let guard = ps.read().await;
        Ok(guard.aggregate.clone())
    }
}
