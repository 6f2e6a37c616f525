use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::now_ms;
use super::{Engine, EngineError};

fn validate_rating(rating: u8, aspects: &AspectRatings) -> Result<(), EngineError> {
    if !(1..=5).contains(&rating) {
        return Err(EngineError::InvalidRating(rating));
    }
    if !aspects.all_in_range() {
        let worst = [aspects.cleanliness, aspects.location, aspects.communication, aspects.value]
            .into_iter()
            .find(|r| !(1..=5).contains(r))
            .unwrap_or(0);
        return Err(EngineError::InvalidRating(worst));
    }
    Ok(())
}

impl Engine {
    /// Post a review for a completed booking. One review per booking; only
    /// the booking's renter is eligible. The property aggregate is recomputed
    /// under the same lock before the write is acknowledged, so readers never
    /// observe it diverging from the fold over active reviews.
    pub async fn create_review(
        &self,
        id: Ulid,
        booking_id: Ulid,
        renter_id: Ulid,
        rating: u8,
        aspects: AspectRatings,
        comment: Option<String>,
    ) -> Result<(Review, RatingAggregate), EngineError> {
        validate_rating(rating, &aspects)?;
        if let Some(ref c) = comment
            && c.len() > MAX_COMMENT_LEN {
                return Err(EngineError::LimitExceeded("review comment too long"));
            }

        let (property_id, mut guard) = self.resolve_entity_write(&booking_id).await?;
        if guard.reviews.len() >= MAX_REVIEWS_PER_PROPERTY {
            return Err(EngineError::LimitExceeded("too many reviews on property"));
        }
        let booking = guard.booking(&booking_id).ok_or(EngineError::NotFound(booking_id))?;
        if booking.renter_id != renter_id || booking.status != BookingStatus::Completed {
            return Err(EngineError::NotEligible(booking_id));
        }
        if guard.review_for_booking(&booking_id).is_some() {
            return Err(EngineError::AlreadyReviewed(booking_id));
        }

        let event = Event::ReviewPosted {
            id,
            property_id,
            booking_id,
            renter_id,
            rating,
            aspects,
            comment,
            at: now_ms(),
        };
        self.persist_and_apply(property_id, &mut guard, &event).await?;
        metrics::counter!(crate::observability::REVIEWS_POSTED_TOTAL).increment(1);

        let review = guard.review(&id).expect("review just inserted").clone();
        Ok((review, guard.aggregate.clone()))
    }

    /// Toggle a helpful vote: present → absent, absent → present.
    pub async fn toggle_helpful(&self, review_id: Ulid, user_id: Ulid) -> Result<Review, EngineError> {
        let (property_id, mut guard) = self.resolve_entity_write(&review_id).await?;
        guard.review(&review_id).ok_or(EngineError::NotFound(review_id))?;

        let event = Event::HelpfulToggled { review_id, property_id, user_id };
        self.persist_and_apply(property_id, &mut guard, &event).await?;
        Ok(guard.review(&review_id).expect("review present").clone())
    }

    /// Report a review. At most one report per (review, user); a duplicate
    /// is answered with `AlreadyReported` and changes nothing.
    pub async fn report_review(
        &self,
        review_id: Ulid,
        user_id: Ulid,
        reason: String,
    ) -> Result<Review, EngineError> {
        if reason.len() > MAX_REASON_LEN {
            return Err(EngineError::LimitExceeded("report reason too long"));
        }
        let (property_id, mut guard) = self.resolve_entity_write(&review_id).await?;
        let review = guard.review(&review_id).ok_or(EngineError::NotFound(review_id))?;
        if review.report_by(&user_id).is_some() {
            return Err(EngineError::AlreadyReported(review_id));
        }
        if review.reports.len() >= MAX_REPORTS_PER_REVIEW {
            return Err(EngineError::LimitExceeded("too many reports on review"));
        }

        let event = Event::ReviewReported { review_id, property_id, reporter: user_id, reason };
        self.persist_and_apply(property_id, &mut guard, &event).await?;
        Ok(guard.review(&review_id).expect("review present").clone())
    }

    /// Close out a report (moderation action). Resolving twice is a no-op.
    pub async fn resolve_report(
        &self,
        review_id: Ulid,
        reporter: Ulid,
    ) -> Result<Review, EngineError> {
        let (property_id, mut guard) = self.resolve_entity_write(&review_id).await?;
        let review = guard.review(&review_id).ok_or(EngineError::NotFound(review_id))?;
        let report = review.report_by(&reporter).ok_or(EngineError::NotFound(review_id))?;
        if report.status == ReportStatus::Resolved {
            return Ok(review.clone());
        }

        let event = Event::ReportResolved { review_id, property_id, reporter };
        self.persist_and_apply(property_id, &mut guard, &event).await?;
        Ok(guard.review(&review_id).expect("review present").clone())
    }

    /// Property owner replies to a review. Settable exactly once.
    pub async fn respond_to_review(
        &self,
        review_id: Ulid,
        actor: Ulid,
        text: String,
    ) -> Result<Review, EngineError> {
        if text.len() > MAX_RESPONSE_LEN {
            return Err(EngineError::LimitExceeded("owner response too long"));
        }
        let (property_id, mut guard) = self.resolve_entity_write(&review_id).await?;
        if guard.owner_id != actor {
            return Err(EngineError::NotOwner(actor));
        }
        let review = guard.review(&review_id).ok_or(EngineError::NotFound(review_id))?;
        if review.owner_response.is_some() {
            return Err(EngineError::AlreadyResponded(review_id));
        }

        let event = Event::OwnerResponded { review_id, property_id, text, at: now_ms() };
        self.persist_and_apply(property_id, &mut guard, &event).await?;
        Ok(guard.review(&review_id).expect("review present").clone())
    }

    /// Author soft-deletes their review; the aggregate is recomputed to
    /// exclude it. Deleting an already-deleted review is a no-op.
    pub async fn delete_review(
        &self,
        review_id: Ulid,
        actor: Ulid,
    ) -> Result<RatingAggregate, EngineError> {
        let (property_id, mut guard) = self.resolve_entity_write(&review_id).await?;
        let review = guard.review(&review_id).ok_or(EngineError::NotFound(review_id))?;
        if review.renter_id != actor {
            return Err(EngineError::NotAuthor(actor));
        }
        if review.status == ReviewStatus::Deleted {
            return Ok(guard.aggregate.clone());
        }

        let event = Event::ReviewDeleted { id: review_id, property_id };
        self.persist_and_apply(property_id, &mut guard, &event).await?;
        Ok(guard.aggregate.clone())
    }
}
