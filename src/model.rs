use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Two half-open intervals `[a,b)` and `[c,d)` overlap iff `a < d && c < b`.
    /// Touching boundaries (`b == c`) do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    /// Clamp `self` to `window`. Caller must ensure they overlap.
    pub fn clamped_to(&self, window: &Span) -> Span {
        Span::new(self.start.max(window.start), self.end.min(window.end))
    }
}

/// Billing granularity of a booking. Determines which rate applies and how
/// the interval is quantized into units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingType {
    Hourly,
    Daily,
    Monthly,
}

impl BookingType {
    /// One billing unit in milliseconds. A month is a fixed 30 days.
    pub fn unit_ms(&self) -> Ms {
        match self {
            BookingType::Hourly => 3_600_000,
            BookingType::Daily => 86_400_000,
            BookingType::Monthly => 30 * 86_400_000,
        }
    }
}

/// Per-granularity rates in minor currency units (e.g. cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateTable {
    pub hourly: i64,
    pub daily: i64,
    pub monthly: i64,
}

impl RateTable {
    pub fn rate_for(&self, booking_type: BookingType) -> i64 {
        match booking_type {
            BookingType::Hourly => self.hourly,
            BookingType::Daily => self.daily,
            BookingType::Monthly => self.monthly,
        }
    }
}

/// Long-stay percentage reductions. A tier of 0 means no discount.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discounts {
    /// Applied when the booking spans at least 7 units.
    pub weekly_pct: u8,
    /// Applied when the booking spans at least 30 units.
    pub monthly_pct: u8,
}

/// Open/close minutes-from-midnight (UTC) for one weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayWindow {
    pub open_min: u16,
    pub close_min: u16,
}

/// Per-weekday opening windows, indexed Monday = 0 .. Sunday = 6.
/// `None` means closed that day. Only a display-level availability filter —
/// never consulted by booking admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatingHours(pub [Option<DayWindow>; 7]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyStatus {
    Available,
    Unlisted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Rejected,
    Cancelled,
    Completed,
}

impl BookingStatus {
    /// Active bookings occupy their interval for conflict purposes.
    /// Terminal-but-completed bookings occupy the past and cannot conflict.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

/// An owner-managed blocked interval. Blocks may overlap each other; the
/// union is what counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: Ulid,
    pub span: Span,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub property_id: Ulid,
    pub renter_id: Ulid,
    pub span: Span,
    pub booking_type: BookingType,
    /// Priced once at creation; never silently recomputed.
    pub total_amount: i64,
    pub status: BookingStatus,
    pub reject_reason: Option<String>,
    pub created_at: Ms,
    pub updated_at: Ms,
}

/// The four rated aspects, each 1..=5 like the overall rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AspectRatings {
    pub cleanliness: u8,
    pub location: u8,
    pub communication: u8,
    pub value: u8,
}

impl AspectRatings {
    pub fn all_in_range(&self) -> bool {
        [self.cleanliness, self.location, self.communication, self.value]
            .iter()
            .all(|r| (1..=5).contains(r))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewStatus {
    Active,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportStatus {
    Open,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub reporter: Ulid,
    pub reason: String,
    pub status: ReportStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: Ulid,
    pub property_id: Ulid,
    /// Each completed booking produces at most one review.
    pub booking_id: Ulid,
    pub renter_id: Ulid,
    pub rating: u8,
    pub aspects: AspectRatings,
    pub comment: Option<String>,
    pub helpful_votes: HashSet<Ulid>,
    pub reports: Vec<Report>,
    pub owner_response: Option<OwnerResponse>,
    pub status: ReviewStatus,
    pub created_at: Ms,
}

impl Review {
    pub fn report_by(&self, user: &Ulid) -> Option<&Report> {
        self.reports.iter().find(|r| r.reporter == *user)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerResponse {
    pub text: String,
    pub at: Ms,
}

/// Rolling rating statistics for one property. Always equal to
/// `RatingAggregate::fold` over the property's active reviews — recomputed
/// under the property lock on every review write, never mutated in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingAggregate {
    pub total_reviews: u64,
    pub average_rating: f64,
    /// `distribution[r - 1]` counts active reviews rated `r`.
    pub distribution: [u64; 5],
}

impl RatingAggregate {
    /// The pure fold the cached aggregate must always equal.
    pub fn fold<'a>(reviews: impl Iterator<Item = &'a Review>) -> Self {
        let mut agg = RatingAggregate::default();
        let mut sum: u64 = 0;
        for review in reviews.filter(|r| r.status == ReviewStatus::Active) {
            agg.total_reviews += 1;
            agg.distribution[(review.rating - 1) as usize] += 1;
            sum += review.rating as u64;
        }
        if agg.total_reviews > 0 {
            agg.average_rating = sum as f64 / agg.total_reviews as f64;
        }
        agg
    }
}

#[derive(Debug, Clone)]
pub struct PropertyState {
    pub id: Ulid,
    pub owner_id: Ulid,
    pub status: PropertyStatus,
    pub rates: RateTable,
    pub discounts: Discounts,
    pub hours: Option<OperatingHours>,
    /// Owner blocks, sorted by `span.start`.
    pub blocks: Vec<Block>,
    /// All bookings ever admitted, terminal ones included, sorted by `span.start`.
    pub bookings: Vec<Booking>,
    /// Creation order.
    pub reviews: Vec<Review>,
    pub aggregate: RatingAggregate,
}

impl PropertyState {
    pub fn new(
        id: Ulid,
        owner_id: Ulid,
        rates: RateTable,
        discounts: Discounts,
        hours: Option<OperatingHours>,
    ) -> Self {
        Self {
            id,
            owner_id,
            status: PropertyStatus::Available,
            rates,
            discounts,
            hours,
            blocks: Vec::new(),
            bookings: Vec::new(),
            reviews: Vec::new(),
            aggregate: RatingAggregate::default(),
        }
    }

    /// Insert a block maintaining sort order by span.start.
    pub fn insert_block(&mut self, block: Block) {
        let pos = self
            .blocks
            .binary_search_by_key(&block.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.blocks.insert(pos, block);
    }

    pub fn remove_block(&mut self, id: Ulid) -> Option<Block> {
        let pos = self.blocks.iter().position(|b| b.id == id)?;
        Some(self.blocks.remove(pos))
    }

    /// Insert a booking maintaining sort order by span.start.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn booking(&self, id: &Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == *id)
    }

    pub fn booking_mut(&mut self, id: &Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == *id)
    }

    pub fn review(&self, id: &Ulid) -> Option<&Review> {
        self.reviews.iter().find(|r| r.id == *id)
    }

    pub fn review_mut(&mut self, id: &Ulid) -> Option<&mut Review> {
        self.reviews.iter_mut().find(|r| r.id == *id)
    }

    pub fn review_for_booking(&self, booking_id: &Ulid) -> Option<&Review> {
        self.reviews.iter().find(|r| r.booking_id == *booking_id)
    }

    /// Blocks whose span overlaps the query window. Binary search skips
    /// everything starting at or after `query.end`.
    pub fn blocks_overlapping(&self, query: &Span) -> impl Iterator<Item = &Block> {
        let right = self.blocks.partition_point(|b| b.span.start < query.end);
        self.blocks[..right]
            .iter()
            .filter(move |b| b.span.end > query.start)
    }

    /// Bookings whose span overlaps the query window, any status.
    pub fn bookings_overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        let right = self.bookings.partition_point(|b| b.span.start < query.end);
        self.bookings[..right]
            .iter()
            .filter(move |b| b.span.end > query.start)
    }

    /// Re-derive the cached aggregate from the review set. Must be called
    /// before a review write is acknowledged.
    pub fn recompute_aggregate(&mut self) {
        self.aggregate = RatingAggregate::fold(self.reviews.iter());
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    PropertyListed {
        id: Ulid,
        owner_id: Ulid,
        rates: RateTable,
        discounts: Discounts,
        hours: Option<OperatingHours>,
    },
    PropertyUpdated {
        id: Ulid,
        rates: RateTable,
        discounts: Discounts,
        hours: Option<OperatingHours>,
    },
    PropertyStatusChanged {
        id: Ulid,
        status: PropertyStatus,
    },
    PropertyDelisted {
        id: Ulid,
    },
    BlockAdded {
        id: Ulid,
        property_id: Ulid,
        span: Span,
        reason: Option<String>,
    },
    BlockRemoved {
        id: Ulid,
        property_id: Ulid,
    },
    BookingCreated {
        id: Ulid,
        property_id: Ulid,
        renter_id: Ulid,
        span: Span,
        booking_type: BookingType,
        total_amount: i64,
        at: Ms,
    },
    BookingConfirmed {
        id: Ulid,
        property_id: Ulid,
        at: Ms,
    },
    BookingRejected {
        id: Ulid,
        property_id: Ulid,
        reason: String,
        at: Ms,
    },
    BookingCancelled {
        id: Ulid,
        property_id: Ulid,
        at: Ms,
    },
    BookingCompleted {
        id: Ulid,
        property_id: Ulid,
        at: Ms,
    },
    ReviewPosted {
        id: Ulid,
        property_id: Ulid,
        booking_id: Ulid,
        renter_id: Ulid,
        rating: u8,
        aspects: AspectRatings,
        comment: Option<String>,
        at: Ms,
    },
    ReviewDeleted {
        id: Ulid,
        property_id: Ulid,
    },
    HelpfulToggled {
        review_id: Ulid,
        property_id: Ulid,
        user_id: Ulid,
    },
    ReviewReported {
        review_id: Ulid,
        property_id: Ulid,
        reporter: Ulid,
        reason: String,
    },
    ReportResolved {
        review_id: Ulid,
        property_id: Ulid,
        reporter: Ulid,
    },
    OwnerResponded {
        review_id: Ulid,
        property_id: Ulid,
        text: String,
        at: Ms,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyInfo {
    pub id: Ulid,
    pub owner_id: Ulid,
    pub status: PropertyStatus,
    pub rates: RateTable,
    pub discounts: Discounts,
    pub hours: Option<OperatingHours>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockInfo {
    pub id: Ulid,
    pub property_id: Ulid,
    pub start: Ms,
    pub end: Ms,
    pub reason: Option<String>,
}
