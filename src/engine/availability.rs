use ulid::Ulid;

use crate::model::*;

use super::EngineError;

// ── Interval validation ───────────────────────────────────────────

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

/// Boundary validation for caller-supplied intervals. Performed once, before
/// any availability state is read.
pub fn validate_interval(start: Ms, end: Ms) -> Result<Span, EngineError> {
    use crate::limits::*;
    if start >= end {
        return Err(EngineError::InvalidInterval { start, end });
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    let span = Span::new(start, end);
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("interval too wide"));
    }
    Ok(span)
}

// ── Conflict predicate ────────────────────────────────────────────

/// The shared primitive: does `candidate` overlap any of `existing`?
/// Both owner blocks and other renters' active bookings reduce to this
/// one half-open overlap test.
pub fn conflicts_with(existing: &[Span], candidate: &Span) -> bool {
    existing.iter().any(|s| s.overlaps(candidate))
}

/// Check a candidate interval against everything that excludes it: property
/// status, owner blocks, and active (pending/confirmed) bookings.
///
/// `exclude_booking` skips one booking id — confirm-time re-validation must
/// not conflict with the booking being confirmed itself.
pub(super) fn check_no_conflict(
    property: &PropertyState,
    span: &Span,
    exclude_booking: Option<Ulid>,
) -> Result<(), EngineError> {
    if property.status != PropertyStatus::Available {
        return Err(EngineError::AvailabilityConflict(property.id));
    }
    if let Some(block) = property.blocks_overlapping(span).next() {
        return Err(EngineError::AvailabilityConflict(block.id));
    }
    for booking in property.bookings_overlapping(span) {
        if !booking.status.is_active() {
            continue;
        }
        if exclude_booking == Some(booking.id) {
            continue;
        }
        return Err(EngineError::AvailabilityConflict(booking.id));
    }
    Ok(())
}

// ── Free-interval computation ─────────────────────────────────────

const DAY_MS: Ms = 86_400_000;
const MIN_MS: Ms = 60_000;

/// Weekday of a day index (days since epoch), Monday = 0.
/// Day 0 (1970-01-01) was a Thursday.
fn weekday_of_day(day_index: i64) -> usize {
    ((day_index + 3).rem_euclid(7)) as usize
}

/// Expand per-weekday opening windows over a query window into concrete
/// spans, clamped to the window. Output is sorted and disjoint.
pub fn operating_spans(hours: &OperatingHours, window: &Span) -> Vec<Span> {
    let mut out = Vec::new();
    let first_day = window.start.div_euclid(DAY_MS);
    let last_day = (window.end - 1).div_euclid(DAY_MS);
    for day in first_day..=last_day {
        let Some(w) = hours.0[weekday_of_day(day)] else {
            continue;
        };
        if w.open_min >= w.close_min {
            continue;
        }
        let open = day * DAY_MS + w.open_min as Ms * MIN_MS;
        let close = day * DAY_MS + w.close_min as Ms * MIN_MS;
        let start = open.max(window.start);
        let end = close.min(window.end);
        if start < end {
            out.push(Span::new(start, end));
        }
    }
    out
}

/// Compute the free sub-spans of a query window for display (search-result
/// calendars). Starts from the operating-hours expansion (the whole window
/// when no hours are configured), then subtracts owner blocks and active
/// bookings. Advisory only — admission re-checks under the property lock.
pub fn free_intervals(property: &PropertyState, query: &Span) -> Vec<Span> {
    if property.status != PropertyStatus::Available {
        return Vec::new();
    }

    let mut free = match &property.hours {
        Some(hours) => operating_spans(hours, query),
        None => vec![*query],
    };
    free.sort_by_key(|s| s.start);
    let mut free = merge_overlapping(&free);

    // Overlapping blocks are tolerated; subtraction treats them as a union.
    let mut blocked: Vec<Span> = property
        .blocks_overlapping(query)
        .map(|b| b.span.clamped_to(query))
        .collect();
    blocked.sort_by_key(|s| s.start);
    if !blocked.is_empty() {
        free = subtract_intervals(&free, &blocked);
    }

    let mut taken: Vec<Span> = property
        .bookings_overlapping(query)
        .filter(|b| b.status.is_active())
        .map(|b| b.span.clamped_to(query))
        .collect();
    taken.sort_by_key(|s| s.start);
    if !taken.is_empty() {
        free = subtract_intervals(&free, &taken);
    }

    free
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end {
                last.end = last.end.max(span.end);
                continue;
            }
        merged.push(span);
    }
    merged
}

pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}
