mod availability;
mod bookings;
mod error;
mod pricing;
mod properties;
mod queries;
mod reviews;

pub use availability::{
    conflicts_with, free_intervals, merge_overlapping, operating_spans, subtract_intervals,
    validate_interval,
};
pub use error::EngineError;
pub use pricing::{price, units_for, MONTHLY_TIER_MIN_UNITS, WEEKLY_TIER_MIN_UNITS};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedPropertyState = Arc<RwLock<PropertyState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                                .record(batch.len() as f64);
                            let flush_start = std::time::Instant::now();
                            let result = flush_batch(&mut wal, &mut batch);
                            metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                                .record(flush_start.elapsed().as_secs_f64());
                            respond_batch(&mut batch, &result);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                        .record(batch.len() as f64);
                    let flush_start = std::time::Instant::now();
                    let result = flush_batch(&mut wal, &mut batch);
                    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                        .record(flush_start.elapsed().as_secs_f64());
                    respond_batch(&mut batch, &result);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The booking/review/aggregate core. One `Engine` per marketplace database;
/// every mutation goes through a property-scoped write lock, the WAL, and the
/// notify hub, in that order.
pub struct Engine {
    pub state: DashMap<Ulid, SharedPropertyState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Reverse lookup: entity (block/booking/review) id → property id
    pub(super) entity_to_property: DashMap<Ulid, Ulid>,
}

/// Apply an event directly to a PropertyState (no locking — caller holds the lock).
/// Review events recompute the cached aggregate before returning, so the
/// cache can never be observed diverging from the fold.
fn apply_to_property(ps: &mut PropertyState, event: &Event, entity_map: &DashMap<Ulid, Ulid>) {
    match event {
        Event::BlockAdded {
            id,
            property_id,
            span,
            reason,
        } => {
            ps.insert_block(Block {
                id: *id,
                span: *span,
                reason: reason.clone(),
            });
            entity_map.insert(*id, *property_id);
        }
        Event::BlockRemoved { id, .. } => {
            ps.remove_block(*id);
            entity_map.remove(id);
        }
        Event::BookingCreated {
            id,
            property_id,
            renter_id,
            span,
            booking_type,
            total_amount,
            at,
        } => {
            ps.insert_booking(Booking {
                id: *id,
                property_id: *property_id,
                renter_id: *renter_id,
                span: *span,
                booking_type: *booking_type,
                total_amount: *total_amount,
                status: BookingStatus::Pending,
                reject_reason: None,
                created_at: *at,
                updated_at: *at,
            });
            entity_map.insert(*id, *property_id);
        }
        Event::BookingConfirmed { id, at, .. } => {
            if let Some(b) = ps.booking_mut(id) {
                b.status = BookingStatus::Confirmed;
                b.updated_at = *at;
            }
        }
        Event::BookingRejected { id, reason, at, .. } => {
            if let Some(b) = ps.booking_mut(id) {
                b.status = BookingStatus::Rejected;
                b.reject_reason = Some(reason.clone());
                b.updated_at = *at;
            }
        }
        Event::BookingCancelled { id, at, .. } => {
            if let Some(b) = ps.booking_mut(id) {
                b.status = BookingStatus::Cancelled;
                b.updated_at = *at;
            }
        }
        Event::BookingCompleted { id, at, .. } => {
            if let Some(b) = ps.booking_mut(id) {
                b.status = BookingStatus::Completed;
                b.updated_at = *at;
            }
        }
        Event::ReviewPosted {
            id,
            property_id,
            booking_id,
            renter_id,
            rating,
            aspects,
            comment,
            at,
        } => {
            ps.reviews.push(Review {
                id: *id,
                property_id: *property_id,
                booking_id: *booking_id,
                renter_id: *renter_id,
                rating: *rating,
                aspects: *aspects,
                comment: comment.clone(),
                helpful_votes: Default::default(),
                reports: Vec::new(),
                owner_response: None,
                status: ReviewStatus::Active,
                created_at: *at,
            });
            entity_map.insert(*id, *property_id);
            ps.recompute_aggregate();
        }
        Event::ReviewDeleted { id, .. } => {
            if let Some(r) = ps.review_mut(id) {
                r.status = ReviewStatus::Deleted;
            }
            ps.recompute_aggregate();
        }
        Event::HelpfulToggled { review_id, user_id, .. } => {
            if let Some(r) = ps.review_mut(review_id)
                && !r.helpful_votes.remove(user_id) {
                    r.helpful_votes.insert(*user_id);
                }
        }
        Event::ReviewReported {
            review_id,
            reporter,
            reason,
            ..
        } => {
            if let Some(r) = ps.review_mut(review_id) {
                r.reports.push(Report {
                    reporter: *reporter,
                    reason: reason.clone(),
                    status: ReportStatus::Open,
                });
            }
        }
        Event::ReportResolved { review_id, reporter, .. } => {
            if let Some(r) = ps.review_mut(review_id)
                && let Some(report) = r.reports.iter_mut().find(|rp| rp.reporter == *reporter) {
                    report.status = ReportStatus::Resolved;
                }
        }
        Event::OwnerResponded { review_id, text, at, .. } => {
            if let Some(r) = ps.review_mut(review_id) {
                r.owner_response = Some(OwnerResponse {
                    text: text.clone(),
                    at: *at,
                });
            }
        }
        Event::PropertyUpdated {
            rates,
            discounts,
            hours,
            ..
        } => {
            ps.rates = *rates;
            ps.discounts = *discounts;
            ps.hours = *hours;
        }
        Event::PropertyStatusChanged { status, .. } => {
            ps.status = *status;
        }
        // PropertyListed/Delisted are handled at the DashMap level, not here
        Event::PropertyListed { .. } | Event::PropertyDelisted { .. } => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> std::io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            notify,
            entity_to_property: DashMap::new(),
        };

        // Replay events — we're the sole owner of these Arcs, so try_read/try_write
        // always succeed instantly (no contention). Never use blocking_read/blocking_write
        // here because this may run inside an async context.
        for event in &events {
            match event {
                Event::PropertyListed {
                    id,
                    owner_id,
                    rates,
                    discounts,
                    hours,
                } => {
                    let ps = PropertyState::new(*id, *owner_id, *rates, *discounts, *hours);
                    engine.state.insert(*id, Arc::new(RwLock::new(ps)));
                }
                Event::PropertyDelisted { id } => {
                    engine.state.remove(id);
                }
                other => {
                    let property_id = event_property_id(other);
                    if let Some(property_id) = property_id
                        && let Some(entry) = engine.state.get(&property_id) {
                            let ps_arc = entry.clone();
                            let mut guard = ps_arc.try_write().expect("replay: uncontended write");
                            apply_to_property(&mut guard, other, &engine.entity_to_property);
                        }
                }
            }
        }

        metrics::gauge!(crate::observability::PROPERTIES_ACTIVE).set(engine.state.len() as f64);
        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_property(&self, id: &Ulid) -> Option<SharedPropertyState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn property_for_entity(&self, entity_id: &Ulid) -> Option<Ulid> {
        self.entity_to_property.get(entity_id).map(|e| *e.value())
    }

    /// WAL-append + apply + notify in one call. Eliminates the repeated 3-line pattern.
    pub(super) async fn persist_and_apply(
        &self,
        property_id: Ulid,
        ps: &mut PropertyState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_property(ps, event, &self.entity_to_property);
        self.notify.send(property_id, event);
        Ok(())
    }

    /// Lookup entity → property, get property, acquire write lock.
    pub(super) async fn resolve_entity_write(
        &self,
        entity_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<PropertyState>), EngineError> {
        let property_id = self
            .property_for_entity(entity_id)
            .ok_or(EngineError::NotFound(*entity_id))?;
        let ps = self
            .get_property(&property_id)
            .ok_or(EngineError::NotFound(property_id))?;
        let guard = ps.write_owned().await;
        Ok((property_id, guard))
    }

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state. Terminal bookings and deleted reviews are
    /// history and are re-emitted; aggregates are never stored — they fall
    /// out of replaying the review events.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        let property_ids: Vec<Ulid> = self.state.iter().map(|e| *e.key()).collect();
        for id in property_ids {
            let Some(entry) = self.state.get(&id) else { continue };
            let ps = entry.value().clone();
            let guard = ps.try_read().expect("compact: uncontended read");

            events.push(Event::PropertyListed {
                id: guard.id,
                owner_id: guard.owner_id,
                rates: guard.rates,
                discounts: guard.discounts,
                hours: guard.hours,
            });
            if guard.status != PropertyStatus::Available {
                events.push(Event::PropertyStatusChanged {
                    id: guard.id,
                    status: guard.status,
                });
            }

            for block in &guard.blocks {
                events.push(Event::BlockAdded {
                    id: block.id,
                    property_id: guard.id,
                    span: block.span,
                    reason: block.reason.clone(),
                });
            }

            for b in &guard.bookings {
                events.push(Event::BookingCreated {
                    id: b.id,
                    property_id: guard.id,
                    renter_id: b.renter_id,
                    span: b.span,
                    booking_type: b.booking_type,
                    total_amount: b.total_amount,
                    at: b.created_at,
                });
                match b.status {
                    BookingStatus::Pending => {}
                    BookingStatus::Confirmed => events.push(Event::BookingConfirmed {
                        id: b.id,
                        property_id: guard.id,
                        at: b.updated_at,
                    }),
                    BookingStatus::Rejected => events.push(Event::BookingRejected {
                        id: b.id,
                        property_id: guard.id,
                        reason: b.reject_reason.clone().unwrap_or_default(),
                        at: b.updated_at,
                    }),
                    BookingStatus::Cancelled => events.push(Event::BookingCancelled {
                        id: b.id,
                        property_id: guard.id,
                        at: b.updated_at,
                    }),
                    BookingStatus::Completed => events.push(Event::BookingCompleted {
                        id: b.id,
                        property_id: guard.id,
                        at: b.updated_at,
                    }),
                }
            }

            for r in &guard.reviews {
                events.push(Event::ReviewPosted {
                    id: r.id,
                    property_id: guard.id,
                    booking_id: r.booking_id,
                    renter_id: r.renter_id,
                    rating: r.rating,
                    aspects: r.aspects,
                    comment: r.comment.clone(),
                    at: r.created_at,
                });
                for voter in &r.helpful_votes {
                    events.push(Event::HelpfulToggled {
                        review_id: r.id,
                        property_id: guard.id,
                        user_id: *voter,
                    });
                }
                for report in &r.reports {
                    events.push(Event::ReviewReported {
                        review_id: r.id,
                        property_id: guard.id,
                        reporter: report.reporter,
                        reason: report.reason.clone(),
                    });
                    if report.status == ReportStatus::Resolved {
                        events.push(Event::ReportResolved {
                            review_id: r.id,
                            property_id: guard.id,
                            reporter: report.reporter,
                        });
                    }
                }
                if let Some(resp) = &r.owner_response {
                    events.push(Event::OwnerResponded {
                        review_id: r.id,
                        property_id: guard.id,
                        text: resp.text.clone(),
                        at: resp.at,
                    });
                }
                if r.status == ReviewStatus::Deleted {
                    events.push(Event::ReviewDeleted {
                        id: r.id,
                        property_id: guard.id,
                    });
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// Extract the property_id from an event (for non-List/Delist events).
fn event_property_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::BlockAdded { property_id, .. }
        | Event::BlockRemoved { property_id, .. }
        | Event::BookingCreated { property_id, .. }
        | Event::BookingConfirmed { property_id, .. }
        | Event::BookingRejected { property_id, .. }
        | Event::BookingCancelled { property_id, .. }
        | Event::BookingCompleted { property_id, .. }
        | Event::ReviewPosted { property_id, .. }
        | Event::ReviewDeleted { property_id, .. }
        | Event::HelpfulToggled { property_id, .. }
        | Event::ReviewReported { property_id, .. }
        | Event::ReportResolved { property_id, .. }
        | Event::OwnerResponded { property_id, .. } => Some(*property_id),
        Event::PropertyUpdated { id, .. } | Event::PropertyStatusChanged { id, .. } => Some(*id),
        Event::PropertyListed { .. } | Event::PropertyDelisted { .. } => None,
    }
}
