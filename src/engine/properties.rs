use std::sync::Arc;

use tokio::sync::RwLock;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::validate_interval;
use super::{Engine, EngineError};

fn validate_rates(rates: &RateTable) -> Result<(), EngineError> {
    for rate in [rates.hourly, rates.daily, rates.monthly] {
        if rate < 0 {
            return Err(EngineError::LimitExceeded("negative rate"));
        }
        if rate > MAX_RATE_MINOR_UNITS {
            return Err(EngineError::LimitExceeded("rate too large"));
        }
    }
    Ok(())
}

fn validate_discounts(discounts: &Discounts) -> Result<(), EngineError> {
    if discounts.weekly_pct > 100 || discounts.monthly_pct > 100 {
        return Err(EngineError::LimitExceeded("discount over 100%"));
    }
    Ok(())
}

impl Engine {
    /// Register a property with the engine. Property CRUD proper lives with
    /// the marketplace layer; the engine only needs the booking-relevant
    /// slice: rates, discounts, operating hours.
    pub async fn list_property(
        &self,
        id: Ulid,
        owner_id: Ulid,
        rates: RateTable,
        discounts: Discounts,
        hours: Option<OperatingHours>,
    ) -> Result<(), EngineError> {
        if self.state.len() >= MAX_PROPERTIES {
            return Err(EngineError::LimitExceeded("too many properties"));
        }
        validate_rates(&rates)?;
        validate_discounts(&discounts)?;
        if self.state.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::PropertyListed { id, owner_id, rates, discounts, hours };
        self.wal_append(&event).await?;
        let ps = PropertyState::new(id, owner_id, rates, discounts, hours);
        self.state.insert(id, Arc::new(RwLock::new(ps)));
        self.notify.send(id, &event);
        metrics::gauge!(crate::observability::PROPERTIES_ACTIVE).set(self.state.len() as f64);
        Ok(())
    }

    /// Replace rates/discounts/hours. Existing bookings keep the amount they
    /// were priced at — re-pricing requires a new booking.
    pub async fn update_property(
        &self,
        id: Ulid,
        rates: RateTable,
        discounts: Discounts,
        hours: Option<OperatingHours>,
    ) -> Result<(), EngineError> {
        validate_rates(&rates)?;
        validate_discounts(&discounts)?;
        let ps = self.get_property(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = ps.write().await;

        let event = Event::PropertyUpdated { id, rates, discounts, hours };
        self.persist_and_apply(id, &mut guard, &event).await
    }

    pub async fn set_property_status(
        &self,
        id: Ulid,
        status: PropertyStatus,
    ) -> Result<(), EngineError> {
        let ps = self.get_property(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = ps.write().await;

        let event = Event::PropertyStatusChanged { id, status };
        self.persist_and_apply(id, &mut guard, &event).await
    }

    /// Remove a property from the engine entirely (archival is external).
    pub async fn delist_property(&self, id: Ulid) -> Result<(), EngineError> {
        if !self.state.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }

        let event = Event::PropertyDelisted { id };
        self.wal_append(&event).await?;
        self.state.remove(&id);
        self.notify.send(id, &event);
        self.notify.remove(&id);
        metrics::gauge!(crate::observability::PROPERTIES_ACTIVE).set(self.state.len() as f64);
        Ok(())
    }

    /// Add an owner block. Blocks may overlap each other and existing
    /// bookings; they only exclude future admissions.
    pub async fn add_block(
        &self,
        id: Ulid,
        property_id: Ulid,
        actor: Ulid,
        start: Ms,
        end: Ms,
        reason: Option<String>,
    ) -> Result<(), EngineError> {
        let span = validate_interval(start, end)?;
        if let Some(ref r) = reason
            && r.len() > MAX_REASON_LEN {
                return Err(EngineError::LimitExceeded("block reason too long"));
            }
        let ps = self
            .get_property(&property_id)
            .ok_or(EngineError::NotFound(property_id))?;
        let mut guard = ps.write().await;
        if guard.owner_id != actor {
            return Err(EngineError::NotOwner(actor));
        }
        if guard.blocks.len() >= MAX_BLOCKS_PER_PROPERTY {
            return Err(EngineError::LimitExceeded("too many blocks on property"));
        }

        let event = Event::BlockAdded { id, property_id, span, reason };
        self.persist_and_apply(property_id, &mut guard, &event).await
    }

    pub async fn remove_block(&self, id: Ulid, actor: Ulid) -> Result<Ulid, EngineError> {
        let (property_id, mut guard) = self.resolve_entity_write(&id).await?;
        if guard.owner_id != actor {
            return Err(EngineError::NotOwner(actor));
        }
        let event = Event::BlockRemoved { id, property_id };
        self.persist_and_apply(property_id, &mut guard, &event).await?;
        Ok(property_id)
    }
}
