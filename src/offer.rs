//! Offers submitted against an order
use super::error::{Conflict, ValidationError};
use super::money::Money;
use super::types::{ActorId, OfferId, OrderId, TimeStamp};
use std::fmt;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OfferStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Accepted,
    #[n(2)]
    Declined,
    #[n(3)]
    Withdrawn,
}

impl OfferStatus {
    pub fn is_terminal(self) -> bool {
        self != OfferStatus::Pending
    }
    pub fn as_str(self) -> &'static str {
        match self {
            OfferStatus::Pending => "PENDING",
            OfferStatus::Accepted => "ACCEPTED",
            OfferStatus::Declined => "DECLINED",
            OfferStatus::Withdrawn => "WITHDRAWN",
        }
    }
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct OfferTerms {
    #[n(0)]
    total_price: Money,
    #[n(1)]
    unit_price: Option<Money>,
    #[n(2)]
    deposit_percent: Option<u32>,
    #[n(3)]
    lead_time_days: Option<u32>,
    #[n(4)]
    terms: Option<String>,
}

impl OfferTerms {
    pub fn new(total_price: Money) -> Self {
        Self {
            total_price,
            unit_price: None,
            deposit_percent: None,
            lead_time_days: None,
            terms: None,
        }
    }
    pub fn set_unit_price(mut self, price: Money) -> Self {
        self.unit_price = Some(price);
        self
    }
    pub fn set_deposit_percent(mut self, percent: u32) -> Self {
        self.deposit_percent = Some(percent);
        self
    }
    pub fn set_lead_time_days(mut self, days: u32) -> Self {
        self.lead_time_days = Some(days);
        self
    }
    pub fn set_terms(mut self, terms: &str) -> Self {
        self.terms = Some(terms.to_string());
        self
    }

    pub fn total_price(&self) -> &Money {
        &self.total_price
    }
    pub fn unit_price(&self) -> Option<&Money> {
        self.unit_price.as_ref()
    }
    pub fn deposit_percent(&self) -> Option<u32> {
        self.deposit_percent
    }
    pub fn lead_time_days(&self) -> Option<u32> {
        self.lead_time_days
    }
    pub fn terms(&self) -> Option<&str> {
        self.terms.as_deref()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.deposit_percent {
            Some(percent) if percent > 100 => {
                Err(ValidationError::InvalidDepositPercent(percent))
            }
            _ => Ok(()),
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Offer {
    #[n(0)]
    pub id: OfferId,
    #[n(1)]
    pub order_id: OrderId,
    #[n(2)]
    pub offered_by: ActorId,
    #[n(3)]
    pub terms: OfferTerms,
    #[n(4)]
    pub status: OfferStatus,
    #[n(5)]
    pub created_at: TimeStamp,
    #[n(6)]
    pub updated_at: TimeStamp,
}

impl Offer {
    pub fn new(order_id: OrderId, offered_by: ActorId, terms: OfferTerms) -> Self {
        let now = TimeStamp::new();
        Self {
            id: OfferId::new(),
            order_id,
            offered_by,
            terms,
            status: OfferStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves a PENDING offer into one of the terminal statuses. Terminal offers never move again.
    pub fn settle(&mut self, next: OfferStatus) -> Result<(), Conflict> {
        if self.status.is_terminal() || !next.is_terminal() {
            return Err(Conflict::OfferNotPending(self.status));
        }
        self.status = next;
        self.updated_at = TimeStamp::new();
        Ok(())
    }
}
