//! Orders and their descriptive details
use super::access::RoleCode;
use super::error::ValidationError;
use super::money::Money;
use super::types::{ActorId, OfferId, OrderId, TimeStamp};
use std::fmt;

const MAX_TITLE_LEN: usize = 255;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderKind {
    #[n(0)]
    Buy,
    #[n(1)]
    Sell,
}

impl OrderKind {
    /// Role the requester must hold to post an order of this kind.
    pub fn requester_role(self) -> RoleCode {
        match self {
            OrderKind::Buy => RoleCode::Buyer,
            OrderKind::Sell => RoleCode::Seller,
        }
    }
    /// Role a counterparty must hold to bid on an order of this kind.
    pub fn bidder_role(self) -> RoleCode {
        match self {
            OrderKind::Buy => RoleCode::Seller,
            OrderKind::Sell => RoleCode::Buyer,
        }
    }
    pub fn as_str(self) -> &'static str {
        match self {
            OrderKind::Buy => "BUY",
            OrderKind::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    #[n(0)]
    Open,
    #[n(1)]
    OfferSelected,
    #[n(2)]
    DepositPending,
    #[n(3)]
    DepositPaid,
    #[n(4)]
    ProviderConfirmed,
    #[n(5)]
    PaymentInProgress,
    #[n(6)]
    ReadyForPickup,
    #[n(7)]
    Loading,
    #[n(8)]
    LoadedAwaitingWeight,
    #[n(9)]
    AwaitingFinalPayment,
    #[n(10)]
    ReadyForDelivery,
    #[n(11)]
    InTransit,
    #[n(12)]
    Delivered,
    #[n(13)]
    Completed,
    #[n(14)]
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Open => "OPEN",
            OrderStatus::OfferSelected => "OFFER_SELECTED",
            OrderStatus::DepositPending => "DEPOSIT_PENDING",
            OrderStatus::DepositPaid => "DEPOSIT_PAID",
            OrderStatus::ProviderConfirmed => "PROVIDER_CONFIRMED",
            OrderStatus::PaymentInProgress => "PAYMENT_IN_PROGRESS",
            OrderStatus::ReadyForPickup => "READY_FOR_PICKUP",
            OrderStatus::Loading => "LOADING",
            OrderStatus::LoadedAwaitingWeight => "LOADED_AWAITING_WEIGHT",
            OrderStatus::AwaitingFinalPayment => "AWAITING_FINAL_PAYMENT",
            OrderStatus::ReadyForDelivery => "READY_FOR_DELIVERY",
            OrderStatus::InTransit => "IN_TRANSIT",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Carried with the order but never interpreted by the negotiation workflow.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderDetails {
    #[n(0)]
    title: String,
    #[n(1)]
    description: String,
    #[n(2)]
    category: Option<String>,
    #[n(3)]
    grade: String,
    #[n(4)]
    dimensions: String,
    #[n(5)]
    quantity: Option<String>, // decimal kept as text
    #[n(6)]
    quantity_unit: String,
    #[n(7)]
    approx_weight_kg: Option<u64>,
    #[n(8)]
    origin: Option<String>,
    #[n(9)]
    destination: Option<String>,
    #[n(10)]
    origin_city: String,
    #[n(11)]
    destination_city: String,
    #[n(12)]
    deadline_at: Option<TimeStamp>,
}

impl OrderDetails {
    /// Construct an empty set of details, fill it with the setters below
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_title(mut self, title: &str) -> Self {
        self.title = title.trim().to_string();
        self
    }
    pub fn set_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
    pub fn set_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }
    pub fn set_grade(mut self, grade: &str) -> Self {
        self.grade = grade.to_string();
        self
    }
    pub fn set_dimensions(mut self, dimensions: &str) -> Self {
        self.dimensions = dimensions.to_string();
        self
    }
    pub fn set_quantity(mut self, quantity: &str, unit: &str) -> Self {
        self.quantity = Some(quantity.to_string());
        self.quantity_unit = unit.to_string();
        self
    }
    pub fn set_approx_weight_kg(mut self, kg: u64) -> Self {
        self.approx_weight_kg = Some(kg);
        self
    }
    pub fn set_origin(mut self, city: &str, location: Option<&str>) -> Self {
        self.origin_city = city.to_string();
        self.origin = location.map(str::to_string);
        self
    }
    pub fn set_destination(mut self, city: &str, location: Option<&str>) -> Self {
        self.destination_city = city.to_string();
        self.destination = location.map(str::to_string);
        self
    }
    pub fn set_deadline(mut self, deadline: TimeStamp) -> Self {
        self.deadline_at = Some(deadline);
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn description(&self) -> &str {
        &self.description
    }
    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }
    pub fn quantity(&self) -> Option<(&str, &str)> {
        self.quantity
            .as_deref()
            .map(|q| (q, self.quantity_unit.as_str()))
    }
    pub fn approx_weight_kg(&self) -> Option<u64> {
        self.approx_weight_kg
    }
    pub fn origin_city(&self) -> &str {
        &self.origin_city
    }
    pub fn destination_city(&self) -> &str {
        &self.destination_city
    }
    pub fn deadline(&self) -> Option<TimeStamp> {
        self.deadline_at
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.is_empty() {
            return Err(ValidationError::MissingTitle);
        }
        if self.title.chars().count() > MAX_TITLE_LEN {
            return Err(ValidationError::TitleTooLong { max: MAX_TITLE_LEN });
        }
        Ok(())
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Order {
    #[n(0)]
    pub id: OrderId,
    #[n(1)]
    pub kind: OrderKind,
    #[n(2)]
    pub status: OrderStatus,
    #[n(3)]
    pub buyer: Option<ActorId>,
    #[n(4)]
    pub assigned_provider: Option<ActorId>,
    #[n(5)]
    pub details: OrderDetails,
    #[n(6)]
    pub selected_offer: Option<OfferId>,
    #[n(7)]
    pub agreed_price: Option<Money>,
    #[n(8)]
    pub requested_at: TimeStamp,
    #[n(9)]
    pub updated_at: TimeStamp,
}

impl Order {
    /// A fresh OPEN order with the requester placed in the slot implied by `kind`.
    pub fn open(kind: OrderKind, requester: ActorId, details: OrderDetails) -> Self {
        let now = TimeStamp::new();
        let (buyer, assigned_provider) = match kind {
            OrderKind::Buy => (Some(requester), None),
            OrderKind::Sell => (None, Some(requester)),
        };

        Self {
            id: OrderId::new(),
            kind,
            status: OrderStatus::Open,
            buyer,
            assigned_provider,
            details,
            selected_offer: None,
            agreed_price: None,
            requested_at: now,
            updated_at: now,
        }
    }

    /// The actor who posted the order: buyer of a BUY order, provider of a SELL order.
    pub fn requester(&self) -> Option<&ActorId> {
        match self.kind {
            OrderKind::Buy => self.buyer.as_ref(),
            OrderKind::Sell => self.assigned_provider.as_ref(),
        }
    }

    /// The matched actor, unset until an offer is accepted.
    pub fn counterparty(&self) -> Option<&ActorId> {
        match self.kind {
            OrderKind::Buy => self.assigned_provider.as_ref(),
            OrderKind::Sell => self.buyer.as_ref(),
        }
    }

    pub(crate) fn assign_counterparty(&mut self, actor: ActorId) {
        match self.kind {
            OrderKind::Buy => self.assigned_provider = Some(actor),
            OrderKind::Sell => self.buyer = Some(actor),
        }
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = TimeStamp::new();
    }
}
