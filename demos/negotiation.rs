//! Drives one negotiation end to end against the configured sled database.
//!
//! ```text
//! NEGOTIATION_DB_PATH=/tmp/negotiation.db RUST_LOG=debug cargo run --example negotiation
//! ```
use anyhow::Context;
use order_negotiation::{
    access::{Actor, RoleBook, RoleCode},
    offer::OfferTerms,
    order::{OrderDetails, OrderKind},
    service::OrderService,
    settings::Settings,
    telemetry,
    types::ActorId,
};
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("Failed to load settings: ")?;
    telemetry::init_tracing(&settings.log_filter);

    let db = sled::open(&settings.db_path)
        .with_context(|| format!("Failed to open {}: ", settings.db_path))?;

    let roles = Arc::new(RoleBook::new());
    let buyer = Actor::new(ActorId::new("buyer_tehran"));
    let sellers = [
        Actor::new(ActorId::new("seller_isfahan")),
        Actor::new(ActorId::new("seller_ahvaz")),
    ];
    roles.grant(&buyer.id, RoleCode::Buyer);
    for seller in &sellers {
        roles.grant(&seller.id, RoleCode::Seller);
    }

    let service = OrderService::new(Arc::new(db), roles, &settings)?;

    let order = service.create_order(
        Some(&buyer),
        OrderKind::Buy,
        OrderDetails::new()
            .set_title("Buy rebar")
            .set_quantity("40", "t")
            .set_destination("Tehran", None),
    )?;

    let mut offers = Vec::new();
    for (seller, amount) in sellers.iter().zip(["1200000000", "1150000000"]) {
        let terms = OfferTerms::new(service.money(Some(amount), None)?).set_lead_time_days(7);
        offers.push(service.submit_offer(Some(seller), order.id, terms)?);
    }

    let accepted = service.accept_offer(Some(&buyer), offers[1].id)?;
    println!("{:#?}", accepted);

    for offer in service.list_offers_for_order(Some(&buyer), order.id)? {
        println!("{} {} {}", offer.id, offer.offered_by, offer.status);
    }
    for entry in service.status_history(Some(&buyer), order.id)? {
        println!(
            "{:?} -> {} ({})",
            entry.from_status, entry.to_status, entry.event
        );
    }

    Ok(())
}
