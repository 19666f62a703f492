use crate::actor_framework::Entity;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// One ordered product, frozen at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLine {
    pub product_id: String,
    pub quantity: u32,
    /// Snapshot price: the catalog price observed when the order was created.
    pub price: Decimal,
}

impl OrderLine {
    /// `quantity * price`, or `None` on overflow.
    pub fn subtotal(&self) -> Option<Decimal> {
        Decimal::from(self.quantity).checked_mul(self.price)
    }
}

/// A placed order, owned by the order service. Append-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: String,
    pub account_id: String,
    pub created_at: DateTime<Utc>,
    pub total_price: Decimal,
    pub lines: Vec<OrderLine>,
}

/// Payload for persisting a new order.
#[derive(Debug, Clone)]
pub struct OrderCreate {
    pub account_id: String,
    pub lines: Vec<OrderLine>,
    pub total_price: Decimal,
}

/// Orders have no update path; the type exists to satisfy [`Entity`].
#[derive(Debug, Clone)]
pub enum OrderPatch {}

#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub account_ids: Option<Vec<String>>,
}

impl Order {
    /// Exact sum of the line subtotals, or `None` on overflow.
    pub fn total_of(lines: &[OrderLine]) -> Option<Decimal> {
        lines
            .iter()
            .try_fold(Decimal::ZERO, |total, line| total.checked_add(line.subtotal()?))
    }
}

impl Entity for Order {
    type Id = String;
    type CreatePayload = OrderCreate;
    type Patch = OrderPatch;
    type Filter = OrderFilter;

    const KIND: &'static str = "order";

    fn id(&self) -> &String {
        &self.id
    }

    fn from_create(id: String, payload: OrderCreate) -> Result<Self, String> {
        if payload.lines.is_empty() {
            return Err("Order must contain at least one line".to_string());
        }
        let expected = Order::total_of(&payload.lines)
            .ok_or_else(|| "Order total overflows".to_string())?;
        if expected != payload.total_price {
            return Err(format!(
                "Order total {} does not match line sum {}",
                payload.total_price, expected
            ));
        }
        Ok(Self {
            id,
            account_id: payload.account_id,
            created_at: Utc::now(),
            total_price: payload.total_price,
            lines: payload.lines,
        })
    }

    fn on_update(&mut self, patch: OrderPatch) -> Result<(), String> {
        match patch {}
    }

    fn matches(&self, filter: &OrderFilter) -> bool {
        filter
            .account_ids
            .as_ref()
            .map_or(true, |ids| ids.contains(&self.account_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(product_id: &str, quantity: u32, price: Decimal) -> OrderLine {
        OrderLine {
            product_id: product_id.into(),
            quantity,
            price,
        }
    }

    #[test]
    fn total_is_exact_decimal_sum() {
        let lines = [line("p1", 3, dec!(0.10)), line("p2", 1, dec!(0.20))];
        assert_eq!(Order::total_of(&lines), Some(dec!(0.50)));
    }

    #[test]
    fn order_service_rejects_a_drifted_total() {
        let payload = OrderCreate {
            account_id: "a1".into(),
            lines: vec![line("p1", 2, dec!(10.00))],
            total_price: dec!(19.99),
        };
        let err = Order::from_create("o1".into(), payload).unwrap_err();
        assert!(err.contains("does not match"), "{err}");
    }

    #[test]
    fn filter_by_account() {
        let order = Order::from_create(
            "o1".into(),
            OrderCreate {
                account_id: "a1".into(),
                lines: vec![line("p1", 1, dec!(1))],
                total_price: dec!(1),
            },
        )
        .unwrap();
        let for_accounts = |ids: &[&str]| OrderFilter {
            account_ids: Some(ids.iter().map(|id| id.to_string()).collect()),
        };
        assert!(order.matches(&for_accounts(&["a1", "a2"])));
        assert!(!order.matches(&for_accounts(&["a2"])));
        assert!(order.matches(&OrderFilter::default()));
    }
}
