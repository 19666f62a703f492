use crate::domain::Order;

// No update or delete: orders are append-only from the gateway's side.
impl_service_client!(OrderClient, Order, "order", order);
