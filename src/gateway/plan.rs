//! Turns a validated document into typed plan nodes.
//!
//! Field names are matched exactly once, here; the executor only sees enums.

use std::collections::BTreeSet;
use tracing::debug;

use super::parser::{Document, Field, OperationKind, Value};
use super::schema::{self, decimal_value, lookup, root_type, FieldType, Owner, TypeName};
use crate::actor_framework::Page;
use crate::domain::ProductCreate;
use crate::error::QueryError;
use crate::orchestrator::{CreateOrder, OrderRequestLine};

/// A planned field and the key it is reported under.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection<F> {
    pub key: String,
    pub field: F,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AccountField {
    Id,
    Name,
    Orders(Vec<Selection<OrderField>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductField {
    Id,
    Name,
    Description,
    Price,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderField {
    Id,
    AccountId,
    CreatedAt,
    TotalPrice,
    Products(Vec<Selection<LineField>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineField {
    Id,
    Name,
    Description,
    Price,
    Quantity,
}

#[derive(Debug, Clone)]
pub enum RootField {
    Accounts {
        id: Option<String>,
        page: Page,
        fields: Vec<Selection<AccountField>>,
    },
    Products {
        id: Option<String>,
        query: Option<String>,
        page: Page,
        fields: Vec<Selection<ProductField>>,
    },
    CreateAccount {
        name: String,
        fields: Vec<Selection<AccountField>>,
    },
    CreateProduct {
        payload: ProductCreate,
        fields: Vec<Selection<ProductField>>,
    },
    CreateOrder {
        request: CreateOrder,
        fields: Vec<Selection<OrderField>>,
    },
}

#[derive(Debug, Clone)]
pub struct Plan {
    pub kind: OperationKind,
    pub roots: Vec<Selection<RootField>>,
    /// Services the plan will call, from the schema's ownership column.
    pub owners: BTreeSet<Owner>,
}

/// Plans a document that already passed [`schema::validate`].
pub fn plan(document: &Document, max_page_size: usize) -> Result<Plan, QueryError> {
    let mut roots = Vec::with_capacity(document.selections.len());
    for field in &document.selections {
        roots.push(Selection {
            key: field.response_key().to_string(),
            field: plan_root(document.kind, field, max_page_size)?,
        });
    }

    let mut owners = BTreeSet::new();
    collect_owners(root_type(document.kind), &document.selections, &mut owners);
    debug!(roots = roots.len(), owners = ?owners, "Planned operation");

    Ok(Plan {
        kind: document.kind,
        roots,
        owners,
    })
}

fn plan_root(
    kind: OperationKind,
    field: &Field,
    max_page_size: usize,
) -> Result<RootField, QueryError> {
    let root = match (kind, field.name.as_str()) {
        (OperationKind::Query, "accounts") => RootField::Accounts {
            id: string_arg(field, "id"),
            page: page_arg(field, max_page_size),
            fields: plan_accounts(&field.selections)?,
        },
        (OperationKind::Query, "products") => RootField::Products {
            id: string_arg(field, "id"),
            query: string_arg(field, "query"),
            page: page_arg(field, max_page_size),
            fields: plan_products(&field.selections)?,
        },
        (OperationKind::Mutation, "createAccount") => RootField::CreateAccount {
            name: required_string(field, "name")?,
            fields: plan_accounts(&field.selections)?,
        },
        (OperationKind::Mutation, "createProduct") => RootField::CreateProduct {
            payload: ProductCreate {
                name: required_string(field, "name")?,
                description: required_string(field, "description")?,
                price: field
                    .argument("price")
                    .and_then(decimal_value)
                    .ok_or_else(|| QueryError::schema("createProduct needs a decimal `price`"))?,
            },
            fields: plan_products(&field.selections)?,
        },
        (OperationKind::Mutation, "createOrder") => RootField::CreateOrder {
            request: CreateOrder {
                account_id: required_string(field, "accountId")?,
                lines: order_lines(field)?,
            },
            fields: plan_orders(&field.selections)?,
        },
        (_, other) => return Err(QueryError::schema(format!("Cannot plan root field `{other}`"))),
    };
    Ok(root)
}

fn plan_fields<F>(
    selections: &[Field],
    mut plan_one: impl FnMut(&Field) -> Result<F, QueryError>,
) -> Result<Vec<Selection<F>>, QueryError> {
    selections
        .iter()
        .map(|field| {
            Ok(Selection {
                key: field.response_key().to_string(),
                field: plan_one(field)?,
            })
        })
        .collect()
}

fn unknown(ty: &str, field: &Field) -> QueryError {
    QueryError::schema(format!("Unknown field `{}` on type {ty}", field.name))
}

fn plan_accounts(selections: &[Field]) -> Result<Vec<Selection<AccountField>>, QueryError> {
    plan_fields(selections, |field| match field.name.as_str() {
        "id" => Ok(AccountField::Id),
        "name" => Ok(AccountField::Name),
        "orders" => Ok(AccountField::Orders(plan_orders(&field.selections)?)),
        _ => Err(unknown("Account", field)),
    })
}

fn plan_products(selections: &[Field]) -> Result<Vec<Selection<ProductField>>, QueryError> {
    plan_fields(selections, |field| match field.name.as_str() {
        "id" => Ok(ProductField::Id),
        "name" => Ok(ProductField::Name),
        "description" => Ok(ProductField::Description),
        "price" => Ok(ProductField::Price),
        _ => Err(unknown("Product", field)),
    })
}

fn plan_orders(selections: &[Field]) -> Result<Vec<Selection<OrderField>>, QueryError> {
    plan_fields(selections, |field| match field.name.as_str() {
        "id" => Ok(OrderField::Id),
        "accountId" => Ok(OrderField::AccountId),
        "createdAt" => Ok(OrderField::CreatedAt),
        "totalPrice" => Ok(OrderField::TotalPrice),
        "products" => Ok(OrderField::Products(plan_lines(&field.selections)?)),
        _ => Err(unknown("Order", field)),
    })
}

fn plan_lines(selections: &[Field]) -> Result<Vec<Selection<LineField>>, QueryError> {
    plan_fields(selections, |field| match field.name.as_str() {
        "id" => Ok(LineField::Id),
        "name" => Ok(LineField::Name),
        "description" => Ok(LineField::Description),
        "price" => Ok(LineField::Price),
        "quantity" => Ok(LineField::Quantity),
        _ => Err(unknown("OrderedProduct", field)),
    })
}

fn string_arg(field: &Field, name: &str) -> Option<String> {
    match field.argument(name) {
        Some(Value::String(value)) => Some(value.clone()),
        _ => None,
    }
}

fn required_string(field: &Field, name: &str) -> Result<String, QueryError> {
    string_arg(field, name).ok_or_else(|| {
        QueryError::schema(format!("`{}` needs a string `{name}`", field.name))
    })
}

/// `take` is clamped to `max_page_size`; an absent or zero `take` means a full page.
fn page_arg(field: &Field, max_page_size: usize) -> Page {
    let pagination = field.argument("pagination");
    let read = |key| pagination.and_then(|p| p.field(key)).and_then(schema::count_value);
    let skip = read("skip").unwrap_or(0);
    let take = match read("take") {
        Some(0) | None => max_page_size,
        Some(take) => take.min(max_page_size),
    };
    Page::new(skip, take)
}

fn order_lines(field: &Field) -> Result<Vec<OrderRequestLine>, QueryError> {
    let Some(Value::List(lines)) = field.argument("products") else {
        return Err(QueryError::schema("createOrder needs a `products` list"));
    };
    lines
        .iter()
        .map(|line| {
            let id = match line.field("id") {
                Some(Value::String(id)) => id.clone(),
                _ => return Err(QueryError::schema("order line needs a string `id`")),
            };
            let quantity = line
                .field("quantity")
                .and_then(schema::quantity_value)
                .ok_or_else(|| QueryError::schema("order line needs an integer `quantity`"))?;
            Ok(OrderRequestLine::new(id, quantity))
        })
        .collect()
}

fn collect_owners(ty: TypeName, fields: &[Field], owners: &mut BTreeSet<Owner>) {
    for field in fields {
        if let Some(def) = lookup(ty, &field.name) {
            owners.insert(def.owner);
            if let FieldType::Object(inner) = def.ty {
                collect_owners(inner, &field.selections, owners);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::parser::parse;
    use rust_decimal_macros::dec;

    fn planned(source: &str) -> Plan {
        let document = parse(source).unwrap();
        schema::validate(&document).unwrap();
        plan(&document, 50).unwrap()
    }

    #[test]
    fn nested_query_maps_to_typed_nodes_and_owners() {
        let plan = planned("{ accounts { name orders { products { name quantity } } } }");
        let RootField::Accounts { id, page, fields } = &plan.roots[0].field else {
            panic!("expected accounts root");
        };
        assert_eq!(*id, None);
        assert_eq!(*page, Page::new(0, 50));
        assert_eq!(fields[0].field, AccountField::Name);
        let AccountField::Orders(orders) = &fields[1].field else {
            panic!("expected orders");
        };
        assert_eq!(
            orders[0].field,
            OrderField::Products(vec![
                Selection { key: "name".into(), field: LineField::Name },
                Selection { key: "quantity".into(), field: LineField::Quantity },
            ])
        );
        assert_eq!(
            plan.owners.iter().copied().collect::<Vec<_>>(),
            vec![Owner::Account, Owner::Catalog, Owner::Order, Owner::Snapshot]
        );
    }

    #[test]
    fn pagination_is_clamped() {
        let plan = planned("{ products(pagination: {skip: 5, take: 500}, query: \"cup\") { id } }");
        let RootField::Products { page, query, .. } = &plan.roots[0].field else {
            panic!("expected products root");
        };
        assert_eq!(*page, Page::new(5, 50));
        assert_eq!(query.as_deref(), Some("cup"));

        let plan = planned("{ products(pagination: {skip: 0, take: 0}) { id } }");
        let RootField::Products { page, .. } = &plan.roots[0].field else {
            panic!("expected products root");
        };
        assert_eq!(*page, Page::new(0, 50));
    }

    #[test]
    fn mutation_arguments_become_payloads() {
        let plan = planned(
            r#"mutation {
                cup: createProduct(name: "Cup", description: "Blue", price: 10.50) { id }
                createOrder(accountId: "account_1", products: [{id: "p1", quantity: 2}, {id: "p2", quantity: 1}]) { totalPrice }
            }"#,
        );
        assert_eq!(plan.roots[0].key, "cup");
        let RootField::CreateProduct { payload, .. } = &plan.roots[0].field else {
            panic!("expected createProduct");
        };
        assert_eq!(payload.price, dec!(10.50));
        let RootField::CreateOrder { request, .. } = &plan.roots[1].field else {
            panic!("expected createOrder");
        };
        assert_eq!(
            request.lines,
            vec![OrderRequestLine::new("p1", 2), OrderRequestLine::new("p2", 1)]
        );
    }
}
