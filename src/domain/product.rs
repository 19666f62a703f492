use crate::actor_framework::Entity;
use rust_decimal::Decimal;

/// A catalog entry. Prices are fixed-point decimals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: Decimal,
}

/// Payload for creating a new product.
#[derive(Debug, Clone)]
pub struct ProductCreate {
    pub name: String,
    pub description: String,
    pub price: Decimal,
}

/// Payload for editing a product. Orders already placed keep their snapshot price.
#[derive(Debug, Clone, Default)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
}

/// Catalog search: free text over name and description, and/or an id set.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub query: Option<String>,
    pub ids: Option<Vec<String>>,
}

impl Product {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        price: Decimal,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            price,
        }
    }
}

fn check_price(price: Decimal) -> Result<(), String> {
    if price.is_sign_negative() {
        return Err(format!("Price must not be negative: {price}"));
    }
    Ok(())
}

impl Entity for Product {
    type Id = String;
    type CreatePayload = ProductCreate;
    type Patch = ProductPatch;
    type Filter = ProductFilter;

    const KIND: &'static str = "product";

    fn id(&self) -> &String {
        &self.id
    }

    fn from_create(id: String, payload: ProductCreate) -> Result<Self, String> {
        if payload.name.trim().is_empty() {
            return Err("Product name required".to_string());
        }
        check_price(payload.price)?;
        Ok(Self::new(id, payload.name, payload.description, payload.price))
    }

    fn on_update(&mut self, patch: ProductPatch) -> Result<(), String> {
        if let Some(price) = patch.price {
            check_price(price)?;
            self.price = price;
        }
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        Ok(())
    }

    fn matches(&self, filter: &ProductFilter) -> bool {
        if let Some(ids) = &filter.ids {
            if !ids.contains(&self.id) {
                return false;
            }
        }
        match filter.query.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(query) => {
                let query = query.to_lowercase();
                self.name.to_lowercase().contains(&query)
                    || self.description.to_lowercase().contains(&query)
            }
        }
    }
}
