//! The published schema as a static lookup table.
//!
//! Every field records the service that owns its data; the planner uses this
//! table instead of any runtime reflection.

use rust_decimal::Decimal;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use super::parser::{Document, Field, OperationKind, Value};
use crate::error::QueryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeName {
    Query,
    Mutation,
    Account,
    Product,
    Order,
    OrderedProduct,
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Service that supplies a field's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Owner {
    Account,
    Catalog,
    Order,
    /// Captured on the order line at creation time.
    Snapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Scalar,
    Object(TypeName),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Id,
    String,
    Decimal,
    Pagination,
    OrderLines,
}

#[derive(Debug)]
pub struct ArgDef {
    pub name: &'static str,
    pub ty: ArgType,
    pub required: bool,
}

#[derive(Debug)]
pub struct FieldDef {
    pub name: &'static str,
    pub ty: FieldType,
    pub args: &'static [ArgDef],
    pub owner: Owner,
}

const fn arg(name: &'static str, ty: ArgType, required: bool) -> ArgDef {
    ArgDef { name, ty, required }
}

const fn scalar(name: &'static str, owner: Owner) -> FieldDef {
    FieldDef {
        name,
        ty: FieldType::Scalar,
        args: &[],
        owner,
    }
}

const fn object(
    name: &'static str,
    ty: TypeName,
    args: &'static [ArgDef],
    owner: Owner,
) -> FieldDef {
    FieldDef {
        name,
        ty: FieldType::Object(ty),
        args,
        owner,
    }
}

static QUERY: &[FieldDef] = &[
    object(
        "accounts",
        TypeName::Account,
        &[
            arg("id", ArgType::Id, false),
            arg("pagination", ArgType::Pagination, false),
        ],
        Owner::Account,
    ),
    object(
        "products",
        TypeName::Product,
        &[
            arg("id", ArgType::Id, false),
            arg("query", ArgType::String, false),
            arg("pagination", ArgType::Pagination, false),
        ],
        Owner::Catalog,
    ),
];

static MUTATION: &[FieldDef] = &[
    object(
        "createAccount",
        TypeName::Account,
        &[arg("name", ArgType::String, true)],
        Owner::Account,
    ),
    object(
        "createProduct",
        TypeName::Product,
        &[
            arg("name", ArgType::String, true),
            arg("description", ArgType::String, true),
            arg("price", ArgType::Decimal, true),
        ],
        Owner::Catalog,
    ),
    object(
        "createOrder",
        TypeName::Order,
        &[
            arg("accountId", ArgType::Id, true),
            arg("products", ArgType::OrderLines, true),
        ],
        Owner::Order,
    ),
];

static ACCOUNT: &[FieldDef] = &[
    scalar("id", Owner::Account),
    scalar("name", Owner::Account),
    object("orders", TypeName::Order, &[], Owner::Order),
];

static PRODUCT: &[FieldDef] = &[
    scalar("id", Owner::Catalog),
    scalar("name", Owner::Catalog),
    scalar("description", Owner::Catalog),
    scalar("price", Owner::Catalog),
];

static ORDER: &[FieldDef] = &[
    scalar("id", Owner::Order),
    scalar("accountId", Owner::Order),
    scalar("createdAt", Owner::Order),
    scalar("totalPrice", Owner::Order),
    object("products", TypeName::OrderedProduct, &[], Owner::Order),
];

static ORDERED_PRODUCT: &[FieldDef] = &[
    scalar("id", Owner::Snapshot),
    scalar("name", Owner::Catalog),
    scalar("description", Owner::Catalog),
    scalar("price", Owner::Snapshot),
    scalar("quantity", Owner::Snapshot),
];

pub fn fields_of(ty: TypeName) -> &'static [FieldDef] {
    match ty {
        TypeName::Query => QUERY,
        TypeName::Mutation => MUTATION,
        TypeName::Account => ACCOUNT,
        TypeName::Product => PRODUCT,
        TypeName::Order => ORDER,
        TypeName::OrderedProduct => ORDERED_PRODUCT,
    }
}

pub fn lookup(ty: TypeName, name: &str) -> Option<&'static FieldDef> {
    fields_of(ty).iter().find(|def| def.name == name)
}

pub fn root_type(kind: OperationKind) -> TypeName {
    match kind {
        OperationKind::Query => TypeName::Query,
        OperationKind::Mutation => TypeName::Mutation,
    }
}

/// Checks the whole document against the schema, reporting every problem.
pub fn validate(document: &Document) -> Result<(), QueryError> {
    let mut errors = Vec::new();
    validate_selections(
        root_type(document.kind),
        &document.selections,
        "",
        &mut errors,
    );
    if errors.is_empty() {
        Ok(())
    } else {
        Err(QueryError::SchemaValidation(errors))
    }
}

fn validate_selections(ty: TypeName, fields: &[Field], path: &str, errors: &mut Vec<String>) {
    let mut keys = HashSet::new();
    for field in fields {
        let at = if path.is_empty() {
            field.response_key().to_string()
        } else {
            format!("{path}.{}", field.response_key())
        };
        if !keys.insert(field.response_key()) {
            errors.push(format!("Duplicate response key `{at}`"));
        }

        let Some(def) = lookup(ty, &field.name) else {
            errors.push(format!("Unknown field `{}` on type {ty} at `{at}`", field.name));
            continue;
        };

        validate_arguments(def, field, &at, errors);

        match def.ty {
            FieldType::Scalar if !field.selections.is_empty() => {
                errors.push(format!("Scalar field `{at}` cannot have a selection set"));
            }
            FieldType::Object(inner) if field.selections.is_empty() => {
                errors.push(format!("Field `{at}` of type {inner} needs a selection set"));
            }
            FieldType::Object(inner) => validate_selections(inner, &field.selections, &at, errors),
            FieldType::Scalar => {}
        }
    }
}

fn validate_arguments(def: &FieldDef, field: &Field, at: &str, errors: &mut Vec<String>) {
    let mut seen = HashSet::new();
    for (name, value) in &field.arguments {
        if !seen.insert(name.as_str()) {
            errors.push(format!("Argument `{name}` given twice on `{at}`"));
        }
        match def.args.iter().find(|arg| arg.name == name) {
            None => errors.push(format!("Unknown argument `{name}` on `{at}`")),
            Some(arg) => {
                if let Err(problem) = check_value(arg, value) {
                    errors.push(format!("Argument `{name}` on `{at}` {problem}"));
                }
            }
        }
    }
    for arg in def.args.iter().filter(|arg| arg.required) {
        let present = field
            .argument(arg.name)
            .is_some_and(|value| *value != Value::Null);
        if !present {
            errors.push(format!("Missing required argument `{}` on `{at}`", arg.name));
        }
    }
}

fn check_value(arg: &ArgDef, value: &Value) -> Result<(), String> {
    if *value == Value::Null {
        return Ok(());
    }
    match arg.ty {
        ArgType::Id | ArgType::String => match value {
            Value::String(_) => Ok(()),
            _ => Err("must be a string".to_string()),
        },
        ArgType::Decimal => decimal_value(value)
            .map(|_| ())
            .ok_or_else(|| "must be a decimal number".to_string()),
        ArgType::Pagination => match value {
            Value::Object(entries) => {
                for (key, entry) in entries {
                    if key != "skip" && key != "take" {
                        return Err(format!("has unknown pagination field `{key}`"));
                    }
                    if *entry != Value::Null && count_value(entry).is_none() {
                        return Err(format!("`{key}` must be a non-negative integer"));
                    }
                }
                Ok(())
            }
            _ => Err("must be an object {skip, take}".to_string()),
        },
        ArgType::OrderLines => match value {
            Value::List(lines) => {
                for line in lines {
                    let Value::Object(entries) = line else {
                        return Err("must contain {id, quantity} objects".to_string());
                    };
                    if let Some((key, _)) = entries
                        .iter()
                        .find(|(key, _)| key != "id" && key != "quantity")
                    {
                        return Err(format!("has unknown line field `{key}`"));
                    }
                    if !matches!(line.field("id"), Some(Value::String(_))) {
                        return Err("lines need a string `id`".to_string());
                    }
                    if line.field("quantity").and_then(quantity_value).is_none() {
                        return Err("lines need an integer `quantity`".to_string());
                    }
                }
                Ok(())
            }
            _ => Err("must be a list".to_string()),
        },
    }
}

/// Parses a decimal from a number literal or a string, never via `f64`.
pub fn decimal_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(text) | Value::String(text) => Decimal::from_str(text.trim()).ok(),
        _ => None,
    }
}

pub fn count_value(value: &Value) -> Option<usize> {
    match value {
        Value::Number(text) => text.parse().ok(),
        _ => None,
    }
}

pub fn quantity_value(value: &Value) -> Option<u32> {
    match value {
        Value::Number(text) => text.parse().ok(),
        _ => None,
    }
}
