//! Parser for the gateway's query language, a GraphQL-style subset:
//!
//! ```text
//! query Named { accounts(id: "account_1") { id name orders { totalPrice } } }
//! mutation { createOrder(accountId: "account_1", products: [{id: "product_1", quantity: 2}]) { id } }
//! ```
//!
//! Variables, fragments and directives are not supported.

use crate::error::QueryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub kind: OperationKind,
    pub name: Option<String>,
    pub selections: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub alias: Option<String>,
    pub name: String,
    pub arguments: Vec<(String, Value)>,
    pub selections: Vec<Field>,
}

impl Field {
    /// Key under which this field appears in the response.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments
            .iter()
            .find(|(arg, _)| arg == name)
            .map(|(_, value)| value)
    }
}

/// Literal argument value. Numbers keep their source text so decimals are
/// never routed through floating point.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(String),
    String(String),
    List(Vec<Value>),
    Object(Vec<(String, Value)>),
}

impl Value {
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Object(entries) => entries
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Punct(char),
    Name(String),
    Str(String),
    Number(String),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Punct(c) => format!("`{c}`"),
            Token::Name(name) => format!("`{name}`"),
            Token::Str(_) => "string".to_string(),
            Token::Number(text) => format!("number {text}"),
        }
    }
}

pub fn parse(source: &str) -> Result<Document, QueryError> {
    let tokens = tokenize(source)?;
    Parser {
        tokens,
        pos: 0,
        depth: 0,
    }
    .document()
}

fn syntax(offset: usize, message: impl std::fmt::Display) -> QueryError {
    QueryError::schema(format!("Syntax error at offset {offset}: {message}"))
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, QueryError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() || c == ',' => {
                chars.next();
            }
            '#' => {
                while let Some((_, c)) = chars.next() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '{' | '}' | '(' | ')' | '[' | ']' | ':' => {
                chars.next();
                tokens.push((offset, Token::Punct(c)));
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        None => return Err(syntax(offset, "unterminated string")),
                        Some((_, '"')) => break,
                        Some((at, '\\')) => {
                            let escaped = match chars.next() {
                                Some((_, '"')) => '"',
                                Some((_, '\\')) => '\\',
                                Some((_, '/')) => '/',
                                Some((_, 'n')) => '\n',
                                Some((_, 't')) => '\t',
                                Some((_, 'r')) => '\r',
                                _ => return Err(syntax(at, "unsupported escape sequence")),
                            };
                            text.push(escaped);
                        }
                        Some((_, c)) => text.push(c),
                    }
                }
                tokens.push((offset, Token::Str(text)));
            }
            c if c == '-' || c.is_ascii_digit() => {
                let mut text = String::new();
                text.push(c);
                chars.next();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        text.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let digits = text.trim_start_matches('-');
                let well_formed = !digits.is_empty()
                    && !digits.starts_with('.')
                    && !digits.ends_with('.')
                    && digits.matches('.').count() <= 1;
                if !well_formed {
                    return Err(syntax(offset, format!("malformed number `{text}`")));
                }
                tokens.push((offset, Token::Number(text)));
            }
            c if c == '_' || c.is_ascii_alphabetic() => {
                let mut name = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c == '_' || c.is_ascii_alphanumeric() {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push((offset, Token::Name(name)));
            }
            other => return Err(syntax(offset, format!("unexpected character `{other}`"))),
        }
    }

    Ok(tokens)
}

/// Deepest nesting of selection sets and list/object values combined.
const MAX_DEPTH: usize = 32;

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn document(mut self) -> Result<Document, QueryError> {
        let kind = match self.peek() {
            Some(Token::Name(name)) if name == "query" => {
                self.pos += 1;
                OperationKind::Query
            }
            Some(Token::Name(name)) if name == "mutation" => {
                self.pos += 1;
                OperationKind::Mutation
            }
            _ => OperationKind::Query,
        };
        let name = match self.peek() {
            Some(Token::Name(_)) => Some(self.name()?),
            _ => None,
        };
        let selections = self.selection_set()?;
        if let Some((offset, token)) = self.tokens.get(self.pos) {
            return Err(syntax(
                *offset,
                format!("unexpected {} after operation", token.describe()),
            ));
        }
        Ok(Document {
            kind,
            name,
            selections,
        })
    }

    /// Runs `parse` one nesting level deeper, failing past [`MAX_DEPTH`].
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, QueryError>,
    ) -> Result<T, QueryError> {
        if self.depth >= MAX_DEPTH {
            return Err(syntax(self.offset(), "query nested too deeply"));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn selection_set(&mut self) -> Result<Vec<Field>, QueryError> {
        self.nested(|parser| {
            parser.expect('{')?;
            let mut fields = Vec::new();
            while !parser.eat('}') {
                fields.push(parser.field()?);
            }
            if fields.is_empty() {
                return Err(syntax(parser.offset(), "empty selection set"));
            }
            Ok(fields)
        })
    }

    fn field(&mut self) -> Result<Field, QueryError> {
        let first = self.name()?;
        let (alias, name) = if self.eat(':') {
            (Some(first), self.name()?)
        } else {
            (None, first)
        };

        let mut arguments = Vec::new();
        if self.eat('(') {
            while !self.eat(')') {
                let arg = self.name()?;
                self.expect(':')?;
                arguments.push((arg, self.value()?));
            }
        }

        let selections = if self.peek() == Some(&Token::Punct('{')) {
            self.selection_set()?
        } else {
            Vec::new()
        };

        Ok(Field {
            alias,
            name,
            arguments,
            selections,
        })
    }

    fn value(&mut self) -> Result<Value, QueryError> {
        let offset = self.offset();
        match self.next() {
            Some(Token::Str(text)) => Ok(Value::String(text)),
            Some(Token::Number(text)) => Ok(Value::Number(text)),
            Some(Token::Name(name)) => match name.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                "null" => Ok(Value::Null),
                other => Err(syntax(offset, format!("unsupported value `{other}`"))),
            },
            Some(Token::Punct('[')) => self.nested(|parser| {
                let mut items = Vec::new();
                while !parser.eat(']') {
                    items.push(parser.value()?);
                }
                Ok(Value::List(items))
            }),
            Some(Token::Punct('{')) => self.nested(|parser| {
                let mut entries = Vec::new();
                while !parser.eat('}') {
                    let key = parser.name()?;
                    parser.expect(':')?;
                    entries.push((key, parser.value()?));
                }
                Ok(Value::Object(entries))
            }),
            Some(token) => Err(syntax(offset, format!("unexpected {}", token.describe()))),
            None => Err(syntax(offset, "unexpected end of input")),
        }
    }

    fn name(&mut self) -> Result<String, QueryError> {
        let offset = self.offset();
        match self.next() {
            Some(Token::Name(name)) => Ok(name),
            Some(token) => Err(syntax(
                offset,
                format!("expected a name, found {}", token.describe()),
            )),
            None => Err(syntax(offset, "expected a name, found end of input")),
        }
    }

    fn expect(&mut self, punct: char) -> Result<(), QueryError> {
        let offset = self.offset();
        if self.eat(punct) {
            return Ok(());
        }
        let found = self
            .peek()
            .map(Token::describe)
            .unwrap_or_else(|| "end of input".to_string());
        Err(syntax(offset, format!("expected `{punct}`, found {found}")))
    }

    /// Consumes `punct` if it is next.
    fn eat(&mut self, punct: char) -> bool {
        if self.peek() == Some(&Token::Punct(punct)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, token)| token)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, token)| token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(0, |(offset, _)| *offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_query_with_alias_and_arguments() {
        let doc = parse(
            r#"
            # accounts with their orders
            query Overview {
              me: accounts(id: "account_1") {
                id, name
                orders { totalPrice products { id quantity } }
              }
            }"#,
        )
        .unwrap();

        assert_eq!(doc.kind, OperationKind::Query);
        assert_eq!(doc.name.as_deref(), Some("Overview"));
        let accounts = &doc.selections[0];
        assert_eq!(accounts.name, "accounts");
        assert_eq!(accounts.response_key(), "me");
        assert_eq!(
            accounts.argument("id"),
            Some(&Value::String("account_1".into()))
        );
        let orders = &accounts.selections[2];
        assert_eq!(orders.name, "orders");
        assert_eq!(orders.selections[1].selections.len(), 2);
    }

    #[test]
    fn parses_mutation_with_list_of_objects_and_decimal_text() {
        let doc = parse(
            r#"mutation {
                 createProduct(name: "Cup", description: "", price: 10.50) { id }
                 createOrder(accountId: "a", products: [{id: "p1", quantity: 2}, {id: "p2", quantity: 1}]) { id }
               }"#,
        )
        .unwrap();

        assert_eq!(doc.kind, OperationKind::Mutation);
        assert_eq!(
            doc.selections[0].argument("price"),
            Some(&Value::Number("10.50".into()))
        );
        let Some(Value::List(lines)) = doc.selections[1].argument("products") else {
            panic!("products should be a list");
        };
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].field("quantity"), Some(&Value::Number("2".into())));
    }

    #[test]
    fn string_escapes_are_decoded() {
        let doc = parse(r#"{ products(query: "say \"hi\"\n") { id } }"#).unwrap();
        assert_eq!(
            doc.selections[0].argument("query"),
            Some(&Value::String("say \"hi\"\n".into()))
        );
    }

    #[test]
    fn syntax_errors_are_schema_validation_failures() {
        for source in [
            "{ accounts { id }",
            "{ }",
            "{ accounts(id: ) { id } }",
            "{ accounts { id } } extra",
            "{ products(query: \"open) { id } }",
            "{ products(pagination: {take: 1.}) { id } }",
            "{ accounts @ }",
        ] {
            let err = parse(source).unwrap_err();
            assert!(
                matches!(err, QueryError::SchemaValidation(_)),
                "{source}: {err}"
            );
        }
    }

    #[test]
    fn deeply_nested_input_is_rejected_not_recursed() {
        let depth = 100_000;
        let values = format!(
            "{{ products(query: {}1{}) {{ id }} }}",
            "[".repeat(depth),
            "]".repeat(depth)
        );
        let selections = format!("{}{}", "{ a ".repeat(depth), "}".repeat(depth));

        for source in [values, selections] {
            match parse(&source) {
                Err(QueryError::SchemaValidation(errors)) => {
                    assert!(errors[0].ends_with("query nested too deeply"), "{errors:?}")
                }
                other => panic!("expected SchemaValidation, got {other:?}"),
            }
        }
    }

    #[test]
    fn nesting_within_the_limit_still_parses() {
        let source = format!(
            "{{ products(query: {}1{}) {{ id }} }}",
            "[".repeat(MAX_DEPTH - 1),
            "]".repeat(MAX_DEPTH - 1)
        );
        assert!(parse(&source).is_ok());
    }
}
