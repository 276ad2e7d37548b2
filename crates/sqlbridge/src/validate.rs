//! Pluggable payload validation run before any SQL is built.
//!
//! A validator is any [`PayloadValidator`]; plain closures
//! `Fn(&str, Value) -> Result<Value, ValidationErrors>` qualify. [`TableSchemas`]
//! is a ready-made validator keyed by table name.

use crate::value::Value;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

/// A machine-friendly validation code.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationCode {
    Required,
    Type,
    Len,
    Range,
    Email,
    Regex,
    Url,
    Uuid,
    OneOf,
    Custom(String),
}

impl ValidationCode {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Required => "required",
            Self::Type => "type",
            Self::Len => "len",
            Self::Range => "range",
            Self::Email => "email",
            Self::Regex => "regex",
            Self::Url => "url",
            Self::Uuid => "uuid",
            Self::OneOf => "one_of",
            Self::Custom(s) => s.as_str(),
        }
    }
}

impl Serialize for ValidationCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// A single field validation error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub field: String,
    pub code: ValidationCode,
    pub message: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, code: ValidationCode, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            code,
            message: message.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A collection of validation errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    pub items: Vec<ValidationError>,
}

impl ValidationErrors {
    /// A collection holding one error.
    pub fn single(field: impl Into<String>, code: ValidationCode, message: impl Into<String>) -> Self {
        Self {
            items: vec![ValidationError::new(field, code, message)],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn push(&mut self, err: ValidationError) {
        self.items.push(err);
    }

    pub fn extend(&mut self, other: Self) {
        self.items.extend(other.items);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.items.iter()
    }

    /// Errors reported for `field`.
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a ValidationError> {
        self.items.iter().filter(move |e| e.field == field)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.items.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", err.field, err.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Checks (and may rewrite) a payload for `table` before SQL synthesis.
///
/// The returned value is what gets normalized and written.
pub trait PayloadValidator: Send + Sync {
    fn validate(&self, table: &str, payload: Value) -> Result<Value, ValidationErrors>;
}

impl<F> PayloadValidator for F
where
    F: Fn(&str, Value) -> Result<Value, ValidationErrors> + Send + Sync,
{
    fn validate(&self, table: &str, payload: Value) -> Result<Value, ValidationErrors> {
        self(table, payload)
    }
}

/// Shared handle to a validator, as stored in instance options.
pub type SharedValidator = Arc<dyn PayloadValidator>;

type CustomCheck = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

#[derive(Clone)]
enum Rule {
    Required,
    MinLen(usize),
    MaxLen(usize),
    Range { min: Option<f64>, max: Option<f64> },
    Email,
    Url,
    Uuid,
    Pattern(&'static str),
    OneOf(Vec<String>),
    Custom { code: String, check: CustomCheck },
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Required => f.write_str("Required"),
            Rule::MinLen(n) => write!(f, "MinLen({n})"),
            Rule::MaxLen(n) => write!(f, "MaxLen({n})"),
            Rule::Range { min, max } => write!(f, "Range({min:?}, {max:?})"),
            Rule::Email => f.write_str("Email"),
            Rule::Url => f.write_str("Url"),
            Rule::Uuid => f.write_str("Uuid"),
            Rule::Pattern(p) => write!(f, "Pattern({p:?})"),
            Rule::OneOf(values) => write!(f, "OneOf({values:?})"),
            Rule::Custom { code, .. } => write!(f, "Custom({code})"),
        }
    }
}

/// Field rules for one table.
///
/// Rules other than `required` only look at present, non-null fields.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    rules: Vec<(String, Rule)>,
    partial: bool,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip `required` checks (update payloads only carry the changed columns).
    pub fn partial(mut self) -> Self {
        self.partial = true;
        self
    }

    pub fn required(self, field: &str) -> Self {
        self.rule(field, Rule::Required)
    }

    /// Minimum length in chars for text fields.
    pub fn min_len(self, field: &str, min: usize) -> Self {
        self.rule(field, Rule::MinLen(min))
    }

    /// Maximum length in chars for text fields.
    pub fn max_len(self, field: &str, max: usize) -> Self {
        self.rule(field, Rule::MaxLen(max))
    }

    /// Inclusive numeric bounds.
    pub fn range(self, field: &str, min: Option<f64>, max: Option<f64>) -> Self {
        self.rule(field, Rule::Range { min, max })
    }

    pub fn email(self, field: &str) -> Self {
        self.rule(field, Rule::Email)
    }

    pub fn url(self, field: &str) -> Self {
        self.rule(field, Rule::Url)
    }

    pub fn uuid(self, field: &str) -> Self {
        self.rule(field, Rule::Uuid)
    }

    /// Text must match `pattern`.
    ///
    /// # Panics
    /// Panics on first use if `pattern` is not a valid regex.
    pub fn pattern(self, field: &str, pattern: &'static str) -> Self {
        self.rule(field, Rule::Pattern(pattern))
    }

    pub fn one_of<I, S>(self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rule(field, Rule::OneOf(values.into_iter().map(Into::into).collect()))
    }

    /// Arbitrary check; `Err(message)` is reported under `code`.
    pub fn custom<F>(self, field: &str, code: &str, check: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.rule(
            field,
            Rule::Custom {
                code: code.to_string(),
                check: Arc::new(check),
            },
        )
    }

    fn rule(mut self, field: &str, rule: Rule) -> Self {
        self.rules.push((field.to_string(), rule));
        self
    }

    /// Check `payload` against every rule, collecting all failures.
    pub fn check(&self, payload: &Value) -> Result<(), ValidationErrors> {
        let Some(record) = payload.as_object() else {
            // Shape errors belong to the normalizer.
            return Ok(());
        };

        let mut errors = ValidationErrors::default();
        for (field, rule) in &self.rules {
            let value = record.get(field).filter(|v| !v.is_absent());
            if let Some(err) = self.check_rule(field, rule, value) {
                errors.push(err);
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    fn check_rule(&self, field: &str, rule: &Rule, value: Option<&Value>) -> Option<ValidationError> {
        if let Rule::Required = rule {
            return match value {
                None if !self.partial => Some(ValidationError::new(
                    field,
                    ValidationCode::Required,
                    "is required",
                )),
                _ => None,
            };
        }

        let value = value.filter(|v| !v.is_null())?;

        match rule {
            Rule::Required => None,
            Rule::MinLen(min) => text_of(field, value).err().or_else(|| {
                let len = value.as_str().map(|s| s.chars().count()).unwrap_or(0);
                (len < *min).then(|| {
                    ValidationError::new(
                        field,
                        ValidationCode::Len,
                        format!("must be at least {min} characters"),
                    )
                    .with_metadata("min", *min as u64)
                })
            }),
            Rule::MaxLen(max) => text_of(field, value).err().or_else(|| {
                let len = value.as_str().map(|s| s.chars().count()).unwrap_or(0);
                (len > *max).then(|| {
                    ValidationError::new(
                        field,
                        ValidationCode::Len,
                        format!("must be at most {max} characters"),
                    )
                    .with_metadata("max", *max as u64)
                })
            }),
            Rule::Range { min, max } => {
                let n = match value {
                    Value::Int(i) => *i as f64,
                    Value::Float(f) => *f,
                    _ => {
                        return Some(ValidationError::new(
                            field,
                            ValidationCode::Type,
                            "must be a number",
                        ));
                    }
                };
                let below = min.is_some_and(|m| n < m);
                let above = max.is_some_and(|m| n > m);
                (below || above).then(|| {
                    ValidationError::new(field, ValidationCode::Range, "is out of range")
                })
            }
            Rule::Email => check_text(field, value, ValidationCode::Email, "must be a valid email", is_email),
            Rule::Url => check_text(field, value, ValidationCode::Url, "must be a valid URL", is_url),
            Rule::Uuid => check_text(field, value, ValidationCode::Uuid, "must be a valid UUID", is_uuid),
            Rule::Pattern(pattern) => check_text(
                field,
                value,
                ValidationCode::Regex,
                "has an invalid format",
                |s| regex_is_match(pattern, s),
            ),
            Rule::OneOf(allowed) => check_text(
                field,
                value,
                ValidationCode::OneOf,
                "is not an allowed value",
                |s| allowed.iter().any(|a| a == s),
            ),
            Rule::Custom { code, check } => check(value)
                .err()
                .map(|message| ValidationError::new(field, ValidationCode::Custom(code.clone()), message)),
        }
    }
}

fn text_of<'a>(field: &str, value: &'a Value) -> Result<&'a str, ValidationError> {
    value
        .as_str()
        .ok_or_else(|| ValidationError::new(field, ValidationCode::Type, "must be text"))
}

fn check_text(
    field: &str,
    value: &Value,
    code: ValidationCode,
    message: &str,
    ok: impl Fn(&str) -> bool,
) -> Option<ValidationError> {
    match text_of(field, value) {
        Err(err) => Some(err),
        Ok(s) if ok(s) => None,
        Ok(_) => Some(ValidationError::new(field, code, message)),
    }
}

/// Table name → [`Schema`]. Tables without a schema pass through unchanged.
#[derive(Debug, Clone, Default)]
pub struct TableSchemas {
    tables: HashMap<String, Schema>,
}

impl TableSchemas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, table: &str, schema: Schema) -> Self {
        self.tables.insert(table.to_string(), schema);
        self
    }

    pub fn get(&self, table: &str) -> Option<&Schema> {
        self.tables.get(table)
    }

    /// Same tables with every schema marked [`Schema::partial`].
    pub fn partial(&self) -> Self {
        Self {
            tables: self
                .tables
                .iter()
                .map(|(name, schema)| (name.clone(), schema.clone().partial()))
                .collect(),
        }
    }
}

impl PayloadValidator for TableSchemas {
    fn validate(&self, table: &str, payload: Value) -> Result<Value, ValidationErrors> {
        if let Some(schema) = self.tables.get(table) {
            schema.check(&payload)?;
        }
        Ok(payload)
    }
}

/// Best-effort email validation.
///
/// This is intentionally not fully RFC-compliant. Use [`Schema::custom`] for
/// stricter rules.
pub fn is_email(s: &str) -> bool {
    static EMAIL_RE: OnceLock<regex::Regex> = OnceLock::new();
    EMAIL_RE
        .get_or_init(|| {
            regex::Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("invalid built-in email regex")
        })
        .is_match(s)
}

/// Returns `true` if `value` matches the provided regex `pattern`.
///
/// # Panics
/// Panics if `pattern` is not a valid regex. This is considered a developer
/// configuration error.
pub fn regex_is_match(pattern: &'static str, value: &str) -> bool {
    static CACHE: OnceLock<Mutex<HashMap<&'static str, regex::Regex>>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| Mutex::new(HashMap::new()));

    let regex = {
        let mut cache = cache.lock().expect("regex cache poisoned");
        if let Some(re) = cache.get(pattern) {
            re.clone()
        } else {
            let re = regex::Regex::new(pattern)
                .unwrap_or_else(|e| panic!("invalid regex pattern: {pattern:?}: {e}"));
            cache.insert(pattern, re.clone());
            re
        }
    };

    regex.is_match(value)
}

pub fn is_url(s: &str) -> bool {
    url::Url::parse(s).is_ok()
}

pub fn is_uuid(s: &str) -> bool {
    uuid::Uuid::parse_str(s).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    fn test_schemas() -> TableSchemas {
        TableSchemas::new().table(
            "test",
            Schema::new().required("data").min_len("data", 4).range("id", Some(1.0), None),
        )
    }

    #[test]
    fn passes_valid_payload_through() {
        let payload = record! { "data" => "test" };
        let out = test_schemas().validate("test", payload.clone()).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn collects_every_failure() {
        let err = test_schemas()
            .validate("test", record! { "data" => "abc", "id" => 0 })
            .unwrap_err();
        assert_eq!(err.len(), 2);
        assert_eq!(err.for_field("data").next().unwrap().code, ValidationCode::Len);
        assert_eq!(err.for_field("id").next().unwrap().code, ValidationCode::Range);
    }

    #[test]
    fn required_is_skipped_for_partial_schemas() {
        let full = test_schemas();
        assert!(full.validate("test", record! { "id" => 3 }).is_err());
        assert!(full.partial().validate("test", record! { "id" => 3 }).is_ok());
    }

    #[test]
    fn absent_counts_as_missing() {
        let err = test_schemas()
            .validate("test", record! { "data" => Value::Absent })
            .unwrap_err();
        assert_eq!(err.items[0].code, ValidationCode::Required);
    }

    #[test]
    fn unknown_table_passes() {
        assert!(test_schemas().validate("other", record! { "x" => 1 }).is_ok());
    }

    #[test]
    fn text_rules() {
        let schemas = TableSchemas::new().table(
            "users",
            Schema::new()
                .email("email")
                .url("site")
                .uuid("ref")
                .one_of("role", ["admin", "member"])
                .pattern("code", r"^[A-Z]{3}$"),
        );
        assert!(schemas
            .validate(
                "users",
                record! {
                    "email" => "a@b.co",
                    "site" => "https://example.com",
                    "ref" => "67e55044-10b1-426f-9247-bb680e5fe0c8",
                    "role" => "admin",
                    "code" => "ABC",
                },
            )
            .is_ok());

        let err = schemas
            .validate(
                "users",
                record! { "email" => "nope", "site" => "::", "ref" => "x", "role" => "root", "code" => 1 },
            )
            .unwrap_err();
        let codes: Vec<&str> = err.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(codes, vec!["email", "url", "uuid", "one_of", "type"]);
    }

    #[test]
    fn custom_rule_and_closure_validator() {
        let schema = Schema::new().custom("n", "even", |v| match v {
            Value::Int(i) if i % 2 == 0 => Ok(()),
            _ => Err("must be even".to_string()),
        });
        let err = schema.check(&record! { "n" => 3 }).unwrap_err();
        assert_eq!(err.to_string(), "n: must be even");

        let rewrite = |_: &str, payload: Value| -> Result<Value, ValidationErrors> {
            let mut record = payload.as_object().cloned().unwrap_or_default();
            record.insert("touched", true);
            Ok(Value::Object(record))
        };
        let out = rewrite.validate("t", record! { "a" => 1 }).unwrap();
        assert_eq!(out.as_object().unwrap().get("touched"), Some(&Value::Bool(true)));
    }

    #[test]
    fn email_helper() {
        assert!(is_email("a@b.co"));
        assert!(!is_email("a@b"));
        assert!(regex_is_match(r"^\d+$", "123"));
    }
}
