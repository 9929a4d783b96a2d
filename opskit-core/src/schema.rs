//! Relation declarations.
//!
//! A [`RelationSchema`] and its [`IndexSpec`]s are what callers hand to the
//! reconciler. They hold plain strings (names, type tags, index keys) so they
//! can be written inline or deserialized from a TOML manifest. Nothing is
//! rendered into SQL from them directly: [`validate_relation`] and
//! [`validate_indexes`] first turn them into [`ColumnDef`]s and [`IndexDef`]s
//! built only from checked tokens.
//!
//! ## Example
//!
//! ```
//! use opskit_core::{ColumnSpec, IndexSpec, RelationSchema};
//!
//! let ops_log = RelationSchema::new("ops_log")
//!     .column(ColumnSpec::integer("id").primary_key().autoincrement())
//!     .column(ColumnSpec::text("ts_utc").not_null().default_expr("CURRENT_TIMESTAMP"))
//!     .column(ColumnSpec::text("status").not_null().default_literal("'ok'"));
//!
//! let by_day = IndexSpec::new("idx_ops_log_day", ["date(ts_utc)", "status"]);
//! # let _ = (ops_log, by_day);
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ReconcileError;
use crate::Result;

/// Longest identifier accepted for relations, columns and indexes.
pub const MAX_IDENT_LEN: usize = 64;

static IDENT_REGEX: OnceLock<Regex> = OnceLock::new();
static LITERAL_REGEX: OnceLock<Regex> = OnceLock::new();
static KEY_COLUMN_REGEX: OnceLock<Regex> = OnceLock::new();
static KEY_FUNCTION_REGEX: OnceLock<Regex> = OnceLock::new();

// ════════════════════════════════════════════════════════════════════
// Declarations
// ════════════════════════════════════════════════════════════════════

/// Desired shape of one relation: its name and ordered columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationSchema {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
}

impl RelationSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// Declared name, type, default and nullability for one column.
///
/// `primary_key`, `autoincrement` and `unique` only take effect when the
/// relation is created from scratch; SQLite cannot add such columns later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    /// One of `TEXT`, `INTEGER`, `REAL`, `BLOB` (case-insensitive).
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(default)]
    pub default: Option<DefaultValue>,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub autoincrement: bool,
    #[serde(default)]
    pub unique: bool,
}

fn default_nullable() -> bool {
    true
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, type_tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_tag: type_tag.into(),
            default: None,
            nullable: true,
            primary_key: false,
            autoincrement: false,
            unique: false,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, "TEXT")
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, "INTEGER")
    }

    pub fn real(name: impl Into<String>) -> Self {
        Self::new(name, "REAL")
    }

    pub fn blob(name: impl Into<String>) -> Self {
        Self::new(name, "BLOB")
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn autoincrement(mut self) -> Self {
        self.autoincrement = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Constant default, rendered exactly as given (`0`, `'normal'`, `-10.0`).
    pub fn default_literal(mut self, value: impl Into<String>) -> Self {
        self.default = Some(DefaultValue::Literal(value.into()));
        self
    }

    /// Engine-evaluated default, rendered inside parentheses.
    pub fn default_expr(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(DefaultValue::Expression(expr.into()));
        self
    }
}

/// A column default.
///
/// The two forms are never converted into each other: a literal is frozen
/// into existing rows when a column is added, an expression is evaluated by
/// SQLite on every insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultValue {
    Literal(String),
    Expression(String),
}

impl DefaultValue {
    pub fn to_sql(&self) -> String {
        match self {
            DefaultValue::Literal(value) => value.clone(),
            DefaultValue::Expression(expr) => format!("({})", expr),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DefaultValue::Literal(v) if v.eq_ignore_ascii_case("null"))
    }

    pub fn is_expression(&self) -> bool {
        matches!(self, DefaultValue::Expression(_))
    }

    fn check(&self) -> std::result::Result<(), &'static str> {
        match self {
            DefaultValue::Literal(value) => {
                let re = LITERAL_REGEX.get_or_init(|| {
                    Regex::new(
                        r"^(?:[+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?|'(?:[^']|'')*'|[xX]'(?:[0-9A-Fa-f]{2})*'|(?i:null|true|false))$",
                    )
                    .expect("Invalid literal regex")
                });
                if re.is_match(value) {
                    Ok(())
                } else {
                    Err("not a numeric, string, blob, NULL or boolean literal")
                }
            }
            DefaultValue::Expression(expr) => check_expression(expr),
        }
    }
}

/// Expressions stay opaque, but must be one balanced expression with no
/// statement separators or comments outside quoted text. All of SQLite's
/// quoting forms are tracked: `'string'`, `"ident"`, `` `ident` `` and
/// `[ident]`.
fn check_expression(expr: &str) -> std::result::Result<(), &'static str> {
    if expr.trim().is_empty() {
        return Err("empty expression");
    }

    let mut depth: i32 = 0;
    // Closing character of the quoted run we are inside, if any.
    let mut closing: Option<char> = None;
    let mut prev = '\0';

    for c in expr.chars() {
        if let Some(close) = closing {
            if c == close {
                closing = None;
            }
            // A doubled quote reopens on the next character; `prev` must
            // not pair the closing quote with what follows.
            prev = '\0';
            continue;
        }
        match c {
            '\'' | '"' | '`' => closing = Some(c),
            '[' => closing = Some(']'),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err("unbalanced parentheses");
                }
            }
            ';' => return Err("statement separator in expression"),
            '-' if prev == '-' => return Err("comment in expression"),
            '*' if prev == '/' => return Err("comment in expression"),
            _ => {}
        }
        prev = c;
    }

    if closing.is_some() {
        return Err("unterminated quoted text");
    }
    if depth != 0 {
        return Err("unbalanced parentheses");
    }
    Ok(())
}

/// Declared index: name, ordered key expressions, uniqueness.
///
/// Keys are either a column name with an optional `ASC`/`DESC`, or one of
/// the whitelisted functions applied to a column: `date(col)`, `lower(col)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub keys: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

impl IndexSpec {
    pub fn new<K: Into<String>>(name: impl Into<String>, keys: impl IntoIterator<Item = K>) -> Self {
        Self {
            name: name.into(),
            keys: keys.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    pub fn unique<K: Into<String>>(
        name: impl Into<String>,
        keys: impl IntoIterator<Item = K>,
    ) -> Self {
        Self {
            unique: true,
            ..Self::new(name, keys)
        }
    }
}

/// A relation together with the indexes declared on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationManifest {
    #[serde(flatten)]
    pub schema: RelationSchema,
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
}

impl RelationManifest {
    pub fn new(schema: RelationSchema, indexes: Vec<IndexSpec>) -> Self {
        Self { schema, indexes }
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }
}

// ════════════════════════════════════════════════════════════════════
// Validated tokens
// ════════════════════════════════════════════════════════════════════

/// A checked SQL identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Ident(String);

impl Ident {
    /// `kind` names what the identifier is for in error messages.
    pub fn parse(kind: &'static str, value: &str) -> Result<Self> {
        let re = IDENT_REGEX.get_or_init(|| {
            Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid identifier regex")
        });
        let reserved = value
            .get(..7)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("sqlite_"));

        if value.len() > MAX_IDENT_LEN || reserved || !re.is_match(value) {
            return Err(ReconcileError::InvalidIdentifier {
                kind,
                value: value.to_string(),
            });
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }

    /// SQLite compares identifiers ASCII-case-insensitively.
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    Text,
    Integer,
    Real,
    Blob,
}

impl ColumnType {
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim();
        [Self::Text, Self::Integer, Self::Real, Self::Blob]
            .into_iter()
            .find(|t| t.as_sql().eq_ignore_ascii_case(tag))
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Blob => "BLOB",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A validated column, safe to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDef {
    pub name: Ident,
    #[serde(rename = "type")]
    pub ty: ColumnType,
    pub default: Option<DefaultValue>,
    pub not_null: bool,
    pub primary_key: bool,
    pub autoincrement: bool,
    pub unique: bool,
}

impl ColumnDef {
    /// Why `ALTER TABLE ADD COLUMN` would reject this column, if it would.
    pub fn unaddable_reason(&self) -> Option<&'static str> {
        if self.primary_key {
            return Some("a PRIMARY KEY column can only be declared when the relation is created");
        }
        if self.unique {
            return Some("a UNIQUE column can only be declared when the relation is created; declare a unique index instead");
        }
        match &self.default {
            Some(d) if d.is_expression() => {
                Some("SQLite only accepts constant defaults on added columns")
            }
            Some(d) if self.not_null && d.is_null() => {
                Some("a NOT NULL column needs a non-NULL default to be added")
            }
            None if self.not_null => Some("a NOT NULL column needs a non-NULL default to be added"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyFunction {
    Date,
    Lower,
}

impl KeyFunction {
    fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("date") {
            Some(KeyFunction::Date)
        } else if name.eq_ignore_ascii_case("lower") {
            Some(KeyFunction::Lower)
        } else {
            None
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            KeyFunction::Date => "date",
            KeyFunction::Lower => "lower",
        }
    }
}

/// One validated index key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKey {
    Column { name: Ident, order: SortOrder },
    Function { func: KeyFunction, column: Ident },
}

impl IndexKey {
    pub fn parse(index: &str, raw: &str) -> Result<Self> {
        let column_re = KEY_COLUMN_REGEX.get_or_init(|| {
            Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)(?:\s+(?i:(asc|desc)))?\s*$")
                .expect("Invalid index key regex")
        });
        let function_re = KEY_FUNCTION_REGEX.get_or_init(|| {
            Regex::new(r"^\s*([A-Za-z_]+)\s*\(\s*([A-Za-z_][A-Za-z0-9_]*)\s*\)\s*$")
                .expect("Invalid index function regex")
        });

        if let Some(caps) = column_re.captures(raw) {
            let name = Ident::parse("index key column", &caps[1])?;
            let order = match caps.get(2) {
                Some(m) if m.as_str().eq_ignore_ascii_case("desc") => SortOrder::Desc,
                _ => SortOrder::Asc,
            };
            return Ok(IndexKey::Column { name, order });
        }

        if let Some(caps) = function_re.captures(raw) {
            if let Some(func) = KeyFunction::from_name(&caps[1]) {
                let column = Ident::parse("index key column", &caps[2])?;
                return Ok(IndexKey::Function { func, column });
            }
        }

        Err(ReconcileError::InvalidIdentifier {
            kind: "index key",
            value: format!("{} in index {}", raw.trim(), index),
        })
    }

    /// The relation column this key reads.
    pub fn column(&self) -> &Ident {
        match self {
            IndexKey::Column { name, .. } => name,
            IndexKey::Function { column, .. } => column,
        }
    }

    /// `true` for plain column keys, which SQLite reports by name when the
    /// index is introspected; expression keys come back without a name.
    pub fn is_plain_column(&self) -> bool {
        matches!(self, IndexKey::Column { .. })
    }
}

/// A validated index, safe to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexDef {
    pub name: Ident,
    pub keys: Vec<IndexKey>,
    pub unique: bool,
}

/// A validated relation declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRelation {
    pub name: Ident,
    pub columns: Vec<ColumnDef>,
}

impl ValidatedRelation {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name.matches(name))
    }
}

// ════════════════════════════════════════════════════════════════════
// Validation
// ════════════════════════════════════════════════════════════════════

/// Check every token of a relation declaration.
pub fn validate_relation(desired: &RelationSchema) -> Result<ValidatedRelation> {
    let name = Ident::parse("relation name", &desired.name)?;
    if desired.columns.is_empty() {
        return Err(ReconcileError::EmptyRelation(desired.name.clone()));
    }

    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(desired.columns.len());

    for spec in &desired.columns {
        let column = Ident::parse("column name", &spec.name)?;
        if !seen.insert(spec.name.to_ascii_lowercase()) {
            return Err(ReconcileError::DuplicateColumn {
                relation: desired.name.clone(),
                column: spec.name.clone(),
            });
        }

        let ty = ColumnType::from_tag(&spec.type_tag).ok_or_else(|| {
            ReconcileError::UnsupportedColumnType {
                relation: desired.name.clone(),
                column: spec.name.clone(),
                tag: spec.type_tag.clone(),
            }
        })?;

        if let Some(default) = &spec.default {
            default.check().map_err(|reason| ReconcileError::InvalidDefault {
                relation: desired.name.clone(),
                column: spec.name.clone(),
                value: match default {
                    DefaultValue::Literal(v) | DefaultValue::Expression(v) => v.clone(),
                },
                reason,
            })?;
        }

        columns.push(ColumnDef {
            name: column,
            ty,
            default: spec.default.clone(),
            not_null: !spec.nullable,
            primary_key: spec.primary_key,
            autoincrement: spec.autoincrement,
            unique: spec.unique,
        });
    }

    let pk_count = columns.iter().filter(|c| c.primary_key).count();
    for col in columns.iter().filter(|c| c.autoincrement) {
        if !col.primary_key || col.ty != ColumnType::Integer || pk_count != 1 {
            return Err(ReconcileError::InvalidConstraint {
                relation: desired.name.clone(),
                reason: format!(
                    "AUTOINCREMENT on `{}` requires it to be the only INTEGER PRIMARY KEY column",
                    col.name
                ),
            });
        }
    }

    Ok(ValidatedRelation { name, columns })
}

/// Check every index declared on `relation`. `known_column` decides whether
/// a key may reference a column (declared, or already present live).
pub fn validate_indexes(
    relation: &Ident,
    indexes: &[IndexSpec],
    known_column: impl Fn(&str) -> bool,
) -> Result<Vec<IndexDef>> {
    let mut seen = HashSet::new();
    let mut defs = Vec::with_capacity(indexes.len());

    for spec in indexes {
        let name = Ident::parse("index name", &spec.name)?;
        if !seen.insert(spec.name.to_ascii_lowercase()) {
            return Err(ReconcileError::DuplicateIndex {
                relation: relation.to_string(),
                index: spec.name.clone(),
            });
        }
        if spec.keys.is_empty() {
            return Err(ReconcileError::InvalidConstraint {
                relation: relation.to_string(),
                reason: format!("index `{}` has no keys", spec.name),
            });
        }

        let keys = spec
            .keys
            .iter()
            .map(|raw| IndexKey::parse(&spec.name, raw))
            .collect::<Result<Vec<_>>>()?;

        if let Some(key) = keys.iter().find(|k| !known_column(k.column().as_str())) {
            return Err(ReconcileError::UnknownIndexColumn {
                relation: relation.to_string(),
                index: spec.name.clone(),
                column: key.column().to_string(),
            });
        }

        defs.push(IndexDef {
            name,
            keys,
            unique: spec.unique,
        });
    }

    Ok(defs)
}
