// opskit-core/src/introspect.rs

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::error::ReconcileError;
use crate::schema::Ident;
use crate::Result;

// ════════════════════════════════════════════════════════════════════
// Data types
// ════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObservedColumn {
    pub name: String,
    /// Declared type as SQLite stored it; may be empty or outside the
    /// supported tags for relations created elsewhere.
    pub declared_type: String,
    pub not_null: bool,
    pub default: Option<String>,
    /// 1-based position in the primary key, 0 if not part of it.
    pub pk: i64,
}

/// One key of a live index, in key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObservedKey {
    /// Column name; `None` for expression keys.
    pub column: Option<String>,
    pub descending: bool,
    /// Expression text for expression keys, normalized with
    /// [`normalize_key`]. `None` for plain columns or when the index has no
    /// stored SQL to read it from.
    pub expression: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObservedIndex {
    pub name: String,
    pub unique: bool,
    pub keys: Vec<ObservedKey>,
    /// `c` for CREATE INDEX, `u` for a UNIQUE constraint, `pk` for the
    /// primary key.
    pub origin: String,
    /// The CREATE INDEX statement, absent for constraint-backed indexes.
    pub sql: Option<String>,
}

impl ObservedIndex {
    /// Key column names in key order; `None` for expression keys.
    pub fn columns(&self) -> Vec<Option<&str>> {
        self.keys.iter().map(|k| k.column.as_deref()).collect()
    }
}

/// An index name in use somewhere in the database. Index names share one
/// namespace across all relations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexOwner {
    pub name: String,
    pub relation: String,
}

/// Live shape of one relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObservedSchema {
    pub name: String,
    pub columns: Vec<ObservedColumn>,
    pub indexes: Vec<ObservedIndex>,
    /// Indexes that belong to other relations.
    pub foreign_indexes: Vec<IndexOwner>,
}

impl ObservedSchema {
    pub fn column(&self, name: &str) -> Option<&ObservedColumn> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn index(&self, name: &str) -> Option<&ObservedIndex> {
        self.indexes.iter().find(|i| i.name.eq_ignore_ascii_case(name))
    }

    /// The other relation already using index name `name`, if any.
    pub fn foreign_index(&self, name: &str) -> Option<&IndexOwner> {
        self.foreign_indexes
            .iter()
            .find(|o| o.name.eq_ignore_ascii_case(name))
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

// ════════════════════════════════════════════════════════════════════
// Introspection
// ════════════════════════════════════════════════════════════════════

/// Read the live columns and indexes of relation `name`.
///
/// All lookups go through the `pragma_*` table-valued functions with bound
/// parameters, so the relation name is never spliced into SQL.
pub fn describe_relation(conn: &Connection, name: &str) -> Result<ObservedSchema> {
    let ident = Ident::parse("relation name", name)?;

    let stored_name: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
            params![ident.as_str()],
            |row| row.get(0),
        )
        .optional()?;

    let Some(stored_name) = stored_name else {
        return Err(ReconcileError::RelationNotFound(name.to_string()));
    };

    let columns = read_columns(conn, &stored_name)?;
    let indexes = read_indexes(conn, &stored_name)?;
    let foreign_indexes = index_owners(conn)?
        .into_iter()
        .filter(|o| !o.relation.eq_ignore_ascii_case(&stored_name))
        .collect();

    Ok(ObservedSchema {
        name: stored_name,
        columns,
        indexes,
        foreign_indexes,
    })
}

/// `true` if a table named `name` exists (case-insensitive).
pub fn relation_exists(conn: &Connection, name: &str) -> Result<bool> {
    match describe_relation(conn, name) {
        Ok(_) => Ok(true),
        Err(ReconcileError::RelationNotFound(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Every index in the database with the relation it belongs to.
pub fn index_owners(conn: &Connection) -> Result<Vec<IndexOwner>> {
    let mut stmt = conn.prepare(
        "SELECT name, tbl_name FROM sqlite_master WHERE type = 'index' ORDER BY name",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(IndexOwner {
            name: row.get(0)?,
            relation: row.get(1)?,
        })
    })?;

    let mut owners = Vec::new();
    for row in rows {
        owners.push(row?);
    }
    Ok(owners)
}

fn read_columns(conn: &Connection, table: &str) -> Result<Vec<ObservedColumn>> {
    let mut stmt = conn.prepare(
        "SELECT name, type, \"notnull\", dflt_value, pk
         FROM pragma_table_info(?1)
         ORDER BY cid",
    )?;
    let rows = stmt.query_map(params![table], |row| {
        Ok(ObservedColumn {
            name: row.get(0)?,
            declared_type: row.get(1)?,
            not_null: row.get::<_, i64>(2)? != 0,
            default: row.get(3)?,
            pk: row.get(4)?,
        })
    })?;

    let mut columns = Vec::new();
    for row in rows {
        columns.push(row?);
    }
    Ok(columns)
}

fn read_indexes(conn: &Connection, table: &str) -> Result<Vec<ObservedIndex>> {
    let mut stmt = conn.prepare(
        "SELECT il.name, il.\"unique\", il.origin, m.sql
         FROM pragma_index_list(?1) AS il
         LEFT JOIN sqlite_master AS m ON m.type = 'index' AND m.name = il.name
         ORDER BY il.name",
    )?;
    let rows = stmt.query_map(params![table], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)? != 0,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
        ))
    })?;

    let mut headers = Vec::new();
    for row in rows {
        headers.push(row?);
    }

    // xinfo also lists the rowid and other auxiliary columns; key = 1 keeps
    // only the index keys.
    let mut key_stmt = conn.prepare(
        "SELECT name, \"desc\" FROM pragma_index_xinfo(?1) WHERE key = 1 ORDER BY seqno",
    )?;

    let mut indexes = Vec::with_capacity(headers.len());
    for (name, unique, origin, sql) in headers {
        let rows = key_stmt.query_map(params![name], |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, i64>(1)? != 0,
            ))
        })?;
        let mut live = Vec::new();
        for row in rows {
            live.push(row?);
        }

        let texts = sql
            .as_deref()
            .map(key_texts)
            .filter(|texts| texts.len() == live.len());
        let keys = live
            .into_iter()
            .enumerate()
            .map(|(i, (column, descending))| {
                let expression = match (&column, &texts) {
                    (None, Some(texts)) => Some(strip_sort_order(&texts[i]).to_string()),
                    _ => None,
                };
                ObservedKey {
                    column,
                    descending,
                    expression,
                }
            })
            .collect();

        indexes.push(ObservedIndex {
            name,
            unique,
            keys,
            origin,
            sql,
        });
    }
    Ok(indexes)
}

// ════════════════════════════════════════════════════════════════════
// Key text
// ════════════════════════════════════════════════════════════════════

/// Canonical form of an index key for comparison: lowercase, without
/// whitespace or identifier quoting. `date("ts")`, `DATE( ts )` and
/// `date([ts])` all become `date(ts)`.
pub fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '"' | '`' | '[' | ']'))
        .flat_map(char::to_lowercase)
        .collect()
}

fn strip_sort_order(key: &str) -> &str {
    key.strip_suffix("desc")
        .or_else(|| key.strip_suffix("asc"))
        .unwrap_or(key)
}

/// Split the key list of a CREATE INDEX statement into normalized keys.
///
/// The list is the parenthesized group after `ON <table>`, which is the
/// first `(` in the statement outside quotes. Commas split keys only at
/// the top nesting level.
fn key_texts(sql: &str) -> Vec<String> {
    let mut keys = Vec::new();
    let mut current = String::new();
    let mut depth = 0;
    let mut quote: Option<char> = None;

    for c in sql.chars() {
        if let Some(close) = quote {
            if depth > 0 {
                current.push(c);
            }
            if c == close {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '[' => quote = Some(']'),
            '(' => {
                depth += 1;
                if depth == 1 {
                    continue;
                }
            }
            ')' => {
                depth -= 1;
                if depth == 0 {
                    keys.push(normalize_key(&current));
                    return keys;
                }
            }
            ',' if depth == 1 => {
                keys.push(normalize_key(&current));
                current.clear();
                continue;
            }
            _ => {}
        }
        if depth > 0 {
            current.push(c);
        }
    }
    Vec::new()
}
