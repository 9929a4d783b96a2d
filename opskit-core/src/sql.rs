//! DDL rendering.
//!
//! Every function here takes validated tokens only ([`Ident`], [`ColumnDef`],
//! [`IndexDef`]); there is no path from a raw declaration string into a
//! statement.

use crate::schema::{ColumnDef, IndexDef, IndexKey, Ident, SortOrder};

/// Column definition as it appears inside `CREATE TABLE` or after
/// `ADD COLUMN`. `inline_pk` is false for composite primary keys, which are
/// rendered as a table constraint instead.
pub fn column_definition(col: &ColumnDef, inline_pk: bool) -> String {
    let mut def = format!("{} {}", col.name.quoted(), col.ty);

    if col.primary_key && inline_pk {
        def.push_str(" PRIMARY KEY");
        if col.autoincrement {
            def.push_str(" AUTOINCREMENT");
        }
    }

    // Inline PK columns are implicitly NOT NULL only for INTEGER PRIMARY KEY,
    // so NOT NULL is kept for every column that asks for it.
    if col.not_null {
        def.push_str(" NOT NULL");
    }

    if col.unique && !col.primary_key {
        def.push_str(" UNIQUE");
    }

    if let Some(default) = &col.default {
        def.push_str(&format!(" DEFAULT {}", default.to_sql()));
    }

    def
}

/// Generate the CREATE TABLE statement for a relation, with all declared
/// constraints.
pub fn create_table_sql(relation: &Ident, columns: &[ColumnDef]) -> String {
    let pk_columns: Vec<&Ident> = columns
        .iter()
        .filter(|c| c.primary_key)
        .map(|c| &c.name)
        .collect();
    let inline_pk = pk_columns.len() <= 1;

    let mut parts: Vec<String> = columns
        .iter()
        .map(|col| format!("    {}", column_definition(col, inline_pk)))
        .collect();

    if !inline_pk {
        let quoted: Vec<String> = pk_columns.iter().map(|c| c.quoted()).collect();
        parts.push(format!("    PRIMARY KEY ({})", quoted.join(", ")));
    }

    format!(
        "CREATE TABLE {} (\n{}\n);",
        relation.quoted(),
        parts.join(",\n")
    )
}

pub fn add_column_sql(relation: &Ident, col: &ColumnDef) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {};",
        relation.quoted(),
        column_definition(col, true)
    )
}

/// Returns the SQL fragment for one index key.
pub fn index_key_sql(key: &IndexKey) -> String {
    match key {
        IndexKey::Column { name, order } => match order {
            SortOrder::Asc => name.quoted(),
            SortOrder::Desc => format!("{} DESC", name.quoted()),
        },
        IndexKey::Function { func, column } => format!("{}({})", func.as_sql(), column.quoted()),
    }
}

pub fn create_index_sql(relation: &Ident, idx: &IndexDef) -> String {
    let unique = if idx.unique { "UNIQUE " } else { "" };
    let keys: Vec<String> = idx.keys.iter().map(index_key_sql).collect();
    format!(
        "CREATE {}INDEX {} ON {} ({});",
        unique,
        idx.name.quoted(),
        relation.quoted(),
        keys.join(", ")
    )
}
