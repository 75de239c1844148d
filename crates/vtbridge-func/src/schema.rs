//! Table construction arguments and schema declaration helpers.

use vtbridge_error::{BridgeError, Result};

/// The arguments of one `CREATE VIRTUAL TABLE` (or reconnect).
///
/// `CREATE VIRTUAL TABLE main.t USING m(a, b=1)` arrives as
/// `["m", "main", "t", "a", "b=1"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableArgs {
    pub module_name: String,
    pub database_name: String,
    pub table_name: String,
    pub arguments: Vec<String>,
}

impl TableArgs {
    /// Split the engine's argument vector.
    pub fn from_argv<S: AsRef<str>>(argv: &[S]) -> Result<Self> {
        let [module, database, table, rest @ ..] = argv else {
            return Err(BridgeError::protocol(format!(
                "virtual table constructor received {} arguments, expected at least 3",
                argv.len()
            )));
        };
        Ok(Self {
            module_name: module.as_ref().to_owned(),
            database_name: database.as_ref().to_owned(),
            table_name: table.as_ref().to_owned(),
            arguments: rest.iter().map(|a| a.as_ref().to_owned()).collect(),
        })
    }

    /// Module argument `index`, trimmed.
    pub fn argument(&self, index: usize) -> Option<&str> {
        self.arguments.get(index).map(|a| a.trim())
    }

    /// Value of a `key=value` module argument, dequoted.
    ///
    /// Keys compare case-insensitively; the first match wins.
    pub fn parameter(&self, key: &str) -> Option<String> {
        self.arguments.iter().find_map(|arg| {
            let (k, v) = arg.split_once('=')?;
            k.trim()
                .eq_ignore_ascii_case(key)
                .then(|| dequote(v.trim()))
        })
    }
}

/// Strip one layer of SQL quoting: `'..'`, `".."`, `` `..` `` or `[..]`.
/// Doubled quote characters inside the quoted text collapse to one.
pub fn dequote(text: &str) -> String {
    let bytes = text.as_bytes();
    if bytes.len() < 2 {
        return text.to_owned();
    }
    let (open, close) = (bytes[0], bytes[bytes.len() - 1]);
    let matched = matches!(
        (open, close),
        (b'\'', b'\'') | (b'"', b'"') | (b'`', b'`') | (b'[', b']')
    );
    if !matched {
        return text.to_owned();
    }
    let inner = &text[1..text.len() - 1];
    if open == b'[' {
        return inner.to_owned();
    }
    let quote = char::from(open);
    inner.replace(&format!("{quote}{quote}"), &quote.to_string())
}

/// One column of a declared schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    /// Declared type, e.g. `INTEGER`. Empty means no type.
    pub declared_type: String,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
        }
    }
}

fn bracket(kind: &str, name: &str) -> Result<String> {
    if name.trim().is_empty() {
        return Err(BridgeError::invalid_schema(format!("{kind} name is empty")));
    }
    if name.contains(']') {
        return Err(BridgeError::invalid_schema(format!(
            "{kind} name {name:?} contains ']'"
        )));
    }
    Ok(format!("[{name}]"))
}

/// Build the `CREATE TABLE` statement a table declares to the engine.
///
/// Column order is the ordinal order the cursor's column reads must use.
pub fn create_table_statement(table_name: &str, columns: &[ColumnDef]) -> Result<String> {
    if columns.is_empty() {
        return Err(BridgeError::invalid_schema(format!(
            "table {table_name:?} declares no columns"
        )));
    }
    let mut sql = format!("CREATE TABLE {}(", bracket("table", table_name)?);
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str(&bracket("column", &column.name)?);
        let ty = column.declared_type.trim();
        if !ty.is_empty() {
            sql.push(' ');
            sql.push_str(ty);
        }
    }
    sql.push(')');
    Ok(sql)
}
