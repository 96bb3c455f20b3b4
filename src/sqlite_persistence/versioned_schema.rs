use anyhow::{bail, Result};
use rusqlite::{params, types::Type, Connection};

pub const BASE_DB_VERSION: usize = 4200;

#[macro_export]
macro_rules! sqlite_column {
    ($name:expr, $sql_type:expr $(, $field:ident = $value:expr)*) => {
        {
            // Only mutated when optional field assignments are passed
            #[allow(unused_mut)]
            let mut column = Column {
                name: $name,
                sql_type: $sql_type,
                is_primary_key: false,
                is_autoincrement: false,
                non_null: false,
                default_value: None,
            };
            $(
                column.$field = $value;
            )*
            column
        }
    };
}

#[derive(Debug, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
    Real,
    DateTime,
}

impl SqlType {
    fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::DateTime => "DATETIME",
        }
    }

    fn from_sql(s: &str) -> Option<&'static SqlType> {
        match s.to_ascii_uppercase().as_str() {
            "TEXT" => Some(&SqlType::Text),
            "INTEGER" => Some(&SqlType::Integer),
            "REAL" => Some(&SqlType::Real),
            "DATETIME" => Some(&SqlType::DateTime),
            _ => None,
        }
    }
}

pub struct Column<'a, S: AsRef<str>> {
    pub name: S,
    pub sql_type: &'a SqlType,
    pub is_primary_key: bool,
    pub is_autoincrement: bool,
    pub non_null: bool,
    pub default_value: Option<S>,
}

pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column<'static, &'static str>],
    pub indices: &'static [(&'static str, &'static str)],
}

impl Table {
    /// Creates the table and its indices unless they already exist.
    pub fn create(&self, conn: &Connection) -> Result<()> {
        let mut create_sql = format!("CREATE TABLE IF NOT EXISTS {} (", self.name);
        for (column_index, column) in self.columns.iter().enumerate() {
            if column_index > 0 {
                create_sql.push_str(", ");
            }
            create_sql.push_str(&format!("{} {}", column.name, column.sql_type.as_sql()));
            if column.is_primary_key {
                create_sql.push_str(" PRIMARY KEY");
                if column.is_autoincrement {
                    create_sql.push_str(" AUTOINCREMENT");
                }
            }
            if column.non_null {
                create_sql.push_str(" NOT NULL");
            }
            if let Some(default_value) = column.default_value {
                create_sql.push_str(&format!(" DEFAULT {}", default_value));
            }
        }
        create_sql.push_str(");");
        conn.execute(&create_sql, params![])?;

        for (index_name, columns) in self.indices {
            conn.execute(
                &format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {}({});",
                    index_name, self.name, columns
                ),
                params![],
            )?;
        }
        Ok(())
    }
}

pub struct VersionedSchema {
    pub version: usize,
    pub tables: &'static [Table],
}

/// SQLite may report defaults wrapped in parentheses
fn normalize_default<S: AsRef<str>>(value: S) -> String {
    let value = value.as_ref();
    value
        .strip_prefix('(')
        .and_then(|v| v.strip_suffix(')'))
        .unwrap_or(value)
        .to_string()
}

/// Reads the on-disk layout of `table_name` through `PRAGMA table_info`.
fn read_columns(conn: &Connection, table_name: &str) -> Result<Vec<Column<'static, String>>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", table_name))?;
    let columns = stmt
        .query_map(params![], |row| {
            let name = row.get::<_, String>(1)?;
            let declared_type = row.get::<_, String>(2)?;
            let sql_type = SqlType::from_sql(&declared_type)
                .ok_or_else(|| rusqlite::Error::InvalidColumnType(2, name.clone(), Type::Text))?;

            Ok(Column {
                name,
                sql_type,
                non_null: row.get::<_, i32>(3)? == 1,
                default_value: row.get::<_, Option<String>>(4)?,
                is_primary_key: row.get::<_, i32>(5)? == 1,
                // Not reported by table_info
                is_autoincrement: false,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

/// Describes how `actual` differs from `expected`, if it does.
fn column_mismatch(actual: &Column<'_, String>, expected: &Column<'_, &str>) -> Option<String> {
    if actual.name != expected.name {
        return Some(format!("expected column {}, got {}", expected.name, actual.name));
    }
    let mismatch = if actual.sql_type != expected.sql_type {
        format!(
            "type mismatch: expected {:?}, got {:?}",
            expected.sql_type, actual.sql_type
        )
    } else if actual.non_null != expected.non_null {
        format!(
            "non-null mismatch: expected {}, got {}",
            expected.non_null, actual.non_null
        )
    } else if actual.default_value.as_ref().map(normalize_default)
        != expected.default_value.map(normalize_default)
    {
        format!(
            "default value mismatch: expected {:?}, got {:?}",
            expected.default_value, actual.default_value
        )
    } else if actual.is_primary_key != expected.is_primary_key {
        format!(
            "primary key mismatch: expected {}, got {}",
            expected.is_primary_key, actual.is_primary_key
        )
    } else {
        return None;
    };
    Some(format!("column {} {}", expected.name, mismatch))
}

fn index_exists(conn: &Connection, table_name: &str, index_name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?1 AND tbl_name = ?2",
        params![index_name, table_name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

impl VersionedSchema {
    pub fn db_version(&self) -> usize {
        BASE_DB_VERSION + self.version
    }

    /// Creates every missing table and index, then stamps `user_version`.
    /// Running it against an up-to-date database changes nothing.
    pub fn create(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.create(conn)?;
        }
        conn.pragma_update(None, "user_version", self.db_version())?;
        Ok(())
    }

    /// Checks that every table matches its definition column by column and
    /// that all declared indices exist.
    pub fn validate(&self, conn: &Connection) -> Result<()> {
        self.validate_columns(conn)?;
        for table in self.tables {
            for (index_name, _columns) in table.indices {
                if !index_exists(conn, table.name, index_name)? {
                    bail!("Table {} is missing index '{}'", table.name, index_name);
                }
            }
        }
        Ok(())
    }

    /// Checks column layouts only. Indices are ignored, so this also
    /// accepts tables created before their indices were declared.
    pub fn validate_columns(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            let actual_columns = read_columns(conn, table.name)?;
            if actual_columns.is_empty() {
                bail!("Table {} does not exist", table.name);
            }

            if actual_columns.len() != table.columns.len() {
                let found: Vec<&str> = actual_columns.iter().map(|c| c.name.as_str()).collect();
                let expected: Vec<&str> = table.columns.iter().map(|c| c.name).collect();
                bail!(
                    "Table {} has {} columns, expected {}. Found: [{}], expected: [{}]",
                    table.name,
                    found.len(),
                    expected.len(),
                    found.join(", "),
                    expected.join(", ")
                );
            }

            if let Some(mismatch) = actual_columns
                .iter()
                .zip(table.columns.iter())
                .find_map(|(actual, expected)| column_mismatch(actual, expected))
            {
                bail!("Table {}: {}", table.name, mismatch);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_TABLE: Table = Table {
        name: "test_table",
        columns: &[
            Column {
                name: "id",
                sql_type: &SqlType::Integer,
                is_primary_key: true,
                is_autoincrement: true,
                non_null: false,
                default_value: None,
            },
            Column {
                name: "name",
                sql_type: &SqlType::Text,
                is_primary_key: false,
                is_autoincrement: false,
                non_null: true,
                default_value: None,
            },
            Column {
                name: "created",
                sql_type: &SqlType::Text,
                is_primary_key: false,
                is_autoincrement: false,
                non_null: true,
                default_value: Some("CURRENT_TIMESTAMP"),
            },
        ],
        indices: &[("idx_test_name", "name")],
    };

    const TEST_SCHEMA: VersionedSchema = VersionedSchema {
        version: 1,
        tables: &[TEST_TABLE],
    };

    #[test]
    fn create_then_validate() {
        let conn = Connection::open_in_memory().unwrap();
        TEST_SCHEMA.create(&conn).unwrap();
        TEST_SCHEMA.validate(&conn).unwrap();

        let version: usize = conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, BASE_DB_VERSION + 1);
    }

    #[test]
    fn create_is_idempotent_and_keeps_rows() {
        let conn = Connection::open_in_memory().unwrap();
        TEST_SCHEMA.create(&conn).unwrap();
        conn.execute("INSERT INTO test_table (name) VALUES ('a')", [])
            .unwrap();

        TEST_SCHEMA.create(&conn).unwrap();
        TEST_SCHEMA.validate(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM test_table", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn validate_detects_missing_table() {
        let conn = Connection::open_in_memory().unwrap();
        let err = TEST_SCHEMA.validate(&conn).unwrap_err().to_string();
        assert!(err.contains("does not exist"));
    }

    #[test]
    fn validate_detects_missing_index() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE test_table (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, created TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP)",
            [],
        )
        .unwrap();

        let err = TEST_SCHEMA.validate(&conn).unwrap_err().to_string();
        assert!(err.contains("missing index"));
        assert!(err.contains("idx_test_name"));
    }

    #[test]
    fn validate_detects_column_type_mismatch() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE test_table (id INTEGER PRIMARY KEY AUTOINCREMENT, name REAL NOT NULL, created TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP)",
            [],
        )
        .unwrap();

        let err = TEST_SCHEMA.validate(&conn).unwrap_err().to_string();
        assert!(err.contains("type mismatch"));
    }

    #[test]
    fn validate_detects_default_mismatch() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE test_table (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, created TEXT NOT NULL DEFAULT '1970-01-01')",
            [],
        )
        .unwrap();
        conn.execute("CREATE INDEX idx_test_name ON test_table(name)", [])
            .unwrap();

        let err = TEST_SCHEMA.validate(&conn).unwrap_err().to_string();
        assert!(err.contains("default value mismatch"));
    }

    #[test]
    fn validate_detects_extra_columns() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE test_table (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, created TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP, extra TEXT)",
            [],
        )
        .unwrap();

        let err = TEST_SCHEMA.validate(&conn).unwrap_err().to_string();
        assert!(err.contains("has 4 columns, expected 3"));
    }

    #[test]
    fn validate_columns_ignores_missing_indices() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE test_table (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, created TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP)",
            [],
        )
        .unwrap();

        TEST_SCHEMA.validate_columns(&conn).unwrap();
        assert!(TEST_SCHEMA.validate(&conn).is_err());
    }

    #[test]
    fn reads_datetime_columns_case_insensitively() {
        assert_eq!(SqlType::from_sql("DATETIME"), Some(&SqlType::DateTime));
        assert_eq!(SqlType::from_sql("datetime"), Some(&SqlType::DateTime));
        assert_eq!(SqlType::from_sql("Text"), Some(&SqlType::Text));
        assert_eq!(SqlType::from_sql("BLOB"), None);
    }
}
