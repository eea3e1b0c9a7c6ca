//! Ordered, reversible schema migrations for the `users` table.
//!
//! Every migration is one [`SchemaChange`]; its `down` is the exact inverse of
//! its `up`. The schema version is the number of applied migrations, and the
//! applied set is always a prefix of [`MIGRATIONS`].
//!
//! [`Schema`] is an in-memory model of the database shape. The migrator
//! replays the whole chain against it before issuing any DDL, so a broken
//! chain (duplicate column, non-inverting down) is caught without touching the
//! database.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use sqlx::PgPool;

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("table {0} already exists")]
    TableExists(String),

    #[error("table {0} does not exist")]
    TableMissing(String),

    #[error("table {0} does not match the definition being dropped")]
    TableMismatch(String),

    #[error("column {table}.{column} already exists")]
    ColumnExists { table: String, column: String },

    #[error("column {table}.{column} does not exist")]
    ColumnMissing { table: String, column: String },

    #[error("column {table}.{column} does not match the definition being dropped")]
    ColumnMismatch { table: String, column: String },

    #[error("column {table}.{column} is already {state}")]
    NullabilityUnchanged {
        table: String,
        column: String,
        state: &'static str,
    },

    #[error("migration {0} is not newer than the one before it")]
    OutOfOrder(i64),

    #[error("migration {0} does not invert cleanly")]
    NotReversible(i64),

    #[error("applied migrations diverge from the known chain at version {0}")]
    Diverged(i64),

    #[error("no applied migration to revert")]
    NothingToRevert,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub nullable: bool,
    /// Trailing constraint text such as `PRIMARY KEY` or `DEFAULT NOW()`.
    pub extra: Option<&'static str>,
}

impl ColumnDef {
    pub const fn required(name: &'static str, sql_type: &'static str) -> Self {
        Self {
            name,
            sql_type,
            nullable: false,
            extra: None,
        }
    }

    pub const fn optional(name: &'static str, sql_type: &'static str) -> Self {
        Self {
            name,
            sql_type,
            nullable: true,
            extra: None,
        }
    }

    pub const fn with(mut self, extra: &'static str) -> Self {
        self.extra = Some(extra);
        self
    }

    fn to_sql(&self) -> String {
        let mut sql = format!("{} {}", quote_ident(self.name), self.sql_type);
        if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(extra) = self.extra {
            sql.push(' ');
            sql.push_str(extra);
        }
        sql
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaChange {
    CreateTable {
        table: &'static str,
        columns: &'static [ColumnDef],
    },
    DropTable {
        table: &'static str,
        columns: &'static [ColumnDef],
    },
    AddColumn {
        table: &'static str,
        column: ColumnDef,
    },
    DropColumn {
        table: &'static str,
        column: ColumnDef,
    },
    SetNullable {
        table: &'static str,
        column: &'static str,
        nullable: bool,
    },
}

impl SchemaChange {
    pub fn inverse(&self) -> SchemaChange {
        match *self {
            Self::CreateTable { table, columns } => Self::DropTable { table, columns },
            Self::DropTable { table, columns } => Self::CreateTable { table, columns },
            Self::AddColumn { table, column } => Self::DropColumn { table, column },
            Self::DropColumn { table, column } => Self::AddColumn { table, column },
            Self::SetNullable {
                table,
                column,
                nullable,
            } => Self::SetNullable {
                table,
                column,
                nullable: !nullable,
            },
        }
    }

    pub fn to_sql(&self) -> String {
        match self {
            Self::CreateTable { table, columns } => {
                let mut sql = format!("CREATE TABLE {} (", quote_ident(table));
                for (i, column) in columns.iter().enumerate() {
                    let sep = if i == 0 { "" } else { "," };
                    let _ = write!(sql, "{}\n    {}", sep, column.to_sql());
                }
                sql.push_str("\n)");
                sql
            }
            Self::DropTable { table, .. } => format!("DROP TABLE {}", quote_ident(table)),
            Self::AddColumn { table, column } => format!(
                "ALTER TABLE {} ADD COLUMN {}",
                quote_ident(table),
                column.to_sql()
            ),
            Self::DropColumn { table, column } => format!(
                "ALTER TABLE {} DROP COLUMN {}",
                quote_ident(table),
                quote_ident(column.name)
            ),
            Self::SetNullable {
                table,
                column,
                nullable,
            } => format!(
                "ALTER TABLE {} ALTER COLUMN {} {}",
                quote_ident(table),
                quote_ident(column),
                if *nullable { "DROP NOT NULL" } else { "SET NOT NULL" }
            ),
        }
    }
}

/// Postgres folds unquoted identifiers to lower case, so anything else is quoted.
fn quote_ident(ident: &str) -> String {
    let plain = ident
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if plain {
        ident.to_string()
    } else {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    pub tables: BTreeMap<String, TableSchema>,
}

impl Schema {
    /// Schema produced by the first `version` migrations of `migrations`.
    pub fn at_version(migrations: &[Migration], version: usize) -> Result<Self, MigrationError> {
        let mut schema = Schema::default();
        for migration in migrations.iter().take(version) {
            schema.apply(&migration.up())?;
        }
        Ok(schema)
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    pub fn apply(&mut self, change: &SchemaChange) -> Result<(), MigrationError> {
        match *change {
            SchemaChange::CreateTable { table, columns } => {
                if self.tables.contains_key(table) {
                    return Err(MigrationError::TableExists(table.to_string()));
                }
                self.tables.insert(
                    table.to_string(),
                    TableSchema {
                        columns: columns.to_vec(),
                    },
                );
            }
            SchemaChange::DropTable { table, columns } => {
                let existing = self
                    .tables
                    .get(table)
                    .ok_or_else(|| MigrationError::TableMissing(table.to_string()))?;
                if existing.columns != columns {
                    return Err(MigrationError::TableMismatch(table.to_string()));
                }
                self.tables.remove(table);
            }
            SchemaChange::AddColumn { table, column } => {
                let existing = self.table_mut(table)?;
                if existing.column(column.name).is_some() {
                    return Err(MigrationError::ColumnExists {
                        table: table.to_string(),
                        column: column.name.to_string(),
                    });
                }
                existing.columns.push(column);
            }
            SchemaChange::DropColumn { table, column } => {
                let existing = self.table_mut(table)?;
                let idx = existing
                    .columns
                    .iter()
                    .position(|c| c.name == column.name)
                    .ok_or_else(|| MigrationError::ColumnMissing {
                        table: table.to_string(),
                        column: column.name.to_string(),
                    })?;
                if existing.columns[idx] != column {
                    return Err(MigrationError::ColumnMismatch {
                        table: table.to_string(),
                        column: column.name.to_string(),
                    });
                }
                existing.columns.remove(idx);
            }
            SchemaChange::SetNullable {
                table,
                column,
                nullable,
            } => {
                let existing = self.table_mut(table)?;
                let def = existing
                    .columns
                    .iter_mut()
                    .find(|c| c.name == column)
                    .ok_or_else(|| MigrationError::ColumnMissing {
                        table: table.to_string(),
                        column: column.to_string(),
                    })?;
                // A no-op here would make the inverse change the schema.
                if def.nullable == nullable {
                    return Err(MigrationError::NullabilityUnchanged {
                        table: table.to_string(),
                        column: column.to_string(),
                        state: if nullable { "nullable" } else { "NOT NULL" },
                    });
                }
                def.nullable = nullable;
            }
        }
        Ok(())
    }

    fn table_mut(&mut self, table: &str) -> Result<&mut TableSchema, MigrationError> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| MigrationError::TableMissing(table.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    /// Creation timestamp in milliseconds; migrations apply in ascending order.
    pub version: i64,
    pub name: &'static str,
    pub change: SchemaChange,
}

impl Migration {
    pub fn up(&self) -> SchemaChange {
        self.change
    }

    pub fn down(&self) -> SchemaChange {
        self.change.inverse()
    }
}

static USERS_COLUMNS: [ColumnDef; 10] = [
    ColumnDef::required("id", "UUID").with("PRIMARY KEY"),
    ColumnDef::required("firebase_uid", "VARCHAR(128)").with("UNIQUE"),
    ColumnDef::required("email", "VARCHAR(255)").with("UNIQUE"),
    ColumnDef::optional("username", "VARCHAR(50)"),
    ColumnDef::required("full_name", "VARCHAR(255)"),
    ColumnDef::optional("phone_number", "VARCHAR(20)"),
    ColumnDef::optional("profile_picture_url", "TEXT"),
    ColumnDef::required("role", "VARCHAR(20)").with("DEFAULT 'user'"),
    ColumnDef::required("created_at", "TIMESTAMPTZ").with("DEFAULT NOW()"),
    ColumnDef::required("updated_at", "TIMESTAMPTZ").with("DEFAULT NOW()"),
];

pub static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1_714_000_000_000,
        name: "create_users_table",
        change: SchemaChange::CreateTable {
            table: "users",
            columns: &USERS_COLUMNS,
        },
    },
    Migration {
        version: 1_714_600_000_000,
        name: "add_display_name_camel_case",
        change: SchemaChange::AddColumn {
            table: "users",
            column: ColumnDef::optional("displayName", "VARCHAR(100)"),
        },
    },
    Migration {
        version: 1_715_200_000_000,
        name: "make_full_name_nullable",
        change: SchemaChange::SetNullable {
            table: "users",
            column: "full_name",
            nullable: true,
        },
    },
    Migration {
        version: 1_715_800_000_000,
        name: "add_display_name",
        change: SchemaChange::AddColumn {
            table: "users",
            column: ColumnDef::optional("display_name", "VARCHAR(255)"),
        },
    },
    Migration {
        version: 1_716_400_000_000,
        name: "add_contact_email",
        change: SchemaChange::AddColumn {
            table: "users",
            column: ColumnDef::optional("contact_email", "VARCHAR(255)").with("UNIQUE"),
        },
    },
];

pub fn check_order(migrations: &[Migration]) -> Result<(), MigrationError> {
    for pair in migrations.windows(2) {
        if pair[1].version <= pair[0].version {
            return Err(MigrationError::OutOfOrder(pair[1].version));
        }
    }
    Ok(())
}

/// Replays `migrations` against an empty [`Schema`], checking order and that
/// every `down` restores the schema its `up` started from.
pub fn verify_chain(migrations: &[Migration]) -> Result<Schema, MigrationError> {
    check_order(migrations)?;

    let mut schema = Schema::default();
    for migration in migrations {
        let before = schema.clone();
        schema.apply(&migration.up())?;

        let mut reverted = schema.clone();
        reverted.apply(&migration.down())?;
        if reverted != before {
            return Err(MigrationError::NotReversible(migration.version));
        }
    }
    Ok(schema)
}

/// The migrations still to run, given the versions already applied in order.
pub fn pending<'m>(
    migrations: &'m [Migration],
    applied: &[i64],
) -> Result<&'m [Migration], MigrationError> {
    for (i, version) in applied.iter().enumerate() {
        match migrations.get(i) {
            Some(m) if m.version == *version => {}
            _ => return Err(MigrationError::Diverged(*version)),
        }
    }
    Ok(&migrations[applied.len()..])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub version: i64,
    pub name: &'static str,
    pub applied: bool,
}

pub struct Migrator<'a> {
    pool: &'a PgPool,
    migrations: &'a [Migration],
}

impl<'a> Migrator<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self::with_migrations(pool, MIGRATIONS)
    }

    pub fn with_migrations(pool: &'a PgPool, migrations: &'a [Migration]) -> Self {
        Self { pool, migrations }
    }

    async fn ensure_table(&self) -> Result<(), MigrationError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version BIGINT PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(self.pool)
        .await?;
        Ok(())
    }

    async fn applied_versions(&self) -> Result<Vec<i64>, MigrationError> {
        self.ensure_table().await?;
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT version FROM schema_migrations ORDER BY version")
                .fetch_all(self.pool)
                .await?;
        Ok(rows.into_iter().map(|(v,)| v).collect())
    }

    /// Current schema version: the number of applied migrations.
    pub async fn version(&self) -> Result<usize, MigrationError> {
        let applied = self.applied_versions().await?;
        pending(self.migrations, &applied)?;
        Ok(applied.len())
    }

    pub async fn status(&self) -> Result<Vec<MigrationStatus>, MigrationError> {
        let applied = self.applied_versions().await?;
        pending(self.migrations, &applied)?;
        Ok(self
            .migrations
            .iter()
            .enumerate()
            .map(|(i, m)| MigrationStatus {
                version: m.version,
                name: m.name,
                applied: i < applied.len(),
            })
            .collect())
    }

    /// Applies every pending migration in order, one transaction each.
    /// Stops at the first failure; earlier migrations in the run stay applied.
    pub async fn run_pending(&self) -> Result<usize, MigrationError> {
        verify_chain(self.migrations)?;

        let applied = self.applied_versions().await?;
        let to_apply = pending(self.migrations, &applied)?;

        for migration in to_apply {
            let mut tx = self.pool.begin().await?;
            sqlx::query(&migration.up().to_sql())
                .execute(&mut *tx)
                .await?;
            sqlx::query("INSERT INTO schema_migrations (version, name) VALUES ($1, $2)")
                .bind(migration.version)
                .bind(migration.name)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applied migration"
            );
        }

        if to_apply.is_empty() {
            tracing::debug!("Schema is up to date");
        }

        Ok(to_apply.len())
    }

    /// Reverts the most recently applied migration.
    pub async fn revert_last(&self) -> Result<&'a Migration, MigrationError> {
        let applied = self.applied_versions().await?;
        pending(self.migrations, &applied)?;

        let migration = applied
            .len()
            .checked_sub(1)
            .and_then(|i| self.migrations.get(i))
            .ok_or(MigrationError::NothingToRevert)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(&migration.down().to_sql())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM schema_migrations WHERE version = $1")
            .bind(migration.version)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(
            version = migration.version,
            name = migration.name,
            "Reverted migration"
        );

        Ok(migration)
    }
}
