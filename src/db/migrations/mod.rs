use crate::error::Error;
use anyhow::Result;
use log::info;
use sqlx::{Executor, PgPool};

/// Migration scripts compiled into the binary
const MIGRATIONS: &[(&str, &str)] = &[(
    "001_create_users.sql",
    include_str!("sql/001_create_users.sql"),
)];

/// Numeric prefix of a migration file; unnumbered files run last
fn order_value(name: &str) -> usize {
    name.split('_')
        .next()
        .and_then(|prefix| prefix.parse::<usize>().ok())
        .unwrap_or(usize::MAX)
}

fn ordered() -> Vec<(&'static str, &'static str)> {
    let mut migrations = MIGRATIONS.to_vec();
    migrations.sort_by_key(|(name, _)| order_value(name));
    migrations
}

/// Apply every migration in order. Scripts are idempotent.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    for (name, sql) in ordered() {
        pool.execute(sql)
            .await
            .map_err(|e| Error::Database(format!("Migration {} failed: {}", name, e)))?;
        info!("Applied migration: {}", name);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_sorted_by_prefix() {
        assert_eq!(order_value("001_create_users.sql"), 1);
        assert_eq!(order_value("010_add_index.sql"), 10);
        assert_eq!(order_value("seed.sql"), usize::MAX);

        let names: Vec<_> = ordered().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names.first(), Some(&"001_create_users.sql"));
    }

    #[test]
    fn test_users_table_has_recipient_columns() {
        let (_, sql) = ordered()[0];
        for column in ["email", "phone_number", "dept_id", "password_hash", "last_login"] {
            assert!(sql.contains(column), "missing column {}", column);
        }
    }
}
