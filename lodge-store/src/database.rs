use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

use crate::app_config::{BookingRules, DatabaseConfig};

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

#[derive(sqlx::FromRow)]
struct RuleRow {
    rule_key: String,
    rule_value: Value,
}

impl DbClient {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlay operator-managed rows from `booking_rules` on top of file config.
    /// Expected row format: `{"value": <number/bool>}`.
    pub async fn fetch_booking_rules(&self, defaults: BookingRules) -> Result<BookingRules, sqlx::Error> {
        let rows: Vec<RuleRow> = sqlx::query_as("SELECT rule_key, rule_value FROM booking_rules")
            .fetch_all(&self.pool)
            .await?;

        Ok(apply_rule_rows(defaults, rows))
    }
}

fn apply_rule_rows(defaults: BookingRules, rows: Vec<RuleRow>) -> BookingRules {
    let mut rules = defaults;

    for row in rows {
        if let Some(v) = row.rule_value.get("value") {
            match row.rule_key.as_str() {
                "hold_seconds" => {
                    if let Some(u) = v.as_u64() {
                        rules.hold_seconds = u;
                    }
                }
                "operation_timeout_ms" => {
                    if let Some(u) = v.as_u64() {
                        rules.operation_timeout_ms = u;
                    }
                }
                "verify_catalog_prices" => {
                    if let Some(b) = v.as_bool() {
                        rules.verify_catalog_prices = b;
                    }
                }
                other => tracing::warn!(rule_key = other, "ignoring unknown booking rule"),
            }
        }
    }

    rules
}
