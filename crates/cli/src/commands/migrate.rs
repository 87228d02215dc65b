use serde_json::json;

use crate::commands::CommandResult;
use leadpipe_core::config::{AppConfig, LoadOptions};
use leadpipe_db::{connect, migrations};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let status = migrations::schema_status(&pool)
            .await
            .map_err(|error| ("schema_verification", error.to_string(), 6u8))?;

        pool.close().await;

        if status.is_complete() {
            Ok(status.migrations_applied)
        } else {
            Err(("schema_verification", missing_tables_message(&status.missing_tables), 6u8))
        }
    });

    match result {
        Ok(applied) => CommandResult::success_with_details(
            "migrate",
            format!("lead store schema is current ({applied} migrations applied)"),
            Some(json!({
                "migrations_applied": applied,
                "tables": migrations::REQUIRED_TABLES,
            })),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}

fn missing_tables_message(missing: &[&str]) -> String {
    format!("migrations ran but required tables are missing: {}", missing.join(", "))
}

#[cfg(test)]
mod tests {
    use super::missing_tables_message;

    #[test]
    fn missing_table_message_names_every_absent_table() {
        let message = missing_tables_message(&["leads", "ai_costs"]);
        assert_eq!(message, "migrations ran but required tables are missing: leads, ai_costs");
    }
}
