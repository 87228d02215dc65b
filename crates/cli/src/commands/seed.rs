use crate::commands::CommandResult;
use leadpipe_core::config::{AppConfig, LoadOptions};
use leadpipe_db::{connect, migrations, DemoDataset, SeedResult};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
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
                "seed",
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

        let seed_result = DemoDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = DemoDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result: Result<SeedResult, (&'static str, String, u8)> =
            if !verification.all_present {
                Err((
                    "seed_verification",
                    verification_failure_message(
                        verification
                            .checks
                            .iter()
                            .filter(|check| !check.passed)
                            .map(|check| check.label.as_str()),
                    ),
                    6u8,
                ))
            } else {
                Ok(seed_result)
            };

        pool.close().await;
        run_result
    });

    match result {
        Ok(output) => CommandResult::success_with_details(
            "seed",
            format!(
                "demo pipeline loaded: {} leads, {} ledger entries",
                output.leads_seeded, output.cost_entries_seeded
            ),
            Some(serde_json::json!({
                "leads_seeded": output.leads_seeded,
                "cost_entries_seeded": output.cost_entries_seeded,
            })),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn verification_failure_message<'a>(failed: impl Iterator<Item = &'a str>) -> String {
    let labels: Vec<&str> = failed.collect();
    if labels.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", labels.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::verification_failure_message;

    #[test]
    fn verification_error_message_targets_failed_checks() {
        let message =
            verification_failure_message(["sarah@growth.co", "mike@enterprise.com-ledger"].into_iter());
        assert_eq!(
            message,
            "Seed verification failed for checks: sarah@growth.co, mike@enterprise.com-ledger"
        );
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        let message = verification_failure_message(std::iter::empty());
        assert_eq!(message, "Some seed data failed to load");
    }
}
