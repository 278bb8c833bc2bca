use anyhow::{bail, Context, Result};
use std::process::Command;
use tracing::{debug, info};

/// Runs goose migrations against PostgreSQL by spawning the goose binary.
pub struct MigrationRunner {
    goose_binary_path: String,
    migrations_dir: String,
    dsn: String,
}

impl MigrationRunner {
    pub fn new(goose_binary_path: String, migrations_dir: String, dsn: String) -> Self {
        Self {
            goose_binary_path,
            migrations_dir,
            dsn,
        }
    }

    /// Executes `goose -dir {migrations_dir} postgres {dsn} up`.
    pub async fn run_migrations(&self) -> Result<()> {
        info!(
            migrations_dir = %self.migrations_dir,
            "running database migrations"
        );

        let output = Command::new(&self.goose_binary_path)
            .args(["-dir", &self.migrations_dir, "postgres", &self.dsn, "up"])
            .output()
            .context("Failed to execute goose command")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            bail!("goose migrations failed: stdout={stdout} stderr={stderr}");
        }

        debug!(
            stdout = %String::from_utf8_lossy(&output.stdout),
            "migrations applied"
        );
        Ok(())
    }
}
