use console::{Term, style};

use crate::commands::shared::connect;
use crate::config::Config;

/// Handle the `validate` command: check the token and project access.
pub async fn handle_validate(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let connector = connect(config, None)?;
    connector.validate_connector_settings().await?;

    let target = format!(
        "{}/{}",
        config.connector.organization, config.connector.project
    );
    if Term::stderr().is_term() {
        eprintln!("{} {} is reachable", style("✓").green(), style(&target).bold());
    } else {
        tracing::info!(target = %target, "Connector settings are valid");
    }
    Ok(())
}
