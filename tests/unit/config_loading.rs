//! Engine configuration files.

use anyhow::Result;
use tempfile::TempDir;

use stackwright::config::EngineConfig;
use stackwright::resolver::PseudoParameters;

#[tokio::test]
async fn blank_stack_name_is_rejected() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "stack_name = \"  \"\n")?;

    let err = EngineConfig::load_with_optional(Some(path)).await.unwrap_err();
    assert!(err.to_string().contains("stack_name must not be empty"));
    Ok(())
}

#[tokio::test]
async fn file_values_feed_pseudo_parameters() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "stack_name = \"orders\"\n\n[pseudo]\naccount_id = \"111122223333\"\n\n[retry]\nmax_attempts = 2\n",
    )?;

    let config = EngineConfig::load_from(&path).await?;
    assert_eq!(config.retry.max_attempts, 2);
    assert_eq!(config.retry.base_delay_ms, 1000);

    let pseudo = PseudoParameters::from_config(&config);
    assert_eq!(pseudo.stack_name, "orders");
    assert_eq!(pseudo.account_id, "111122223333");
    assert!(pseudo.stack_id.starts_with("arn:aws:cloudformation:"));
    assert!(pseudo.stack_id.contains(":111122223333:stack/orders/"));
    Ok(())
}

#[tokio::test]
async fn invalid_values_are_rejected_on_load() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[retry]\nmax_attempts = 0\n")?;

    let err = EngineConfig::load_with_optional(Some(path)).await.unwrap_err();
    assert!(err.to_string().contains("max_attempts"));
    Ok(())
}
