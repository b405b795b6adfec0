//! Loading templates from disk.

use anyhow::Result;
use tempfile::TempDir;

use stackwright::graph::{DependencyGraph, level_graph};
use stackwright::template::Template;

const YAML: &str = r#"
Resources:
  Bucket:
    Type: Test::Bucket
  Policy:
    Type: Test::Policy
    Properties:
      Bucket: {"Ref": Bucket}
"#;

#[tokio::test]
async fn load_yaml_by_extension() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("stack.yml");
    std::fs::write(&path, YAML)?;

    let template = Template::load(&path).await?;
    assert_eq!(template.resources.keys().collect::<Vec<_>>(), vec!["Bucket", "Policy"]);
    assert!(template.is_resource("Policy"));
    assert!(!template.is_parameter("Policy"));
    Ok(())
}

#[tokio::test]
async fn load_json_otherwise() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("stack.template");
    std::fs::write(&path, r#"{"Resources": {"Bucket": {"Type": "Test::Bucket"}}}"#)?;

    let template = Template::load(&path).await?;
    assert_eq!(template.resources.len(), 1);
    Ok(())
}

#[tokio::test]
async fn load_reports_the_path_on_parse_errors() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{not json")?;

    let err = Template::load(&path).await.unwrap_err();
    assert!(format!("{err:#}").contains("broken.json"));
    Ok(())
}

#[tokio::test]
async fn template_without_resources_is_rejected() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("empty.yaml");
    std::fs::write(&path, "Parameters: {}\n")?;

    assert!(Template::load(&path).await.is_err());
    Ok(())
}

#[tokio::test]
async fn loaded_template_levels_by_reference() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("stack.yaml");
    std::fs::write(&path, YAML)?;

    let template = Template::load(&path).await?;
    let graph = DependencyGraph::from_template(&template)?;
    let leveling = level_graph(&graph, false)?;
    assert_eq!(leveling.levels(), vec![vec!["Bucket"], vec!["Policy"]]);
    assert_eq!(graph.dependents("Bucket"), vec!["Policy"]);
    Ok(())
}
