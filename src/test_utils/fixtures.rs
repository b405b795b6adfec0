//! Sample templates and states for tests.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::template::Template;

/// A named template document.
#[derive(Clone, Debug)]
pub struct TemplateFixture {
    pub name: String,
    pub content: String,
}

impl TemplateFixture {
    /// Topic, Queue referencing the topic's Arn, and a conditional Alarm.
    pub fn basic() -> Self {
        Self {
            name: "basic.yaml".to_string(),
            content: r#"
Parameters:
  Env:
    Type: String
    Default: dev
    AllowedValues: [dev, prod]
Conditions:
  IsProd: {"Fn::Equals": [{"Ref": Env}, prod]}
Resources:
  Topic:
    Type: Test::Topic
    Properties:
      Name: {"Fn::Sub": "${AWS::StackName}-topic"}
  Queue:
    Type: Test::Queue
    Properties:
      TopicArn: {"Fn::GetAtt": [Topic, Arn]}
  Alarm:
    Type: Test::Alarm
    Condition: IsProd
    Properties:
      Queue: {"Ref": Queue}
Outputs:
  TopicArn:
    Value: {"Fn::GetAtt": [Topic, Arn]}
"#
            .to_string(),
        }
    }

    /// Two resources referencing each other.
    pub fn cyclic() -> Self {
        Self {
            name: "cyclic.yaml".to_string(),
            content: r#"
Resources:
  A:
    Type: Test::Thing
    Properties:
      Peer: {"Ref": B}
  B:
    Type: Test::Thing
    Properties:
      Peer: {"Fn::GetAtt": [A, Arn]}
"#
            .to_string(),
        }
    }

    /// A reference to a misspelled resource.
    pub fn missing_reference() -> Self {
        Self {
            name: "missing.yaml".to_string(),
            content: r#"
Resources:
  Topic:
    Type: Test::Topic
  Queue:
    Type: Test::Queue
    Properties:
      TopicArn: {"Fn::GetAtt": [Topik, Arn]}
"#
            .to_string(),
        }
    }

    /// A rule that only holds for small sizes.
    pub fn with_rule() -> Self {
        Self {
            name: "rules.yaml".to_string(),
            content: r#"
Parameters:
  Size:
    Type: String
    Default: small
Rules:
  SmallOnly:
    Assertions:
      - Assert: {"Fn::Equals": [{"Ref": Size}, small]}
        AssertDescription: only small stacks are supported
Resources:
  Bucket:
    Type: Test::Bucket
"#
            .to_string(),
        }
    }

    /// Parse the fixture.
    pub fn template(&self) -> Result<Template> {
        Template::from_yaml_str(&self.content).with_context(|| format!("Invalid fixture {}", self.name))
    }

    /// Write the fixture into `dir` and return its path.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(&self.name);
        fs::write(&path, self.content.trim_start())
            .with_context(|| format!("Failed to write fixture: {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixtures_parse() {
        for fixture in [
            TemplateFixture::basic(),
            TemplateFixture::cyclic(),
            TemplateFixture::missing_reference(),
            TemplateFixture::with_rule(),
        ] {
            assert!(fixture.template().is_ok(), "{} should parse", fixture.name);
        }
    }
}
