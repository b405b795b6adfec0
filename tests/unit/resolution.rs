//! Expression resolution against validated inputs.

use serde_json::json;

use stackwright::engine::validate_inputs;
use stackwright::resolver::{Dependency, PseudoParameters, TemplateResolver};
use stackwright::template::{Expression, ParameterValues, Template};

fn template() -> Template {
    Template::from_value(json!({
        "Parameters": {
            "Env": {"Type": "String", "Default": "dev"},
            "Sizes": {"Type": "CommaDelimitedList", "Default": "s,m"}
        },
        "Conditions": {
            "IsProd": {"Fn::Equals": [{"Ref": "Env"}, "prod"]}
        },
        "Resources": {
            "Bucket": {"Type": "Test::Bucket"}
        }
    }))
    .unwrap()
}

#[test]
fn parameters_conditions_and_pseudo_parameters_resolve() {
    let template = template();
    let pseudo = PseudoParameters::default();
    let mut supplied = ParameterValues::new();
    supplied.insert("Env".to_string(), "prod".to_string());
    let inputs = validate_inputs(&template, &supplied, &pseudo).unwrap();

    let resolver = TemplateResolver::new(&template)
        .with_parameters(&inputs.parameters)
        .with_conditions(&inputs.conditions)
        .with_pseudo_parameters(&pseudo);

    let expr = Expression::parse(json!({
        "Name": {"Fn::Sub": "${Env}-${AWS::Region}"},
        "Size": {"Fn::Select": [1, {"Ref": "Sizes"}]},
        "Tier": {"Fn::If": ["IsProd", "gold", "bronze"]}
    }))
    .unwrap();
    let resolution = resolver.evaluate(&expr).unwrap();

    assert!(resolution.is_resolved());
    assert_eq!(
        resolution.realize().unwrap(),
        json!({"Name": "prod-us-east-1", "Size": "m", "Tier": "gold"})
    );
    assert!(resolution.resolved_dependencies().contains(&Dependency::Condition("IsProd".into())));
}

#[test]
fn resource_references_stay_unresolved_without_a_resource_resolver() {
    let template = template();
    let expr = Expression::parse(json!({"Fn::GetAtt": ["Bucket", "Arn"]})).unwrap();

    let resolution = TemplateResolver::new(&template).evaluate(&expr).unwrap();
    assert!(!resolution.is_resolved());
    assert_eq!(resolution.unresolved_resources().collect::<Vec<_>>(), vec!["Bucket"]);
    assert!(resolution.realize().is_err());
}

#[test]
fn unknown_references_fail() {
    let template = template();
    let expr = Expression::parse(json!({"Ref": "Nope"})).unwrap();
    assert!(TemplateResolver::new(&template).evaluate(&expr).is_err());
}
