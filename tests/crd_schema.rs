//! CRD generation and selector semantics through the public API

use std::collections::BTreeMap;

use etcd_custodian::controller::selector::{matches, LabelMatcher};
use etcd_custodian::crd::Etcd;
use etcd_custodian::Error;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use kube::CustomResourceExt;

fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn requirement(key: &str, operator: &str, values: &[&str]) -> LabelSelectorRequirement {
    LabelSelectorRequirement {
        key: key.to_string(),
        operator: operator.to_string(),
        values: if values.is_empty() {
            None
        } else {
            Some(values.iter().map(|v| v.to_string()).collect())
        },
    }
}

#[test]
fn crd_yaml_describes_namespaced_etcd_with_status() {
    let yaml = serde_yaml::to_string(&Etcd::crd()).unwrap();
    let crd: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();

    assert_eq!(crd["metadata"]["name"].as_str(), Some("etcds.druid.gardener.cloud"));
    assert_eq!(crd["spec"]["group"].as_str(), Some("druid.gardener.cloud"));
    assert_eq!(crd["spec"]["scope"].as_str(), Some("Namespaced"));
    assert_eq!(crd["spec"]["names"]["kind"].as_str(), Some("Etcd"));

    let version = &crd["spec"]["versions"][0];
    assert_eq!(version["name"].as_str(), Some("v1alpha1"));
    assert!(version["subresources"]["status"].is_mapping());

    let properties = &version["schema"]["openAPIV3Schema"]["properties"];
    let selector = &properties["spec"]["properties"]["selector"];
    assert_eq!(selector["type"].as_str(), Some("object"));
    assert_eq!(
        selector["x-kubernetes-preserve-unknown-fields"].as_bool(),
        Some(true)
    );
    assert!(properties["status"]["properties"]["conditions"].is_mapping());
}

#[test]
fn missing_selector_matches_nothing() {
    let matcher = LabelMatcher::from_selector(None).unwrap();
    assert!(matcher.selects_nothing());
    assert!(!matcher.matches(&labels(&[])));
    assert!(!matcher.matches(&labels(&[("app", "E1")])));
}

#[test]
fn empty_selector_matches_everything() {
    let selector = LabelSelector::default();
    assert!(matches(&labels(&[]), Some(&selector)).unwrap());
    assert!(matches(&labels(&[("app", "E1")]), Some(&selector)).unwrap());
}

#[test]
fn match_labels_and_expressions_are_anded() {
    let selector = LabelSelector {
        match_labels: Some(labels(&[("app", "etcd")])),
        match_expressions: Some(vec![
            requirement("role", "In", &["main", "events"]),
            requirement("tier", "NotIn", &["test"]),
            requirement("owner", "Exists", &[]),
            requirement("legacy", "DoesNotExist", &[]),
        ]),
    };

    let good = labels(&[("app", "etcd"), ("role", "main"), ("owner", "x")]);
    assert!(matches(&good, Some(&selector)).unwrap());

    let mut wrong_role = good.clone();
    wrong_role.insert("role".to_string(), "backup".to_string());
    assert!(!matches(&wrong_role, Some(&selector)).unwrap());

    let mut excluded_tier = good.clone();
    excluded_tier.insert("tier".to_string(), "test".to_string());
    assert!(!matches(&excluded_tier, Some(&selector)).unwrap());

    let mut legacy = good.clone();
    legacy.insert("legacy".to_string(), "true".to_string());
    assert!(!matches(&legacy, Some(&selector)).unwrap());

    let mut no_owner = good;
    no_owner.remove("owner");
    assert!(!matches(&no_owner, Some(&selector)).unwrap());
}

#[test]
fn malformed_selectors_are_rejected() {
    let cases = [
        requirement("app", "Near", &["x"]),
        requirement("app", "In", &[]),
        requirement("app", "Exists", &["x"]),
        requirement("", "Exists", &[]),
        requirement("bad key!", "Exists", &[]),
        requirement("Bad_Prefix/app", "Exists", &[]),
        requirement("app", "In", &["E 1/x"]),
    ];

    for case in cases {
        let selector = LabelSelector {
            match_expressions: Some(vec![case.clone()]),
            ..Default::default()
        };
        match LabelMatcher::from_selector(Some(&selector)) {
            Err(Error::SelectorInvalid(_)) => {}
            other => panic!("{:?} should be invalid, got {:?}", case, other.map(|_| ())),
        }
    }
}

#[test]
fn malformed_match_labels_are_rejected() {
    let selector = LabelSelector {
        match_labels: Some(labels(&[("bad key!", "E 1/x")])),
        ..Default::default()
    };
    assert!(matches!(
        LabelMatcher::from_selector(Some(&selector)),
        Err(Error::SelectorInvalid(_))
    ));
}

#[test]
fn prefixed_keys_are_accepted() {
    let selector = LabelSelector {
        match_labels: Some(labels(&[("app.kubernetes.io/name", "etcd")])),
        ..Default::default()
    };
    assert!(matches(&labels(&[("app.kubernetes.io/name", "etcd")]), Some(&selector)).unwrap());
}
