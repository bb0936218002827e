//! Shared Kubernetes helpers built on kube-rs

use std::collections::BTreeMap;

use kube::api::Api;
use kube::Resource;
use serde::de::DeserializeOwned;

use crate::Result;

/// Get a resource by name, mapping 404 to `None`
///
/// The common pattern for resources that may legitimately not exist yet.
pub async fn get_optional<K>(api: &Api<K>, name: &str) -> Result<Option<K>>
where
    K: Resource + Clone + DeserializeOwned + std::fmt::Debug,
{
    match api.get(name).await {
        Ok(resource) => Ok(Some(resource)),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Render a label map as a `k=v,k=v` selector string
///
/// BTreeMap iteration order keeps the selector stable across calls.
pub fn selector_string(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_string_sorted() {
        let mut labels = BTreeMap::new();
        labels.insert("zebra".to_string(), "1".to_string());
        labels.insert("alpha".to_string(), "2".to_string());
        assert_eq!(selector_string(&labels), "alpha=2,zebra=1");
    }

    #[test]
    fn test_selector_string_empty() {
        assert_eq!(selector_string(&BTreeMap::new()), "");
    }
}
