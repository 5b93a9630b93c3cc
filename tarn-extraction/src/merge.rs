use crate::types::AcceptedObject;

/// Merges per-chunk extractor output into one object set:
/// exact `key` match first, then normalized-name exact match. A match
/// folds the new properties over the existing object's.
pub fn merge_by_key_similarity(batches: Vec<Vec<AcceptedObject>>) -> Vec<AcceptedObject> {
    let mut merged: Vec<AcceptedObject> = Vec::new();

    for batch in batches {
        for candidate in batch {
            let existing = merged.iter_mut().find(|existing| matches(existing, &candidate));
            match existing {
                Some(existing) => existing.properties.extend(candidate.properties),
                None => merged.push(candidate),
            }
        }
    }

    merged
}

fn matches(a: &AcceptedObject, b: &AcceptedObject) -> bool {
    match (&a.key, &b.key) {
        (Some(ak), Some(bk)) => ak == bk,
        _ => match (a.normalized_name(), b.normalized_name()) {
            (Some(an), Some(bn)) => an == bn,
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use tarn_common::PropertyValue;

    use super::*;

    fn object(key: Option<&str>, name: &str) -> AcceptedObject {
        let mut properties = tarn_common::PropertyMap::new();
        properties.insert("name".into(), PropertyValue::String(name.into()));
        AcceptedObject { object_type: "person".into(), key: key.map(String::from), properties, low_confidence: false }
    }

    #[test]
    fn exact_key_match_merges_across_chunks() {
        let merged = merge_by_key_similarity(vec![vec![object(Some("e1"), "Ada")], vec![object(Some("e1"), "Ada Lovelace")]]);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn normalized_name_match_merges_when_keys_absent() {
        let merged = merge_by_key_similarity(vec![vec![object(None, "Ada")], vec![object(None, "  ADA  ")]]);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn distinct_names_are_not_merged() {
        let merged = merge_by_key_similarity(vec![vec![object(None, "Ada")], vec![object(None, "Grace")]]);
        assert_eq!(merged.len(), 2);
    }
}
