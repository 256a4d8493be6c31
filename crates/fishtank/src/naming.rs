//! Deterministic translation from (cluster, node) identity to docker resource
//! names. Discovery relies purely on names and labels, so these functions are
//! the single source of truth for how resources are addressed.

use crate::error::InvalidNameError;

/// A name is valid if it is non-empty and contains only letters, numbers,
/// underscores, or hyphens. This keeps names usable as docker resource names
/// and as container hostnames without quoting.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

pub fn assert_valid_name(name: &str) -> Result<(), InvalidNameError> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(InvalidNameError(name.to_string()))
    }
}

/// The docker network used for a cluster is named after the cluster itself.
pub fn network_name(cluster: &str) -> Result<String, InvalidNameError> {
    assert_valid_name(cluster)?;
    Ok(cluster.to_string())
}

/// The docker container hosting a node is named `{cluster}_{node}`.
pub fn container_name(cluster: &str, node: &str) -> Result<String, InvalidNameError> {
    assert_valid_name(cluster)?;
    assert_valid_name(node)?;
    Ok(format!("{cluster}_{node}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_names_with_letters_numbers_underscores_and_hyphens() {
        for name in ["bootstrap", "node-1", "my_node", "Node2", "a"] {
            assert!(assert_valid_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn rejects_empty_and_punctuated_names() {
        for name in ["", "abc def", "abc:def", "abc/def", "abc.def"] {
            let err = assert_valid_name(name).unwrap_err();
            assert_eq!(err.0, name);
        }
    }

    #[test]
    fn network_name_is_the_cluster_name() {
        assert_eq!(network_name("test-1").unwrap(), "test-1");
        assert!(network_name("test 1").is_err());
    }

    #[test]
    fn container_name_joins_cluster_and_node() {
        assert_eq!(container_name("test-1", "a").unwrap(), "test-1_a");
        assert!(container_name("test-1", "a b").is_err());
        assert!(container_name("test 1", "a").is_err());
    }
}
