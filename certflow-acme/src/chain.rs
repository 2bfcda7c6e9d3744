//! Preferred chain selection

use crate::error::{AcmeError, AcmeResult};

/// One chain offered by the CA for an issuance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedChain {
    /// Certificate resource URL
    pub url: String,
    /// Leaf plus intermediates (PEM)
    pub chain_pem: String,
}

/// Pick the chain with the shortest PEM encoding.
///
/// Ties resolve to the earliest chain offered, since the sort is stable.
pub fn select_preferred_chain(mut chains: Vec<IssuedChain>) -> AcmeResult<IssuedChain> {
    if chains.len() == 1 {
        return Ok(chains.remove(0));
    }

    chains.sort_by_key(|c| c.chain_pem.len());
    chains
        .into_iter()
        .next()
        .ok_or_else(|| AcmeError::Issuance("CA returned no certificate chain".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(url: &str, len: usize) -> IssuedChain {
        IssuedChain {
            url: url.to_string(),
            chain_pem: "x".repeat(len),
        }
    }

    #[test]
    fn test_shortest_chain_wins() {
        let offered = vec![chain("a", 500), chain("b", 200), chain("c", 800)];
        let picked = select_preferred_chain(offered).unwrap();
        assert_eq!(picked.url, "b");
        assert_eq!(picked.chain_pem.len(), 200);
    }

    #[test]
    fn test_single_chain_unchanged() {
        let only = chain("only", 1234);
        assert_eq!(select_preferred_chain(vec![only.clone()]).unwrap(), only);
    }

    #[test]
    fn test_tie_keeps_first_offered() {
        let offered = vec![chain("first", 300), chain("second", 300), chain("long", 900)];
        let picked = select_preferred_chain(offered).unwrap();
        assert_eq!(picked.url, "first");
    }

    #[test]
    fn test_empty_is_issuance_error() {
        assert!(matches!(select_preferred_chain(Vec::new()), Err(AcmeError::Issuance(_))));
    }
}
