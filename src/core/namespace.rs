// =============================================================================
// NAMESPACE — Les noms de colonnes déjà utilisés
// =============================================================================
//
// Inverser une arête ou développer une projection fait apparaître des clés
// cachées qu'il faut nommer sans collision. Le Namespace est passé
// explicitement (`&mut`) à chaque opération qui crée un nom : il n'y a
// pas d'état global.
//
// EXEMPLE : si `person` et `person_1` sont pris, `fresh("person")` donne
// `person_2`.
//
// =============================================================================

use std::collections::BTreeSet;

use super::schema::{AtomicNode, Domain};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Namespace {
    names: BTreeSet<String>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Namespace { names: names.into_iter().map(Into::into).collect() }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Réserve un nom. Retourne faux s'il était déjà pris.
    pub fn reserve(&mut self, name: &str) -> bool {
        self.names.insert(name.to_string())
    }

    /// `base` s'il est libre, sinon `base_1`, `base_2`... Le nom est réservé.
    pub fn fresh(&mut self, base: &str) -> String {
        let mut candidate = base.to_string();
        let mut suffix = 0;
        while self.names.contains(&candidate) {
            suffix += 1;
            candidate = format!("{}_{}", base, suffix);
        }
        self.names.insert(candidate.clone());
        candidate
    }

    /// Un domaine frais sur `node`, nommé d'après `base`.
    pub fn fresh_domain(&mut self, base: &str, node: &AtomicNode) -> Domain {
        let name = self.fresh(base);
        Domain { name, node: node.clone() }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_suffixes_until_free() {
        let mut ns = Namespace::from_names(["person", "person_1"]);
        assert_eq!(ns.fresh("city"), "city");
        assert_eq!(ns.fresh("person"), "person_2");
        assert_eq!(ns.fresh("person"), "person_3");
        assert!(ns.contains("city"));
        assert!(!ns.reserve("city"));
    }
}
