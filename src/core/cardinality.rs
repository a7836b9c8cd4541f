// =============================================================================
// CARDINALITY — L'algèbre des cardinalités d'arêtes
// =============================================================================
//
// Chaque arête du schéma (et chaque dérivation de colonne) porte une
// cardinalité parmi quatre :
//
//   OneToOne    1:1   bijection partielle
//   OneToMany   1:N   une source, plusieurs cibles
//   ManyToOne   N:1   fonctionnelle (chaque source a au plus une cible)
//   ManyToMany  N:M   relation quelconque
//
// ANALOGIE : c'est un petit treillis.
//
//            N:M
//           /   \
//         N:1   1:N
//           \   /
//            1:1
//
// Composer deux arêtes successives revient à prendre la borne supérieure
// dans ce treillis : 1:1 est l'élément neutre, N:M est absorbant, et
// N:1 suivi de 1:N (dans un sens ou dans l'autre) donne N:M.
//
// Inverser une arête (la parcourir à rebours) échange N:1 et 1:N.
//
// =============================================================================

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl Cardinality {
    pub const ALL: [Cardinality; 4] = [
        Cardinality::OneToOne,
        Cardinality::OneToMany,
        Cardinality::ManyToOne,
        Cardinality::ManyToMany,
    ];

    /// Compose deux arêtes successives : `self` puis `next`.
    pub fn compose(self, next: Cardinality) -> Cardinality {
        use Cardinality::*;
        match (self, next) {
            (OneToOne, c) | (c, OneToOne) => c,
            (ManyToMany, _) | (_, ManyToMany) => ManyToMany,
            (ManyToOne, ManyToOne) => ManyToOne,
            (OneToMany, OneToMany) => OneToMany,
            (ManyToOne, OneToMany) | (OneToMany, ManyToOne) => ManyToMany,
        }
    }

    /// Composition d'une suite d'arêtes, de gauche à droite.
    /// Une suite vide donne l'identité (1:1).
    pub fn compose_all<I: IntoIterator<Item = Cardinality>>(iter: I) -> Cardinality {
        iter.into_iter()
            .fold(Cardinality::OneToOne, |acc, c| acc.compose(c))
    }

    /// Cardinalité de l'arête parcourue à rebours.
    pub fn invert(self) -> Cardinality {
        match self {
            Cardinality::OneToMany => Cardinality::ManyToOne,
            Cardinality::ManyToOne => Cardinality::OneToMany,
            c => c,
        }
    }

    /// Vrai si chaque source a au plus une cible : aucune clé cachée
    /// n'est nécessaire pour parcourir l'arête.
    pub fn is_functional(self) -> bool {
        matches!(self, Cardinality::OneToOne | Cardinality::ManyToOne)
    }

    /// Affaiblissement produit par un Curry : une position source devient
    /// une clé cachée, la source perd donc son pouvoir discriminant.
    pub fn curried(self) -> Cardinality {
        self.compose(Cardinality::OneToMany)
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cardinality::OneToOne => write!(f, "1:1"),
            Cardinality::OneToMany => write!(f, "1:N"),
            Cardinality::ManyToOne => write!(f, "N:1"),
            Cardinality::ManyToMany => write!(f, "N:M"),
        }
    }
}
