// =============================================================================
// MAPPING — Une arête et les transformations qui changent sa forme
// =============================================================================
//
// Un Mapping, c'est une arête de base du schéma plus une "lentille" sur
// elle : quelles positions de la relation de base servent d'entrée (from),
// lesquelles sortent (to), et quelles clés cachées il faut matérialiser
// pour que la traversée reste une fonction de ses lignes.
//
// La relation de base d'une arête `(p, q) → r` a les colonnes
//
//     0:p  1:q  2:r
//
// Chaque position de from/to est soit une colonne de base (`Slot::Base`),
// soit un domaine "transporté" (`Slot::Carried`) qui traverse l'arête sans
// changer.
//
// TRANSFORMATIONS (chacune est enregistrée pour pouvoir être rejouée) :
//
//   Curry(i, h)      la position source i devient la clé cachée h
//                    (1:1 → 1:N, N:1 → N:M, 1:N → N:M)
//   Uncurry(k, p)    la clé cachée k redevient source, insérée en position p
//   Carry(d)         d est ajouté en fin de from ET de to
//   Drop(d)          retire un domaine transporté
//   Invert           échange from et to, inverse la cardinalité et recalcule
//                    les clés cachées
//
// L'arithmétique d'indices (décalage des positions transportées à chaque
// insertion/suppression) est le point délicat de cette algèbre.
//
// =============================================================================

use std::collections::BTreeMap;
use std::fmt;

use super::cardinality::Cardinality;
use super::error::MappingError;
use super::namespace::Namespace;
use super::schema::{AtomicNode, Domain, SchemaEdge, SchemaNode};

/// D'où vient une position de from/to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    /// Colonne de la relation de base (from de l'arête, puis to)
    Base(usize),
    /// Domaine transporté tel quel
    Carried(Domain),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    pub node: AtomicNode,
    pub slot: Slot,
}

/// Une clé cachée : un domaine nommé, lu dans une colonne de la relation de base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HiddenKey {
    pub domain: Domain,
    pub column: usize,
}

/// Historique rejouable des transformations appliquées à l'arête de base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transform {
    Curry { index: usize, hidden_key: Domain },
    Uncurry { hidden_index: usize, position: usize },
    Carry { domain: Domain },
    Drop { domain: Domain },
    Invert { hidden_keys: Vec<Domain> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    /// L'arête de base, telle qu'orientée à la création du mapping
    pub edge: SchemaEdge,
    pub from: Vec<Port>,
    pub to: Vec<Port>,
    pub hidden_keys: Vec<HiddenKey>,
    /// Pour chaque domaine transporté : (indice dans from, indice dans to)
    pub carried: BTreeMap<Domain, (usize, usize)>,
    pub transforms: Vec<Transform>,
    pub cardinality: Cardinality,
    /// Clés cachées du mapping de base, avant toute transformation
    pub base_hidden_keys: Vec<HiddenKey>,
}

impl Mapping {
    /// Le mapping de base d'une arête. Une arête non fonctionnelle reçoit
    /// une clé cachée fraîche par constituant cible.
    pub fn new(edge: SchemaEdge, namespace: &mut Namespace) -> Self {
        let width = edge.from.arity();
        let hidden = if edge.cardinality.is_functional() {
            Vec::new()
        } else {
            edge.to
                .constituents()
                .iter()
                .enumerate()
                .map(|(j, node)| HiddenKey {
                    domain: namespace.fresh_domain(&node.name, node),
                    column: width + j,
                })
                .collect()
        };
        Self::base(edge, hidden)
    }

    fn base(edge: SchemaEdge, hidden_keys: Vec<HiddenKey>) -> Self {
        let width = edge.from.arity();
        let from = edge.from
            .constituents()
            .iter()
            .enumerate()
            .map(|(i, node)| Port { node: node.clone(), slot: Slot::Base(i) })
            .collect();
        let to = edge.to
            .constituents()
            .iter()
            .enumerate()
            .map(|(j, node)| Port { node: node.clone(), slot: Slot::Base(width + j) })
            .collect();
        Mapping {
            cardinality: edge.cardinality,
            edge,
            from,
            to,
            hidden_keys: hidden_keys.clone(),
            carried: BTreeMap::new(),
            transforms: Vec::new(),
            base_hidden_keys: hidden_keys,
        }
    }

    pub fn from_nodes(&self) -> Vec<AtomicNode> {
        self.from.iter().map(|p| p.node.clone()).collect()
    }

    pub fn to_nodes(&self) -> Vec<AtomicNode> {
        self.to.iter().map(|p| p.node.clone()).collect()
    }

    pub fn hidden_domains(&self) -> Vec<Domain> {
        self.hidden_keys.iter().map(|h| h.domain.clone()).collect()
    }

    /// Vrai si un nombre impair d'inversions a été appliqué.
    pub fn is_inverted(&self) -> bool {
        self.transforms
            .iter()
            .filter(|t| matches!(t, Transform::Invert { .. }))
            .count()
            % 2
            == 1
    }

    /// Cardinalité de l'arête de base lue dans le sens courant
    fn oriented_base_cardinality(&self) -> Cardinality {
        if self.is_inverted() {
            self.edge.cardinality.invert()
        } else {
            self.edge.cardinality
        }
    }

    /// Les positions non transportées ont-elles exactement la forme de
    /// l'arête de base (dans le sens courant) ?
    fn matches_base_shape(&self) -> bool {
        let m = self.edge.from.arity();
        let n = self.edge.to.arity();
        let (expected_from, expected_to): (Vec<usize>, Vec<usize>) = if self.is_inverted() {
            ((m..m + n).collect(), (0..m).collect())
        } else {
            ((0..m).collect(), (m..m + n).collect())
        };
        let base = |ports: &[Port]| -> Vec<usize> {
            ports
                .iter()
                .filter_map(|p| match p.slot {
                    Slot::Base(c) => Some(c),
                    Slot::Carried(_) => None,
                })
                .collect()
        };
        base(&self.from) == expected_from && base(&self.to) == expected_to
    }

    pub fn curry(&self, index: usize, hidden_key: Domain) -> Result<Mapping, MappingError> {
        let wrong = MappingError::CurryAtWrongPosition { index, arity: self.from.len() };
        let column = match self.from.get(index) {
            Some(Port { slot: Slot::Base(c), node }) if *node == hidden_key.node => *c,
            _ => return Err(wrong),
        };

        let mut next = self.clone();
        next.from.remove(index);
        for (fi, _) in next.carried.values_mut() {
            if *fi > index {
                *fi -= 1;
            }
        }
        next.hidden_keys.push(HiddenKey { domain: hidden_key.clone(), column });
        next.cardinality = self.cardinality.curried();
        next.transforms.push(Transform::Curry { index, hidden_key });
        Ok(next)
    }

    pub fn uncurry(&self, hidden_index: usize, position: usize) -> Result<Mapping, MappingError> {
        if hidden_index >= self.hidden_keys.len() {
            return Err(MappingError::UncurryNotHidden {
                index: hidden_index,
                count: self.hidden_keys.len(),
            });
        }
        if position > self.from.len() {
            return Err(MappingError::UncurryAtWrongPosition {
                position,
                arity: self.from.len(),
            });
        }

        let mut next = self.clone();
        let key = next.hidden_keys.remove(hidden_index);
        next.from.insert(position, Port { node: key.domain.node, slot: Slot::Base(key.column) });
        for (fi, _) in next.carried.values_mut() {
            if *fi >= position {
                *fi += 1;
            }
        }
        if next.hidden_keys.is_empty() && next.matches_base_shape() {
            next.cardinality = next.oriented_base_cardinality();
        }
        next.transforms.push(Transform::Uncurry { hidden_index, position });
        Ok(next)
    }

    pub fn carry(&self, domain: Domain) -> Result<Mapping, MappingError> {
        if self.carried.contains_key(&domain) {
            return Err(MappingError::AlreadyCarried(domain.name));
        }
        let mut next = self.clone();
        let port = Port { node: domain.node.clone(), slot: Slot::Carried(domain.clone()) };
        next.from.push(port.clone());
        next.to.push(port);
        next.carried.insert(domain.clone(), (next.from.len() - 1, next.to.len() - 1));
        next.transforms.push(Transform::Carry { domain });
        Ok(next)
    }

    pub fn drop(&self, domain: &Domain) -> Result<Mapping, MappingError> {
        let mut next = self.clone();
        let (fi, ti) = next
            .carried
            .remove(domain)
            .ok_or_else(|| MappingError::NotCarried(domain.name.clone()))?;
        next.from.remove(fi);
        next.to.remove(ti);
        for (f, t) in next.carried.values_mut() {
            if *f > fi {
                *f -= 1;
            }
            if *t > ti {
                *t -= 1;
            }
        }
        next.transforms.push(Transform::Drop { domain: domain.clone() });
        Ok(next)
    }

    /// Inverse le mapping. Les clés cachées nécessaires sont nommées
    /// fraîchement dans `namespace`.
    pub fn invert(&self, namespace: &mut Namespace) -> Mapping {
        let hidden = if self.cardinality.invert().is_functional() {
            Vec::new()
        } else {
            self.from
                .iter()
                .filter(|p| matches!(p.slot, Slot::Base(_)))
                .map(|p| namespace.fresh_domain(&p.node.name, &p.node))
                .collect()
        };
        self.invert_with(hidden)
    }

    fn invert_with(&self, hidden: Vec<Domain>) -> Mapping {
        let mut next = self.clone();
        next.cardinality = self.cardinality.invert();
        next.hidden_keys = self
            .from
            .iter()
            .filter_map(|p| match p.slot {
                Slot::Base(c) => Some(c),
                Slot::Carried(_) => None,
            })
            .zip(hidden.iter().cloned())
            .map(|(column, domain)| HiddenKey { domain, column })
            .collect();
        std::mem::swap(&mut next.from, &mut next.to);
        for (f, t) in next.carried.values_mut() {
            std::mem::swap(f, t);
        }
        next.transforms.push(Transform::Invert { hidden_keys: hidden });
        next
    }

    /// Rejoue l'historique depuis l'arête de base.
    pub fn replay(&self) -> Result<Mapping, MappingError> {
        let mut current = Self::base(self.edge.clone(), self.base_hidden_keys.clone());
        for transform in &self.transforms {
            current = match transform {
                Transform::Curry { index, hidden_key } => current.curry(*index, hidden_key.clone())?,
                Transform::Uncurry { hidden_index, position } => {
                    current.uncurry(*hidden_index, *position)?
                }
                Transform::Carry { domain } => current.carry(domain.clone())?,
                Transform::Drop { domain } => current.drop(domain)?,
                Transform::Invert { hidden_keys } => current.invert_with(hidden_keys.clone()),
            };
        }
        Ok(current)
    }
}

impl fmt::Display for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}→{}",
            SchemaNode::product(self.from_nodes()),
            SchemaNode::product(self.to_nodes())
        )
    }
}
