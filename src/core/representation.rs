// =============================================================================
// REPRESENTATION — Le langage intermédiaire de la machine à pile
// =============================================================================
//
// Une "représentation intermédiaire" (IR) est une liste plate
// d'instructions qui dit comment dériver un ensemble de colonnes B à
// partir d'un ensemble A. Chaque instruction a une mnémonique de trois
// lettres, utilisée à l'affichage :
//
//   GET  pousse le produit des domaines demandés (fournis par le backend)
//   PSH  duplique le sommet             POP  jette le sommet
//   CAL  ouvre un cadre                 RET  ferme le cadre
//   RST  repart de la table du cadre courant
//   STT  ouvre une traversée : colonnes nommées → positions #0, #1...
//   TRV  traverse un mapping (jointure "right" avec la relation)
//   PRJ  ne garde que certaines positions
//   EXP  ajoute des positions, matérialisées en clés cachées
//   EQT  marqueur sans effet (l'égalité est réalisée par l'arbre)
//   ENT  ferme la traversée : positions → colonnes nommées
//   REN  renomme        DRP  retire des colonnes (dédoublonne)
//   FLT  garde les lignes non nulles     SRT  trie
//   MER  fusionne les deux tables du sommet
//   END  déclare les clés affichées, cachées, et les valeurs
//
// EXEMPLE : dériver `b` depuis la clé `a` par l'arête u→v
//
//   [STT<[a]>, TRV<u→v>, ENT<[b]>]
//
// Seules TRV, PRJ et EXP ont un inverse non trivial.
//
// =============================================================================

use std::fmt;

use super::error::TreeError;
use super::mapping::Mapping;
use super::namespace::Namespace;
use super::schema::{format_list, AtomicNode, Domain, SchemaNode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepresentationStep {
    Get { domains: Vec<Domain> },
    Push,
    Pop,
    Call,
    Return,
    Reset,
    StartTraversal { domains: Vec<Domain> },
    Traverse { mapping: Mapping },
    /// Positions d'entrée `start`, sortie `end = start[indices]`
    Project {
        start: Vec<AtomicNode>,
        end: Vec<AtomicNode>,
        indices: Vec<usize>,
    },
    /// Positions d'entrée `start`, sortie `end` avec `end[indices[i]] = start[i]` ;
    /// les autres positions de `end` deviennent les clés cachées `hidden_keys`
    Expand {
        start: Vec<AtomicNode>,
        end: Vec<AtomicNode>,
        indices: Vec<usize>,
        hidden_keys: Vec<Domain>,
    },
    Equate { left: Domain, right: Domain },
    EndTraversal { domains: Vec<Domain> },
    Rename { renames: Vec<(Domain, Domain)> },
    Merge,
    Drop { domains: Vec<Domain> },
    Filter { domain: Domain },
    Sort { domains: Vec<Domain> },
    End {
        left: Vec<Domain>,
        hidden: Vec<Domain>,
        right: Vec<Domain>,
    },
}

impl RepresentationStep {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            RepresentationStep::Get { .. } => "GET",
            RepresentationStep::Push => "PSH",
            RepresentationStep::Pop => "POP",
            RepresentationStep::Call => "CAL",
            RepresentationStep::Return => "RET",
            RepresentationStep::Reset => "RST",
            RepresentationStep::StartTraversal { .. } => "STT",
            RepresentationStep::Traverse { .. } => "TRV",
            RepresentationStep::Project { .. } => "PRJ",
            RepresentationStep::Expand { .. } => "EXP",
            RepresentationStep::Equate { .. } => "EQT",
            RepresentationStep::EndTraversal { .. } => "ENT",
            RepresentationStep::Rename { .. } => "REN",
            RepresentationStep::Merge => "MER",
            RepresentationStep::Drop { .. } => "DRP",
            RepresentationStep::Filter { .. } => "FLT",
            RepresentationStep::Sort { .. } => "SRT",
            RepresentationStep::End { .. } => "END",
        }
    }

    /// Inverse d'une instruction. Les clés cachées créées par l'inversion
    /// sont nommées dans `namespace`.
    pub fn invert(&self, namespace: &mut Namespace) -> Result<RepresentationStep, TreeError> {
        match self {
            RepresentationStep::Traverse { mapping } => Ok(RepresentationStep::Traverse {
                mapping: mapping.invert(namespace),
            }),
            RepresentationStep::Project { start, end, indices } => {
                let hidden_keys = start
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| !indices.contains(i))
                    .map(|(_, node)| namespace.fresh_domain(&node.name, node))
                    .collect();
                Ok(RepresentationStep::Expand {
                    start: end.clone(),
                    end: start.clone(),
                    indices: indices.clone(),
                    hidden_keys,
                })
            }
            RepresentationStep::Expand { start, end, indices, .. } => Ok(RepresentationStep::Project {
                start: end.clone(),
                end: start.clone(),
                indices: indices.clone(),
            }),
            RepresentationStep::Rename { renames } => Ok(RepresentationStep::Rename {
                renames: renames.iter().map(|(a, b)| (b.clone(), a.clone())).collect(),
            }),
            RepresentationStep::Push
            | RepresentationStep::Pop
            | RepresentationStep::Equate { .. }
            | RepresentationStep::Filter { .. }
            | RepresentationStep::Sort { .. } => Ok(self.clone()),
            _ => Err(TreeError::NotInvertible(self.to_string())),
        }
    }

    /// Les clés cachées que cette instruction fait apparaître.
    pub fn introduced_hidden_keys(&self) -> Vec<Domain> {
        match self {
            RepresentationStep::Traverse { mapping } => mapping.hidden_domains(),
            RepresentationStep::Expand { hidden_keys, .. } => hidden_keys.clone(),
            _ => Vec::new(),
        }
    }

    /// L'instruction lit-elle ou écrit-elle la colonne `domain` ?
    pub fn references(&self, domain: &Domain) -> bool {
        match self {
            RepresentationStep::Get { domains }
            | RepresentationStep::StartTraversal { domains }
            | RepresentationStep::EndTraversal { domains }
            | RepresentationStep::Drop { domains }
            | RepresentationStep::Sort { domains } => domains.contains(domain),
            RepresentationStep::Filter { domain: d } => d == domain,
            RepresentationStep::Equate { left, right } => left == domain || right == domain,
            RepresentationStep::Rename { renames } => {
                renames.iter().any(|(a, b)| a == domain || b == domain)
            }
            RepresentationStep::End { left, hidden, right } => {
                left.contains(domain) || hidden.contains(domain) || right.contains(domain)
            }
            RepresentationStep::Traverse { .. } | RepresentationStep::Expand { .. } => {
                self.introduced_hidden_keys().contains(domain)
            }
            RepresentationStep::Push
            | RepresentationStep::Pop
            | RepresentationStep::Call
            | RepresentationStep::Return
            | RepresentationStep::Reset
            | RepresentationStep::Project { .. }
            | RepresentationStep::Merge => false,
        }
    }
}

impl fmt::Display for RepresentationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.mnemonic();
        match self {
            RepresentationStep::Get { domains }
            | RepresentationStep::StartTraversal { domains }
            | RepresentationStep::EndTraversal { domains }
            | RepresentationStep::Drop { domains }
            | RepresentationStep::Sort { domains } => write!(f, "{}<{}>", name, format_list(domains)),
            RepresentationStep::Traverse { mapping } => write!(f, "{}<{}>", name, mapping),
            RepresentationStep::Project { start, end, .. }
            | RepresentationStep::Expand { start, end, .. } => write!(
                f,
                "{}<{}→{}>",
                name,
                SchemaNode::product(start.clone()),
                SchemaNode::product(end.clone())
            ),
            RepresentationStep::Equate { left, right } => write!(f, "{}<{}={}>", name, left, right),
            RepresentationStep::Rename { renames } => {
                let parts: Vec<String> = renames.iter().map(|(a, b)| format!("{}→{}", a, b)).collect();
                write!(f, "{}<[{}]>", name, parts.join(", "))
            }
            RepresentationStep::Filter { domain } => write!(f, "{}<{}>", name, domain),
            RepresentationStep::End { left, hidden, right } => write!(
                f,
                "{}<{}|{}|{}>",
                name,
                format_list(left),
                format_list(hidden),
                format_list(right)
            ),
            RepresentationStep::Push
            | RepresentationStep::Pop
            | RepresentationStep::Call
            | RepresentationStep::Return
            | RepresentationStep::Reset
            | RepresentationStep::Merge => write!(f, "{}", name),
        }
    }
}

/// Affiche un programme complet : `[GET<[a]>, CAL, ...]`
pub fn format_program(program: &[RepresentationStep]) -> String {
    format_list(program)
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cardinality::Cardinality;
    use crate::core::schema::SchemaEdge;

    fn a(name: &str) -> AtomicNode {
        AtomicNode::string(name)
    }

    #[test]
    fn test_display() {
        let mut ns = Namespace::new();
        let edge = SchemaEdge::new(a("u").into(), a("v").into(), Cardinality::ManyToOne);
        let program = vec![
            RepresentationStep::Get { domains: vec![Domain::new("a", a("u"))] },
            RepresentationStep::Call,
            RepresentationStep::Traverse { mapping: Mapping::new(edge, &mut ns) },
            RepresentationStep::Merge,
        ];
        assert_eq!(format_program(&program), "[GET<[a]>, CAL, TRV<u→v>, MER]");
    }

    #[test]
    fn test_project_and_expand_are_inverse() {
        let mut ns = Namespace::from_names(["x"]);
        let project = RepresentationStep::Project {
            start: vec![a("x"), a("y")],
            end: vec![a("y")],
            indices: vec![1],
        };
        let expand = project.invert(&mut ns).unwrap();
        match &expand {
            RepresentationStep::Expand { start, end, indices, hidden_keys } => {
                assert_eq!(start, &vec![a("y")]);
                assert_eq!(end, &vec![a("x"), a("y")]);
                assert_eq!(indices, &vec![1]);
                assert_eq!(hidden_keys, &vec![Domain::new("x_1", a("x"))]);
            }
            other => panic!("attendu EXP, reçu {}", other),
        }
        assert_eq!(expand.invert(&mut ns).unwrap(), project);
    }

    #[test]
    fn test_control_steps_are_not_invertible() {
        let mut ns = Namespace::new();
        assert!(RepresentationStep::Call.invert(&mut ns).is_err());
        assert!(RepresentationStep::Merge.invert(&mut ns).is_err());
        assert_eq!(RepresentationStep::Push.invert(&mut ns).unwrap(), RepresentationStep::Push);
    }

    #[test]
    fn test_references() {
        let d = Domain::new("a", a("u"));
        assert!(RepresentationStep::Get { domains: vec![d.clone()] }.references(&d));
        assert!(!RepresentationStep::Merge.references(&d));
    }
}
