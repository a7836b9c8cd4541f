// =============================================================================
// VALIDATE — Vérification de cohérence
// =============================================================================
//
// Les éditions de l'arbre préservent ses invariants, mais un arbre peut
// aussi être construit à la main (DerivationNode est public). Ce module
// vérifie :
//   - qu'un graphe de schéma ne fusionne que des nœuds de même type ;
//   - qu'un arbre de dérivation est bien formé (enfant unité, frères
//     distincts, colonnes à un seul domaine, clés cachées jamais affichées).
//
// Comme pour un schéma mal formé, on remonte TOUTES les erreurs d'un coup.
//
// =============================================================================

use std::collections::BTreeSet;

use super::derivation::{ColumnRole, DerivationNode, DerivationTree, NodeKind};
use super::representation::RepresentationStep;
use super::schema::{format_list, Domain, SchemaGraph};

/// Erreur de validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation error: {}", self.message)
    }
}

fn finish(errors: Vec<ValidationError>) -> Result<(), Vec<ValidationError>> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Vérifie qu'un graphe est bien formé.
///
/// Conditions :
/// - Un produit a au moins deux constituants, tous distincts
/// - Deux nœuds fusionnés ont le même type de base
pub fn validate_graph(graph: &SchemaGraph) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for node in graph.nodes() {
        if node.is_product() {
            let distinct: BTreeSet<_> = node.constituents().iter().collect();
            if node.arity() < 2 || distinct.len() != node.arity() {
                errors.push(ValidationError {
                    message: format!("Produit '{}' : constituants invalides", node),
                });
            }
        }
        for atom in node.constituents() {
            match graph.get_equivalence_class(atom) {
                Ok(class) => {
                    if let Some(other) = class.iter().find(|o| o.ty != atom.ty) {
                        errors.push(ValidationError {
                            message: format!(
                                "Blend '{}' ≡ '{}' : types {:?} et {:?} incompatibles",
                                atom, other, atom.ty, other.ty
                            ),
                        });
                    }
                }
                Err(e) => errors.push(ValidationError { message: e.to_string() }),
            }
        }
    }

    finish(errors)
}

/// Vérifie qu'un arbre de dérivation est bien formé.
///
/// Conditions :
/// - La racine a un enfant unité
/// - Clés affichées et cachées de la racine sont disjointes
/// - Deux frères n'ont jamais le même ensemble de domaines
/// - Un nœud colonne porte exactement un domaine
/// - Une clé cachée n'est affichée nulle part
/// - Aucune IR de nœud ne contient END
pub fn validate_tree(tree: &DerivationTree) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let root = tree.root();

    if !root.children.iter().any(|c| c.is_unit()) {
        errors.push(ValidationError {
            message: "La racine n'a pas d'enfant unité".into(),
        });
    }
    for k in root.hidden_keys.iter().filter(|k| root.domains.contains(k)) {
        errors.push(ValidationError {
            message: format!("La clé '{}' est à la fois affichée et cachée", k),
        });
    }

    let mut hidden: BTreeSet<&Domain> = root.hidden_keys.iter().collect();
    let mut displayed: Vec<&Domain> = Vec::new();
    check_node(root, &mut hidden, &mut displayed, &mut errors);

    for d in displayed.iter().filter(|d| hidden.contains(*d)) {
        errors.push(ValidationError {
            message: format!("La colonne '{}' est affichée mais aussi cachée", d),
        });
    }

    finish(errors)
}

fn check_node<'a>(
    node: &'a DerivationNode,
    hidden: &mut BTreeSet<&'a Domain>,
    displayed: &mut Vec<&'a Domain>,
    errors: &mut Vec<ValidationError>,
) {
    match node.kind {
        NodeKind::Column(role) => {
            if node.domains.len() != 1 {
                errors.push(ValidationError {
                    message: format!(
                        "Nœud colonne {} : exactement un domaine attendu",
                        format_list(&node.domains)
                    ),
                });
            }
            match role {
                ColumnRole::HiddenKey => hidden.extend(&node.domains),
                ColumnRole::Key | ColumnRole::Value => displayed.extend(&node.domains),
            }
        }
        NodeKind::Root | NodeKind::Intermediate => {}
    }
    hidden.extend(&node.hidden_keys);

    if node
        .intermediate_representation
        .iter()
        .any(|s| matches!(s, RepresentationStep::End { .. }))
    {
        errors.push(ValidationError {
            message: format!("Nœud {} : END dans une IR de nœud", format_list(&node.domains)),
        });
    }

    let mut siblings = BTreeSet::new();
    for child in &node.children {
        if !siblings.insert(child.domain_set()) {
            errors.push(ValidationError {
                message: format!(
                    "Nœud {} : deux enfants sur {}",
                    format_list(&node.domains),
                    format_list(&child.domains)
                ),
            });
        }
        check_node(child, hidden, displayed, errors);
    }
}
