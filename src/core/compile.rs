// =============================================================================
// COMPILE — D'un plus court chemin à un segment d'IR
// =============================================================================
//
// Un chemin `name → homeworld ≡ world → sector` devient :
//
//   [STT<[name]>, TRV<name→homeworld>, TRV<world→sector>, ENT<[sector]>]
//
// À l'intérieur du crochet STT/ENT, les colonnes sont positionnelles : on
// suit seulement la liste des nœuds atomiques courants. Les blends ne
// produisent aucune instruction (les positions ne changent pas), une
// projection produit un PRJ.
//
// On accumule au passage les clés cachées des arêtes non fonctionnelles et
// la cardinalité composée de gauche à droite.
//
// =============================================================================

use super::cardinality::Cardinality;
use super::error::GraphError;
use super::mapping::Mapping;
use super::namespace::Namespace;
use super::representation::RepresentationStep;
use super::schema::{AtomicNode, Domain, PathStep, ShortestPath};

/// Un chemin compilé, prêt à être greffé dans l'arbre de dérivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPath {
    pub representation: Vec<RepresentationStep>,
    pub hidden_keys: Vec<Domain>,
    pub cardinality: Cardinality,
}

/// Compile `path` en un segment qui lit les colonnes `sources` et écrit
/// les colonnes `targets`. Les clés cachées sont nommées dans `namespace`.
pub fn compile_path(
    path: &ShortestPath,
    sources: &[Domain],
    targets: &[Domain],
    namespace: &mut Namespace,
) -> Result<CompiledPath, GraphError> {
    let mut current: Vec<AtomicNode> = path
        .nodes
        .first()
        .map(|n| n.constituents().to_vec())
        .unwrap_or_default();
    check_arity(current.len(), sources.len())?;

    let mut representation = vec![RepresentationStep::StartTraversal { domains: sources.to_vec() }];
    let mut hidden_keys = Vec::new();
    let mut cardinality = Cardinality::OneToOne;

    for step in &path.steps {
        match step {
            PathStep::Traverse(edge) => {
                check_arity(current.len(), edge.from.arity())?;
                let mapping = Mapping::new(edge.clone(), namespace);
                hidden_keys.extend(mapping.hidden_domains());
                cardinality = cardinality.compose(edge.cardinality);
                current = edge.to.constituents().to_vec();
                representation.push(RepresentationStep::Traverse { mapping });
            }
            PathStep::Project { indices, to } => {
                if indices.iter().any(|&i| i >= current.len()) {
                    return Err(GraphError::ConstituentMismatch {
                        expected: current.len(),
                        found: indices.len(),
                    });
                }
                let end = to.constituents().to_vec();
                representation.push(RepresentationStep::Project {
                    start: current.clone(),
                    end: end.clone(),
                    indices: indices.clone(),
                });
                cardinality = cardinality.compose(Cardinality::ManyToOne);
                current = end;
            }
            PathStep::Blend { .. } => {}
        }
    }

    check_arity(current.len(), targets.len())?;
    representation.push(RepresentationStep::EndTraversal { domains: targets.to_vec() });
    Ok(CompiledPath { representation, hidden_keys, cardinality })
}

fn check_arity(expected: usize, found: usize) -> Result<(), GraphError> {
    if expected == found {
        Ok(())
    } else {
        Err(GraphError::ConstituentMismatch { expected, found })
    }
}
