// =============================================================================
// CORE — Module principal du moteur
// =============================================================================
//
// Ce module regroupe toute la logique pure : pas de stockage, pas de
// réseau. Les données viennent uniquement du trait Backend.
//
// Architecture :
//   typeside        → les types primitifs et les valeurs
//   cardinality     → l'algèbre des cardinalités (1:1, 1:N, N:1, N:M)
//   blend           → union-find des nœuds équivalents
//   schema          → le graphe de schéma et le plus court chemin
//   namespace       → noms de colonnes frais
//   mapping         → une arête transformée (curry, carry, invert...)
//   representation  → l'IR de la machine à pile
//   compile         → d'un chemin du graphe à un segment d'IR
//   derivation      → l'arbre de dérivation persistant et ses éditions
//   table           → les tables matérialisées
//   interpreter     → la machine à pile
//   validate        → la vérification de cohérence
//   query           → la façade : dériver, exécuter, garder les instantanés
//   error           → les erreurs typées
//
// =============================================================================

pub mod typeside;
pub mod cardinality;
pub mod error;
pub mod blend;
pub mod schema;
pub mod namespace;
pub mod mapping;
pub mod representation;
pub mod compile;
pub mod derivation;
pub mod table;
pub mod interpreter;
pub mod validate;
pub mod query;
