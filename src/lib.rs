// =============================================================================
// TABRUST — Algèbre relationnelle guidée par un schéma
// =============================================================================
//
// Tabrust calcule des tables à partir d'un graphe de schéma : on choisit
// des clés, on demande des colonnes, et le moteur trouve le chemin dans le
// graphe, l'enregistre dans un arbre de dérivation auditable, puis
// l'exécute sur une machine à pile au-dessus d'un backend de données.
//
// Architecture :
//   core/     → Le cœur pur (graphe, mappings, arbre, IR, interpréteur)
//   backend/  → Le trait Backend et un backend en mémoire
//   config    → Les réglages du moteur
//
// Concepts fondamentaux :
//   SchemaGraph    = nœuds typés + arêtes avec cardinalité + blends
//   Mapping        = une arête prête à être traversée
//   DerivationTree = comment chaque colonne se calcule
//   Schema         = graphe + backend : dérive et exécute
//
// =============================================================================

pub mod core;
pub mod backend;
pub mod config;
