// =============================================================================
// BACKEND — Le contrat du stockage tabulaire
// =============================================================================
//
// Le cœur (module core) ne stocke aucune donnée. Il demande au backend :
//   - le domaine matérialisé d'un nœud atomique (GET) ;
//   - la relation qui implémente une arête, jointe à une table d'entrée
//     (TRV) ;
//   - la taille d'un domaine, pour compter les clés perdues.
//
// Grâce au trait Backend, on peut brancher une base en mémoire, une base
// SQL, un data frame... L'interpréteur ne voit que le trait.
//
// =============================================================================

pub mod memory;

use crate::core::error::BackendError;
use crate::core::mapping::Mapping;
use crate::core::schema::AtomicNode;
use crate::core::table::Table;

/// Trait abstrait pour tous les backends tabulaires.
///
/// Chaque appel doit être logiquement synchrone et idempotent pour une
/// entrée donnée.
pub trait Backend {
    /// Relation à une colonne des valeurs distinctes du nœud, colonne
    /// nommée d'après le nœud (`node.name`).
    fn get_domain_from_atomic_node(&self, node: &AtomicNode) -> Result<Table, BackendError>;

    /// Jointure "right" de `from_table` avec la relation de l'arête du
    /// mapping.
    ///
    /// En entrée, les positions source sont les colonnes `Table::positional(i)`.
    /// En sortie : toutes les colonnes de `from_table`, puis une colonne
    /// `Table::output(j)` par position cible, puis une colonne par clé cachée
    /// (nommée d'après son domaine). Toute ligne d'entrée est conservée : sans
    /// correspondance, les colonnes ajoutées valent NULL.
    fn get_relation_from_mapping(
        &self,
        mapping: &Mapping,
        from_table: &Table,
    ) -> Result<Table, BackendError>;

    /// Nombre de valeurs distinctes du nœud
    fn get_domain_size(&self, node: &AtomicNode) -> Result<usize, BackendError>;

    /// Retourne le nom du backend
    fn name(&self) -> &str;
}
