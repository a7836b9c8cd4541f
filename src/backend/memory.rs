// =============================================================================
// BACKEND MEMORY — Un backend tabulaire entièrement en mémoire
// =============================================================================
//
// Parfait pour les tests et le prototypage : zéro base de données.
//
// Chaque arête du schéma est implémentée par une relation (liste de lignes
// dont les colonnes sont les constituants source puis cible). Insérer une
// relation enregistre aussi ses valeurs dans les domaines des nœuds.
//
// Les erreurs de données sont remontées, jamais corrigées :
//   - colonnes qui ne correspondent pas à l'arête ;
//   - clés dupliquées dans une relation fonctionnelle.
//
// =============================================================================

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::trace;

use crate::backend::Backend;
use crate::core::error::BackendError;
use crate::core::mapping::{Mapping, Slot};
use crate::core::schema::{AtomicNode, SchemaEdge};
use crate::core::table::Table;
use crate::core::typeside::Value;

#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    domains: BTreeMap<AtomicNode, BTreeSet<Value>>,
    relations: Vec<(SchemaEdge, Vec<Vec<Value>>)>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ajoute des valeurs au domaine d'un nœud
    pub fn add_domain(
        &mut self,
        node: &AtomicNode,
        values: impl IntoIterator<Item = Value>,
    ) -> &mut Self {
        self.domains
            .entry(node.clone())
            .or_default()
            .extend(values.into_iter().filter(|v| !v.is_null()));
        self
    }

    /// Les colonnes attendues pour la relation d'une arête
    pub fn relation_columns(edge: &SchemaEdge) -> Vec<String> {
        edge.from
            .constituents()
            .iter()
            .chain(edge.to.constituents())
            .map(|n| n.name.clone())
            .collect()
    }

    /// Insère une table dont les colonnes doivent être exactement celles
    /// de l'arête.
    pub fn insert_table(&mut self, edge: &SchemaEdge, table: &Table) -> Result<&mut Self, BackendError> {
        let expected = Self::relation_columns(edge);
        if table.columns != expected {
            return Err(BackendError::ColumnMismatch {
                expected,
                found: table.columns.clone(),
            });
        }
        self.insert_rows(edge, table.rows.clone())
    }

    /// Insère des lignes (constituants source puis cible) dans la relation
    /// de l'arête.
    pub fn insert_rows(
        &mut self,
        edge: &SchemaEdge,
        rows: Vec<Vec<Value>>,
    ) -> Result<&mut Self, BackendError> {
        let expected = Self::relation_columns(edge);
        if let Some(bad) = rows.iter().find(|r| r.len() != expected.len()) {
            return Err(BackendError::ColumnMismatch {
                expected,
                found: bad.iter().map(|v| v.to_string()).collect(),
            });
        }

        let position = self.relations.iter().position(|(stored, _)| stored.same_as(edge));
        let (stored_edge, mut combined) = match position {
            Some(i) => self.relations[i].clone(),
            None => (edge.clone(), Vec::new()),
        };
        let split = edge.from.arity();
        for row in rows {
            if stored_edge == *edge {
                combined.push(row);
            } else {
                // Arête stockée dans l'autre sens : on remet les colonnes
                // dans l'ordre stocké
                let mut reordered = row[split..].to_vec();
                reordered.extend_from_slice(&row[..split]);
                combined.push(reordered);
            }
        }
        let mut seen = BTreeSet::new();
        combined.retain(|r| seen.insert(r.clone()));

        check_functional(&stored_edge, &combined)?;

        let width = stored_edge.from.arity();
        let nodes: Vec<AtomicNode> = stored_edge
            .from
            .constituents()
            .iter()
            .chain(stored_edge.to.constituents())
            .cloned()
            .collect();
        for (c, node) in nodes.iter().enumerate() {
            self.add_domain(node, combined.iter().map(|r| r[c].clone()));
        }
        trace!(edge = %stored_edge, rows = combined.len(), width, "relation enregistrée");

        match position {
            Some(i) => self.relations[i] = (stored_edge, combined),
            None => self.relations.push((stored_edge, combined)),
        }
        Ok(self)
    }

    /// Les lignes de la relation, dans l'orientation de `edge`
    fn relation_for(&self, edge: &SchemaEdge) -> Result<Vec<Vec<Value>>, BackendError> {
        let (stored, rows) = self
            .relations
            .iter()
            .find(|(stored, _)| stored.same_as(edge))
            .ok_or_else(|| BackendError::UnknownRelation(edge.to_string()))?;
        if stored == edge {
            return Ok(rows.clone());
        }
        let split = stored.from.arity();
        Ok(rows
            .iter()
            .map(|r| {
                let mut reordered = r[split..].to_vec();
                reordered.extend_from_slice(&r[..split]);
                reordered
            })
            .collect())
    }
}

/// Dans le sens fonctionnel d'une arête, une clé n'a qu'une image.
fn check_functional(edge: &SchemaEdge, rows: &[Vec<Value>]) -> Result<(), BackendError> {
    let split = edge.from.arity();
    let mut directions = Vec::new();
    if edge.cardinality.is_functional() {
        directions.push((0..split, split..split + edge.to.arity()));
    }
    if edge.cardinality.invert().is_functional() {
        directions.push((split..split + edge.to.arity(), 0..split));
    }
    for (key_cols, value_cols) in directions {
        let mut images: HashMap<Vec<Value>, Vec<Value>> = HashMap::new();
        for row in rows {
            let key = row[key_cols.clone()].to_vec();
            let image = row[value_cols.clone()].to_vec();
            if let Some(previous) = images.insert(key.clone(), image.clone()) {
                if previous != image {
                    let key: Vec<String> = key.iter().map(|v| v.to_string()).collect();
                    return Err(BackendError::DuplicateKeys {
                        relation: edge.to_string(),
                        key: key.join(", "),
                    });
                }
            }
        }
    }
    Ok(())
}

impl Backend for MemoryBackend {
    fn get_domain_from_atomic_node(&self, node: &AtomicNode) -> Result<Table, BackendError> {
        let values = self
            .domains
            .get(node)
            .ok_or_else(|| BackendError::UnknownNode(node.name.clone()))?;
        Ok(Table::single_column(&node.name, values.iter().cloned()))
    }

    fn get_relation_from_mapping(
        &self,
        mapping: &Mapping,
        from_table: &Table,
    ) -> Result<Table, BackendError> {
        let relation = self.relation_for(&mapping.edge)?;

        let mut columns = from_table.columns.clone();
        columns.extend((0..mapping.to.len()).map(Table::output));
        columns.extend(mapping.hidden_keys.iter().map(|h| h.domain.name.clone()));

        let positions = (0..mapping.from.len())
            .map(|i| {
                from_table.column_index(&Table::positional(i)).ok_or_else(|| {
                    BackendError::ColumnMismatch {
                        expected: vec![Table::positional(i)],
                        found: from_table.columns.clone(),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        // (colonne de l'entrée, colonne de la relation) pour chaque source réelle
        let joins: Vec<(usize, usize)> = mapping
            .from
            .iter()
            .zip(&positions)
            .filter_map(|(port, &pos)| match port.slot {
                Slot::Base(c) => Some((pos, c)),
                Slot::Carried(_) => None,
            })
            .collect();

        let mut index: HashMap<Vec<Value>, Vec<usize>> = HashMap::new();
        for (i, row) in relation.iter().enumerate() {
            let key = joins.iter().map(|&(_, c)| row[c].clone()).collect();
            index.entry(key).or_default().push(i);
        }

        let mut rows = Vec::new();
        for input in &from_table.rows {
            let key: Vec<Value> = joins.iter().map(|&(pos, _)| input[pos].clone()).collect();
            let hits = if key.iter().any(Value::is_null) {
                None
            } else {
                index.get(&key)
            };
            let matches: Vec<Option<&Vec<Value>>> = match hits {
                Some(hits) => hits.iter().map(|&i| Some(&relation[i])).collect(),
                None => vec![None],
            };
            for rel in matches {
                let mut out = input.clone();
                for port in &mapping.to {
                    let value = match (&port.slot, rel) {
                        (Slot::Base(c), Some(r)) => r[*c].clone(),
                        (Slot::Base(_), None) => Value::Null,
                        (Slot::Carried(d), _) => mapping
                            .carried
                            .get(d)
                            .map(|&(fi, _)| input[positions[fi]].clone())
                            .unwrap_or(Value::Null),
                    };
                    out.push(value);
                }
                for hidden in &mapping.hidden_keys {
                    out.push(rel.map(|r| r[hidden.column].clone()).unwrap_or(Value::Null));
                }
                rows.push(out);
            }
        }
        Ok(Table::from_rows(columns, rows).distinct())
    }

    fn get_domain_size(&self, node: &AtomicNode) -> Result<usize, BackendError> {
        self.domains
            .get(node)
            .map(BTreeSet::len)
            .ok_or_else(|| BackendError::UnknownNode(node.name.clone()))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
