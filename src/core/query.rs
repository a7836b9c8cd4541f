// =============================================================================
// QUERY — Le schéma exécutable : graphe + backend + instantanés
// =============================================================================
//
// C'est la façade du moteur. Une requête typique :
//
//   1. `derive_column` : "donne-moi `sector` à partir de la clé `name`"
//        → plus court chemin dans le graphe (name → homeworld ≡ world → sector)
//        → compilation en IR  [STT<[name]>, TRV<...>, TRV<...>, ENT<[sector]>]
//        → greffe dans l'arbre de dérivation
//   2. `execute_query` : l'arbre aplati est exécuté par la machine à pile,
//      sur les données du backend.
//
// INSTANTANÉS : chaque table exécutée est gardée sous son identifiant. Une
// requête suivante peut repartir d'elle (`derived_from_table_id`) au lieu
// de tout recalculer depuis les GET : c'est ainsi qu'une édition
// incrémentale (infer, hide...) évite de rejouer tout l'historique.
//
// =============================================================================

use std::collections::HashMap;
use std::slice;

use tracing::{debug, info, instrument};

use super::compile::{compile_path, CompiledPath};
use super::derivation::{DerivationNode, DerivationTree, Inference, NodeKind};
use super::error::{Error, ExecutionError, TreeError};
use super::interpreter::{self, EndShape, Execution};
use super::namespace::Namespace;
use super::representation::RepresentationStep;
use super::schema::{format_list, Domain, SchemaGraph, SchemaNode};
use super::table::Table;
use crate::backend::Backend;
use crate::config::EngineConfig;

/// Résultat d'une requête : la table mise en forme et ce qui a été perdu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    /// Colonnes : clés affichées, clés cachées, puis valeurs
    pub table: Table,
    /// Combinaisons de clés du domaine absentes du résultat
    pub dropped_key_count: usize,
    /// Lignes retirées parce que toutes leurs valeurs étaient nulles
    pub dropped_value_count: usize,
    pub keys: Vec<Domain>,
    pub hidden: Vec<Domain>,
    pub values: Vec<Domain>,
}

impl QueryResult {
    /// La table telle qu'un utilisateur la voit : sans les clés cachées.
    pub fn visible(&self) -> Result<Table, ExecutionError> {
        let names: Vec<String> = self
            .keys
            .iter()
            .chain(&self.values)
            .map(|d| d.name.clone())
            .collect();
        Ok(self.table.select(&names)?.distinct())
    }
}

/// Un schéma exécutable.
pub struct Schema<B: Backend> {
    pub graph: SchemaGraph,
    backend: B,
    config: EngineConfig,
    snapshots: HashMap<String, Table>,
}

impl<B: Backend> Schema<B> {
    pub fn new(graph: SchemaGraph, backend: B, config: EngineConfig) -> Self {
        Schema {
            graph,
            backend,
            config,
            snapshots: HashMap::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// La table brute gardée sous `table_id`, s'il y en a une.
    pub fn snapshot(&self, table_id: &str) -> Option<&Table> {
        self.snapshots.get(table_id)
    }

    /// Plus court chemin des colonnes `from` vers les colonnes `to`,
    /// compilé en segment d'IR.
    pub fn resolve(
        &self,
        from: &[Domain],
        to: &[Domain],
        via: &[SchemaNode],
        namespace: &mut Namespace,
    ) -> Result<CompiledPath, Error> {
        let source = SchemaNode::product(from.iter().map(|d| d.node.clone()).collect());
        let target = SchemaNode::product(to.iter().map(|d| d.node.clone()).collect());
        let path = self.graph.find_shortest_path(&source, &target, via)?;
        debug!(from = %source, to = %target, len = path.len(), "chemin résolu");
        Ok(compile_path(&path, from, to, namespace)?)
    }

    /// Ajoute à l'arbre la colonne `value`, dérivée des colonnes `from`.
    ///
    /// Si `from` ne contient que des clés de la racine, la valeur est
    /// inférée sous ces clés. Sinon `from` doit désigner une seule colonne
    /// déjà présente, sous laquelle la valeur est greffée.
    pub fn derive_column(
        &self,
        tree: &DerivationTree,
        value: &Domain,
        from: &[Domain],
        via: &[SchemaNode],
    ) -> Result<DerivationTree, Error> {
        let mut namespace = tree.namespace();
        if !namespace.reserve(&value.name) {
            return Err(TreeError::AlreadyChild(value.name.clone()).into());
        }
        let compiled = self.resolve(from, slice::from_ref(value), via, &mut namespace)?;

        let root = tree.root();
        let from_keys = !from.is_empty()
            && from
                .iter()
                .all(|d| root.domains.contains(d) || root.hidden_keys.contains(d));
        if from_keys {
            let inference = Inference {
                new_hidden_keys: compiled.hidden_keys,
                ..Inference::new(
                    value.clone(),
                    from.to_vec(),
                    compiled.representation,
                    compiled.cardinality,
                )
            };
            let next = tree.infer(inference)?;
            debug!(value = %value, from = %format_list(from), "valeur inférée");
            return Ok(next);
        }

        let parent = tree
            .find_path(|n, depth| {
                depth >= 2 && n.kind != NodeKind::Intermediate && n.domains.as_slice() == from
            })
            .ok_or_else(|| TreeError::ColumnNotFound(format_list(from)))?;
        let node = DerivationNode::value(
            value.clone(),
            compiled.representation,
            compiled.hidden_keys,
            compiled.cardinality,
        );
        let next = tree.derive(&parent, node)?;
        debug!(value = %value, parent = ?parent, "valeur dérivée");
        Ok(next)
    }

    /// Exécute `program`. Avec `derived_from_table_id`, la pile de départ
    /// contient l'instantané de cette table.
    #[instrument(skip(self, program), fields(steps = program.len()))]
    pub fn execute_query(
        &mut self,
        table_id: &str,
        derived_from_table_id: Option<&str>,
        program: &[RepresentationStep],
    ) -> Result<QueryResult, Error> {
        let stack = match derived_from_table_id {
            Some(id) => {
                let base = self
                    .snapshots
                    .get(id)
                    .cloned()
                    .ok_or_else(|| ExecutionError::UnknownTable(id.to_string()))?;
                vec![base]
            }
            None => Vec::new(),
        };

        let Execution { mut stack, end } = interpreter::execute(program, &self.backend, stack)?;
        if stack.len() != 1 {
            return Err(ExecutionError::UnbalancedStack(stack.len()).into());
        }
        let raw = stack.pop().ok_or(ExecutionError::UnbalancedStack(0))?;
        if self.config.cache_snapshots {
            self.snapshots.insert(table_id.to_string(), raw.clone());
        }

        let result = match end {
            Some(shape) => self.shape(raw, shape)?,
            None => QueryResult {
                table: raw,
                dropped_key_count: 0,
                dropped_value_count: 0,
                keys: Vec::new(),
                hidden: Vec::new(),
                values: Vec::new(),
            },
        };
        info!(
            rows = result.table.len(),
            dropped_keys = result.dropped_key_count,
            dropped_values = result.dropped_value_count,
            "requête exécutée"
        );
        Ok(result)
    }

    /// Exécute le programme complet d'un arbre.
    pub fn run(&mut self, table_id: &str, tree: &DerivationTree) -> Result<QueryResult, Error> {
        self.execute_query(table_id, None, &tree.to_program())
    }

    /// Met en forme la table brute selon l'instruction END.
    fn shape(&self, raw: Table, shape: EndShape) -> Result<QueryResult, Error> {
        fn names(domains: &[Domain]) -> Vec<String> {
            domains.iter().map(|d| d.name.clone()).collect()
        }
        let key_names = names(&shape.left);
        let value_names = names(&shape.right);

        let mut table = raw;
        let mut dropped_value_count = 0;
        if self.config.drop_empty_rows && !value_names.is_empty() {
            let idx = value_names
                .iter()
                .map(|n| {
                    table
                        .column_index(n)
                        .ok_or_else(|| ExecutionError::MissingColumn(n.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let before = table.len();
            table = table.retain(|row| idx.iter().any(|&i| !row[i].is_null()));
            dropped_value_count = before - table.len();
        }

        let mut expected: usize = 1;
        for d in &shape.left {
            expected = expected.saturating_mul(self.backend.get_domain_size(&d.node)?);
        }
        let present = table.select(&key_names)?.distinct().len();
        let dropped_key_count = expected.saturating_sub(present);

        let mut ordered = key_names;
        for n in names(&shape.hidden).into_iter().chain(value_names) {
            if !ordered.contains(&n) {
                ordered.push(n);
            }
        }
        let table = table.select(&ordered)?.distinct();

        Ok(QueryResult {
            table,
            dropped_key_count,
            dropped_value_count,
            keys: shape.left,
            hidden: shape.hidden,
            values: shape.right,
        })
    }
}
