// =============================================================================
// TABLE — Les tables matérialisées manipulées par la machine à pile
// =============================================================================
//
// Une Table est une liste de colonnes nommées et des lignes de Value.
// C'est le seul type de donnée qui circule sur la pile de l'interpréteur.
//
// Pendant une traversée (entre STT et ENT), les colonnes de travail sont
// positionnelles : `#0`, `#1`... Le backend rend les colonnes d'arrivée
// d'une traversée sous les noms `#>0`, `#>1`...
//
// Les opérateurs sont ceux dont la machine et le backend mémoire ont
// besoin : produit cartésien, jointure externe complète, fusion (MERGE),
// renommage, suppression de colonnes, filtre, tri.
//
// =============================================================================

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use super::error::ExecutionError;
use super::typeside::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Table { columns, rows: Vec::new() }
    }

    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Table { columns, rows }
    }

    /// La table unité : une ligne, aucune colonne. Neutre pour le produit.
    pub fn unit() -> Self {
        Table { columns: Vec::new(), rows: vec![Vec::new()] }
    }

    pub fn single_column(name: &str, values: impl IntoIterator<Item = Value>) -> Self {
        Table {
            columns: vec![name.to_string()],
            rows: values.into_iter().map(|v| vec![v]).collect(),
        }
    }

    /// Nom de la i-ème colonne positionnelle d'une traversée
    pub fn positional(i: usize) -> String {
        format!("#{}", i)
    }

    /// Nom de la j-ème colonne d'arrivée rendue par le backend
    pub fn output(j: usize) -> String {
        format!("#>{}", j)
    }

    pub fn is_positional(name: &str) -> bool {
        name.starts_with('#')
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    fn require(&self, name: &str) -> Result<usize, ExecutionError> {
        self.column_index(name)
            .ok_or_else(|| ExecutionError::MissingColumn(name.to_string()))
    }

    pub fn column(&self, name: &str) -> Result<Vec<Value>, ExecutionError> {
        let idx = self.require(name)?;
        Ok(self.rows.iter().map(|r| r[idx].clone()).collect())
    }

    /// Les lignes sous forme d'ensemble, pour comparer sans tenir compte
    /// de l'ordre
    pub fn row_set(&self) -> BTreeSet<Vec<Value>> {
        self.rows.iter().cloned().collect()
    }

    /// Produit cartésien.
    pub fn cross_join(&self, other: &Table) -> Table {
        let mut columns = self.columns.clone();
        columns.extend(other.columns.iter().cloned());
        let mut rows = Vec::with_capacity(self.rows.len() * other.rows.len());
        for left in &self.rows {
            for right in &other.rows {
                let mut row = Vec::with_capacity(left.len() + right.len());
                row.extend(left.iter().cloned());
                row.extend(right.iter().cloned());
                rows.push(row);
            }
        }
        Table { columns, rows }
    }

    /// Jointure externe complète sur les colonnes `on`. Les lignes sans
    /// correspondance sont complétées par des NULL.
    pub fn outer_join(&self, other: &Table, on: &[String]) -> Result<Table, ExecutionError> {
        let left_keys = on.iter().map(|c| self.require(c)).collect::<Result<Vec<_>, _>>()?;
        let right_keys = on.iter().map(|c| other.require(c)).collect::<Result<Vec<_>, _>>()?;
        let right_rest: Vec<usize> = (0..other.columns.len())
            .filter(|i| !right_keys.contains(i))
            .collect();

        let mut columns = self.columns.clone();
        columns.extend(right_rest.iter().map(|&i| other.columns[i].clone()));

        let mut index: HashMap<Vec<Value>, Vec<usize>> = HashMap::new();
        for (i, row) in other.rows.iter().enumerate() {
            let key: Vec<Value> = right_keys.iter().map(|&k| row[k].clone()).collect();
            index.entry(key).or_default().push(i);
        }

        let mut rows = Vec::new();
        let mut matched: HashSet<usize> = HashSet::new();
        for left in &self.rows {
            let key: Vec<Value> = left_keys.iter().map(|&k| left[k].clone()).collect();
            match index.get(&key) {
                Some(hits) => {
                    for &hit in hits {
                        matched.insert(hit);
                        let mut row = left.clone();
                        row.extend(right_rest.iter().map(|&i| other.rows[hit][i].clone()));
                        rows.push(row);
                    }
                }
                None => {
                    let mut row = left.clone();
                    row.extend(right_rest.iter().map(|_| Value::Null));
                    rows.push(row);
                }
            }
        }
        for (i, right) in other.rows.iter().enumerate() {
            if matched.contains(&i) {
                continue;
            }
            let mut row = vec![Value::Null; self.columns.len()];
            for (&lk, &rk) in left_keys.iter().zip(&right_keys) {
                row[lk] = right[rk].clone();
            }
            row.extend(right_rest.iter().map(|&c| right[c].clone()));
            rows.push(row);
        }
        Ok(Table { columns, rows })
    }

    /// Fusion de deux tables (instruction MER) : produit cartésien si
    /// aucune colonne commune, jointure externe sur les colonnes communes
    /// sinon, puis dédoublonnage.
    pub fn merge(&self, other: &Table) -> Result<Table, ExecutionError> {
        let shared: Vec<String> = self
            .columns
            .iter()
            .filter(|c| other.has_column(c))
            .cloned()
            .collect();
        let merged = if shared.is_empty() {
            self.cross_join(other)
        } else {
            self.outer_join(other, &shared)?
        };
        Ok(merged.distinct())
    }

    /// Supprime les lignes en double (garde la première occurrence).
    pub fn distinct(&self) -> Table {
        let mut seen = HashSet::new();
        let rows = self
            .rows
            .iter()
            .filter(|r| seen.insert((*r).clone()))
            .cloned()
            .collect();
        Table { columns: self.columns.clone(), rows }
    }

    pub fn rename(&self, from: &str, to: &str) -> Result<Table, ExecutionError> {
        let idx = self.require(from)?;
        if from != to && self.has_column(to) {
            return Err(ExecutionError::DuplicateColumn(to.to_string()));
        }
        let mut next = self.clone();
        next.columns[idx] = to.to_string();
        Ok(next)
    }

    /// Ajoute une copie de la colonne `from` sous le nom `to`.
    pub fn copy_column(&self, from: &str, to: &str) -> Result<Table, ExecutionError> {
        let idx = self.require(from)?;
        if self.has_column(to) {
            return Err(ExecutionError::DuplicateColumn(to.to_string()));
        }
        let mut next = self.clone();
        next.columns.push(to.to_string());
        for row in &mut next.rows {
            let v = row[idx].clone();
            row.push(v);
        }
        Ok(next)
    }

    /// Garde les colonnes `names`, dans cet ordre (sans dédoublonner).
    pub fn select(&self, names: &[String]) -> Result<Table, ExecutionError> {
        let idx = names.iter().map(|n| self.require(n)).collect::<Result<Vec<_>, _>>()?;
        let rows = self
            .rows
            .iter()
            .map(|r| idx.iter().map(|&i| r[i].clone()).collect())
            .collect();
        Ok(Table { columns: names.to_vec(), rows })
    }

    /// Retire les colonnes `names` puis dédoublonne : c'est une projection
    /// ensembliste.
    pub fn drop_columns(&self, names: &[String]) -> Result<Table, ExecutionError> {
        for n in names {
            self.require(n)?;
        }
        let kept: Vec<String> = self
            .columns
            .iter()
            .filter(|c| !names.contains(c))
            .cloned()
            .collect();
        Ok(self.select(&kept)?.distinct())
    }

    pub fn filter_non_null(&self, name: &str) -> Result<Table, ExecutionError> {
        let idx = self.require(name)?;
        Ok(self.retain(|row| !row[idx].is_null()))
    }

    pub fn retain(&self, keep: impl Fn(&[Value]) -> bool) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|r| keep(r.as_slice())).cloned().collect(),
        }
    }

    pub fn sort_by(&self, names: &[String]) -> Result<Table, ExecutionError> {
        let idx = names.iter().map(|n| self.require(n)).collect::<Result<Vec<_>, _>>()?;
        let mut next = self.clone();
        next.rows.sort_by(|a, b| {
            idx.iter()
                .map(|&i| a[i].cmp(&b[i]))
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(next)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "| {} |", self.columns.join(" | "))?;
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            writeln!(f, "| {} |", cells.join(" | "))?;
        }
        write!(f, "({} lignes)", self.rows.len())
    }
}
