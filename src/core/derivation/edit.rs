// =============================================================================
// EDIT — Les éditions de l'arbre de dérivation
// =============================================================================
//
// Chaque édition prend `&self` et rend un nouvel arbre. Les sous-arbres non
// touchés sont partagés avec l'ancien.
//
//   insert_key   ajoute un point de passage (un ensemble de clés)
//   derive       greffe un nœud sous un parent donné
//   infer        greffe une valeur calculée depuis des clés fortes
//   hide / show  cache ou affiche une colonne
//   compose      substitue des clés à une clé de la racine
//   equate       identifie deux clés de la racine
//   invert_path  échange une clé et une valeur dérivée
//
// CACHER UNE CLÉ : la clé passe dans les clés cachées de la racine, et les
// enfants de la racine qui ne diffèrent plus que par des clés cachées
// fusionnent. AFFICHER la refait sortir, avec les enfants qui en dépendent.
// show(hide(k)) redonne un arbre structurellement égal.
//
// =============================================================================

use std::collections::BTreeSet;
use std::slice;
use std::sync::Arc;

use super::{push_unique, ColumnRole, DerivationNode, DerivationTree, NodeKind};
use crate::core::cardinality::Cardinality;
use crate::core::error::TreeError;
use crate::core::namespace::Namespace;
use crate::core::representation::{format_program, RepresentationStep};
use crate::core::schema::{format_list, Domain};

/// Un chemin vers des colonnes intermédiaires, partagées entre les clés
/// fortes et la valeur.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntermediatePath {
    pub domains: Vec<Domain>,
    pub representation: Vec<RepresentationStep>,
}

/// Tout ce qu'il faut pour greffer une valeur calculée.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inference {
    pub value: Domain,
    pub strong_keys: Vec<Domain>,
    /// Clés cachées héritées des chemins intermédiaires
    pub old_hidden_keys: Vec<Domain>,
    /// Clés cachées introduites par le dernier segment
    pub new_hidden_keys: Vec<Domain>,
    pub intermediates: Vec<IntermediatePath>,
    pub cardinality: Cardinality,
    pub representation: Vec<RepresentationStep>,
}

impl Inference {
    pub fn new(
        value: Domain,
        strong_keys: Vec<Domain>,
        representation: Vec<RepresentationStep>,
        cardinality: Cardinality,
    ) -> Self {
        Inference {
            value,
            strong_keys,
            old_hidden_keys: Vec::new(),
            new_hidden_keys: Vec::new(),
            intermediates: Vec::new(),
            cardinality,
            representation,
        }
    }
}

fn get(domains: Vec<Domain>) -> RepresentationStep {
    RepresentationStep::Get { domains }
}

fn concat(a: &[Domain], b: &[Domain]) -> Vec<Domain> {
    a.iter().chain(b).cloned().collect()
}

fn without(list: &[Domain], removed: &Domain) -> Vec<Domain> {
    list.iter().filter(|d| *d != removed).cloned().collect()
}

fn is_single(node: &DerivationNode, domain: &Domain) -> bool {
    node.domains.as_slice() == slice::from_ref(domain)
}

/// L'IR du nœud lit-elle la colonne `key` ?
fn depends_on(node: &DerivationNode, key: &Domain) -> bool {
    node.hidden_keys.contains(key)
        || node.intermediate_representation.iter().any(|s| s.references(key))
}

fn check_siblings(children: &[Arc<DerivationNode>]) -> Result<(), TreeError> {
    let mut seen = BTreeSet::new();
    for child in children {
        if !seen.insert(child.domain_set()) {
            return Err(TreeError::AlreadyChild(format_list(&child.domains)));
        }
    }
    Ok(())
}

/// Plusieurs chemins intermédiaires se combinent dans un cadre : le premier
/// tel quel, les suivants repartent de la table du cadre puis fusionnent.
fn intermediate_program(paths: &[IntermediatePath]) -> Vec<RepresentationStep> {
    match paths {
        [only] => only.representation.clone(),
        [first, rest @ ..] => {
            let mut program = vec![RepresentationStep::Call];
            program.extend(first.representation.iter().cloned());
            for path in rest {
                program.push(RepresentationStep::Reset);
                program.extend(path.representation.iter().cloned());
                program.push(RepresentationStep::Merge);
            }
            program.push(RepresentationStep::Return);
            program
        }
        [] => Vec::new(),
    }
}

/// Fusionne les enfants de la racine qui partagent les mêmes clés visibles.
fn merge_group(
    visible: &BTreeSet<Domain>,
    members: Vec<DerivationNode>,
    hidden: &BTreeSet<Domain>,
) -> Result<DerivationNode, TreeError> {
    if let [single] = members.as_slice() {
        if single.domains.iter().all(|d| !hidden.contains(d)) {
            return Ok(single.clone());
        }
    }
    let anchor = members
        .iter()
        .find(|m| m.domain_set() == *visible)
        .unwrap_or(&members[0]);
    let domains: Vec<Domain> = anchor
        .domains
        .iter()
        .filter(|d| !hidden.contains(*d))
        .cloned()
        .collect();

    let mut hidden_keys = Vec::new();
    for member in &members {
        push_unique(&mut hidden_keys, &member.hidden_keys);
        let now_hidden: Vec<Domain> = member
            .domains
            .iter()
            .filter(|d| hidden.contains(*d))
            .cloned()
            .collect();
        push_unique(&mut hidden_keys, &now_hidden);
    }

    let kind = match anchor.kind {
        NodeKind::Column(role) if domains.len() == 1 && anchor.domain_set() == *visible => {
            NodeKind::Column(role)
        }
        _ => NodeKind::Intermediate,
    };

    let children: Vec<Arc<DerivationNode>> = members
        .iter()
        .flat_map(|m| m.children.iter().cloned())
        .collect();
    check_siblings(&children)?;

    Ok(DerivationNode {
        kind,
        intermediate_representation: vec![get(concat(&domains, &hidden_keys))],
        domains,
        hidden_keys,
        cardinality: anchor.cardinality,
        children,
    })
}

/// `[STT<src>, ..., ENT<dst>]` devient `[STT<dst>, inverses..., ENT<src>]`.
fn invert_segment(
    segment: &[RepresentationStep],
    namespace: &mut Namespace,
) -> Result<(Vec<RepresentationStep>, Vec<Domain>), TreeError> {
    match segment {
        [RepresentationStep::StartTraversal { domains: sources }, middle @ .., RepresentationStep::EndTraversal { domains: targets }] =>
        {
            let mut steps = vec![RepresentationStep::StartTraversal { domains: targets.clone() }];
            let mut hidden = Vec::new();
            for step in middle.iter().rev() {
                if matches!(
                    step,
                    RepresentationStep::StartTraversal { .. } | RepresentationStep::EndTraversal { .. }
                ) {
                    return Err(TreeError::NotInvertible(format_program(segment)));
                }
                let inverse = step.invert(namespace)?;
                hidden.extend(inverse.introduced_hidden_keys());
                steps.push(inverse);
            }
            steps.push(RepresentationStep::EndTraversal { domains: sources.clone() });
            Ok((steps, hidden))
        }
        _ => Err(TreeError::NotInvertible(format_program(segment))),
    }
}

impl DerivationTree {
    /// Garantit un enfant de la racine sur exactement `domains`.
    /// Idempotent.
    pub fn insert_key(&self, domains: &[Domain]) -> Result<DerivationTree, TreeError> {
        let root = self.root();
        let mut seen = BTreeSet::new();
        for d in domains {
            if !root.domains.contains(d) && !root.hidden_keys.contains(d) {
                return Err(TreeError::KeyNotFound(d.name.clone()));
            }
            if !seen.insert(d) {
                return Err(TreeError::KeysNotUnique(d.name.clone()));
            }
        }
        if self.key_path(domains).is_some() {
            return Ok(self.clone());
        }

        // Un point de passage plus large : on le relit, puis on projette.
        let wider = root
            .children
            .iter()
            .find(|c| c.domains.len() > domains.len() && c.domains.starts_with(domains));
        let representation = match wider {
            Some(w) => vec![
                get(w.domains.clone()),
                RepresentationStep::Drop { domains: w.domains[domains.len()..].to_vec() },
            ],
            None => vec![get(domains.to_vec())],
        };
        let kind = match domains {
            [single] if root.domains.contains(single) => NodeKind::Column(ColumnRole::Key),
            _ => NodeKind::Intermediate,
        };
        let node = DerivationNode::new(
            kind,
            domains.to_vec(),
            representation,
            Vec::new(),
            Cardinality::OneToOne,
        );
        self.update_at(&[], |root| root.add_child(node))
    }

    /// Greffe `node` sous le nœud en `parent`.
    pub fn derive(&self, parent: &[usize], node: DerivationNode) -> Result<DerivationTree, TreeError> {
        self.update_at(parent, |p| p.add_child(node))
    }

    pub fn infer(&self, inference: Inference) -> Result<DerivationTree, TreeError> {
        let Inference {
            value,
            strong_keys,
            old_hidden_keys,
            new_hidden_keys,
            intermediates,
            cardinality,
            representation,
        } = inference;

        if self.namespace().contains(&value.name) {
            return Err(TreeError::AlreadyChild(value.name));
        }
        if !old_hidden_keys.is_empty() && intermediates.is_empty() {
            return Err(TreeError::MissingIntermediate);
        }

        let mut tree = self.insert_key(&strong_keys)?;
        let mut parent = tree
            .key_path(&strong_keys)
            .ok_or_else(|| TreeError::KeyNotFound(format_list(&strong_keys)))?;

        if !intermediates.is_empty() {
            let mut domains = Vec::new();
            for path in &intermediates {
                push_unique(&mut domains, &path.domains);
            }
            let anchor = tree.node_at(&parent)?;
            match anchor.child_index(&domains) {
                Some(i) if anchor.children[i].kind == NodeKind::Intermediate => parent.push(i),
                Some(_) => return Err(TreeError::AlreadyChild(format_list(&domains))),
                None => {
                    let index = anchor.children.len();
                    let intermediate_cardinality = if old_hidden_keys.is_empty() {
                        Cardinality::ManyToOne
                    } else {
                        Cardinality::ManyToMany
                    };
                    let node = DerivationNode::new(
                        NodeKind::Intermediate,
                        domains,
                        intermediate_program(&intermediates),
                        old_hidden_keys,
                        intermediate_cardinality,
                    );
                    tree = tree.derive(&parent, node)?;
                    parent.push(index);
                }
            }
        }

        let node = DerivationNode::value(value, representation, new_hidden_keys, cardinality);
        tree.derive(&parent, node)
    }

    // -------------------------------------------------------------------------
    // Cacher, afficher
    // -------------------------------------------------------------------------

    pub fn hide(&self, column: &Domain) -> Result<DerivationTree, TreeError> {
        if self.root().domains.contains(column) {
            return self.hide_key(column);
        }
        let surfaced = self.find_path(|n, depth| {
            depth >= 2 && n.is_column(ColumnRole::Key) && is_single(n, column)
        });
        if let Some(path) = surfaced {
            return self.retag(&path, NodeKind::Column(ColumnRole::HiddenKey));
        }
        if let Some(path) = self.find_column(column, ColumnRole::Value) {
            if self.node_at(&path)?.children.is_empty() {
                return self.remove(&path);
            }
            return self.retag(&path, NodeKind::Intermediate);
        }
        Err(TreeError::ColumnNotFound(column.name.clone()))
    }

    pub fn show(&self, column: &Domain) -> Result<DerivationTree, TreeError> {
        if self.root().hidden_keys.contains(column) {
            return self.show_key(column);
        }
        let hidden_column = self.find_path(|n, depth| {
            depth >= 2 && n.is_column(ColumnRole::HiddenKey) && is_single(n, column)
        });
        if let Some(path) = hidden_column {
            return self.retag(&path, NodeKind::Column(ColumnRole::Key));
        }
        let intermediate = self.find_path(|n, depth| {
            depth >= 1 && n.kind == NodeKind::Intermediate && is_single(n, column)
        });
        if let Some(path) = intermediate {
            return self.retag(&path, NodeKind::Column(ColumnRole::Value));
        }
        if let Some(path) = self.find_path(|n, depth| depth >= 2 && n.hidden_keys.contains(column)) {
            // Une clé cachée de traversée remonte comme colonne clé.
            return self.update_at(&path, |n| {
                let mut next = n.clone();
                next.hidden_keys = without(&n.hidden_keys, column);
                next.add_child(DerivationNode::new(
                    NodeKind::Column(ColumnRole::Key),
                    vec![column.clone()],
                    Vec::new(),
                    Vec::new(),
                    Cardinality::OneToOne,
                ))
            });
        }
        Err(TreeError::ColumnNotFound(column.name.clone()))
    }

    fn retag(&self, path: &[usize], kind: NodeKind) -> Result<DerivationTree, TreeError> {
        self.update_at(path, |n| {
            let mut next = n.clone();
            next.kind = kind;
            Ok(next)
        })
    }

    fn remove(&self, path: &[usize]) -> Result<DerivationTree, TreeError> {
        let (&index, parent) = path
            .split_last()
            .ok_or_else(|| TreeError::InvalidPath(path.to_vec()))?;
        self.update_at(parent, |p| {
            let mut next = p.clone();
            next.children.remove(index);
            Ok(next)
        })
    }

    fn hide_key(&self, key: &Domain) -> Result<DerivationTree, TreeError> {
        let root = self.root();
        let mut hidden_keys = root.hidden_keys.clone();
        hidden_keys.push(key.clone());
        let hidden: BTreeSet<Domain> = hidden_keys.iter().cloned().collect();

        let mut groups: Vec<(BTreeSet<Domain>, Vec<DerivationNode>)> = Vec::new();
        for child in &root.children {
            let mut child = (**child).clone();
            if child.is_column(ColumnRole::Key) && is_single(&child, key) {
                child.kind = NodeKind::Column(ColumnRole::HiddenKey);
            }
            let visible: BTreeSet<Domain> = child
                .domains
                .iter()
                .filter(|d| !hidden.contains(*d))
                .cloned()
                .collect();
            match groups.iter_mut().find(|(v, _)| *v == visible) {
                Some((_, members)) => members.push(child),
                None => groups.push((visible, vec![child])),
            }
        }

        let mut children = Vec::new();
        for (visible, members) in groups {
            children.push(Arc::new(merge_group(&visible, members, &hidden)?));
        }

        let mut next = root.clone();
        next.domains = without(&root.domains, key);
        next.hidden_keys = hidden_keys;
        next.children = children;
        Ok(DerivationTree::from_root(next))
    }

    fn show_key(&self, key: &Domain) -> Result<DerivationTree, TreeError> {
        let root = self.root();
        let mut kept = Vec::new();
        let mut surfaced = Vec::new();

        for child in &root.children {
            if !child.hidden_keys.contains(key) {
                kept.push(Arc::clone(child));
                continue;
            }
            let rest = without(&child.hidden_keys, key);
            let (dependent, independent): (Vec<_>, Vec<_>) = child
                .children
                .iter()
                .cloned()
                .partition(|c| depends_on(c, key));

            let mut remaining = (**child).clone();
            remaining.intermediate_representation = vec![get(concat(&child.domains, &rest))];
            remaining.hidden_keys = rest.clone();
            remaining.children = independent;
            if remaining.is_unit()
                || remaining.is_column(ColumnRole::Key)
                || !remaining.children.is_empty()
            {
                kept.push(Arc::new(remaining));
            }

            let domains = concat(&child.domains, slice::from_ref(key));
            let kind = if child.domains.is_empty() {
                NodeKind::Column(ColumnRole::Key)
            } else {
                NodeKind::Intermediate
            };
            let mut node = DerivationNode::new(
                kind,
                domains.clone(),
                vec![get(concat(&domains, &rest))],
                rest,
                Cardinality::OneToOne,
            );
            node.children = dependent;
            if kind == NodeKind::Column(ColumnRole::Key) || !node.children.is_empty() {
                surfaced.push(Arc::new(node));
            }
        }

        kept.extend(surfaced);
        if !kept.iter().any(|c| is_single(c, key)) {
            kept.push(Arc::new(DerivationNode::key(key.clone())));
        }
        check_siblings(&kept)?;

        let mut next = root.clone();
        next.domains.push(key.clone());
        next.hidden_keys = without(&root.hidden_keys, key);
        next.children = kept;
        Ok(DerivationTree::from_root(next))
    }

    // -------------------------------------------------------------------------
    // Algèbre des clés
    // -------------------------------------------------------------------------

    /// Remplace la clé `old_key` par `new_keys`. Tout ce qui dérivait de
    /// `old_key` passe sous un nœud intermédiaire qui la recalcule avec
    /// `representation`.
    pub fn compose(
        &self,
        new_keys: &[Domain],
        old_key: &Domain,
        hidden_keys: Vec<Domain>,
        representation: Vec<RepresentationStep>,
        cardinality: Cardinality,
    ) -> Result<DerivationTree, TreeError> {
        let root = self.root();
        let position = root
            .domains
            .iter()
            .position(|d| d == old_key)
            .ok_or_else(|| TreeError::NotAKey(old_key.name.clone()))?;
        let old_index = root
            .child_index(slice::from_ref(old_key))
            .ok_or_else(|| TreeError::KeyNotFound(old_key.name.clone()))?;
        let in_use = root.children.iter().enumerate().any(|(i, c)| {
            i != old_index && (c.domains.contains(old_key) || c.hidden_keys.contains(old_key))
        });
        if in_use {
            return Err(TreeError::KeyInUse(old_key.name.clone()));
        }

        let fresh: Vec<Domain> = new_keys
            .iter()
            .filter(|k| !root.domains.contains(k) && !root.hidden_keys.contains(k))
            .cloned()
            .collect();
        let mut domains = root.domains.clone();
        domains.splice(position..position + 1, fresh.iter().cloned());

        let mut children: Vec<Arc<DerivationNode>> = root
            .children
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != old_index)
            .map(|(_, c)| Arc::clone(c))
            .collect();
        for k in &fresh {
            if !children.iter().any(|c| is_single(c, k)) {
                children.push(Arc::new(DerivationNode::key(k.clone())));
            }
        }

        let mut next = root.clone();
        next.domains = domains;
        next.children = children;
        let tree = DerivationTree::from_root(next).insert_key(new_keys)?;
        let anchor = tree
            .key_path(new_keys)
            .ok_or_else(|| TreeError::KeyNotFound(format_list(new_keys)))?;

        let mut moved = DerivationNode::new(
            NodeKind::Intermediate,
            vec![old_key.clone()],
            representation,
            hidden_keys,
            cardinality,
        );
        moved.children = root.children[old_index].children.clone();
        tree.derive(&anchor, moved)
    }

    /// Identifie `key2` à `key1` : `key2` disparaît de la racine, et ce qui
    /// en dépendait la recopie depuis `key1`.
    pub fn equate(&self, key1: &Domain, key2: &Domain) -> Result<DerivationTree, TreeError> {
        if key1 == key2 {
            return Ok(self.clone());
        }
        let root = self.root();
        for k in [key1, key2] {
            if !root.domains.contains(k) && !root.hidden_keys.contains(k) {
                return Err(TreeError::NotAKey(k.name.clone()));
            }
        }

        let prelude = vec![
            RepresentationStep::Equate { left: key1.clone(), right: key2.clone() },
            RepresentationStep::StartTraversal { domains: vec![key1.clone()] },
            RepresentationStep::EndTraversal { domains: vec![key2.clone()] },
        ];
        let splice = |node: &DerivationNode| {
            let mut next = node.clone();
            next.intermediate_representation = prelude
                .iter()
                .chain(&node.intermediate_representation)
                .cloned()
                .chain([RepresentationStep::Drop { domains: vec![key2.clone()] }])
                .collect();
            Arc::new(next)
        };

        let mut moved = Vec::new();
        let mut children = Vec::new();
        for child in &root.children {
            if is_single(child, key2) {
                moved.extend(child.children.iter().map(|c| splice(&**c)));
            } else if child.hidden_keys.contains(key2) {
                let mut next = (**child).clone();
                next.children.clear();
                for c in &child.children {
                    if depends_on(c, key2) {
                        moved.push(splice(&**c));
                    } else {
                        next.children.push(Arc::clone(c));
                    }
                }
                next.hidden_keys = without(&child.hidden_keys, key2);
                next.intermediate_representation =
                    vec![get(concat(&next.domains, &next.hidden_keys))];
                children.push(Arc::new(next));
            } else if child.domains.contains(key2) {
                let mut fetched = Vec::new();
                for d in &child.domains {
                    let d = if d == key2 { key1 } else { d };
                    push_unique(&mut fetched, slice::from_ref(d));
                }
                push_unique(&mut fetched, &child.hidden_keys);
                let mut next = (**child).clone();
                next.intermediate_representation = vec![
                    get(fetched),
                    RepresentationStep::StartTraversal { domains: vec![key1.clone()] },
                    RepresentationStep::EndTraversal { domains: vec![key2.clone()] },
                ];
                children.push(Arc::new(next));
            } else {
                children.push(Arc::clone(child));
            }
        }

        let anchor = children
            .iter()
            .position(|c| is_single(c, key1))
            .or_else(|| {
                children
                    .iter()
                    .position(|c| c.domains.is_empty() && c.hidden_keys.contains(key1))
            })
            .ok_or_else(|| TreeError::KeyNotFound(key1.name.clone()))?;
        let mut target = (*children[anchor]).clone();
        for m in moved {
            if target.child_index(&m.domains).is_some() {
                return Err(TreeError::AlreadyChild(format_list(&m.domains)));
            }
            target.children.push(m);
        }
        children[anchor] = Arc::new(target);

        let mut next = root.clone();
        next.domains = without(&root.domains, key2);
        next.hidden_keys = without(&root.hidden_keys, key2);
        next.children = children;
        Ok(DerivationTree::from_root(next))
    }

    /// Inverse le chemin racine → `path` : la valeur en bout de chemin
    /// devient la clé, l'ancienne clé devient une valeur N:M.
    pub fn invert_path(&self, path: &[usize]) -> Result<DerivationTree, TreeError> {
        if path.len() < 2 {
            return Err(TreeError::PathDoesNotDiverge(path.to_vec()));
        }
        let root = self.root();
        let chain: Vec<&DerivationNode> = (1..=path.len())
            .map(|depth| self.node_at(&path[..depth]))
            .collect::<Result<_, _>>()?;

        let head = chain[0];
        let old_key = match head.domains.as_slice() {
            [k] if head.is_column(ColumnRole::Key) && root.domains.contains(k) => k.clone(),
            _ => return Err(TreeError::NotAKey(format_list(&head.domains))),
        };
        let leaf = chain[chain.len() - 1];
        let new_key = match leaf.domains.as_slice() {
            [v] if leaf.is_column(ColumnRole::Value) => v.clone(),
            _ => return Err(TreeError::NotInvertible(format_list(&leaf.domains))),
        };
        if root.domains.contains(&new_key) || root.hidden_keys.contains(&new_key) {
            return Err(TreeError::KeysNotUnique(new_key.name.clone()));
        }

        let mut namespace = self.namespace();
        let inverted = chain[1..]
            .iter()
            .map(|n| invert_segment(&n.intermediate_representation, &mut namespace))
            .collect::<Result<Vec<_>, _>>()?;

        // Reconstruit le chemin à l'envers, de l'ancienne clé vers la nouvelle.
        let mut below: Option<DerivationNode> = None;
        for (i, (node, (representation, hidden_keys))) in
            chain.iter().zip(inverted).enumerate()
        {
            let (kind, cardinality) = if i == 0 {
                (NodeKind::Column(ColumnRole::Value), Cardinality::ManyToMany)
            } else {
                (node.kind, chain[i + 1].cardinality.invert())
            };
            let mut rebuilt =
                DerivationNode::new(kind, node.domains.clone(), representation, hidden_keys, cardinality);
            rebuilt.children = node
                .children
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != path[i + 1])
                .map(|(_, c)| Arc::clone(c))
                .collect();
            if let Some(b) = below.take() {
                rebuilt.children.push(Arc::new(b));
            }
            below = Some(rebuilt);
        }

        let mut key = DerivationNode::key(new_key.clone());
        key.children = leaf.children.clone();
        if let Some(b) = below {
            key.children.push(Arc::new(b));
        }
        check_siblings(&key.children)?;

        let mut next = root.clone();
        next.domains = root
            .domains
            .iter()
            .map(|d| if *d == old_key { new_key.clone() } else { d.clone() })
            .collect();
        next.children[path[0]] = Arc::new(key);
        check_siblings(&next.children)?;
        Ok(DerivationTree::from_root(next))
    }
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::derivation::tests::{fixture, traverse};
    use crate::core::schema::AtomicNode;

    fn d(name: &str, node: &str) -> Domain {
        Domain::new(name, AtomicNode::string(node))
    }

    fn two_keys() -> DerivationTree {
        let a = d("a", "u");
        let k = d("k", "x");
        let b = d("b", "v");
        let c = d("c", "w");
        DerivationTree::new(vec![a.clone(), k.clone()])
            .unwrap()
            .derive(&[1], DerivationNode::value(b.clone(), traverse(&a, ("u", "v"), &b), vec![], Cardinality::ManyToOne))
            .unwrap()
            .derive(&[2], DerivationNode::value(c.clone(), traverse(&k, ("x", "w"), &c), vec![], Cardinality::ManyToOne))
            .unwrap()
    }

    #[test]
    fn test_insert_key() {
        let a = d("a", "u");
        let b = d("b", "v");
        let c = d("c", "w");
        let tree = DerivationTree::new(vec![a.clone(), b.clone(), c.clone()]).unwrap();

        let wide = tree.insert_key(&[a.clone(), b.clone(), c.clone()]).unwrap();
        assert_eq!(wide.root().children.len(), 5);
        assert_eq!(wide.insert_key(&[a.clone(), b.clone(), c.clone()]).unwrap(), wide);
        assert_eq!(tree.insert_key(&[a.clone()]).unwrap(), tree);

        let narrow = wide.insert_key(&[a.clone(), b.clone()]).unwrap();
        let node = narrow.node_at(&[5]).unwrap();
        assert_eq!(node.kind, NodeKind::Intermediate);
        assert_eq!(
            format_program(&node.intermediate_representation),
            "[GET<[a, b, c]>, DRP<[c]>]"
        );

        assert_eq!(
            tree.insert_key(&[d("z", "u")]).unwrap_err(),
            TreeError::KeyNotFound("z".into())
        );
    }

    #[test]
    fn test_infer_value() {
        let a = d("a", "u");
        let b = d("b", "v");
        let tree = DerivationTree::new(vec![a.clone()]).unwrap();
        let inference = Inference::new(b.clone(), vec![a.clone()], traverse(&a, ("u", "v"), &b), Cardinality::ManyToOne);
        let tree = tree.infer(inference.clone()).unwrap();
        assert_eq!(tree.node_at(&[1, 0]).unwrap().domains, vec![b.clone()]);
        assert_eq!(tree.infer(inference).unwrap_err(), TreeError::AlreadyChild("b".into()));
    }

    #[test]
    fn test_infer_with_waypoint_and_intermediate() {
        let tree = two_keys();
        let a = d("a", "u");
        let k = d("k", "x");
        let e = d("e", "y");
        let m = d("m", "z");
        let h = d("h", "z");

        let waypoint = Inference::new(e.clone(), vec![a.clone(), k.clone()], traverse(&a, ("u", "y"), &e), Cardinality::ManyToOne);
        let tree2 = tree.infer(waypoint).unwrap();
        assert_eq!(tree2.node_at(&[3]).unwrap().domains, vec![a.clone(), k.clone()]);
        assert_eq!(tree2.node_at(&[3, 0]).unwrap().domains, vec![e.clone()]);

        let missing = Inference {
            old_hidden_keys: vec![h.clone()],
            ..Inference::new(e.clone(), vec![a.clone()], traverse(&m, ("z", "y"), &e), Cardinality::ManyToMany)
        };
        assert_eq!(tree.infer(missing.clone()).unwrap_err(), TreeError::MissingIntermediate);

        let with_intermediate = Inference {
            intermediates: vec![IntermediatePath {
                domains: vec![m.clone()],
                representation: traverse(&a, ("u", "z"), &m),
            }],
            ..missing
        };
        let tree3 = tree.infer(with_intermediate).unwrap();
        let inter = tree3.node_at(&[1, 1]).unwrap();
        assert_eq!(inter.kind, NodeKind::Intermediate);
        assert_eq!(inter.hidden_keys, vec![h]);
        assert_eq!(tree3.node_at(&[1, 1, 0]).unwrap().domains, vec![e]);
    }

    #[test]
    fn test_hide_then_show_key_restores_tree() {
        let tree = two_keys();
        let k = d("k", "x");

        let hidden = tree.hide(&k).unwrap();
        assert_eq!(hidden.keys(), &[d("a", "u")]);
        assert_eq!(hidden.hidden_keys(), &[k.clone()]);
        assert_eq!(hidden.root().children.len(), 2);
        let merged = hidden.node_at(&[0]).unwrap();
        assert!(merged.domains.is_empty());
        assert_eq!(merged.hidden_keys, vec![k.clone()]);
        assert_eq!(format_program(&merged.intermediate_representation), "[GET<[k]>]");
        println!("{}", hidden);

        let shown = hidden.show(&k).unwrap();
        assert!(shown.structurally_eq(&tree));
        assert_eq!(shown.to_program(), tree.to_program());
    }

    #[test]
    fn test_hide_and_show_values() {
        let tree = fixture();
        let b = d("b", "v");
        let c = d("c", "w");

        let without_c = tree.hide(&c).unwrap();
        assert_eq!(without_c.node_at(&[1]).unwrap().children.len(), 1);

        let e = d("e", "y");
        let tree = tree
            .derive(&[1, 0], DerivationNode::value(e.clone(), traverse(&b, ("v", "y"), &e), vec![], Cardinality::ManyToOne))
            .unwrap();
        let hidden_b = tree.hide(&b).unwrap();
        let node = hidden_b.node_at(&[1, 0]).unwrap();
        assert_eq!(node.kind, NodeKind::Intermediate);
        assert_eq!(
            node.to_intermediate_representation().last(),
            Some(&RepresentationStep::Drop { domains: vec![b.clone()] })
        );
        assert_eq!(hidden_b.show(&b).unwrap(), tree);

        assert_eq!(
            tree.hide(&d("zz", "u")).unwrap_err(),
            TreeError::ColumnNotFound("zz".into())
        );
    }

    #[test]
    fn test_show_traversal_hidden_key() {
        let a = d("a", "u");
        let b = d("b", "v");
        let h = d("h", "v");
        let tree = DerivationTree::new(vec![a.clone()])
            .unwrap()
            .derive(&[1], DerivationNode::value(b.clone(), traverse(&a, ("u", "v"), &b), vec![h.clone()], Cardinality::ManyToMany))
            .unwrap();

        let shown = tree.show(&h).unwrap();
        assert!(shown.node_at(&[1, 0]).unwrap().hidden_keys.is_empty());
        assert!(shown.node_at(&[1, 0, 0]).unwrap().is_column(ColumnRole::Key));
        match shown.end_step() {
            RepresentationStep::End { left, hidden, .. } => {
                assert_eq!(left, vec![a.clone(), h.clone()]);
                assert!(hidden.is_empty());
            }
            other => panic!("END attendu, obtenu {}", other),
        }

        let rehidden = shown.hide(&h).unwrap();
        assert!(rehidden.node_at(&[1, 0, 0]).unwrap().is_column(ColumnRole::HiddenKey));
        assert_eq!(rehidden.show(&h).unwrap(), shown);
    }

    #[test]
    fn test_compose() {
        let a = d("a", "u");
        let b = d("b", "v");
        let n = d("n", "y");
        let tree = DerivationTree::new(vec![a.clone()])
            .unwrap()
            .derive(&[1], DerivationNode::value(b.clone(), traverse(&a, ("u", "v"), &b), vec![], Cardinality::ManyToOne))
            .unwrap();

        let composed = tree
            .compose(&[n.clone()], &a, vec![], traverse(&n, ("y", "u"), &a), Cardinality::ManyToOne)
            .unwrap();
        assert_eq!(composed.keys(), &[n.clone()]);
        assert_eq!(composed.node_at(&[1, 0]).unwrap().kind, NodeKind::Intermediate);
        assert_eq!(
            format_program(&composed.node_at(&[1]).unwrap().to_intermediate_representation()),
            "[GET<[n]>, STT<[n]>, TRV<y→u>, ENT<[a]>, STT<[a]>, TRV<u→v>, ENT<[b]>, DRP<[a]>]"
        );

        assert_eq!(
            tree.compose(&[n.clone()], &b, vec![], vec![], Cardinality::OneToOne).unwrap_err(),
            TreeError::NotAKey("b".into())
        );

        let k = d("k", "x");
        let busy = DerivationTree::new(vec![a.clone(), k.clone()])
            .unwrap()
            .insert_key(&[a.clone(), k])
            .unwrap();
        assert_eq!(
            busy.compose(&[n], &a, vec![], vec![], Cardinality::OneToOne).unwrap_err(),
            TreeError::KeyInUse("a".into())
        );
    }

    #[test]
    fn test_equate() {
        let a = d("a", "u");
        let a2 = d("a2", "u");
        let b = d("b", "v");
        let tree = DerivationTree::new(vec![a.clone(), a2.clone()])
            .unwrap()
            .derive(&[2], DerivationNode::value(b.clone(), traverse(&a2, ("u", "v"), &b), vec![], Cardinality::ManyToOne))
            .unwrap();

        let equated = tree.equate(&a, &a2).unwrap();
        assert_eq!(equated.keys(), &[a.clone()]);
        assert_eq!(equated.root().children.len(), 2);
        let moved = equated.node_at(&[1, 0]).unwrap();
        assert_eq!(
            format_program(&moved.intermediate_representation),
            "[EQT<a=a2>, STT<[a]>, ENT<[a2]>, STT<[a2]>, TRV<u→v>, ENT<[b]>, DRP<[a2]>]"
        );
        assert_eq!(tree.equate(&a, &a).unwrap(), tree);
        assert_eq!(
            tree.equate(&a, &d("zz", "u")).unwrap_err(),
            TreeError::NotAKey("zz".into())
        );
    }

    #[test]
    fn test_invert_path() {
        let person = d("person", "person");
        let city = d("city", "city");
        let tree = DerivationTree::new(vec![person.clone()])
            .unwrap()
            .derive(&[1], DerivationNode::value(city.clone(), traverse(&person, ("person", "city"), &city), vec![], Cardinality::ManyToOne))
            .unwrap();

        let inverted = tree.invert_path(&[1, 0]).unwrap();
        assert_eq!(inverted.keys(), &[city.clone()]);
        let key = inverted.node_at(&[1]).unwrap();
        assert!(key.is_column(ColumnRole::Key));
        let former = inverted.node_at(&[1, 0]).unwrap();
        assert!(former.is_column(ColumnRole::Value));
        assert_eq!(former.cardinality, Cardinality::ManyToMany);
        assert_eq!(
            format_program(&former.intermediate_representation),
            "[STT<[city]>, TRV<city→person>, ENT<[person]>]"
        );
        assert_eq!(former.hidden_keys, vec![d("person_1", "person")]);

        assert_eq!(
            tree.invert_path(&[1]).unwrap_err(),
            TreeError::PathDoesNotDiverge(vec![1])
        );
        let framed = tree
            .derive(&[1], DerivationNode::value(d("x", "x"), vec![get(vec![])], vec![], Cardinality::OneToOne))
            .unwrap();
        assert!(matches!(
            framed.invert_path(&[1, 1]).unwrap_err(),
            TreeError::NotInvertible(_)
        ));
    }
}
