// =============================================================================
// DERIVATION — L'arbre persistant qui décrit une table calculée
// =============================================================================
//
// Un arbre de dérivation décrit une table : quelles colonnes sont des clés,
// lesquelles sont des valeurs, et comment chaque colonne se calcule à
// partir de ses ancêtres.
//
//   Root  [name]
//   ├── Intermediate []          ← l'enfant "unité", toujours présent
//   └── Key  [name]              GET<[name]>
//       ├── Value [homeworld]    STT<[name]>, TRV<...>, ENT<[homeworld]>
//       └── Value [sector]       STT<[name]>, TRV<...>, TRV<...>, ENT<[sector]>
//
// PERSISTANCE : un arbre n'est jamais modifié. Chaque édition rend un
// nouvel arbre qui partage (par Arc) tous les sous-arbres non touchés. On
// peut donc garder l'ancienne version, ou la lire depuis un autre thread.
//
// APLATISSEMENT : l'arbre se compile en un programme pour la machine à
// pile (voir interpreter.rs) :
//   - un nœud sans enfant émet son IR ;
//   - un nœud à un enfant émet son IR puis celui de l'enfant ;
//   - sinon : IR, CAL, enfant 0, puis (RST, enfant i, MER)*, puis RET ;
//   - la racine émet ses enfants bout à bout, séparés par des MER.
//
// Les éditions (edit.rs) : insert_key, derive, infer, hide, show, compose,
// equate, invert_path.
//
// =============================================================================

mod edit;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use super::cardinality::Cardinality;
use super::error::TreeError;
use super::namespace::Namespace;
use super::representation::{format_program, RepresentationStep};
use super::schema::{format_list, Domain};

pub use edit::{Inference, IntermediatePath};

/// Rôle d'une colonne affichée (ou cachée) dans la table finale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnRole {
    Key,
    Value,
    HiddenKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Root,
    Column(ColumnRole),
    Intermediate,
}

/// Chemin d'un nœud : indices d'enfants successifs depuis la racine.
pub type NodePath = Vec<usize>;

/// Un nœud de l'arbre. Immuable une fois construit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationNode {
    pub kind: NodeKind,
    pub domains: Vec<Domain>,
    /// Comment calculer `domains` à partir des colonnes des ancêtres
    pub intermediate_representation: Vec<RepresentationStep>,
    pub hidden_keys: Vec<Domain>,
    /// Cardinalité relative au parent
    pub cardinality: Cardinality,
    pub children: Vec<Arc<DerivationNode>>,
}

impl DerivationNode {
    pub fn new(
        kind: NodeKind,
        domains: Vec<Domain>,
        intermediate_representation: Vec<RepresentationStep>,
        hidden_keys: Vec<Domain>,
        cardinality: Cardinality,
    ) -> Self {
        DerivationNode {
            kind,
            domains,
            intermediate_representation,
            hidden_keys,
            cardinality,
            children: Vec::new(),
        }
    }

    /// L'enfant unité : la table à une ligne et zéro colonne.
    pub fn unit() -> Self {
        DerivationNode::new(
            NodeKind::Intermediate,
            Vec::new(),
            vec![RepresentationStep::Get { domains: Vec::new() }],
            Vec::new(),
            Cardinality::OneToOne,
        )
    }

    /// Un nœud clé de la racine : `GET<[key]>`.
    pub fn key(domain: Domain) -> Self {
        DerivationNode::new(
            NodeKind::Column(ColumnRole::Key),
            vec![domain.clone()],
            vec![RepresentationStep::Get { domains: vec![domain] }],
            Vec::new(),
            Cardinality::OneToOne,
        )
    }

    pub fn value(
        domain: Domain,
        intermediate_representation: Vec<RepresentationStep>,
        hidden_keys: Vec<Domain>,
        cardinality: Cardinality,
    ) -> Self {
        DerivationNode::new(
            NodeKind::Column(ColumnRole::Value),
            vec![domain],
            intermediate_representation,
            hidden_keys,
            cardinality,
        )
    }

    pub fn with_children(mut self, children: Vec<DerivationNode>) -> Self {
        self.children = children.into_iter().map(Arc::new).collect();
        self
    }

    pub fn is_unit(&self) -> bool {
        self.kind == NodeKind::Intermediate && self.domains.is_empty()
    }

    pub fn is_column(&self, role: ColumnRole) -> bool {
        self.kind == NodeKind::Column(role)
    }

    /// Les domaines comme ensemble : deux frères ne partagent jamais le même.
    pub fn domain_set(&self) -> BTreeSet<Domain> {
        self.domains.iter().cloned().collect()
    }

    pub fn child_index(&self, domains: &[Domain]) -> Option<usize> {
        let wanted: BTreeSet<Domain> = domains.iter().cloned().collect();
        self.children.iter().position(|c| c.domain_set() == wanted)
    }

    /// Ajoute un enfant, en refusant un doublon de domaines parmi les frères.
    pub fn add_child(&self, child: DerivationNode) -> Result<DerivationNode, TreeError> {
        if self.child_index(&child.domains).is_some() {
            return Err(TreeError::AlreadyChild(format_list(&child.domains)));
        }
        let mut next = self.clone();
        next.children.push(Arc::new(child));
        Ok(next)
    }

    /// IR aplatie du sous-arbre, isolé de ses ancêtres.
    pub fn to_intermediate_representation(&self) -> Vec<RepresentationStep> {
        let shape = Shape::collect(self);
        let mut out = Vec::new();
        flatten(self, &shape.protected(), &BTreeSet::new(), &mut out);
        out
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let label = match self.kind {
            NodeKind::Root => "Root",
            NodeKind::Column(ColumnRole::Key) => "Key",
            NodeKind::Column(ColumnRole::Value) => "Value",
            NodeKind::Column(ColumnRole::HiddenKey) => "HiddenKey",
            NodeKind::Intermediate => "Intermediate",
        };
        write!(f, "{}{} {}", "  ".repeat(depth), label, format_list(&self.domains))?;
        if !self.hidden_keys.is_empty() {
            write!(f, " cachées {}", format_list(&self.hidden_keys))?;
        }
        if !self.intermediate_representation.is_empty() {
            write!(f, " {}", format_program(&self.intermediate_representation))?;
        }
        writeln!(f)?;
        for child in &self.children {
            child.write_tree(f, depth + 1)?;
        }
        Ok(())
    }
}

/// Les listes de l'instruction END, relevées sur tout l'arbre.
#[derive(Debug, Clone, Default)]
struct Shape {
    left: Vec<Domain>,
    hidden: Vec<Domain>,
    right: Vec<Domain>,
}

impl Shape {
    fn collect(root: &DerivationNode) -> Self {
        let mut shape = Shape::default();
        if root.kind == NodeKind::Root {
            push_unique(&mut shape.left, &root.domains);
            push_unique(&mut shape.hidden, &root.hidden_keys);
            for child in &root.children {
                push_unique(&mut shape.hidden, &child.hidden_keys);
                for grandchild in &child.children {
                    shape.visit(grandchild);
                }
            }
        } else {
            shape.visit(root);
        }
        shape
    }

    fn visit(&mut self, node: &DerivationNode) {
        match node.kind {
            NodeKind::Column(ColumnRole::Key) => push_unique(&mut self.left, &node.domains),
            NodeKind::Column(ColumnRole::Value) => push_unique(&mut self.right, &node.domains),
            NodeKind::Column(ColumnRole::HiddenKey) => push_unique(&mut self.hidden, &node.domains),
            NodeKind::Root | NodeKind::Intermediate => {}
        }
        push_unique(&mut self.hidden, &node.hidden_keys);
        for child in &node.children {
            self.visit(child);
        }
    }

    fn protected(&self) -> BTreeSet<Domain> {
        self.left
            .iter()
            .chain(&self.hidden)
            .chain(&self.right)
            .cloned()
            .collect()
    }
}

fn push_unique(target: &mut Vec<Domain>, domains: &[Domain]) {
    for d in domains {
        if !target.contains(d) {
            target.push(d.clone());
        }
    }
}

fn flatten(
    node: &DerivationNode,
    protected: &BTreeSet<Domain>,
    ancestors: &BTreeSet<Domain>,
    out: &mut Vec<RepresentationStep>,
) {
    let mut scope = ancestors.clone();
    scope.extend(node.domains.iter().cloned());
    scope.extend(node.hidden_keys.iter().cloned());

    if node.kind == NodeKind::Root {
        for (i, child) in node.children.iter().enumerate() {
            flatten(child, protected, &scope, out);
            if i > 0 {
                out.push(RepresentationStep::Merge);
            }
        }
        return;
    }

    out.extend(node.intermediate_representation.iter().cloned());
    let framed = node.children.len() > 1;
    match node.children.split_first() {
        None => {}
        Some((only, [])) => flatten(only, protected, &scope, out),
        Some((first, rest)) => {
            out.push(RepresentationStep::Call);
            flatten(first, protected, &scope, out);
            for child in rest {
                out.push(RepresentationStep::Reset);
                flatten(child, protected, &scope, out);
                out.push(RepresentationStep::Merge);
            }
        }
    }

    if node.kind == NodeKind::Intermediate {
        let droppable: Vec<Domain> = node
            .domains
            .iter()
            .filter(|d| !protected.contains(*d) && !ancestors.contains(*d))
            .cloned()
            .collect();
        if !droppable.is_empty() {
            out.push(RepresentationStep::Drop { domains: droppable });
        }
    }
    if framed {
        out.push(RepresentationStep::Return);
    }
}

// =============================================================================
// L'ARBRE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationTree {
    root: Arc<DerivationNode>,
}

impl DerivationTree {
    /// Un arbre dont la racine affiche `keys`.
    pub fn new(keys: Vec<Domain>) -> Result<Self, TreeError> {
        let mut seen = BTreeSet::new();
        for k in &keys {
            if !seen.insert(&k.name) {
                return Err(TreeError::KeysNotUnique(k.name.clone()));
            }
        }
        let mut children = vec![DerivationNode::unit()];
        children.extend(keys.iter().cloned().map(DerivationNode::key));
        let root = DerivationNode::new(
            NodeKind::Root,
            keys,
            Vec::new(),
            Vec::new(),
            Cardinality::OneToOne,
        )
        .with_children(children);
        Ok(DerivationTree { root: Arc::new(root) })
    }

    pub(crate) fn from_root(root: DerivationNode) -> Self {
        DerivationTree { root: Arc::new(root) }
    }

    pub fn root(&self) -> &DerivationNode {
        &self.root
    }

    /// Clés affichées de la racine
    pub fn keys(&self) -> &[Domain] {
        &self.root.domains
    }

    /// Clés cachées de la racine
    pub fn hidden_keys(&self) -> &[Domain] {
        &self.root.hidden_keys
    }

    pub fn node_at(&self, path: &[usize]) -> Result<&DerivationNode, TreeError> {
        let mut node: &DerivationNode = &self.root;
        for &i in path {
            node = node
                .children
                .get(i)
                .ok_or_else(|| TreeError::InvalidPath(path.to_vec()))?;
        }
        Ok(node)
    }

    /// Premier nœud (parcours préfixe) qui satisfait `pred`. La profondeur
    /// de la racine est 0.
    pub fn find_path<F>(&self, pred: F) -> Option<NodePath>
    where
        F: Fn(&DerivationNode, usize) -> bool,
    {
        fn walk<F>(node: &DerivationNode, path: &mut NodePath, pred: &F) -> bool
        where
            F: Fn(&DerivationNode, usize) -> bool,
        {
            if pred(node, path.len()) {
                return true;
            }
            for (i, child) in node.children.iter().enumerate() {
                path.push(i);
                if walk(child, path, pred) {
                    return true;
                }
                path.pop();
            }
            false
        }
        let mut path = Vec::new();
        if walk(&self.root, &mut path, &pred) {
            Some(path)
        } else {
            None
        }
    }

    /// Le nœud colonne `role` dont l'unique domaine est `domain`.
    pub fn find_column(&self, domain: &Domain, role: ColumnRole) -> Option<NodePath> {
        self.find_path(|n, _| n.is_column(role) && n.domains.as_slice() == std::slice::from_ref(domain))
    }

    /// Chemin de l'enfant de la racine dont les domaines valent `domains`.
    pub fn key_path(&self, domains: &[Domain]) -> Option<NodePath> {
        self.root.child_index(domains).map(|i| vec![i])
    }

    /// Nouvel arbre où le nœud en `path` est remplacé par `f(nœud)`.
    /// Tout ce qui n'est pas sur le chemin est partagé.
    pub fn update_at<F>(&self, path: &[usize], f: F) -> Result<DerivationTree, TreeError>
    where
        F: FnOnce(&DerivationNode) -> Result<DerivationNode, TreeError>,
    {
        fn rebuild<F>(
            node: &DerivationNode,
            rest: &[usize],
            full: &[usize],
            f: F,
        ) -> Result<DerivationNode, TreeError>
        where
            F: FnOnce(&DerivationNode) -> Result<DerivationNode, TreeError>,
        {
            match rest.split_first() {
                None => f(node),
                Some((&i, tail)) => {
                    let child = node
                        .children
                        .get(i)
                        .ok_or_else(|| TreeError::InvalidPath(full.to_vec()))?;
                    let replaced = rebuild(child, tail, full, f)?;
                    let mut next = node.clone();
                    next.children[i] = Arc::new(replaced);
                    Ok(next)
                }
            }
        }
        Ok(DerivationTree::from_root(rebuild(&self.root, path, path, f)?))
    }

    /// Tous les noms de colonnes déjà utilisés par l'arbre.
    pub fn namespace(&self) -> Namespace {
        fn walk(node: &DerivationNode, ns: &mut Namespace) {
            for d in node.domains.iter().chain(&node.hidden_keys) {
                ns.reserve(&d.name);
            }
            for step in &node.intermediate_representation {
                for d in step.introduced_hidden_keys() {
                    ns.reserve(&d.name);
                }
            }
            for child in &node.children {
                walk(child, ns);
            }
        }
        let mut ns = Namespace::new();
        walk(&self.root, &mut ns);
        ns
    }

    /// Égalité à l'ordre des enfants près : mêmes genres, mêmes domaines,
    /// mêmes clés cachées à chaque nœud.
    pub fn structurally_eq(&self, other: &DerivationTree) -> bool {
        fn same(a: &DerivationNode, b: &DerivationNode) -> bool {
            let hidden = |n: &DerivationNode| n.hidden_keys.iter().cloned().collect::<BTreeSet<_>>();
            if a.kind != b.kind
                || a.domain_set() != b.domain_set()
                || hidden(a) != hidden(b)
                || a.children.len() != b.children.len()
            {
                return false;
            }
            a.children.iter().all(|ca| {
                b.children
                    .iter()
                    .find(|cb| cb.domain_set() == ca.domain_set())
                    .is_some_and(|cb| same(ca, cb))
            })
        }
        same(&self.root, &other.root)
    }

    /// Le programme sans son END.
    pub fn to_intermediate_representation(&self) -> Vec<RepresentationStep> {
        self.root.to_intermediate_representation()
    }

    /// L'instruction END : clés affichées, clés cachées, valeurs.
    pub fn end_step(&self) -> RepresentationStep {
        let shape = Shape::collect(&self.root);
        RepresentationStep::End {
            left: shape.left,
            hidden: shape.hidden,
            right: shape.right,
        }
    }

    /// Le programme complet, prêt pour l'interpréteur.
    pub fn to_program(&self) -> Vec<RepresentationStep> {
        let mut program = self.to_intermediate_representation();
        program.push(self.end_step());
        program
    }
}

impl fmt::Display for DerivationTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.root.write_tree(f, 0)
    }
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mapping::Mapping;
    use crate::core::schema::{AtomicNode, SchemaEdge, SchemaNode};

    fn d(name: &str, node: &str) -> Domain {
        Domain::new(name, AtomicNode::string(node))
    }

    pub(crate) fn traverse(from: &Domain, edge: (&str, &str), to: &Domain) -> Vec<RepresentationStep> {
        let edge = SchemaEdge::new(
            SchemaNode::from(AtomicNode::string(edge.0)),
            SchemaNode::from(AtomicNode::string(edge.1)),
            Cardinality::ManyToOne,
        );
        let mut ns = Namespace::new();
        vec![
            RepresentationStep::StartTraversal { domains: vec![from.clone()] },
            RepresentationStep::Traverse { mapping: Mapping::new(edge, &mut ns) },
            RepresentationStep::EndTraversal { domains: vec![to.clone()] },
        ]
    }

    /// Clé `a` sur u, valeurs `b` (u→v) et `c` (u→w)
    pub(crate) fn fixture() -> DerivationTree {
        let a = d("a", "u");
        let b = d("b", "v");
        let c = d("c", "w");
        let tree = DerivationTree::new(vec![a.clone()]).unwrap();
        let tree = tree
            .derive(
                &[1],
                DerivationNode::value(b.clone(), traverse(&a, ("u", "v"), &b), vec![], Cardinality::ManyToOne),
            )
            .unwrap();
        tree.derive(
            &[1],
            DerivationNode::value(c.clone(), traverse(&a, ("u", "w"), &c), vec![], Cardinality::ManyToOne),
        )
        .unwrap()
    }

    #[test]
    fn test_new_tree() {
        let tree = DerivationTree::new(vec![d("a", "u"), d("b", "v")]).unwrap();
        assert_eq!(tree.root().children.len(), 3);
        assert!(tree.root().children[0].is_unit());
        assert_eq!(
            format_program(&tree.to_intermediate_representation()),
            "[GET<[]>, GET<[a]>, MER, GET<[b]>, MER]"
        );

        let err = DerivationTree::new(vec![d("a", "u"), d("a", "v")]).unwrap_err();
        assert_eq!(err, TreeError::KeysNotUnique("a".into()));
    }

    #[test]
    fn test_flatten_key_node_with_two_values() {
        let tree = fixture();
        let key = tree.node_at(&[1]).unwrap();
        assert_eq!(
            format_program(&key.to_intermediate_representation()),
            "[GET<[a]>, CAL, STT<[a]>, TRV<u→v>, ENT<[b]>, RST, STT<[a]>, TRV<u→w>, ENT<[c]>, MER, RET]"
        );
        println!("{}", tree);
    }

    #[test]
    fn test_end_step_lists_columns() {
        let tree = fixture();
        match tree.end_step() {
            RepresentationStep::End { left, hidden, right } => {
                assert_eq!(left, vec![d("a", "u")]);
                assert!(hidden.is_empty());
                assert_eq!(right, vec![d("b", "v"), d("c", "w")]);
            }
            other => panic!("END attendu, obtenu {}", other),
        }
        assert!(matches!(tree.to_program().last(), Some(RepresentationStep::End { .. })));
    }

    #[test]
    fn test_intermediate_domains_dropped() {
        let a = d("a", "u");
        let m = d("m", "v");
        let b = d("b", "w");
        let tree = DerivationTree::new(vec![a.clone()]).unwrap();
        let inter = DerivationNode::new(
            NodeKind::Intermediate,
            vec![m.clone()],
            traverse(&a, ("u", "v"), &m),
            vec![],
            Cardinality::ManyToOne,
        )
        .with_children(vec![DerivationNode::value(
            b.clone(),
            traverse(&m, ("v", "w"), &b),
            vec![],
            Cardinality::ManyToOne,
        )]);
        let tree = tree.derive(&[1], inter).unwrap();
        let program = tree.node_at(&[1]).unwrap().to_intermediate_representation();
        assert_eq!(program.last(), Some(&RepresentationStep::Drop { domains: vec![m] }));
    }

    #[test]
    fn test_persistence_shares_untouched_subtrees() {
        let tree = fixture();
        let next = tree.derive(&[0], DerivationNode::key(d("z", "z"))).unwrap();
        assert!(Arc::ptr_eq(&tree.root.children[1], &next.root.children[1]));
        assert_eq!(tree.node_at(&[0]).unwrap().children.len(), 0);
        assert_eq!(next.node_at(&[0]).unwrap().children.len(), 1);
    }

    #[test]
    fn test_node_paths() {
        let tree = fixture();
        assert_eq!(tree.node_at(&[1, 1]).unwrap().domains, vec![d("c", "w")]);
        assert_eq!(tree.node_at(&[1, 5]), Err(TreeError::InvalidPath(vec![1, 5])));
        assert_eq!(tree.find_column(&d("c", "w"), ColumnRole::Value), Some(vec![1, 1]));
        assert_eq!(tree.key_path(&[d("a", "u")]), Some(vec![1]));
    }

    #[test]
    fn test_namespace_and_structural_eq() {
        let tree = fixture();
        let ns = tree.namespace();
        assert!(ns.contains("a") && ns.contains("b") && ns.contains("c"));

        let a = d("a", "u");
        let b = d("b", "v");
        let c = d("c", "w");
        let swapped = DerivationTree::new(vec![a.clone()])
            .unwrap()
            .derive(&[1], DerivationNode::value(c.clone(), traverse(&a, ("u", "w"), &c), vec![], Cardinality::ManyToOne))
            .unwrap()
            .derive(&[1], DerivationNode::value(b.clone(), traverse(&a, ("u", "v"), &b), vec![], Cardinality::ManyToOne))
            .unwrap();
        assert_ne!(tree, swapped);
        assert!(tree.structurally_eq(&swapped));
    }
}
