// =============================================================================
// SCHEMA — Le graphe typé qui décrit la structure des données
// =============================================================================
//
// Le graphe de schéma contient :
//   - des NŒUDS atomiques (nommés, typés) ou PRODUITS (tuple ordonné
//     d'atomiques, qui joue le rôle de clé composite) ;
//   - des ARÊTES porteuses d'une cardinalité. Une arête est stockée une
//     seule fois mais se lit dans les deux sens : à rebours, sa
//     cardinalité est inversée ;
//   - des CLASSES D'ÉQUIVALENCE ("blending") entre nœuds atomiques.
//
// EXEMPLE VISUEL :
//
//   name ──N:1──▶ homeworld ≡ world ──N:1──▶ sector
//
//   (trilogy, episode) ──N:1──▶ director
//
// En langage courant : "le secteur d'un personnage" est le chemin
// name → homeworld ≡ world → sector, de longueur 2.
//
// ALGORITHME (find_shortest_path) :
//   Un état de recherche est le tuple des leaders de classe des
//   constituants. Passer d'un nœud à un nœud équivalent ne change donc pas
//   l'état : le blending coûte zéro et ne peut pas créer de cycle.
//   Les mouvements possibles depuis un état :
//     1. traverser une arête (coût 1, dans un sens ou dans l'autre) ;
//     2. projeter vers un nœud dont les constituants forment un
//        sous-ensemble strict (coût 0, l'arité diminue strictement).
//   On fait un BFS par couches en COMPTANT les plus courts chemins. S'il y
//   en a plusieurs, c'est une erreur : l'appelant doit ajouter un point de
//   passage (`via`).
//
// =============================================================================

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use tracing::debug;

use super::blend::Blending;
use super::cardinality::Cardinality;
use super::error::GraphError;
use super::typeside::BaseType;

/// Un nœud atomique : un point nommé et typé du graphe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtomicNode {
    pub name: String,
    pub ty: BaseType,
}

impl AtomicNode {
    pub fn new(name: &str, ty: BaseType) -> Self {
        AtomicNode { name: name.to_string(), ty }
    }

    /// Raccourci pour un nœud de type String (le cas le plus courant)
    pub fn string(name: &str) -> Self {
        AtomicNode::new(name, BaseType::String)
    }
}

impl fmt::Display for AtomicNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Un nœud du graphe : atomique, ou produit ordonné d'atomiques.
///
/// L'égalité des produits est structurelle (même tuple, même ordre).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SchemaNode {
    Atomic(AtomicNode),
    Product(Vec<AtomicNode>),
}

impl SchemaNode {
    pub fn atomic(name: &str, ty: BaseType) -> Self {
        SchemaNode::Atomic(AtomicNode::new(name, ty))
    }

    /// Un produit d'un seul constituant est simplement ce constituant.
    pub fn product(nodes: Vec<AtomicNode>) -> Self {
        if nodes.len() == 1 {
            SchemaNode::Atomic(nodes[0].clone())
        } else {
            SchemaNode::Product(nodes)
        }
    }

    pub fn constituents(&self) -> &[AtomicNode] {
        match self {
            SchemaNode::Atomic(a) => std::slice::from_ref(a),
            SchemaNode::Product(nodes) => nodes,
        }
    }

    pub fn arity(&self) -> usize {
        self.constituents().len()
    }

    pub fn is_product(&self) -> bool {
        matches!(self, SchemaNode::Product(_))
    }
}

impl From<AtomicNode> for SchemaNode {
    fn from(node: AtomicNode) -> Self {
        SchemaNode::Atomic(node)
    }
}

impl fmt::Display for SchemaNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaNode::Atomic(a) => write!(f, "{}", a),
            SchemaNode::Product(nodes) => {
                let names: Vec<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
                write!(f, "({})", names.join(", "))
            }
        }
    }
}

/// Un domaine : un nom de colonne pour exactement un nœud atomique.
///
/// Deux colonnes peuvent porter sur le même nœud (`a` et `a_1` sur `u`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Domain {
    pub name: String,
    pub node: AtomicNode,
}

impl Domain {
    pub fn new(name: &str, node: AtomicNode) -> Self {
        Domain { name: name.to_string(), node }
    }

    /// Le domaine qui porte le nom de son nœud
    pub fn of(node: &AtomicNode) -> Self {
        Domain { name: node.name.clone(), node: node.clone() }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Affiche une liste sous la forme `[a, b]`.
pub fn format_list<T: fmt::Display>(items: &[T]) -> String {
    let parts: Vec<String> = items.iter().map(|i| i.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

/// Une arête du graphe, orientée `from → to` avec sa cardinalité.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaEdge {
    pub from: SchemaNode,
    pub to: SchemaNode,
    pub cardinality: Cardinality,
}

impl SchemaEdge {
    pub fn new(from: SchemaNode, to: SchemaNode, cardinality: Cardinality) -> Self {
        SchemaEdge { from, to, cardinality }
    }

    /// La même arête lue à rebours
    pub fn reversed(&self) -> Self {
        SchemaEdge {
            from: self.to.clone(),
            to: self.from.clone(),
            cardinality: self.cardinality.invert(),
        }
    }

    /// Même arête stockée, quel que soit le sens de lecture
    pub fn same_as(&self, other: &SchemaEdge) -> bool {
        self == other || *self == other.reversed()
    }
}

impl fmt::Display for SchemaEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}→{}", self.from, self.to)
    }
}

/// Une étape d'un plus court chemin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStep {
    /// Traversée d'une arête, orientée dans le sens de la marche
    Traverse(SchemaEdge),
    /// Projection d'un produit vers le sous-tuple `indices`
    Project { indices: Vec<usize>, to: SchemaNode },
    /// Passage gratuit entre deux nœuds équivalents
    Blend { from: SchemaNode, to: SchemaNode },
}

/// Résultat de `find_shortest_path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortestPath {
    /// Les nœuds visités, du départ à l'arrivée
    pub nodes: Vec<SchemaNode>,
    pub steps: Vec<PathStep>,
}

impl ShortestPath {
    /// Les arêtes traversées, dans l'ordre et dans le sens de la marche
    pub fn edges(&self) -> Vec<&SchemaEdge> {
        self.steps
            .iter()
            .filter_map(|s| match s {
                PathStep::Traverse(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    /// Longueur du chemin = nombre d'arêtes traversées
    pub fn len(&self) -> usize {
        self.edges().len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Display for ShortestPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(first) = self.nodes.first() else {
            return write!(f, "∅");
        };
        write!(f, "{}", first)?;
        let mut nodes = self.nodes.iter().skip(1);
        for step in &self.steps {
            let Some(node) = nodes.next() else { break };
            let arrow = match step {
                PathStep::Traverse(_) => " → ",
                PathStep::Project { .. } => " ⇢ ",
                PathStep::Blend { .. } => " ≡ ",
            };
            write!(f, "{}{}", arrow, node)?;
        }
        Ok(())
    }
}

/// État de recherche : les leaders de classe des constituants.
type State = Vec<usize>;

/// Mouvement élémentaire trouvé par le BFS (avant reconstruction des nœuds).
#[derive(Debug, Clone)]
enum Move {
    Traverse(SchemaEdge),
    Project { indices: Vec<usize>, to: SchemaNode },
}

/// Le graphe de schéma complet.
#[derive(Debug, Clone)]
pub struct SchemaGraph {
    /// Nom du graphe
    pub name: String,
    atoms: Vec<AtomicNode>,
    atom_ids: HashMap<AtomicNode, usize>,
    nodes: BTreeSet<SchemaNode>,
    edges: Vec<SchemaEdge>,
    blending: Blending,
}

impl SchemaGraph {
    pub fn new(name: &str) -> Self {
        SchemaGraph {
            name: name.to_string(),
            atoms: Vec::new(),
            atom_ids: HashMap::new(),
            nodes: BTreeSet::new(),
            edges: Vec::new(),
            blending: Blending::new(),
        }
    }

    fn register_atom(&mut self, atom: &AtomicNode) -> usize {
        if let Some(&id) = self.atom_ids.get(atom) {
            return id;
        }
        let id = self.atoms.len();
        self.atoms.push(atom.clone());
        self.atom_ids.insert(atom.clone(), id);
        self.blending.register(id);
        id
    }

    /// Ajoute un nœud (et, pour un produit, ses constituants)
    pub fn add_node(&mut self, node: impl Into<SchemaNode>) -> &mut Self {
        let node = node.into();
        for atom in node.constituents() {
            let atom = atom.clone();
            self.register_atom(&atom);
            self.nodes.insert(SchemaNode::Atomic(atom));
        }
        self.nodes.insert(node);
        self
    }

    /// Ajoute une arête. Les extrémités sont enregistrées au passage.
    pub fn add_edge(
        &mut self,
        from: impl Into<SchemaNode>,
        to: impl Into<SchemaNode>,
        cardinality: Cardinality,
    ) -> &mut Self {
        let (from, to) = (from.into(), to.into());
        self.add_node(from.clone()).add_node(to.clone());
        self.edges.push(SchemaEdge::new(from, to, cardinality));
        self
    }

    /// Déclare deux nœuds atomiques équivalents.
    pub fn blend(&mut self, a: &SchemaNode, b: &SchemaNode) -> Result<(), GraphError> {
        let ia = self.atom_id(Self::as_atomic(a)?)?;
        let ib = self.atom_id(Self::as_atomic(b)?)?;
        self.blending.blend(ia, ib);
        debug!(a = %a, b = %b, "nœuds blendés");
        Ok(())
    }

    fn as_atomic(node: &SchemaNode) -> Result<&AtomicNode, GraphError> {
        match node {
            SchemaNode::Atomic(a) => Ok(a),
            SchemaNode::Product(_) => Err(GraphError::NotAtomic(node.to_string())),
        }
    }

    fn atom_id(&self, atom: &AtomicNode) -> Result<usize, GraphError> {
        self.atom_ids
            .get(atom)
            .copied()
            .ok_or_else(|| GraphError::NodeNotInGraph(atom.name.clone()))
    }

    pub fn contains(&self, node: &SchemaNode) -> bool {
        self.nodes.contains(node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &SchemaNode> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> &[SchemaEdge] {
        &self.edges
    }

    pub fn find_leader(&self, atom: &AtomicNode) -> Result<AtomicNode, GraphError> {
        let id = self.atom_id(atom)?;
        Ok(self.atoms[self.blending.find_leader(id)].clone())
    }

    pub fn get_equivalence_class(&self, atom: &AtomicNode) -> Result<Vec<AtomicNode>, GraphError> {
        let id = self.atom_id(atom)?;
        Ok(self
            .blending
            .get_equivalence_class(id)
            .into_iter()
            .map(|i| self.atoms[i].clone())
            .collect())
    }

    /// La classe d'un nœud vue comme un nœud synthétique : le produit de
    /// tous ses membres, ou le nœud lui-même s'il est seul.
    pub fn equivalence_class_node(&self, atom: &AtomicNode) -> Result<SchemaNode, GraphError> {
        Ok(SchemaNode::product(self.get_equivalence_class(atom)?))
    }

    pub fn are_equivalent(&self, a: &SchemaNode, b: &SchemaNode) -> Result<bool, GraphError> {
        Ok(self.canonical(a)? == self.canonical(b)?)
    }

    fn canonical(&self, node: &SchemaNode) -> Result<State, GraphError> {
        node.constituents()
            .iter()
            .map(|a| self.atom_id(a).map(|id| self.blending.find_leader(id)))
            .collect()
    }

    /// Plus court chemin de `from` vers `to`, en passant dans l'ordre par
    /// chaque point de `via`.
    pub fn find_shortest_path(
        &self,
        from: &SchemaNode,
        to: &SchemaNode,
        via: &[SchemaNode],
    ) -> Result<ShortestPath, GraphError> {
        let mut points = Vec::with_capacity(via.len() + 2);
        points.push(from);
        points.extend(via.iter());
        points.push(to);

        let mut nodes = vec![from.clone()];
        let mut steps = Vec::new();
        for pair in points.windows(2) {
            let moves = self.search_segment(pair[0], pair[1])?;
            let segment = Self::assemble(pair[0], pair[1], moves);
            nodes.extend(segment.nodes.into_iter().skip(1));
            steps.extend(segment.steps);
        }

        // Un état ne doit jamais être revisité (les blends consécutifs
        // restent dans le même état et ne comptent pas)
        let mut seen: BTreeSet<State> = BTreeSet::new();
        let mut previous: Option<State> = None;
        for node in &nodes {
            let state = self.canonical(node)?;
            if previous.as_ref() == Some(&state) {
                continue;
            }
            if !seen.insert(state.clone()) {
                return Err(GraphError::CycleDetected(node.to_string()));
            }
            previous = Some(state);
        }

        let path = ShortestPath { nodes, steps };
        debug!(from = %from, to = %to, path = %path, "plus court chemin résolu");
        Ok(path)
    }

    /// BFS par couches entre deux points, avec comptage des plus courts chemins.
    fn search_segment(&self, from: &SchemaNode, to: &SchemaNode) -> Result<Vec<Move>, GraphError> {
        let start = self.canonical(from)?;
        let goal = self.canonical(to)?;

        let mut adjacency: BTreeMap<State, Vec<(State, SchemaEdge)>> = BTreeMap::new();
        for edge in &self.edges {
            let (f, t) = (self.canonical(&edge.from)?, self.canonical(&edge.to)?);
            adjacency.entry(f.clone()).or_default().push((t.clone(), edge.clone()));
            adjacency.entry(t).or_default().push((f, edge.reversed()));
        }

        // Cibles de projection : la destination d'abord, puis les nœuds connus
        let mut targets: BTreeMap<State, SchemaNode> = BTreeMap::new();
        targets.insert(goal.clone(), to.clone());
        for node in &self.nodes {
            targets.entry(self.canonical(node)?).or_insert_with(|| node.clone());
        }

        let mut settled: BTreeSet<State> = BTreeSet::new();
        let mut preds: BTreeMap<State, Vec<(State, Move)>> = BTreeMap::new();
        let mut frontier: BTreeMap<State, u64> = BTreeMap::from([(start.clone(), 1)]);

        while !frontier.is_empty() {
            let mut layer = frontier;

            // Projections, seulement depuis les états atteints par traversée :
            // une projection directe couvre déjà toute chaîne de projections
            let reached: Vec<(State, u64)> = layer
                .iter()
                .filter(|(s, _)| s.len() >= 2)
                .map(|(s, c)| (s.clone(), *c))
                .collect();
            for (state, count) in reached {
                for (target, node) in &targets {
                    if settled.contains(target) {
                        continue;
                    }
                    if let Some(indices) = projection_indices(&state, target) {
                        let entry = layer.entry(target.clone()).or_insert(0);
                        *entry = entry.saturating_add(count);
                        preds.entry(target.clone()).or_default().push((
                            state.clone(),
                            Move::Project { indices, to: node.clone() },
                        ));
                    }
                }
            }

            settled.extend(layer.keys().cloned());
            if let Some(&count) = layer.get(&goal) {
                if count > 1 {
                    return Err(GraphError::MultiplePaths {
                        from: from.to_string(),
                        to: to.to_string(),
                        count,
                    });
                }
                return Self::reconstruct(&start, &goal, &preds, from, to);
            }

            let mut next: BTreeMap<State, u64> = BTreeMap::new();
            for (state, count) in &layer {
                for (target, edge) in adjacency.get(state).into_iter().flatten() {
                    if settled.contains(target) {
                        continue;
                    }
                    let entry = next.entry(target.clone()).or_insert(0);
                    *entry = entry.saturating_add(*count);
                    preds
                        .entry(target.clone())
                        .or_default()
                        .push((state.clone(), Move::Traverse(edge.clone())));
                }
            }
            frontier = next;
        }

        Err(GraphError::NoPath {
            from: from.to_string(),
            to: to.to_string(),
            projection_hint: from.is_product() || to.is_product(),
        })
    }

    /// Remonte l'unique chemin (le compte vaut 1, chaque état du chemin a
    /// donc exactement un prédécesseur).
    fn reconstruct(
        start: &State,
        goal: &State,
        preds: &BTreeMap<State, Vec<(State, Move)>>,
        from: &SchemaNode,
        to: &SchemaNode,
    ) -> Result<Vec<Move>, GraphError> {
        let mut moves = Vec::new();
        let mut current = goal.clone();
        while current != *start {
            let (previous, mv) = preds
                .get(&current)
                .and_then(|p| p.first())
                .ok_or_else(|| GraphError::NoPath {
                    from: from.to_string(),
                    to: to.to_string(),
                    projection_hint: false,
                })?;
            moves.push(mv.clone());
            current = previous.clone();
        }
        moves.reverse();
        Ok(moves)
    }

    /// Transforme les mouvements en nœuds et étapes, en explicitant les
    /// passages entre nœuds équivalents.
    fn assemble(from: &SchemaNode, to: &SchemaNode, moves: Vec<Move>) -> ShortestPath {
        let mut nodes = vec![from.clone()];
        let mut steps = Vec::new();
        let mut current = from.clone();
        for mv in moves {
            match mv {
                Move::Traverse(edge) => {
                    if edge.from != current {
                        steps.push(PathStep::Blend { from: current, to: edge.from.clone() });
                        nodes.push(edge.from.clone());
                    }
                    current = edge.to.clone();
                    steps.push(PathStep::Traverse(edge));
                    nodes.push(current.clone());
                }
                Move::Project { indices, to } => {
                    current = to.clone();
                    steps.push(PathStep::Project { indices, to });
                    nodes.push(current.clone());
                }
            }
        }
        if current != *to {
            steps.push(PathStep::Blend { from: current, to: to.clone() });
            nodes.push(to.clone());
        }
        ShortestPath { nodes, steps }
    }
}

/// Indices de `target` dans `state` si `target` en est un sous-tuple strict.
fn projection_indices(state: &State, target: &State) -> Option<Vec<usize>> {
    if target.is_empty() || target.len() >= state.len() {
        return None;
    }
    target
        .iter()
        .map(|t| state.iter().position(|s| s == t))
        .collect()
}

impl fmt::Display for SchemaGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "graph {} {{", self.name)?;
        writeln!(f, "  nodes")?;
        for node in &self.nodes {
            writeln!(f, "    {}", node)?;
        }
        if !self.edges.is_empty() {
            writeln!(f, "  edges")?;
            for edge in &self.edges {
                writeln!(f, "    {} ({})", edge, edge.cardinality)?;
            }
        }
        write!(f, "}}")
    }
}
