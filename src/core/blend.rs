// =============================================================================
// BLEND — Classes d'équivalence de nœuds atomiques (union-find)
// =============================================================================
//
// "Blender" deux nœuds, c'est déclarer qu'ils désignent la même chose :
// `characters.homeworld` et `sectors.world` par exemple. La recherche de
// chemins peut alors passer de l'un à l'autre gratuitement.
//
// L'équivalence est transitive : on la maintient avec un union-find.
// On ne garde que la liste des unions demandées et une table de leaders
// recalculée après chaque union, ce qui permet de répondre à `find_leader`
// sans emprunt mutable et de cloner librement le graphe.
//
// Le leader d'une classe est toujours son plus petit identifiant, pour
// que le résultat ne dépende pas des choix internes de l'union-find.
//
// =============================================================================

use egglog_union_find::UnionFind;

#[derive(Debug, Clone, Default)]
pub struct Blending {
    unions: Vec<(usize, usize)>,
    leaders: Vec<usize>,
}

impl Blending {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enregistre un nouvel identifiant (seul dans sa classe).
    pub fn register(&mut self, id: usize) {
        while self.leaders.len() <= id {
            let next = self.leaders.len();
            self.leaders.push(next);
        }
    }

    /// Fusionne les classes de `a` et `b`.
    pub fn blend(&mut self, a: usize, b: usize) {
        self.register(a.max(b));
        self.unions.push((a, b));
        self.recompute();
    }

    fn recompute(&mut self) {
        let mut uf: UnionFind<usize> = UnionFind::default();
        for &(a, b) in &self.unions {
            uf.union(a, b);
        }
        let roots: Vec<usize> = (0..self.leaders.len()).map(|id| uf.find(id)).collect();
        // Ramène chaque racine au plus petit membre de sa classe
        let mut smallest = std::collections::HashMap::new();
        for (id, &root) in roots.iter().enumerate() {
            smallest.entry(root).or_insert(id);
        }
        self.leaders = roots.iter().map(|root| smallest[root]).collect();
    }

    pub fn find_leader(&self, id: usize) -> usize {
        self.leaders.get(id).copied().unwrap_or(id)
    }

    pub fn are_equivalent(&self, a: usize, b: usize) -> bool {
        self.find_leader(a) == self.find_leader(b)
    }

    /// Tous les membres de la classe de `id`, en ordre croissant.
    pub fn get_equivalence_class(&self, id: usize) -> Vec<usize> {
        let leader = self.find_leader(id);
        let members: Vec<usize> = (0..self.leaders.len())
            .filter(|&other| self.leaders[other] == leader)
            .collect();
        if members.is_empty() {
            vec![id]
        } else {
            members
        }
    }
}
