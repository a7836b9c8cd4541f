//! Propriétés de l'algèbre : cardinalités, mappings et plus courts chemins.

use proptest::prelude::*;
use tabrust::core::cardinality::Cardinality;
use tabrust::core::mapping::Mapping;
use tabrust::core::namespace::Namespace;
use tabrust::core::schema::{AtomicNode, Domain, SchemaEdge, SchemaGraph, SchemaNode};

// ===== Stratégies =====

fn arb_cardinality() -> impl Strategy<Value = Cardinality> {
    prop::sample::select(Cardinality::ALL.to_vec())
}

fn arb_functional() -> impl Strategy<Value = Cardinality> {
    prop::sample::select(vec![Cardinality::OneToOne, Cardinality::ManyToOne])
}

/// Une arête dont la source a 1 ou 2 constituants et la cible un seul.
fn arb_edge(cardinality: impl Strategy<Value = Cardinality>) -> impl Strategy<Value = SchemaEdge> {
    (1usize..=2, cardinality).prop_map(|(width, c)| {
        let from = (0..width).map(|i| AtomicNode::string(&format!("s{}", i))).collect();
        SchemaEdge::new(SchemaNode::product(from), AtomicNode::string("t").into(), c)
    })
}

/// Une chaîne n0 → n1 → ... → nk, avec l'ordre d'insertion des arêtes mélangé.
fn arb_chain() -> impl Strategy<Value = (usize, Vec<usize>)> {
    (2usize..8).prop_flat_map(|n| (Just(n), Just((0..n).collect::<Vec<_>>()).prop_shuffle()))
}

fn chain_node(i: usize) -> AtomicNode {
    AtomicNode::string(&format!("n{}", i))
}

fn chain_graph(order: &[usize]) -> SchemaGraph {
    let mut graph = SchemaGraph::new("Chain");
    for &i in order {
        graph.add_edge(chain_node(i), chain_node(i + 1), Cardinality::ManyToOne);
    }
    graph
}

// ===== Propriétés =====

proptest! {
    #[test]
    fn prop_compose_is_associative(a in arb_cardinality(), b in arb_cardinality(), c in arb_cardinality()) {
        prop_assert_eq!(a.compose(b).compose(c), a.compose(b.compose(c)));
    }

    #[test]
    fn prop_one_to_one_is_identity(c in arb_cardinality()) {
        prop_assert_eq!(Cardinality::OneToOne.compose(c), c);
        prop_assert_eq!(c.compose(Cardinality::OneToOne), c);
    }

    #[test]
    fn prop_invert_reverses_composition(a in arb_cardinality(), b in arb_cardinality()) {
        prop_assert_eq!(a.invert().invert(), a);
        prop_assert_eq!(a.compose(b).invert(), b.invert().compose(a.invert()));
    }

    #[test]
    fn prop_compose_all_is_a_fold(cs in prop::collection::vec(arb_cardinality(), 0..6)) {
        let folded = cs.iter().fold(Cardinality::OneToOne, |acc, c| acc.compose(*c));
        prop_assert_eq!(Cardinality::compose_all(cs), folded);
    }

    #[test]
    fn prop_carry_then_drop_restores(edge in arb_edge(arb_cardinality())) {
        let mut ns = Namespace::new();
        let base = Mapping::new(edge, &mut ns);
        let extra = Domain::of(&AtomicNode::string("extra"));

        let carried = base.carry(extra.clone()).unwrap();
        prop_assert_eq!(carried.from.len(), base.from.len() + 1);
        let back = carried.drop(&extra).unwrap();
        prop_assert_eq!(&back.from, &base.from);
        prop_assert_eq!(&back.to, &base.to);
        prop_assert_eq!(&back.hidden_keys, &base.hidden_keys);
        prop_assert!(back.carried.is_empty());
        prop_assert_eq!(back.cardinality, base.cardinality);
        prop_assert_eq!(back.replay().unwrap(), back);
    }

    #[test]
    fn prop_curry_then_uncurry_restores(edge in arb_edge(arb_functional()), pick in 0usize..2) {
        let mut ns = Namespace::new();
        let base = Mapping::new(edge, &mut ns);
        let index = pick % base.from.len();
        let hidden = Domain::of(&base.from[index].node);

        let curried = base.curry(index, hidden).unwrap();
        prop_assert_eq!(curried.from.len(), base.from.len() - 1);
        prop_assert!(!curried.cardinality.is_functional());

        let back = curried.uncurry(0, index).unwrap();
        prop_assert_eq!(back.from_nodes(), base.from_nodes());
        prop_assert_eq!(back.cardinality, base.cardinality);
        prop_assert!(back.hidden_keys.is_empty());
    }

    #[test]
    fn prop_invert_twice_keeps_shape(edge in arb_edge(arb_cardinality())) {
        let mut ns = Namespace::new();
        let base = Mapping::new(edge, &mut ns);
        let twice = base.invert(&mut ns).invert(&mut ns);
        prop_assert!(!twice.is_inverted());
        prop_assert_eq!(twice.cardinality, base.cardinality);
        prop_assert_eq!(twice.hidden_keys.len(), base.hidden_keys.len());
        prop_assert_eq!(twice.from_nodes(), base.from_nodes());
        prop_assert_eq!(twice.to_nodes(), base.to_nodes());
    }

    #[test]
    fn prop_chain_path_ignores_insertion_order((n, order) in arb_chain()) {
        let graph = chain_graph(&order);
        let sorted = chain_graph(&(0..n).collect::<Vec<_>>());
        let (from, to): (SchemaNode, SchemaNode) = (chain_node(0).into(), chain_node(n).into());

        let path = graph.find_shortest_path(&from, &to, &[]).unwrap();
        prop_assert_eq!(path.len(), n);
        for (i, edge) in path.edges().iter().enumerate() {
            prop_assert_eq!(&edge.from, &SchemaNode::from(chain_node(i)));
            prop_assert_eq!(&edge.to, &SchemaNode::from(chain_node(i + 1)));
        }

        let reference = sorted.find_shortest_path(&from, &to, &[]).unwrap();
        prop_assert_eq!(path.to_string(), reference.to_string());
        prop_assert_eq!(graph.find_shortest_path(&from, &to, &[]).unwrap(), path);
    }

    #[test]
    fn prop_waypoint_on_path_changes_nothing((n, order) in arb_chain(), pick in 1usize..8) {
        let graph = chain_graph(&order);
        let (from, to): (SchemaNode, SchemaNode) = (chain_node(0).into(), chain_node(n).into());
        let via: SchemaNode = chain_node(1 + pick % (n - 1)).into();

        let direct = graph.find_shortest_path(&from, &to, &[]).unwrap();
        let through = graph.find_shortest_path(&from, &to, &[via]).unwrap();
        prop_assert_eq!(direct.edges(), through.edges());
    }
}
