//! Scénarios complets : graphe, données mémoire, arbre de dérivation, exécution.

use tabrust::backend::memory::MemoryBackend;
use tabrust::config::EngineConfig;
use tabrust::core::cardinality::Cardinality;
use tabrust::core::derivation::{DerivationTree, Inference, IntermediatePath};
use tabrust::core::query::Schema;
use tabrust::core::representation::{format_program, RepresentationStep};
use tabrust::core::schema::{AtomicNode, Domain, SchemaEdge, SchemaGraph, SchemaNode};
use tabrust::core::typeside::{BaseType, Value};
use tabrust::core::validate::{validate_graph, validate_tree};

fn a(name: &str) -> AtomicNode {
    AtomicNode::string(name)
}

fn d(name: &str) -> Domain {
    Domain::of(&a(name))
}

fn row(values: &[&str]) -> Vec<Value> {
    values.iter().map(|v| Value::from(*v)).collect()
}

fn names(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}

fn episode() -> AtomicNode {
    AtomicNode::new("episode", BaseType::Integer)
}

fn star_wars(config: EngineConfig) -> Schema<MemoryBackend> {
    let characters = SchemaEdge::new(a("name").into(), a("homeworld").into(), Cardinality::ManyToOne);
    let sectors = SchemaEdge::new(a("world").into(), a("sector").into(), Cardinality::ManyToOne);
    let film = SchemaNode::product(vec![a("trilogy"), episode()]);
    let trilogies = SchemaEdge::new(film.clone(), a("director").into(), Cardinality::ManyToOne);

    let mut graph = SchemaGraph::new("StarWars");
    graph
        .add_edge(a("name"), a("homeworld"), Cardinality::ManyToOne)
        .add_edge(a("world"), a("sector"), Cardinality::ManyToOne)
        .add_edge(film, a("director"), Cardinality::ManyToOne);
    graph.blend(&a("homeworld").into(), &a("world").into()).unwrap();
    assert!(validate_graph(&graph).is_ok());

    let mut backend = MemoryBackend::new();
    backend
        .insert_rows(&characters, vec![
            row(&["Luke", "Tatooine"]),
            row(&["Leia", "Alderaan"]),
            row(&["Han", "Corellia"]),
        ])
        .unwrap()
        .insert_rows(&sectors, vec![
            row(&["Tatooine", "Arkanis"]),
            row(&["Alderaan", "Alderaan"]),
            row(&["Corellia", "Corellian"]),
        ])
        .unwrap()
        .insert_rows(&trilogies, vec![
            vec![Value::from("Original"), Value::from(4_i64), Value::from("Lucas")],
            vec![Value::from("Original"), Value::from(5_i64), Value::from("Kershner")],
            vec![Value::from("Original"), Value::from(6_i64), Value::from("Marquand")],
            vec![Value::from("Prequel"), Value::from(1_i64), Value::from("Lucas")],
        ])
        .unwrap();
    Schema::new(graph, backend, config)
}

#[test]
fn test_sector_from_name_crosses_the_blend() {
    let mut schema = star_wars(EngineConfig::default());
    let path = schema
        .graph
        .find_shortest_path(&a("name").into(), &a("sector").into(), &[])
        .unwrap();
    assert_eq!(path.len(), 2);
    println!("{}", path);

    let tree = DerivationTree::new(vec![d("name")]).unwrap();
    let tree = schema.derive_column(&tree, &d("sector"), &[d("name")], &[]).unwrap();
    assert!(validate_tree(&tree).is_ok());

    let result = schema.run("sectors", &tree).unwrap();
    let visible = result.visible().unwrap();
    assert_eq!(visible.columns, names(&["name", "sector"]));
    assert_eq!(visible.len(), 3);
    assert!(visible.row_set().contains(&row(&["Han", "Corellian"])));
    assert_eq!(result.dropped_key_count, 0);
}

#[test]
fn test_directors_then_hide_episode() {
    let mut schema = star_wars(EngineConfig::default());
    let keys = vec![d("trilogy"), Domain::of(&episode())];
    let films = DerivationTree::new(keys.clone()).unwrap();
    let films = schema.derive_column(&films, &d("director"), &keys, &[]).unwrap();

    let result = schema.run("films", &films).unwrap();
    assert_eq!(result.table.len(), 4);
    // 2 trilogies × 4 épisodes, dont 4 combinaisons sans réalisateur
    assert_eq!(result.dropped_key_count, 4);
    assert_eq!(result.dropped_value_count, 4);

    let by_trilogy = films.hide(&Domain::of(&episode())).unwrap();
    assert_eq!(by_trilogy.keys(), &[d("trilogy")]);
    assert!(validate_tree(&by_trilogy).is_ok());

    let result = schema.run("trilogies", &by_trilogy).unwrap();
    assert!(result.hidden.contains(&Domain::of(&episode())));
    let visible = result.visible().unwrap();
    assert_eq!(visible.columns, names(&["trilogy", "director"]));
    assert_eq!(visible.len(), 4);
    assert!(visible.row_set().contains(&row(&["Prequel", "Lucas"])));
    assert!(visible.row_set().contains(&row(&["Original", "Marquand"])));
}

#[test]
fn test_resume_from_snapshot_matches_full_run() {
    let mut schema = star_wars(EngineConfig::default());
    let tree = DerivationTree::new(vec![d("name")]).unwrap();
    let tree = schema.derive_column(&tree, &d("homeworld"), &[d("name")], &[]).unwrap();
    schema.run("characters", &tree).unwrap();
    assert!(schema.snapshot("characters").is_some());

    let mut namespace = tree.namespace();
    let step = schema
        .resolve(&[d("homeworld")], &[d("sector")], &[], &mut namespace)
        .unwrap();
    let mut program = step.representation;
    program.push(RepresentationStep::End {
        left: vec![d("name")],
        hidden: Vec::new(),
        right: vec![d("homeworld"), d("sector")],
    });
    let resumed = schema.execute_query("resumed", Some("characters"), &program).unwrap();

    let full_tree = schema.derive_column(&tree, &d("sector"), &[d("name")], &[]).unwrap();
    let full = schema.run("full", &full_tree).unwrap();

    let columns = names(&["name", "homeworld", "sector"]);
    assert_eq!(
        resumed.visible().unwrap().select(&columns).unwrap().row_set(),
        full.visible().unwrap().select(&columns).unwrap().row_set()
    );
}

#[test]
fn test_resume_without_snapshots_fails() {
    let mut schema = star_wars(EngineConfig { cache_snapshots: false, drop_empty_rows: true });
    let tree = DerivationTree::new(vec![d("name")]).unwrap();
    let tree = schema.derive_column(&tree, &d("homeworld"), &[d("name")], &[]).unwrap();
    schema.run("characters", &tree).unwrap();
    assert!(schema.snapshot("characters").is_none());
    assert!(schema.execute_query("resumed", Some("characters"), &[]).is_err());
}

#[test]
fn test_invert_person_city_round_trip() {
    let lives_in = SchemaEdge::new(a("person").into(), a("city").into(), Cardinality::ManyToOne);
    let mut graph = SchemaGraph::new("Cities");
    graph.add_edge(a("person"), a("city"), Cardinality::ManyToOne);
    let mut backend = MemoryBackend::new();
    backend
        .insert_rows(&lives_in, vec![
            row(&["Alice", "Paris"]),
            row(&["Bob", "Paris"]),
            row(&["Chloé", "Lyon"]),
        ])
        .unwrap();
    let mut schema = Schema::new(graph, backend, EngineConfig::default());

    let tree = DerivationTree::new(vec![d("person")]).unwrap();
    let tree = schema.derive_column(&tree, &d("city"), &[d("person")], &[]).unwrap();
    let forward = schema.run("people", &tree).unwrap().visible().unwrap();
    assert_eq!(forward.columns, names(&["person", "city"]));

    let city_path = tree.find_path(|n, _| n.domains == [d("city")]).unwrap();
    let inverted = tree.invert_path(&city_path).unwrap();
    assert_eq!(inverted.keys(), &[d("city")]);
    assert!(validate_tree(&inverted).is_ok());

    let backward = schema.run("cities", &inverted).unwrap();
    let swapped = backward
        .visible()
        .unwrap()
        .select(&names(&["person", "city"]))
        .unwrap();
    assert_eq!(swapped.row_set(), forward.row_set());
    assert_eq!(backward.dropped_key_count, 0);
}

/// Employés : ville, employeur, bureau par (ville, employeur), badges
fn staff() -> Schema<MemoryBackend> {
    let lives_in = SchemaEdge::new(a("person").into(), a("city").into(), Cardinality::ManyToOne);
    let works_for = SchemaEdge::new(a("person").into(), a("employer").into(), Cardinality::ManyToOne);
    let site = SchemaNode::product(vec![a("city"), a("employer")]);
    let offices = SchemaEdge::new(site.clone(), a("office").into(), Cardinality::ManyToOne);
    let badges = SchemaEdge::new(a("badge").into(), a("person").into(), Cardinality::ManyToOne);

    let mut graph = SchemaGraph::new("Staff");
    graph
        .add_edge(a("person"), a("city"), Cardinality::ManyToOne)
        .add_edge(a("person"), a("employer"), Cardinality::ManyToOne)
        .add_edge(site, a("office"), Cardinality::ManyToOne)
        .add_edge(a("badge"), a("person"), Cardinality::ManyToOne);

    let mut backend = MemoryBackend::new();
    backend
        .insert_rows(&lives_in, vec![
            row(&["Alice", "Paris"]),
            row(&["Bob", "Paris"]),
            row(&["Chloé", "Lyon"]),
        ])
        .unwrap()
        .insert_rows(&works_for, vec![
            row(&["Alice", "Acme"]),
            row(&["Bob", "Globex"]),
            row(&["Chloé", "Acme"]),
        ])
        .unwrap()
        .insert_rows(&offices, vec![
            row(&["Paris", "Acme", "Rue A"]),
            row(&["Paris", "Globex", "Rue B"]),
            row(&["Lyon", "Acme", "Quai C"]),
        ])
        .unwrap()
        .insert_rows(&badges, vec![
            row(&["B1", "Alice"]),
            row(&["B2", "Bob"]),
            row(&["B3", "Chloé"]),
        ])
        .unwrap();
    Schema::new(graph, backend, EngineConfig::default())
}

fn rows(values: &[&[&str]]) -> std::collections::BTreeSet<Vec<Value>> {
    values.iter().map(|r| row(r)).collect()
}

#[test]
fn test_infer_through_two_intermediate_paths() {
    let mut schema = staff();
    let tree = DerivationTree::new(vec![d("person")]).unwrap();
    let mut namespace = tree.namespace();
    let to_city = schema.resolve(&[d("person")], &[d("city")], &[], &mut namespace).unwrap();
    let to_employer = schema.resolve(&[d("person")], &[d("employer")], &[], &mut namespace).unwrap();
    let to_office = schema
        .resolve(&[d("city"), d("employer")], &[d("office")], &[], &mut namespace)
        .unwrap();

    let inference = Inference {
        intermediates: vec![
            IntermediatePath { domains: vec![d("city")], representation: to_city.representation },
            IntermediatePath { domains: vec![d("employer")], representation: to_employer.representation },
        ],
        ..Inference::new(d("office"), vec![d("person")], to_office.representation, to_office.cardinality)
    };
    let tree = tree.infer(inference).unwrap();
    assert!(validate_tree(&tree).is_ok());
    let program = format_program(&tree.to_program());
    assert!(program.contains("CAL"));
    assert!(program.contains("RST"));
    assert!(program.contains("RET"));

    let result = schema.run("offices", &tree).unwrap();
    let visible = result.visible().unwrap();
    assert_eq!(visible.columns, names(&["person", "office"]));
    assert_eq!(
        visible.row_set(),
        rows(&[&["Alice", "Rue A"], &["Bob", "Rue B"], &["Chloé", "Quai C"]])
    );
}

#[test]
fn test_equate_runs_as_single_key() {
    let mut schema = staff();
    let friend = Domain::new("friend", a("person"));
    let tree = DerivationTree::new(vec![d("person"), friend.clone()]).unwrap();
    let tree = schema.derive_column(&tree, &d("city"), &[friend.clone()], &[]).unwrap();

    // Deux clés indépendantes : produit cartésien
    let pairs = schema.run("pairs", &tree).unwrap();
    assert_eq!(pairs.visible().unwrap().len(), 9);

    let equated = tree.equate(&d("person"), &friend).unwrap();
    assert_eq!(equated.keys(), &[d("person")]);
    let result = schema.run("equated", &equated).unwrap();
    let visible = result.visible().unwrap();
    assert_eq!(visible.columns, names(&["person", "city"]));
    assert_eq!(
        visible.row_set(),
        rows(&[&["Alice", "Paris"], &["Bob", "Paris"], &["Chloé", "Lyon"]])
    );
}

#[test]
fn test_compose_rekeys_by_badge() {
    let mut schema = staff();
    let tree = DerivationTree::new(vec![d("person")]).unwrap();
    let tree = schema.derive_column(&tree, &d("city"), &[d("person")], &[]).unwrap();

    let mut namespace = tree.namespace();
    let to_person = schema.resolve(&[d("badge")], &[d("person")], &[], &mut namespace).unwrap();
    let composed = tree
        .compose(
            &[d("badge")],
            &d("person"),
            to_person.hidden_keys,
            to_person.representation,
            to_person.cardinality,
        )
        .unwrap();
    assert_eq!(composed.keys(), &[d("badge")]);

    let result = schema.run("badges", &composed).unwrap();
    let visible = result.visible().unwrap();
    assert_eq!(visible.columns, names(&["badge", "city"]));
    assert_eq!(
        visible.row_set(),
        rows(&[&["B1", "Paris"], &["B2", "Paris"], &["B3", "Lyon"]])
    );
    assert_eq!(result.dropped_key_count, 0);
}
