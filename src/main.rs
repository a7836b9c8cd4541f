// =============================================================================
// TABRUST — Point d'entrée : démonstration du moteur
// =============================================================================
//
// Ce main.rs montre un exemple complet sur un petit univers Star Wars :
//   1. Définir le graphe (personnages, secteurs, trilogies) et ses blends
//   2. Charger les données dans le backend mémoire
//   3. Dériver `sector` depuis `name` (deux arêtes, via un blend)
//   4. Dériver `director` depuis (trilogy, episode), puis cacher `episode`
//   5. Reprendre une table déjà exécutée (instantané)
//   6. Inverser un chemin : `sector` devient la clé
//
// =============================================================================

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use tabrust::backend::memory::MemoryBackend;
use tabrust::backend::Backend;
use tabrust::config::EngineConfig;
use tabrust::core::cardinality::Cardinality;
use tabrust::core::derivation::DerivationTree;
use tabrust::core::query::{QueryResult, Schema};
use tabrust::core::representation::{format_program, RepresentationStep};
use tabrust::core::schema::{AtomicNode, Domain, SchemaEdge, SchemaGraph, SchemaNode};
use tabrust::core::typeside::{BaseType, Value};
use tabrust::core::validate;

#[derive(Parser, Debug)]
#[command(author, version, about = "Démonstration de Tabrust sur l'univers Star Wars")]
struct Args {
    /// Fichier de configuration JSON du moteur
    #[arg(long)]
    config: Option<PathBuf>,
    /// Affiche les traces de l'interpréteur
    #[arg(long)]
    verbose: bool,
}

fn atom(name: &str) -> AtomicNode {
    AtomicNode::string(name)
}

fn dom(name: &str) -> Domain {
    Domain::of(&atom(name))
}

fn row(values: &[&str]) -> Vec<Value> {
    values.iter().map(|v| Value::from(*v)).collect()
}

fn print_result(title: &str, result: &QueryResult) -> Result<()> {
    println!("── {} ──", title);
    println!("{}", result.visible()?);
    println!(
        "clés perdues : {}, lignes vides retirées : {}\n",
        result.dropped_key_count, result.dropped_value_count
    );
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::TRACE } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &args.config {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default(),
    };

    println!("╔══════════════════════════════════════════════════╗");
    println!("║      TABRUST — Algèbre relationnelle             ║");
    println!("║      Dérivations de colonnes auditables          ║");
    println!("╚══════════════════════════════════════════════════╝\n");

    // ═══════════════════════════════════════════════════════════
    // ÉTAPE 1 : Le graphe
    // ═══════════════════════════════════════════════════════════
    println!("═══ ÉTAPE 1 : Graphe de schéma ═══\n");

    let episode = AtomicNode::new("episode", BaseType::Integer);
    let film = SchemaNode::product(vec![atom("trilogy"), episode.clone()]);
    let characters = SchemaEdge::new(atom("name").into(), atom("homeworld").into(), Cardinality::ManyToOne);
    let sectors = SchemaEdge::new(atom("world").into(), atom("sector").into(), Cardinality::ManyToOne);
    let trilogies = SchemaEdge::new(film.clone(), atom("director").into(), Cardinality::ManyToOne);

    let mut graph = SchemaGraph::new("StarWars");
    graph
        .add_edge(characters.from.clone(), characters.to.clone(), characters.cardinality)
        .add_edge(sectors.from.clone(), sectors.to.clone(), sectors.cardinality)
        .add_edge(trilogies.from.clone(), trilogies.to.clone(), trilogies.cardinality);
    graph.blend(&atom("homeworld").into(), &atom("world").into())?;

    match validate::validate_graph(&graph) {
        Ok(()) => println!("✓ Graphe valide\n"),
        Err(errors) => {
            for e in errors {
                println!("✗ {}", e);
            }
        }
    }

    // ═══════════════════════════════════════════════════════════
    // ÉTAPE 2 : Les données
    // ═══════════════════════════════════════════════════════════
    println!("═══ ÉTAPE 2 : Backend mémoire ═══\n");

    let mut backend = MemoryBackend::new();
    backend
        .insert_rows(&characters, vec![
            row(&["Luke", "Tatooine"]),
            row(&["Leia", "Alderaan"]),
            row(&["Han", "Corellia"]),
        ])?
        .insert_rows(&sectors, vec![
            row(&["Tatooine", "Arkanis"]),
            row(&["Alderaan", "Alderaan"]),
            row(&["Corellia", "Corellian"]),
        ])?
        .insert_rows(&trilogies, vec![
            vec![Value::from("Original"), Value::from(4_i64), Value::from("Lucas")],
            vec![Value::from("Original"), Value::from(5_i64), Value::from("Kershner")],
            vec![Value::from("Original"), Value::from(6_i64), Value::from("Marquand")],
            vec![Value::from("Prequel"), Value::from(1_i64), Value::from("Lucas")],
        ])?;
    println!("Backend : {}\n", backend.name());

    let mut schema = Schema::new(graph, backend, config);

    // ═══════════════════════════════════════════════════════════
    // ÉTAPE 3 : sector depuis name
    // ═══════════════════════════════════════════════════════════
    println!("═══ ÉTAPE 3 : Dériver sector depuis name ═══\n");

    let tree = DerivationTree::new(vec![dom("name")])?;
    let tree = schema.derive_column(&tree, &dom("homeworld"), &[dom("name")], &[])?;
    let base = schema.run("characters", &tree)?;
    print_result("characters", &base)?;

    let tree = schema.derive_column(&tree, &dom("sector"), &[dom("name")], &[])?;
    println!("{}", tree);
    println!("Programme : {}\n", format_program(&tree.to_program()));
    let full = schema.run("characters_sectors", &tree)?;
    print_result("characters_sectors", &full)?;

    // ═══════════════════════════════════════════════════════════
    // ÉTAPE 4 : director depuis (trilogy, episode)
    // ═══════════════════════════════════════════════════════════
    println!("═══ ÉTAPE 4 : Réalisateurs ═══\n");

    let film_keys = vec![dom("trilogy"), Domain::of(&episode)];
    let films = DerivationTree::new(film_keys.clone())?;
    let films = schema.derive_column(&films, &dom("director"), &film_keys, &[])?;
    print_result("films", &schema.run("films", &films)?)?;

    let by_trilogy = films.hide(&Domain::of(&episode))?;
    println!("{}", by_trilogy);
    print_result("films par trilogie (episode caché)", &schema.run("trilogies", &by_trilogy)?)?;

    // ═══════════════════════════════════════════════════════════
    // ÉTAPE 5 : Reprendre un instantané
    // ═══════════════════════════════════════════════════════════
    println!("═══ ÉTAPE 5 : Exécution incrémentale ═══\n");

    let mut namespace = tree.namespace();
    let step = schema.resolve(&[dom("homeworld")], &[dom("sector")], &[], &mut namespace)?;
    let mut program = step.representation;
    program.push(RepresentationStep::End {
        left: vec![dom("name")],
        hidden: Vec::new(),
        right: vec![dom("homeworld"), dom("sector")],
    });
    println!("Programme incrémental : {}\n", format_program(&program));
    if schema.config().cache_snapshots {
        let resumed = schema.execute_query("resumed", Some("characters"), &program)?;
        print_result("characters + sector", &resumed)?;
    } else {
        println!("(instantanés désactivés par la configuration)\n");
    }

    // ═══════════════════════════════════════════════════════════
    // ÉTAPE 6 : Inverser
    // ═══════════════════════════════════════════════════════════
    println!("═══ ÉTAPE 6 : sector devient la clé ═══\n");

    let without_homeworld = tree.hide(&dom("homeworld"))?;
    let sector_path = without_homeworld
        .find_path(|n, _| n.domains == [dom("sector")])
        .ok_or_else(|| anyhow::anyhow!("colonne sector introuvable"))?;
    let by_sector = without_homeworld.invert_path(&sector_path)?;
    println!("{}", by_sector);
    print_result("personnages par secteur", &schema.run("by_sector", &by_sector)?)?;

    Ok(())
}
