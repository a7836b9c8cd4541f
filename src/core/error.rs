// =============================================================================
// ERROR — Les familles d'erreurs du moteur
// =============================================================================
//
// Toutes ces erreurs sont des violations de contrat : le moteur ne retente
// rien. Comme chaque édition retourne un nouvel arbre (copy-on-write), une
// édition qui échoue laisse simplement l'arbre de l'appelant intact.
//
// =============================================================================

use thiserror::Error;

/// Erreurs du graphe de schéma et de la recherche de chemins.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("le nœud '{0}' n'est pas dans le graphe")]
    NodeNotInGraph(String),

    #[error("le nœud '{0}' n'est pas atomique")]
    NotAtomic(String),

    #[error("aucun chemin de '{from}' vers '{to}'{}", projection_hint_text(.projection_hint))]
    NoPath {
        from: String,
        to: String,
        projection_hint: bool,
    },

    #[error("{count} plus courts chemins de '{from}' vers '{to}' : ajouter un point de passage")]
    MultiplePaths { from: String, to: String, count: u64 },

    #[error("cycle détecté : le chemin repasse par '{0}'")]
    CycleDetected(String),

    #[error("les constituants ne correspondent pas : {expected} attendus, {found} trouvés")]
    ConstituentMismatch { expected: usize, found: usize },
}

fn projection_hint_text(hint: &bool) -> &'static str {
    if *hint {
        " (un point de passage sur un constituant du produit pourrait permettre une projection)"
    } else {
        ""
    }
}

/// Erreurs de l'algèbre des mappings (préconditions des transformations).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("curry impossible en position {index} : ce n'est pas une position source (arité {arity})")]
    CurryAtWrongPosition { index: usize, arity: usize },

    #[error("uncurry impossible : {index} n'est pas l'indice d'une clé cachée ({count} clés cachées)")]
    UncurryNotHidden { index: usize, count: usize },

    #[error("uncurry impossible en position {position} (arité {arity})")]
    UncurryAtWrongPosition { position: usize, arity: usize },

    #[error("le domaine '{0}' est déjà transporté")]
    AlreadyCarried(String),

    #[error("le domaine '{0}' n'a jamais été transporté")]
    NotCarried(String),
}

/// Erreurs structurelles de l'arbre de dérivation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("les clés doivent être uniques : '{0}' est dupliquée")]
    KeysNotUnique(String),

    #[error("'{0}' est déjà un enfant du parent")]
    AlreadyChild(String),

    #[error("chemin de nœud invalide : {0:?}")]
    InvalidPath(Vec<usize>),

    #[error("le chemin {0:?} ne diverge pas de sa clé racine")]
    PathDoesNotDiverge(Vec<usize>),

    #[error("clé introuvable : '{0}'")]
    KeyNotFound(String),

    #[error("colonne introuvable : '{0}'")]
    ColumnNotFound(String),

    #[error("'{0}' n'est pas une clé de la racine")]
    NotAKey(String),

    #[error("segment non inversible : {0}")]
    NotInvertible(String),

    #[error("des clés cachées héritées exigent au moins un chemin intermédiaire")]
    MissingIntermediate,

    #[error("la clé '{0}' est encore utilisée par un autre point de passage")]
    KeyInUse(String),
}

/// Erreurs de données remontées par un backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("colonnes incompatibles : attendu {expected:?}, reçu {found:?}")]
    ColumnMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("clés dupliquées dans la relation '{relation}' : {key}")]
    DuplicateKeys { relation: String, key: String },

    #[error("nœud inconnu du backend : '{0}'")]
    UnknownNode(String),

    #[error("aucune relation pour l'arête '{0}'")]
    UnknownRelation(String),
}

/// Erreurs d'exécution de la machine à pile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("pile vide pendant {0}")]
    EmptyStack(String),

    #[error("{0} sans cadre d'appel actif")]
    NoFrame(String),

    #[error("RET ne correspond pas au cadre courant (indice {index}, profondeur {depth})")]
    FrameMismatch { index: usize, depth: usize },

    #[error("colonne absente : '{0}'")]
    MissingColumn(String),

    #[error("colonne déjà présente : '{0}'")]
    DuplicateColumn(String),

    #[error("traversée imbriquée : des colonnes positionnelles existent déjà")]
    NestedTraversal,

    #[error("arité incompatible : {expected} attendues, {found} trouvées")]
    ArityMismatch { expected: usize, found: usize },

    #[error("END rencontré hors de la fin du programme")]
    UnexpectedEnd,

    #[error("pile déséquilibrée en fin de programme : {0} tables")]
    UnbalancedStack(usize),

    #[error("table inconnue : '{0}'")]
    UnknownTable(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Erreur de haut niveau, pour les appels qui traversent plusieurs couches.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}
