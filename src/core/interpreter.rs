// =============================================================================
// INTERPRETER — La machine à pile qui exécute l'IR
// =============================================================================
//
// État de la machine :
//   - une PILE de tables ;
//   - un POINTEUR de pile : liste chaînée immuable de cadres. Chaque cadre
//     retient un indice dans la pile et le cadre englobant.
//
// ALGORITHME : un pli gauche sur le programme. Chaque instruction est une
// fonction pure (instruction, backend, pile, pointeur) → (pile', pointeur').
//
// Le trio CAL / RST / RET permet à un nœud de l'arbre d'avoir plusieurs
// enfants dérivés indépendamment à partir de la même table :
//
//   GET<[a]>      [A]
//   CAL           [A, A]          cadre → indice 0
//   ...b...       [A, AB]
//   RST           [A, AB, A]      copie de la table du cadre, pas du sommet
//   ...c...       [A, AB, AC]
//   MER           [A, ABC]
//   RET           [ABC]           cadre englobant restauré
//
// L'instruction finale END n'est pas exécutée : `execute` s'arrête dessus
// et la rend à l'appelant, qui s'en sert pour mettre en forme le résultat.
//
// =============================================================================

use std::rc::Rc;

use tracing::trace;

use super::error::ExecutionError;
use super::representation::RepresentationStep;
use super::schema::Domain;
use super::table::Table;
use crate::backend::Backend;

/// Un cadre d'appel : indice de la table de départ dans la pile.
#[derive(Debug)]
pub struct Frame {
    pub index: usize,
    pub parent: StackPointer,
}

pub type StackPointer = Option<Rc<Frame>>;

pub type Stack = Vec<Table>;

/// Le contenu de l'instruction END.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndShape {
    pub left: Vec<Domain>,
    pub hidden: Vec<Domain>,
    pub right: Vec<Domain>,
}

/// Résultat d'une exécution : la pile finale et, si le programme se
/// terminait par END, la forme demandée.
#[derive(Debug, Clone)]
pub struct Execution {
    pub stack: Stack,
    pub end: Option<EndShape>,
}

/// Exécute `program` à partir de `stack`.
pub fn execute<B: Backend + ?Sized>(
    program: &[RepresentationStep],
    backend: &B,
    stack: Stack,
) -> Result<Execution, ExecutionError> {
    let mut stack = stack;
    let mut pointer: StackPointer = None;
    for (i, step) in program.iter().enumerate() {
        if let RepresentationStep::End { left, hidden, right } = step {
            if i + 1 != program.len() {
                return Err(ExecutionError::UnexpectedEnd);
            }
            let end = EndShape {
                left: left.clone(),
                hidden: hidden.clone(),
                right: right.clone(),
            };
            return Ok(Execution { stack, end: Some(end) });
        }
        (stack, pointer) = execute_step(step, backend, stack, pointer)?;
    }
    Ok(Execution { stack, end: None })
}

fn pop(stack: &mut Stack, step: &RepresentationStep) -> Result<Table, ExecutionError> {
    stack
        .pop()
        .ok_or_else(|| ExecutionError::EmptyStack(step.mnemonic().to_string()))
}

/// Nombre de colonnes positionnelles consécutives `#0, #1...`
fn positional_arity(table: &Table) -> usize {
    (0..).take_while(|&i| table.has_column(&Table::positional(i))).count()
}

fn check_arity(expected: usize, found: usize) -> Result<(), ExecutionError> {
    if expected == found {
        Ok(())
    } else {
        Err(ExecutionError::ArityMismatch { expected, found })
    }
}

/// Les positions d'un EXP doivent être distinctes et dans `0..width`.
fn check_expansion(indices: &[usize], width: usize) -> Result<(), ExecutionError> {
    let mut seen = vec![false; width];
    for &i in indices {
        match seen.get_mut(i) {
            Some(slot) if !*slot => *slot = true,
            _ => {
                return Err(ExecutionError::ArityMismatch {
                    expected: width,
                    found: indices.len(),
                })
            }
        }
    }
    Ok(())
}

fn scratch(i: usize) -> String {
    format!("#<{}", i)
}

/// Exécute une instruction.
pub fn execute_step<B: Backend + ?Sized>(
    step: &RepresentationStep,
    backend: &B,
    mut stack: Stack,
    pointer: StackPointer,
) -> Result<(Stack, StackPointer), ExecutionError> {
    trace!(step = %step, depth = stack.len(), "instruction");
    match step {
        RepresentationStep::Get { domains } => {
            let mut table = Table::unit();
            for d in domains {
                let domain = backend
                    .get_domain_from_atomic_node(&d.node)?
                    .rename(&d.node.name, &d.name)?;
                table = table.cross_join(&domain);
            }
            stack.push(table);
            Ok((stack, pointer))
        }
        RepresentationStep::Push => {
            let top = stack
                .last()
                .cloned()
                .ok_or_else(|| ExecutionError::EmptyStack(step.mnemonic().to_string()))?;
            stack.push(top);
            Ok((stack, pointer))
        }
        RepresentationStep::Pop => {
            pop(&mut stack, step)?;
            Ok((stack, pointer))
        }
        RepresentationStep::Call => {
            let top = stack
                .last()
                .cloned()
                .ok_or_else(|| ExecutionError::EmptyStack(step.mnemonic().to_string()))?;
            let frame = Frame { index: stack.len() - 1, parent: pointer };
            stack.push(top);
            Ok((stack, Some(Rc::new(frame))))
        }
        RepresentationStep::Return => {
            let frame = pointer.ok_or_else(|| ExecutionError::NoFrame("RET".into()))?;
            if frame.index + 2 != stack.len() {
                return Err(ExecutionError::FrameMismatch {
                    index: frame.index,
                    depth: stack.len(),
                });
            }
            let inner = pop(&mut stack, step)?;
            pop(&mut stack, step)?;
            stack.push(inner);
            Ok((stack, frame.parent.clone()))
        }
        RepresentationStep::Reset => {
            let frame = pointer
                .as_ref()
                .ok_or_else(|| ExecutionError::NoFrame("RST".into()))?;
            let snapshot = stack
                .get(frame.index)
                .cloned()
                .ok_or_else(|| ExecutionError::EmptyStack(step.mnemonic().to_string()))?;
            stack.push(snapshot);
            Ok((stack, pointer))
        }
        RepresentationStep::StartTraversal { domains } => {
            let mut table = pop(&mut stack, step)?;
            if table.columns.iter().any(|c| Table::is_positional(c)) {
                return Err(ExecutionError::NestedTraversal);
            }
            for (i, d) in domains.iter().enumerate() {
                table = table.copy_column(&d.name, &Table::positional(i))?;
            }
            stack.push(table);
            Ok((stack, pointer))
        }
        RepresentationStep::Traverse { mapping } => {
            let table = pop(&mut stack, step)?;
            check_arity(mapping.from.len(), positional_arity(&table))?;
            let joined = backend.get_relation_from_mapping(mapping, &table)?;
            let kept: Vec<String> = joined
                .columns
                .iter()
                .filter(|c| {
                    !(0..mapping.from.len()).any(|i| **c == Table::positional(i))
                })
                .cloned()
                .collect();
            let mut table = joined.select(&kept)?;
            for j in 0..mapping.to.len() {
                table = table.rename(&Table::output(j), &Table::positional(j))?;
            }
            stack.push(table);
            Ok((stack, pointer))
        }
        RepresentationStep::Project { start, indices, .. } => {
            let mut table = pop(&mut stack, step)?;
            check_arity(start.len(), positional_arity(&table))?;
            for (k, &i) in indices.iter().enumerate() {
                table = table.copy_column(&Table::positional(i), &scratch(k))?;
            }
            let kept: Vec<String> = table
                .columns
                .iter()
                .filter(|c| !(0..start.len()).any(|i| **c == Table::positional(i)))
                .cloned()
                .collect();
            table = table.select(&kept)?;
            for k in 0..indices.len() {
                table = table.rename(&scratch(k), &Table::positional(k))?;
            }
            stack.push(table);
            Ok((stack, pointer))
        }
        RepresentationStep::Expand { start, end, indices, hidden_keys } => {
            let mut table = pop(&mut stack, step)?;
            check_arity(start.len(), positional_arity(&table))?;
            check_arity(start.len(), indices.len())?;
            check_expansion(indices, end.len())?;
            check_arity(end.len() - indices.len(), hidden_keys.len())?;
            for i in 0..start.len() {
                table = table.rename(&Table::positional(i), &scratch(i))?;
            }
            let missing: Vec<usize> = (0..end.len()).filter(|p| !indices.contains(p)).collect();
            for (&p, hidden) in missing.iter().zip(hidden_keys) {
                let domain = backend
                    .get_domain_from_atomic_node(&end[p])?
                    .rename(&end[p].name, &hidden.name)?;
                table = table.cross_join(&domain);
            }
            for p in 0..end.len() {
                match indices.iter().position(|&i| i == p) {
                    Some(i) => table = table.rename(&scratch(i), &Table::positional(p))?,
                    None => {
                        let hidden = missing
                            .iter()
                            .position(|&m| m == p)
                            .and_then(|k| hidden_keys.get(k))
                            .ok_or(ExecutionError::ArityMismatch {
                                expected: missing.len(),
                                found: hidden_keys.len(),
                            })?;
                        table = table.copy_column(&hidden.name, &Table::positional(p))?;
                    }
                }
            }
            stack.push(table);
            Ok((stack, pointer))
        }
        RepresentationStep::Equate { .. } => Ok((stack, pointer)),
        RepresentationStep::EndTraversal { domains } => {
            let mut table = pop(&mut stack, step)?;
            check_arity(domains.len(), positional_arity(&table))?;
            for (i, d) in domains.iter().enumerate() {
                table = table.rename(&Table::positional(i), &d.name)?;
            }
            stack.push(table);
            Ok((stack, pointer))
        }
        RepresentationStep::Rename { renames } => {
            let mut table = pop(&mut stack, step)?;
            for (from, to) in renames {
                table = table.rename(&from.name, &to.name)?;
            }
            stack.push(table);
            Ok((stack, pointer))
        }
        RepresentationStep::Merge => {
            let right = pop(&mut stack, step)?;
            let left = pop(&mut stack, step)?;
            stack.push(left.merge(&right)?);
            Ok((stack, pointer))
        }
        RepresentationStep::Drop { domains } => {
            let table = pop(&mut stack, step)?;
            let names: Vec<String> = domains.iter().map(|d| d.name.clone()).collect();
            stack.push(table.drop_columns(&names)?);
            Ok((stack, pointer))
        }
        RepresentationStep::Filter { domain } => {
            let table = pop(&mut stack, step)?;
            stack.push(table.filter_non_null(&domain.name)?);
            Ok((stack, pointer))
        }
        RepresentationStep::Sort { domains } => {
            let table = pop(&mut stack, step)?;
            let names: Vec<String> = domains.iter().map(|d| d.name.clone()).collect();
            stack.push(table.sort_by(&names)?);
            Ok((stack, pointer))
        }
        RepresentationStep::End { .. } => Err(ExecutionError::UnexpectedEnd),
    }
}
