use std::collections::{BTreeSet, HashMap};

use super::error::PlanningError;
use super::task::{Task, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Index-based dependency graph over a task slice. Node `i` is `tasks[i]`,
/// so input order doubles as the deterministic tie-break order.
#[derive(Debug)]
pub struct DependencyGraph<'a> {
    tasks: &'a [Task],
    dependencies: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
}

impl<'a> DependencyGraph<'a> {
    /// Validate ids and wire up edges. Does not check for cycles.
    pub fn build(tasks: &'a [Task]) -> Result<Self, PlanningError> {
        if tasks.is_empty() {
            return Err(PlanningError::EmptyTaskList);
        }

        let mut index: HashMap<&TaskId, usize> = HashMap::with_capacity(tasks.len());
        for (i, task) in tasks.iter().enumerate() {
            if index.insert(&task.id, i).is_some() {
                return Err(PlanningError::DuplicateTaskId(task.id.clone()));
            }
        }

        let mut dependencies = vec![Vec::new(); tasks.len()];
        let mut dependents = vec![Vec::new(); tasks.len()];
        for (i, task) in tasks.iter().enumerate() {
            for dep in &task.dependencies {
                let Some(&d) = index.get(dep) else {
                    return Err(PlanningError::UnknownDependency {
                        task: task.id.clone(),
                        dependency: dep.clone(),
                    });
                };
                // Repeated dependency ids collapse to one edge
                if !dependencies[i].contains(&d) {
                    dependencies[i].push(d);
                    dependents[d].push(i);
                }
            }
        }

        Ok(Self {
            tasks,
            dependencies,
            dependents,
        })
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task(&self, node: usize) -> &'a Task {
        &self.tasks[node]
    }

    pub fn dependencies_of(&self, node: usize) -> &[usize] {
        &self.dependencies[node]
    }

    pub fn dependents_of(&self, node: usize) -> &[usize] {
        &self.dependents[node]
    }

    /// Three-color DFS along dependency edges. Returns the first cycle found
    /// as a closed path of task ids (first id repeated at the end).
    pub fn find_cycle(&self) -> Option<Vec<TaskId>> {
        let mut color = vec![Color::White; self.len()];

        for root in 0..self.len() {
            if color[root] != Color::White {
                continue;
            }

            // (node, index of the next dependency to visit)
            let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
            color[root] = Color::Gray;

            while let Some(top) = stack.last_mut() {
                let node = top.0;
                let Some(&dep) = self.dependencies[node].get(top.1) else {
                    color[node] = Color::Black;
                    stack.pop();
                    continue;
                };
                top.1 += 1;

                match color[dep] {
                    Color::White => {
                        color[dep] = Color::Gray;
                        stack.push((dep, 0));
                    }
                    Color::Gray => {
                        let start = stack
                            .iter()
                            .position(|&(n, _)| n == dep)
                            .unwrap_or(0);
                        let mut cycle: Vec<TaskId> = stack[start..]
                            .iter()
                            .map(|&(n, _)| self.tasks[n].id.clone())
                            .collect();
                        cycle.push(self.tasks[dep].id.clone());
                        return Some(cycle);
                    }
                    Color::Black => {}
                }
            }
        }

        None
    }

    /// Kahn's algorithm; among ready nodes the earliest in input order goes
    /// first.
    pub fn topological_order(&self) -> Result<Vec<usize>, PlanningError> {
        let mut in_degree: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let mut ready: BTreeSet<usize> = (0..self.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(self.len());

        while let Some(node) = ready.pop_first() {
            order.push(node);
            for &dependent in &self.dependents[node] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() == self.len() {
            Ok(order)
        } else {
            let cycle = self.find_cycle().unwrap_or_default();
            Err(PlanningError::CircularDependency { cycle })
        }
    }
}
