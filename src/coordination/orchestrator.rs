//! Task orchestration: a dependency DAG of tasks, keyword-matched against
//! agent capabilities, with a checked status lifecycle.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

use super::types::{AgentProfile, Task, TaskStatus};
use super::CoordinationError;
use crate::config::CoordinationConfig;

#[derive(Debug, Clone, Serialize)]
pub struct Assignment {
    pub task_id: String,
    pub agent_id: String,
    /// Keyword overlap between the agent's capabilities and the task.
    pub score: usize,
}

#[derive(Debug, Default, Serialize)]
pub struct AssignmentReport {
    pub assigned: Vec<Assignment>,
    /// Ready tasks no agent could take; they stay pending.
    pub unassigned: Vec<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub total: usize,
    pub pending: usize,
    pub assigned: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

#[derive(Debug)]
pub struct TaskOrchestrator {
    tasks: HashMap<String, Task>,
    /// Insertion order, for stable tie-breaking and listing.
    order: Vec<String>,
    min_keyword_overlap: usize,
}

impl TaskOrchestrator {
    pub fn new(config: &CoordinationConfig) -> Self {
        Self {
            tasks: HashMap::new(),
            order: Vec::new(),
            min_keyword_overlap: config.min_keyword_overlap,
        }
    }

    pub fn add_task(&mut self, task: Task) -> Result<(), CoordinationError> {
        self.add_tasks(vec![task])
    }

    /// Add a batch atomically. Dependencies may point at existing tasks or at
    /// other tasks in the batch; the combined graph must stay acyclic.
    pub fn add_tasks(&mut self, batch: Vec<Task>) -> Result<(), CoordinationError> {
        let mut batch_ids: HashSet<&str> = HashSet::new();
        for task in &batch {
            if self.tasks.contains_key(&task.id) || !batch_ids.insert(task.id.as_str()) {
                return Err(CoordinationError::DuplicateTask(task.id.clone()));
            }
        }
        for task in &batch {
            for dep in &task.dependencies {
                if !self.tasks.contains_key(dep) && !batch_ids.contains(dep.as_str()) {
                    return Err(CoordinationError::UnknownDependency {
                        task: task.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        // Existing tasks cannot depend on new ones, so a cycle lies inside the batch.
        let layered: Vec<&Task> = batch.iter().collect();
        kahn_layers(&layered)?;

        for mut task in batch {
            task.status = TaskStatus::Pending;
            task.assigned_agent = None;
            task.result = None;
            self.order.push(task.id.clone());
            self.tasks.insert(task.id.clone(), task);
        }
        Ok(())
    }

    pub fn get(&self, task_id: &str) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    /// Tasks in insertion order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }

    /// Pending tasks whose dependencies have all completed, highest priority first.
    pub fn ready_tasks(&self) -> Vec<&Task> {
        let mut ready: Vec<(usize, &Task)> = self
            .tasks()
            .enumerate()
            .filter(|(_, t)| t.status == TaskStatus::Pending && self.pending_dependencies(t).is_empty())
            .collect();
        ready.sort_by(|(ia, a), (ib, b)| b.priority.cmp(&a.priority).then(ia.cmp(ib)));
        ready.into_iter().map(|(_, t)| t).collect()
    }

    /// Assign every ready task to its best-matching agent with spare capacity.
    pub fn assign_tasks(&mut self, agents: &[AgentProfile]) -> AssignmentReport {
        let ready: Vec<String> = self.ready_tasks().iter().map(|t| t.id.clone()).collect();
        let mut report = AssignmentReport::default();

        for task_id in ready {
            match self.assign_task(&task_id, agents) {
                Ok(assignment) => report.assigned.push(assignment),
                Err(_) => report.unassigned.push(task_id),
            }
        }

        if !report.unassigned.is_empty() {
            tracing::warn!(unassigned = ?report.unassigned, "tasks left without an agent");
        }
        report
    }

    /// Assign one ready task.
    pub fn assign_task(
        &mut self,
        task_id: &str,
        agents: &[AgentProfile],
    ) -> Result<Assignment, CoordinationError> {
        let task = self.task(task_id)?;
        if task.status != TaskStatus::Pending {
            return Err(CoordinationError::InvalidTransition {
                task: task_id.to_string(),
                from: task.status,
                to: TaskStatus::Assigned,
            });
        }
        let pending = self.pending_dependencies(task);
        if !pending.is_empty() {
            return Err(CoordinationError::Blocked {
                task: task_id.to_string(),
                pending,
            });
        }

        let wanted = task.keywords();
        let loads = self.agent_loads();
        let best = agents
            .iter()
            .filter_map(|agent| {
                let load = loads.get(agent.id.as_str()).copied().unwrap_or(0);
                if load >= agent.max_concurrent_tasks {
                    return None;
                }
                let score = agent.keywords().intersection(&wanted).count();
                (score >= self.min_keyword_overlap).then_some((agent, score, load))
            })
            // Highest score, then lowest load, then smallest id.
            .min_by(|(a, sa, la), (b, sb, lb)| {
                sb.cmp(sa).then(la.cmp(lb)).then_with(|| a.id.cmp(&b.id))
            });

        let Some((agent, score, _)) = best else {
            return Err(CoordinationError::NoEligibleAgent(task_id.to_string()));
        };

        let task = self.task_mut(task_id)?;
        task.status = TaskStatus::Assigned;
        task.assigned_agent = Some(agent.id.clone());

        tracing::info!(task = task_id, agent = %agent.id, score, "task assigned");

        Ok(Assignment {
            task_id: task_id.to_string(),
            agent_id: agent.id.clone(),
            score,
        })
    }

    pub fn start(&mut self, task_id: &str) -> Result<(), CoordinationError> {
        self.transition(task_id, &[TaskStatus::Assigned], TaskStatus::InProgress)?;
        Ok(())
    }

    pub fn complete(&mut self, task_id: &str, result: impl Into<String>) -> Result<(), CoordinationError> {
        let task = self.transition(task_id, &[TaskStatus::InProgress], TaskStatus::Completed)?;
        task.result = Some(result.into());
        Ok(())
    }

    /// Fail an assigned or running task. Returns the dependents cancelled with it.
    pub fn fail(&mut self, task_id: &str, reason: impl Into<String>) -> Result<Vec<String>, CoordinationError> {
        let task = self.transition(
            task_id,
            &[TaskStatus::Assigned, TaskStatus::InProgress],
            TaskStatus::Failed,
        )?;
        task.result = Some(reason.into());
        Ok(self.cancel_dependents(task_id))
    }

    /// Cancel any non-terminal task. Returns the dependents cancelled with it.
    pub fn cancel(&mut self, task_id: &str) -> Result<Vec<String>, CoordinationError> {
        self.transition(
            task_id,
            &[TaskStatus::Pending, TaskStatus::Assigned, TaskStatus::InProgress],
            TaskStatus::Cancelled,
        )?;
        Ok(self.cancel_dependents(task_id))
    }

    /// Layers of non-cancelled tasks; every task's dependencies sit in earlier layers.
    pub fn execution_waves(&self) -> Result<Vec<Vec<String>>, CoordinationError> {
        let live: Vec<&Task> = self
            .tasks()
            .filter(|t| t.status != TaskStatus::Cancelled)
            .collect();
        kahn_layers(&live)
    }

    pub fn progress(&self) -> Progress {
        let mut p = Progress {
            total: self.tasks.len(),
            ..Progress::default()
        };
        for task in self.tasks.values() {
            match task.status {
                TaskStatus::Pending => p.pending += 1,
                TaskStatus::Assigned => p.assigned += 1,
                TaskStatus::InProgress => p.in_progress += 1,
                TaskStatus::Completed => p.completed += 1,
                TaskStatus::Failed => p.failed += 1,
                TaskStatus::Cancelled => p.cancelled += 1,
            }
        }
        p
    }

    fn task(&self, task_id: &str) -> Result<&Task, CoordinationError> {
        self.tasks
            .get(task_id)
            .ok_or_else(|| CoordinationError::TaskNotFound(task_id.to_string()))
    }

    fn task_mut(&mut self, task_id: &str) -> Result<&mut Task, CoordinationError> {
        self.tasks
            .get_mut(task_id)
            .ok_or_else(|| CoordinationError::TaskNotFound(task_id.to_string()))
    }

    fn transition(
        &mut self,
        task_id: &str,
        allowed_from: &[TaskStatus],
        to: TaskStatus,
    ) -> Result<&mut Task, CoordinationError> {
        let task = self.task_mut(task_id)?;
        if !allowed_from.contains(&task.status) {
            return Err(CoordinationError::InvalidTransition {
                task: task_id.to_string(),
                from: task.status,
                to,
            });
        }
        tracing::debug!(task = task_id, from = %task.status, %to, "task transition");
        task.status = to;
        Ok(task)
    }

    fn pending_dependencies(&self, task: &Task) -> Vec<String> {
        task.dependencies
            .iter()
            .filter(|dep| {
                !matches!(self.tasks.get(dep.as_str()), Some(d) if d.status == TaskStatus::Completed)
            })
            .cloned()
            .collect()
    }

    /// Tasks each agent holds in `assigned` or `in_progress`.
    fn agent_loads(&self) -> HashMap<&str, usize> {
        let mut loads = HashMap::new();
        for task in self.tasks.values() {
            if matches!(task.status, TaskStatus::Assigned | TaskStatus::InProgress) {
                if let Some(agent) = &task.assigned_agent {
                    *loads.entry(agent.as_str()).or_insert(0) += 1;
                }
            }
        }
        loads
    }

    /// Transitively cancel pending tasks downstream of `root`.
    fn cancel_dependents(&mut self, root: &str) -> Vec<String> {
        let mut cancelled = Vec::new();
        let mut queue = VecDeque::from([root.to_string()]);

        while let Some(upstream) = queue.pop_front() {
            let dependents: Vec<String> = self
                .order
                .iter()
                .filter(|id| {
                    self.tasks.get(id.as_str()).is_some_and(|t| {
                        t.status == TaskStatus::Pending && t.dependencies.contains(&upstream)
                    })
                })
                .cloned()
                .collect();
            for id in dependents {
                if let Some(task) = self.tasks.get_mut(&id) {
                    task.status = TaskStatus::Cancelled;
                    task.result = Some(format!("upstream task {upstream} did not complete"));
                }
                queue.push_back(id.clone());
                cancelled.push(id);
            }
        }

        if !cancelled.is_empty() {
            tracing::info!(root, cancelled = ?cancelled, "dependents cancelled");
        }
        cancelled
    }
}

/// Kahn layering over `tasks`. Edges to tasks outside the slice are ignored.
/// Within a layer, higher priority comes first, then slice order.
fn kahn_layers(tasks: &[&Task]) -> Result<Vec<Vec<String>>, CoordinationError> {
    let mut dag: DiGraph<usize, ()> = DiGraph::with_capacity(tasks.len(), 0);
    let nodes: Vec<NodeIndex> = (0..tasks.len()).map(|i| dag.add_node(i)).collect();
    let index: HashMap<&str, NodeIndex> = tasks
        .iter()
        .zip(&nodes)
        .map(|(t, &n)| (t.id.as_str(), n))
        .collect();
    for (task, &node) in tasks.iter().zip(&nodes) {
        for dep in &task.dependencies {
            if let Some(&d) = index.get(dep.as_str()) {
                dag.add_edge(d, node, ());
            }
        }
    }

    let order = petgraph::algo::toposort(&dag, None).map_err(|_| cycle_error(&dag, tasks))?;

    // A task's layer is one past the deepest of its dependencies.
    let mut depth = vec![0usize; tasks.len()];
    for &node in &order {
        let layer = dag
            .neighbors_directed(node, Direction::Incoming)
            .map(|d| depth[dag[d]] + 1)
            .max()
            .unwrap_or(0);
        depth[dag[node]] = layer;
    }

    let mut layers: Vec<Vec<usize>> = vec![Vec::new(); depth.iter().max().map_or(0, |d| d + 1)];
    for (i, &d) in depth.iter().enumerate() {
        layers[d].push(i);
    }
    Ok(layers
        .into_iter()
        .map(|mut layer| {
            layer.sort_by(|&a, &b| tasks[b].priority.cmp(&tasks[a].priority).then(a.cmp(&b)));
            layer.into_iter().map(|i| tasks[i].id.clone()).collect()
        })
        .collect())
}

/// Tasks on a cycle, in slice order.
fn cycle_error(dag: &DiGraph<usize, ()>, tasks: &[&Task]) -> CoordinationError {
    let mut stuck: Vec<usize> = petgraph::algo::tarjan_scc(dag)
        .into_iter()
        .filter(|scc| scc.len() > 1 || scc.iter().any(|&n| dag.contains_edge(n, n)))
        .flatten()
        .map(|n| dag[n])
        .collect();
    stuck.sort_unstable();
    CoordinationError::DependencyCycle(stuck.into_iter().map(|i| tasks[i].id.clone()).collect())
}
