//! Resolution: which targets must run, and in what order.
//!
//! Both algorithms walk dependency edges breadth-first and expand each target
//! at most once, so they terminate on cyclic graphs. The invoked target is
//! always part of the plan, always at depth 0, and always runs last.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::rule::Rule;
use crate::staleness::{Comparison, StatCache};

/// Which resolution algorithm produced a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Only targets newer than the invoked target are expanded.
    Bounded,
    /// Staleness anywhere in the dependency closure propagates to every
    /// target on the way back up.
    Recursive,
}

/// Ordered list of outdated targets, deepest dependencies first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub target: String,
    pub mode: Mode,
    pub order: Vec<String>,
    /// Recorded depth of every visited target.
    pub depths: BTreeMap<String, usize>,
}

impl Plan {
    fn new(target: &str, mode: Mode, outdated: Outdated, depths: HashMap<String, usize>) -> Self {
        let mut order = outdated.order;
        // stable: equal depths keep discovery order
        order.sort_by(|a, b| {
            let da = depths.get(a).copied().unwrap_or(0);
            let db = depths.get(b).copied().unwrap_or(0);
            db.cmp(&da)
        });
        Self {
            target: target.to_string(),
            mode,
            order,
            depths: depths.into_iter().collect(),
        }
    }

    pub fn contains(&self, target: &str) -> bool {
        self.order.iter().any(|t| t == target)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Nothing but the invoked target is outdated.
    pub fn is_entry_only(&self) -> bool {
        self.order.len() == 1
    }
}

/// Outdated targets in discovery order.
struct Outdated {
    order: Vec<String>,
    members: HashSet<String>,
}

impl Outdated {
    fn new(entry: &str) -> Self {
        let mut outdated = Self {
            order: Vec::new(),
            members: HashSet::new(),
        };
        outdated.insert(entry);
        outdated
    }

    fn insert(&mut self, target: &str) -> bool {
        if self.members.insert(target.to_string()) {
            self.order.push(target.to_string());
            true
        } else {
            false
        }
    }

    fn contains(&self, target: &str) -> bool {
        self.members.contains(target)
    }
}

/// Dependencies of `target`; unregistered names have none.
fn deps_of<'r>(rules: &'r HashMap<String, Rule>, target: &str) -> impl Iterator<Item = &'r String> {
    rules.get(target).into_iter().flat_map(|r| r.dependencies().iter())
}

/// Record a revisit. The invoked target is pinned at depth 0.
fn revisit(depths: &mut HashMap<String, usize>, entry: &str, target: &str, depth: usize) -> bool {
    match depths.get_mut(target) {
        Some(recorded) => {
            if target != entry && depth > *recorded {
                *recorded = depth;
            }
            true
        }
        None => false,
    }
}

/// Check the invoked target against its dependencies, expanding only the
/// dependencies that are newer than it.
pub fn bounded(rules: &HashMap<String, Rule>, target: &str, stats: &mut StatCache<'_>) -> Plan {
    let mut depths = HashMap::from([(target.to_string(), 0)]);
    let mut outdated = Outdated::new(target);
    let mut queue: VecDeque<(String, usize)> =
        deps_of(rules, target).map(|dep| (dep.clone(), 1)).collect();

    while let Some((name, depth)) = queue.pop_front() {
        if revisit(&mut depths, target, &name, depth) {
            continue;
        }
        depths.insert(name.clone(), depth);

        if stats.is_newer(&name, target, Comparison::Strict) {
            tracing::debug!(rule = %name, depth, "Outdated relative to {target}");
            outdated.insert(&name);
            queue.extend(deps_of(rules, &name).map(|dep| (dep.clone(), depth + 1)));
        }
    }

    Plan::new(target, Mode::Bounded, outdated, depths)
}

/// Propagate staleness through the whole dependency closure of the invoked
/// target.
pub fn recursive(rules: &HashMap<String, Rule>, target: &str, stats: &mut StatCache<'_>) -> Plan {
    let mut depths = HashMap::new();
    let mut outdated = Outdated::new(target);
    let mut visited: Vec<String> = Vec::new();
    let mut queue: VecDeque<(String, Vec<String>)> = VecDeque::from([(target.to_string(), Vec::new())]);

    while let Some((name, mut path)) = queue.pop_front() {
        let depth = path.len();
        if revisit(&mut depths, target, &name, depth) {
            continue;
        }
        depths.insert(name.clone(), depth);
        path.push(name.clone());

        if stats.is_newer(&name, target, Comparison::Strict) {
            tracing::debug!(rule = %name, depth, path = ?path, "Outdated relative to {target}");
            for step in &path {
                outdated.insert(step);
            }
        }

        for dep in deps_of(rules, &name) {
            queue.push_back((dep.clone(), path.clone()));
        }
        visited.push(name);
    }

    // Routes other than the first-found path: a target is outdated when any
    // of its dependencies is. The entry is outdated unconditionally, so a
    // cycle back to it does not count.
    loop {
        let mut changed = false;
        for name in &visited {
            if !outdated.contains(name)
                && deps_of(rules, name).any(|dep| dep != target && outdated.contains(dep))
            {
                tracing::debug!(rule = %name, "Outdated through a dependency");
                changed |= outdated.insert(name);
            }
        }
        if !changed {
            break;
        }
    }

    Plan::new(target, Mode::Recursive, outdated, depths)
}
