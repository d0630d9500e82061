//! Priority ordering for registered schemas.
//!
//! Each registration has a base priority (higher first) and may ask to run
//! before or after other named registrations. Relative constraints win over
//! base priority, base priority wins over registration order, and
//! registration order breaks the remaining ties.
//!
//! The order is a topological sort (Kahn's algorithm) where, among the
//! registrations whose constraints are satisfied, the one with the highest
//! priority and then the earliest registration is emitted next. Constraints
//! naming a registration that does not exist yet are kept and take effect
//! once it is registered.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::error::RegistrationError;

/// Name, priority and relative constraints of a schema registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub name: String,
    pub priority: i64,
    pub before: Vec<String>,
    pub after: Vec<String>,
}

impl Registration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Run before the registration called `name`.
    pub fn before(mut self, name: impl Into<String>) -> Self {
        self.before.push(name.into());
        self
    }

    /// Run after the registration called `name`.
    pub fn after(mut self, name: impl Into<String>) -> Self {
        self.after.push(name.into());
        self
    }
}

struct Entry<T> {
    registration: Registration,
    item: T,
}

/// Items kept in priority order.
pub(crate) struct PriorityOrder<T> {
    entries: Vec<Entry<T>>,
    order: Vec<usize>,
}

impl<T> Default for PriorityOrder<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            order: Vec::new(),
        }
    }
}

impl<T> PriorityOrder<T> {
    /// Items without relative constraints, ordered by priority and then by
    /// position in `items`.
    pub(crate) fn unconstrained(items: Vec<(Registration, T)>) -> Self {
        let entries: Vec<Entry<T>> = items
            .into_iter()
            .map(|(registration, item)| Entry { registration, item })
            .collect();
        let mut order: Vec<usize> = (0..entries.len()).collect();
        order.sort_by_key(|&i| (Reverse(entries[i].registration.priority), i));
        Self { entries, order }
    }

    /// Add an item. Fails without modifying the order when the name is taken
    /// or when the constraints would create a cycle.
    pub(crate) fn insert(
        &mut self,
        registration: Registration,
        item: T,
    ) -> Result<(), RegistrationError> {
        if self.position(&registration.name).is_some() {
            return Err(RegistrationError::DuplicateSchema {
                name: registration.name,
            });
        }
        let name = registration.name.clone();
        self.entries.push(Entry { registration, item });
        match compute_order(&self.entries) {
            Ok(order) => {
                self.order = order;
                Ok(())
            }
            Err(cycle) => {
                self.entries.pop();
                Err(RegistrationError::CyclicOrder { name, cycle })
            }
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.registration.name == name)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&Registration, &T)> {
        self.order.iter().map(|&i| {
            let entry = &self.entries[i];
            (&entry.registration, &entry.item)
        })
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.iter().map(|(reg, _)| reg.name.clone()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Topologically sort the entries. On a cycle, returns the names of the
/// registrations that could not be placed.
fn compute_order<T>(entries: &[Entry<T>]) -> Result<Vec<usize>, Vec<String>> {
    let index_of = |name: &str| {
        entries
            .iter()
            .position(|entry| entry.registration.name == name)
    };

    let n = entries.len();
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut in_degree = vec![0usize; n];
    let mut add_edge = |from: usize, to: usize| {
        if from != to && !successors[from].contains(&to) {
            successors[from].push(to);
            in_degree[to] += 1;
        }
    };

    for (i, entry) in entries.iter().enumerate() {
        for other in &entry.registration.before {
            if let Some(j) = index_of(other) {
                add_edge(i, j);
            }
        }
        for other in &entry.registration.after {
            if let Some(j) = index_of(other) {
                add_edge(j, i);
            }
        }
    }

    let key = |i: usize| (entries[i].registration.priority, Reverse(i));
    let mut ready: BinaryHeap<_> = (0..n).filter(|&i| in_degree[i] == 0).map(key).collect();
    let mut order = Vec::with_capacity(n);

    while let Some((_, Reverse(i))) = ready.pop() {
        order.push(i);
        for &j in &successors[i] {
            in_degree[j] -= 1;
            if in_degree[j] == 0 {
                ready.push(key(j));
            }
        }
    }

    if order.len() == n {
        Ok(order)
    } else {
        Err((0..n)
            .filter(|i| !order.contains(i))
            .map(|i| entries[i].registration.name.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(regs: Vec<Registration>) -> Vec<String> {
        let mut order = PriorityOrder::default();
        for reg in regs {
            order.insert(reg, ()).unwrap();
        }
        order.names()
    }

    #[test]
    fn test_registration_order_breaks_ties() {
        let names = order(vec![Registration::new("a"), Registration::new("b")]);
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn test_priority_beats_registration_order() {
        let names = order(vec![
            Registration::new("low"),
            Registration::new("high").priority(5),
        ]);
        assert_eq!(names, ["high", "low"]);
    }

    #[test]
    fn test_relative_order_beats_priority() {
        let names = order(vec![
            Registration::new("low").before("high"),
            Registration::new("high").priority(5),
        ]);
        assert_eq!(names, ["low", "high"]);

        let names = order(vec![
            Registration::new("high").priority(5).after("low"),
            Registration::new("low"),
        ]);
        assert_eq!(names, ["low", "high"]);
    }

    #[test]
    fn test_unknown_names_apply_once_registered() {
        let mut order = PriorityOrder::default();
        order
            .insert(Registration::new("a").after("later"), ())
            .unwrap();
        assert_eq!(order.names(), ["a"]);
        order.insert(Registration::new("later"), ()).unwrap();
        assert_eq!(order.names(), ["later", "a"]);
    }

    #[test]
    fn test_cycle_rejected_and_rolled_back() {
        let mut order = PriorityOrder::default();
        order.insert(Registration::new("a").before("b"), ()).unwrap();
        let err = order
            .insert(Registration::new("b").before("a"), ())
            .unwrap_err();
        assert!(matches!(err, RegistrationError::CyclicOrder { .. }));
        assert_eq!(order.names(), ["a"]);
        assert_eq!(order.len(), 1);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut order = PriorityOrder::default();
        order.insert(Registration::new("a"), 1).unwrap();
        assert_eq!(
            order.insert(Registration::new("a"), 2).unwrap_err(),
            RegistrationError::DuplicateSchema {
                name: "a".to_string()
            }
        );
        assert_eq!(order.names(), ["a"]);
    }

    #[test]
    fn test_unconstrained_matches_sequential_inserts() {
        let regs = vec![
            Registration::new("a"),
            Registration::new("b").priority(3),
            Registration::new("c"),
        ];
        let built = PriorityOrder::unconstrained(regs.iter().cloned().map(|r| (r, ())).collect());
        assert_eq!(built.names(), order(regs));
    }
}
