//! Splitting a whole model into subdomain blueprints.

use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

use crate::error::{DdError, DdResult};
use crate::model::{Element, EqualDof, LoadPattern, Node, SpConstraint};
use crate::subdomain::SubdomainBlueprint;

/// A complete, undivided model.
#[derive(Debug, Clone, Default)]
pub struct ModelDescription {
    pub nodes: Vec<Node>,
    pub elements: Vec<Box<dyn Element>>,
    pub sp_constraints: Vec<SpConstraint>,
    pub mp_constraints: Vec<EqualDof>,
    pub load_patterns: Vec<LoadPattern>,
}

impl ModelDescription {
    pub fn node(&self, tag: i32) -> Option<&Node> {
        self.nodes.iter().find(|n| n.tag == tag)
    }
}

/// Assigns elements to subdomains and derives everything else from that.
///
/// - a node belongs to every subdomain holding one of its elements; nodes
///   held by more than one subdomain are interface (external) nodes there
/// - SP constraints go to every subdomain holding the node
/// - an equal-DOF constraint must fall inside one subdomain
/// - nodal loads go to the first subdomain holding the node, elemental loads
///   follow their element
#[derive(Debug, Clone, Copy)]
pub struct Partitioner {
    num_subdomains: usize,
}

impl Partitioner {
    pub fn new(num_subdomains: usize) -> Self {
        Self { num_subdomains }
    }

    pub fn num_subdomains(&self) -> usize {
        self.num_subdomains
    }

    /// Contiguous blocks of elements in model order.
    pub fn by_element_order(&self, model: &ModelDescription) -> DdResult<Vec<SubdomainBlueprint>> {
        let n = model.elements.len();
        let parts = self.num_subdomains.max(1);
        let assignment: Vec<usize> = (0..n).map(|i| i * parts / n.max(1)).collect();
        self.partition(model, &assignment)
    }

    /// Partitions with an explicit subdomain index per element (model order).
    /// Subdomain tags are `index + 1`.
    pub fn partition(
        &self,
        model: &ModelDescription,
        assignment: &[usize],
    ) -> DdResult<Vec<SubdomainBlueprint>> {
        if self.num_subdomains == 0 {
            return Err(DdError::invalid_model("no subdomains requested"));
        }
        if assignment.len() != model.elements.len() {
            return Err(DdError::invalid_model(format!(
                "{} assignments for {} elements",
                assignment.len(),
                model.elements.len()
            )));
        }
        if let Some(bad) = assignment.iter().find(|&&s| s >= self.num_subdomains) {
            return Err(DdError::invalid_model(format!(
                "element assigned to subdomain {} of {}",
                bad, self.num_subdomains
            )));
        }

        // node -> owning subdomains
        let mut owners: BTreeMap<i32, BTreeSet<usize>> = BTreeMap::new();
        for (element, &sub) in model.elements.iter().zip(assignment) {
            for &node in element.connected_nodes() {
                if model.node(node).is_none() {
                    return Err(DdError::UnknownNode(node));
                }
                owners.entry(node).or_default().insert(sub);
            }
        }

        let mut blueprints: Vec<SubdomainBlueprint> = (0..self.num_subdomains)
            .map(|i| SubdomainBlueprint::new(i as i32 + 1))
            .collect();

        for node in &model.nodes {
            let Some(subs) = owners.get(&node.tag) else {
                // a node without elements would have a singular row
                return Err(DdError::invalid_model(format!(
                    "node {} is not connected to any element",
                    node.tag
                )));
            };
            let external = subs.len() > 1;
            for &sub in subs {
                if external {
                    blueprints[sub].external_nodes.push(node.clone());
                } else {
                    blueprints[sub].nodes.push(node.clone());
                }
            }
        }

        let mut element_owner: BTreeMap<i32, usize> = BTreeMap::new();
        for (element, &sub) in model.elements.iter().zip(assignment) {
            blueprints[sub].push_element(element.as_ref())?;
            element_owner.insert(element.tag(), sub);
        }

        for sp in &model.sp_constraints {
            for &sub in owners.get(&sp.node).into_iter().flatten() {
                blueprints[sub].sp_constraints.push(sp.clone());
            }
        }

        for mp in &model.mp_constraints {
            let sub = shared_subdomain(&owners, mp)?;
            blueprints[sub].mp_constraints.push(mp.clone());
        }

        for pattern in &model.load_patterns {
            let mut parts: Vec<LoadPattern> =
                (0..self.num_subdomains).map(|_| pattern.empty_like()).collect();
            for load in pattern.nodal_loads.values() {
                let sub = owners
                    .get(&load.node)
                    .and_then(|subs| subs.iter().next())
                    .ok_or(DdError::UnknownNode(load.node))?;
                parts[*sub].nodal_loads.insert(load.tag, load.clone());
            }
            for load in pattern.elemental_loads.values() {
                let sub = element_owner
                    .get(&load.element)
                    .ok_or(DdError::UnknownElement(load.element))?;
                parts[*sub].elemental_loads.insert(load.tag, load.clone());
            }
            for sp in pattern.sp_constraints.values() {
                for &sub in owners.get(&sp.node).into_iter().flatten() {
                    parts[sub].sp_constraints.insert(sp.tag, sp.clone());
                }
            }
            for (blueprint, part) in blueprints.iter_mut().zip(parts) {
                blueprint.load_patterns.push(part);
            }
        }

        info!(
            subdomains = self.num_subdomains,
            interface_nodes = owners.values().filter(|s| s.len() > 1).count(),
            "model partitioned"
        );
        Ok(blueprints)
    }
}

fn shared_subdomain(owners: &BTreeMap<i32, BTreeSet<usize>>, mp: &EqualDof) -> DdResult<usize> {
    let retained = owners
        .get(&mp.retained)
        .ok_or(DdError::UnknownNode(mp.retained))?;
    let constrained = owners
        .get(&mp.constrained)
        .ok_or(DdError::UnknownNode(mp.constrained))?;
    retained
        .intersection(constrained)
        .next()
        .copied()
        .ok_or_else(|| {
            DdError::invalid_model(format!(
                "mp constraint {} spans subdomains {:?} and {:?}",
                mp.tag, retained, constrained
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NodalLoad, Spring1D, TimeSeries};

    /// 1 - 2 - 3 - 4 - 5 springs, fixed at 1, load at 5.
    fn chain() -> ModelDescription {
        let mut model = ModelDescription::default();
        for tag in 1..=5 {
            model.nodes.push(Node::new(tag, 1, vec![tag as f64]));
        }
        for tag in 1..=4 {
            model
                .elements
                .push(Box::new(Spring1D::new(tag, tag, tag + 1, 1.0)));
        }
        model.sp_constraints.push(SpConstraint::fixed(1, 1, 0));
        model.load_patterns.push(
            LoadPattern::new(1, TimeSeries::Linear { factor: 1.0 })
                .with_nodal_load(NodalLoad::new(1, 5, vec![1.0])),
        );
        model
    }

    #[test]
    fn test_shared_nodes_become_external() {
        let blueprints = Partitioner::new(2).by_element_order(&chain()).unwrap();
        assert_eq!(blueprints.len(), 2);

        let tags = |nodes: &[Node]| nodes.iter().map(|n| n.tag).collect::<Vec<_>>();
        assert_eq!(tags(&blueprints[0].nodes), vec![1, 2]);
        assert_eq!(tags(&blueprints[0].external_nodes), vec![3]);
        assert_eq!(tags(&blueprints[1].nodes), vec![4, 5]);
        assert_eq!(tags(&blueprints[1].external_nodes), vec![3]);

        assert_eq!(blueprints[0].sp_constraints.len(), 1);
        assert!(blueprints[1].sp_constraints.is_empty());
        assert!(blueprints[0].load_patterns[0].nodal_loads.is_empty());
        assert_eq!(blueprints[1].load_patterns[0].nodal_loads.len(), 1);
    }

    #[test]
    fn test_single_subdomain_has_no_interface() {
        let blueprints = Partitioner::new(1).by_element_order(&chain()).unwrap();
        assert!(blueprints[0].external_nodes.is_empty());
        assert_eq!(blueprints[0].nodes.len(), 5);
    }

    #[test]
    fn test_mp_across_subdomains_rejected() {
        let mut model = chain();
        model.mp_constraints.push(EqualDof::new(1, 1, 5, vec![0]));
        assert!(matches!(
            Partitioner::new(2).by_element_order(&model),
            Err(DdError::InvalidModel(_))
        ));
    }

    #[test]
    fn test_bad_assignment_rejected() {
        let model = chain();
        assert!(Partitioner::new(2).partition(&model, &[0, 1]).is_err());
        assert!(Partitioner::new(2).partition(&model, &[0, 1, 2, 0]).is_err());
    }
}
