//! Plain DOF numbering with the interface pinned to the trailing block.

use crate::analysis::model::{AnalysisModel, UNNUMBERED_EXTERNAL, UNNUMBERED_INTERNAL};
use crate::error::{DdError, DdResult};
use crate::model::Domain;

/// Numbers internal DOF groups in node order, then external groups in
/// external-node order, so equations `num_eqn - num_ext .. num_eqn` are
/// exactly the interface.
#[derive(Debug, Clone, Copy, Default)]
pub struct DofNumberer;

impl DofNumberer {
    /// Assigns equation numbers and maps elements; returns `num_eqn`.
    pub fn number(&self, domain: &Domain, model: &mut AnalysisModel) -> DdResult<usize> {
        let mut next = 0i32;

        for group in model.dof_groups.values_mut().filter(|g| !g.external) {
            for id in group.ids.iter_mut().filter(|id| **id == UNNUMBERED_INTERNAL) {
                *id = next;
                next += 1;
            }
        }

        for tag in domain.external_nodes() {
            let group = model
                .dof_groups
                .get_mut(tag)
                .ok_or(DdError::UnknownNode(*tag))?;
            for id in group.ids.iter_mut().filter(|id| **id == UNNUMBERED_EXTERNAL) {
                *id = next;
                next += 1;
            }
        }

        let num_eqn = next as usize;
        model.set_num_eqn(num_eqn);
        model.map_elements(
            domain
                .elements()
                .map(|e| (e.tag(), e.connected_nodes(), e.dofs_per_node())),
        );
        Ok(num_eqn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::handler::ConstraintHandler;
    use crate::model::{Node, SpConstraint, Spring1D};

    #[test]
    fn test_external_dofs_trail() {
        let mut domain = Domain::new();
        domain.add_external_node(Node::new(1, 1, vec![0.0])).unwrap();
        domain.add_node(Node::new(2, 1, vec![1.0])).unwrap();
        domain.add_node(Node::new(3, 1, vec![2.0])).unwrap();
        domain.add_node(Node::new(4, 1, vec![3.0])).unwrap();
        for (tag, (i, j)) in [(1, 2), (2, 3), (3, 4)].into_iter().enumerate() {
            domain
                .add_element(Box::new(Spring1D::new(tag as i32 + 1, i, j, 1.0)))
                .unwrap();
        }
        domain.add_sp_constraint(SpConstraint::fixed(1, 4, 0)).unwrap();

        let mut model = AnalysisModel::default();
        let num_ext = ConstraintHandler::default().handle(&domain, &mut model).unwrap();
        let num_eqn = DofNumberer.number(&domain, &mut model).unwrap();

        assert_eq!(num_ext, 1);
        assert_eq!(num_eqn, 3);
        assert_eq!(model.equation(1, 0), 2);
        assert_eq!(model.equation(2, 0), 0);
        assert_eq!(model.equation(3, 0), 1);
        assert_eq!(model.equation(4, 0), -1);
        assert_eq!(model.owners(2, 1), vec![(1, 0)]);
        assert_eq!(model.elements[2].ids, vec![1, -1]);
    }
}
