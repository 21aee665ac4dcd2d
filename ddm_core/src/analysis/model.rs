//! Equation bookkeeping: DOF groups and element id-maps.

use std::collections::BTreeMap;

/// Marker of a DOF eliminated by a single-point constraint.
pub const CONSTRAINED: i32 = -1;
/// Marker of an internal DOF not yet numbered.
pub const UNNUMBERED_INTERNAL: i32 = -2;
/// Marker of an interface DOF not yet numbered.
pub const UNNUMBERED_EXTERNAL: i32 = -3;

/// Equation numbers of one node's DOFs.
#[derive(Debug, Clone, PartialEq)]
pub struct DofGroup {
    pub node: i32,
    pub external: bool,
    /// One entry per DOF: an equation number, or a negative marker
    pub ids: Vec<i32>,
}

/// Element-to-equation map.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementFe {
    pub element: i32,
    /// Local DOF order of the element, negative for constrained DOFs
    pub ids: Vec<i32>,
}

/// One penalty pair of an equal-DOF constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct PenaltyFe {
    pub retained: (i32, usize),
    pub constrained: (i32, usize),
    pub ids: [i32; 2],
}

/// The analysis view of a domain after constraint handling and numbering.
#[derive(Debug, Clone, Default)]
pub struct AnalysisModel {
    pub dof_groups: BTreeMap<i32, DofGroup>,
    pub elements: Vec<ElementFe>,
    pub penalties: Vec<PenaltyFe>,
    num_eqn: usize,
}

impl AnalysisModel {
    pub fn clear(&mut self) {
        self.dof_groups.clear();
        self.elements.clear();
        self.penalties.clear();
        self.num_eqn = 0;
    }

    pub fn num_eqn(&self) -> usize {
        self.num_eqn
    }

    pub fn set_num_eqn(&mut self, num_eqn: usize) {
        self.num_eqn = num_eqn;
    }

    /// Equation of `(node, dof)`, negative when constrained or unknown.
    pub fn equation(&self, node: i32, dof: usize) -> i32 {
        self.dof_groups
            .get(&node)
            .and_then(|g| g.ids.get(dof).copied())
            .unwrap_or(CONSTRAINED)
    }

    /// `(node, dof)` owning each equation in `range`, in equation order.
    pub fn owners(&self, first: usize, count: usize) -> Vec<(i32, usize)> {
        let mut owners = vec![(0, 0); count];
        for group in self.dof_groups.values() {
            for (dof, &id) in group.ids.iter().enumerate() {
                if id < 0 {
                    continue;
                }
                let id = id as usize;
                if id >= first && id < first + count {
                    owners[id - first] = (group.node, dof);
                }
            }
        }
        owners
    }

    /// Re-derives element and penalty id-maps from the DOF groups.
    pub fn map_elements<'a>(
        &mut self,
        elements: impl Iterator<Item = (i32, &'a [i32], usize)>,
    ) {
        let mut fes = Vec::new();
        for (tag, nodes, dofs_per_node) in elements {
            let ids = nodes
                .iter()
                .flat_map(|&node| (0..dofs_per_node).map(move |dof| (node, dof)))
                .map(|(node, dof)| self.equation(node, dof))
                .collect();
            fes.push(ElementFe { element: tag, ids });
        }
        self.elements = fes;

        for penalty in &mut self.penalties {
            let ids = [
                equation_in(&self.dof_groups, penalty.retained),
                equation_in(&self.dof_groups, penalty.constrained),
            ];
            penalty.ids = ids;
        }
    }
}

fn equation_in(groups: &BTreeMap<i32, DofGroup>, (node, dof): (i32, usize)) -> i32 {
    groups
        .get(&node)
        .and_then(|g| g.ids.get(dof).copied())
        .unwrap_or(CONSTRAINED)
}
