//! The mesh container of one subdomain.
//!
//! `Domain` owns nodes, elements, constraints and load patterns, plus the
//! pseudo-time state. Every edit that can change the equation layout bumps
//! the change stamp, which analyses compare against their last-observed copy.

use nalgebra::DMatrix;
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{DdError, DdResult};
use crate::model::constraint::{EqualDof, SpConstraint};
use crate::model::element::{Element, NodeMap, RayleighFactors};
use crate::model::load::{ElementalLoad, LoadPattern, NodalLoad};
use crate::model::node::Node;

/// Mesh and time state of one subdomain.
#[derive(Debug, Default)]
pub struct Domain {
    nodes: NodeMap,
    elements: BTreeMap<i32, Box<dyn Element>>,
    sp_constraints: BTreeMap<i32, SpConstraint>,
    mp_constraints: BTreeMap<i32, EqualDof>,
    load_patterns: BTreeMap<i32, LoadPattern>,

    /// Interface nodes in insertion order (their equations go last)
    external_nodes: Vec<i32>,

    current_time: f64,
    committed_time: f64,
    dt: f64,
    commit_tag: i32,

    /// Change stamp, bumped by every layout-changing edit
    stamp: u64,
}

impl Domain {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // STAMP
    // ========================================================================

    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    /// Forces the next analysis call to rebuild.
    pub fn domain_change(&mut self) {
        self.stamp += 1;
        debug!(stamp = self.stamp, "domain changed");
    }

    // ========================================================================
    // MESH EDITS
    // ========================================================================

    pub fn add_node(&mut self, node: Node) -> DdResult<()> {
        if self.nodes.contains_key(&node.tag) {
            return Err(DdError::DuplicateTag {
                kind: "node",
                tag: node.tag,
            });
        }
        self.nodes.insert(node.tag, node);
        self.domain_change();
        Ok(())
    }

    /// Adds a node whose equations are part of the interface.
    pub fn add_external_node(&mut self, node: Node) -> DdResult<()> {
        let tag = node.tag;
        self.add_node(node)?;
        self.external_nodes.push(tag);
        Ok(())
    }

    pub fn add_element(&mut self, element: Box<dyn Element>) -> DdResult<()> {
        let tag = element.tag();
        if self.elements.contains_key(&tag) {
            return Err(DdError::DuplicateTag { kind: "element", tag });
        }
        for node_tag in element.connected_nodes() {
            let node = self.node(*node_tag)?;
            if node.ndf() != element.dofs_per_node() {
                return Err(DdError::invalid_model(format!(
                    "element {} needs {} dofs per node, node {} has {}",
                    tag,
                    element.dofs_per_node(),
                    node_tag,
                    node.ndf()
                )));
            }
        }
        self.elements.insert(tag, element);
        self.domain_change();
        Ok(())
    }

    fn check_sp(&self, sp: &SpConstraint) -> DdResult<()> {
        let node = self.node(sp.node)?;
        if sp.dof >= node.ndf() {
            return Err(DdError::invalid_model(format!(
                "sp constraint {} on dof {} of node {} with {} dofs",
                sp.tag,
                sp.dof,
                sp.node,
                node.ndf()
            )));
        }
        Ok(())
    }

    pub fn add_sp_constraint(&mut self, sp: SpConstraint) -> DdResult<()> {
        if self.sp_constraints.contains_key(&sp.tag) {
            return Err(DdError::DuplicateTag {
                kind: "sp constraint",
                tag: sp.tag,
            });
        }
        self.check_sp(&sp)?;
        self.sp_constraints.insert(sp.tag, sp);
        self.domain_change();
        Ok(())
    }

    pub fn add_mp_constraint(&mut self, mp: EqualDof) -> DdResult<()> {
        if self.mp_constraints.contains_key(&mp.tag) {
            return Err(DdError::DuplicateTag {
                kind: "mp constraint",
                tag: mp.tag,
            });
        }
        let retained = self.node(mp.retained)?.ndf();
        let constrained = self.node(mp.constrained)?.ndf();
        if mp.dofs.iter().any(|&dof| dof >= retained || dof >= constrained) {
            return Err(DdError::invalid_model(format!(
                "mp constraint {} names a dof missing on node {} or {}",
                mp.tag, mp.retained, mp.constrained
            )));
        }
        self.mp_constraints.insert(mp.tag, mp);
        self.domain_change();
        Ok(())
    }

    pub fn add_load_pattern(&mut self, pattern: LoadPattern) -> DdResult<()> {
        if self.load_patterns.contains_key(&pattern.tag) {
            return Err(DdError::DuplicateTag {
                kind: "load pattern",
                tag: pattern.tag,
            });
        }
        for sp in pattern.sp_constraints.values() {
            self.check_sp(sp)?;
        }
        self.load_patterns.insert(pattern.tag, pattern);
        self.domain_change();
        Ok(())
    }

    fn pattern_mut(&mut self, tag: i32) -> DdResult<&mut LoadPattern> {
        self.load_patterns
            .get_mut(&tag)
            .ok_or(DdError::UnknownLoadPattern(tag))
    }

    pub fn add_nodal_load(&mut self, load: NodalLoad, pattern: i32) -> DdResult<()> {
        let ndf = self.node(load.node)?.ndf();
        if load.values.len() != ndf {
            return Err(DdError::invalid_model(format!(
                "nodal load {} has {} values for node {} with {} dofs",
                load.tag,
                load.values.len(),
                load.node,
                ndf
            )));
        }
        let pattern = self.pattern_mut(pattern)?;
        if pattern.nodal_loads.contains_key(&load.tag) {
            return Err(DdError::DuplicateTag {
                kind: "nodal load",
                tag: load.tag,
            });
        }
        pattern.nodal_loads.insert(load.tag, load);
        self.domain_change();
        Ok(())
    }

    pub fn add_elemental_load(&mut self, load: ElementalLoad, pattern: i32) -> DdResult<()> {
        let num_dof = self.element(load.element)?.num_dof();
        if load.values.len() != num_dof {
            return Err(DdError::invalid_model(format!(
                "elemental load {} has {} values for element {} with {} dofs",
                load.tag,
                load.values.len(),
                load.element,
                num_dof
            )));
        }
        let pattern = self.pattern_mut(pattern)?;
        if pattern.elemental_loads.contains_key(&load.tag) {
            return Err(DdError::DuplicateTag {
                kind: "elemental load",
                tag: load.tag,
            });
        }
        pattern.elemental_loads.insert(load.tag, load);
        self.domain_change();
        Ok(())
    }

    pub fn add_sp_constraint_to_pattern(&mut self, sp: SpConstraint, pattern: i32) -> DdResult<()> {
        self.check_sp(&sp)?;
        let pattern = self.pattern_mut(pattern)?;
        if pattern.sp_constraints.contains_key(&sp.tag) {
            return Err(DdError::DuplicateTag {
                kind: "sp constraint",
                tag: sp.tag,
            });
        }
        pattern.sp_constraints.insert(sp.tag, sp);
        self.domain_change();
        Ok(())
    }

    /// Removes an element. Absent tags return `None` and leave the stamp alone.
    pub fn remove_element(&mut self, tag: i32) -> Option<Box<dyn Element>> {
        let removed = self.elements.remove(&tag);
        if removed.is_some() {
            self.domain_change();
        }
        removed
    }

    /// Removes a node that no element references any more.
    pub fn remove_node(&mut self, tag: i32) -> DdResult<Option<Node>> {
        if let Some(element) = self
            .elements
            .values()
            .find(|e| e.connected_nodes().contains(&tag))
        {
            return Err(DdError::invalid_model(format!(
                "node {} is still used by element {}",
                tag,
                element.tag()
            )));
        }
        let removed = self.nodes.remove(&tag);
        if removed.is_some() {
            self.external_nodes.retain(|&t| t != tag);
            self.sp_constraints.retain(|_, sp| sp.node != tag);
            self.mp_constraints
                .retain(|_, mp| mp.retained != tag && mp.constrained != tag);
            for pattern in self.load_patterns.values_mut() {
                pattern.nodal_loads.retain(|_, l| l.node != tag);
                pattern.sp_constraints.retain(|_, sp| sp.node != tag);
            }
            self.domain_change();
        }
        Ok(removed)
    }

    pub fn remove_sp_constraint(&mut self, tag: i32) -> Option<SpConstraint> {
        let removed = self.sp_constraints.remove(&tag);
        if removed.is_some() {
            self.domain_change();
        }
        removed
    }

    pub fn remove_mp_constraint(&mut self, tag: i32) -> Option<EqualDof> {
        let removed = self.mp_constraints.remove(&tag);
        if removed.is_some() {
            self.domain_change();
        }
        removed
    }

    pub fn remove_load_pattern(&mut self, tag: i32) -> Option<LoadPattern> {
        let removed = self.load_patterns.remove(&tag);
        if removed.is_some() {
            self.domain_change();
        }
        removed
    }

    pub fn remove_nodal_load(&mut self, tag: i32, pattern: i32) -> DdResult<Option<NodalLoad>> {
        let removed = self.pattern_mut(pattern)?.nodal_loads.remove(&tag);
        if removed.is_some() {
            self.domain_change();
        }
        Ok(removed)
    }

    pub fn remove_elemental_load(
        &mut self,
        tag: i32,
        pattern: i32,
    ) -> DdResult<Option<ElementalLoad>> {
        let removed = self.pattern_mut(pattern)?.elemental_loads.remove(&tag);
        if removed.is_some() {
            self.domain_change();
        }
        Ok(removed)
    }

    pub fn remove_sp_constraint_from_pattern(
        &mut self,
        tag: i32,
        pattern: i32,
    ) -> DdResult<Option<SpConstraint>> {
        let removed = self.pattern_mut(pattern)?.sp_constraints.remove(&tag);
        if removed.is_some() {
            self.domain_change();
        }
        Ok(removed)
    }

    /// Drops every mesh component and resets time. The stamp keeps counting.
    pub fn clear_all(&mut self) {
        let stamp = self.stamp;
        *self = Self::default();
        self.stamp = stamp;
        self.domain_change();
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn node(&self, tag: i32) -> DdResult<&Node> {
        self.nodes.get(&tag).ok_or(DdError::UnknownNode(tag))
    }

    pub fn node_mut(&mut self, tag: i32) -> DdResult<&mut Node> {
        self.nodes.get_mut(&tag).ok_or(DdError::UnknownNode(tag))
    }

    pub fn element(&self, tag: i32) -> DdResult<&dyn Element> {
        self.elements
            .get(&tag)
            .map(|e| e.as_ref())
            .ok_or(DdError::UnknownElement(tag))
    }

    pub fn has_node(&self, tag: i32) -> bool {
        self.nodes.contains_key(&tag)
    }

    pub fn has_element(&self, tag: i32) -> bool {
        self.elements.contains_key(&tag)
    }

    pub fn nodes(&self) -> &NodeMap {
        &self.nodes
    }

    pub fn elements(&self) -> impl Iterator<Item = &dyn Element> {
        self.elements.values().map(|e| e.as_ref())
    }

    pub fn sp_constraints(&self) -> impl Iterator<Item = &SpConstraint> {
        self.sp_constraints.values()
    }

    pub fn mp_constraints(&self) -> impl Iterator<Item = &EqualDof> {
        self.mp_constraints.values()
    }

    pub fn load_patterns(&self) -> impl Iterator<Item = &LoadPattern> {
        self.load_patterns.values()
    }

    /// Domain SP constraints followed by the SP constraints of every pattern.
    pub fn all_sp_constraints(&self) -> impl Iterator<Item = &SpConstraint> {
        self.sp_constraints.values().chain(
            self.load_patterns
                .values()
                .flat_map(|p| p.sp_constraints.values()),
        )
    }

    pub fn external_nodes(&self) -> &[i32] {
        &self.external_nodes
    }

    pub fn is_external(&self, tag: i32) -> bool {
        self.external_nodes.contains(&tag)
    }

    // ========================================================================
    // TIME AND STATE
    // ========================================================================

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn committed_time(&self) -> f64 {
        self.committed_time
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn commit_tag(&self) -> i32 {
        self.commit_tag
    }

    pub fn set_commit_tag(&mut self, tag: i32) {
        self.commit_tag = tag;
    }

    pub fn set_current_time(&mut self, time: f64) {
        self.current_time = time;
    }

    pub fn set_committed_time(&mut self, time: f64) {
        self.committed_time = time;
    }

    pub fn update_time_dt(&mut self, time: f64, dt: f64) {
        self.current_time = time;
        self.dt = dt;
    }

    /// Freezes every load pattern at its current factor.
    pub fn set_load_constant(&mut self) {
        for pattern in self.load_patterns.values_mut() {
            pattern.set_load_constant();
        }
    }

    /// Applies all patterns at `time`: nodal and elemental loads are scaled by
    /// the pattern factor, prescribed values of SP constraints are imposed on
    /// the trial displacements.
    pub fn apply_load(&mut self, time: f64) -> DdResult<()> {
        self.current_time = time;
        for node in self.nodes.values_mut() {
            node.zero_unbalanced_load();
        }
        for element in self.elements.values_mut() {
            element.zero_load();
        }

        for pattern in self.load_patterns.values_mut() {
            let factor = pattern.update_factor(time);
            for load in pattern.nodal_loads.values() {
                self.nodes
                    .get_mut(&load.node)
                    .ok_or(DdError::UnknownNode(load.node))?
                    .add_unbalanced_load(&load.values, factor)?;
            }
            for load in pattern.elemental_loads.values() {
                self.elements
                    .get_mut(&load.element)
                    .ok_or(DdError::UnknownElement(load.element))?
                    .add_load(&load.values, factor)?;
            }
            for sp in pattern.sp_constraints.values() {
                self.nodes
                    .get_mut(&sp.node)
                    .ok_or(DdError::UnknownNode(sp.node))?
                    .set_trial_disp(sp.dof, factor * sp.value)?;
            }
        }

        for sp in self.sp_constraints.values() {
            self.nodes
                .get_mut(&sp.node)
                .ok_or(DdError::UnknownNode(sp.node))?
                .set_trial_disp(sp.dof, sp.value)?;
        }
        Ok(())
    }

    pub fn commit(&mut self) {
        for node in self.nodes.values_mut() {
            node.commit_state();
        }
        self.committed_time = self.current_time;
    }

    pub fn revert_to_last_commit(&mut self) {
        for node in self.nodes.values_mut() {
            node.revert_to_last_commit();
        }
        self.current_time = self.committed_time;
    }

    pub fn revert_to_start(&mut self) {
        for node in self.nodes.values_mut() {
            node.revert_to_start();
        }
        for element in self.elements.values_mut() {
            element.zero_load();
        }
        self.current_time = 0.0;
        self.committed_time = 0.0;
    }

    pub fn set_mass(&mut self, node: i32, mass: DMatrix<f64>) -> DdResult<()> {
        self.node_mut(node)?.set_mass(mass)
    }

    pub fn set_rayleigh_damping_factors(&mut self, factors: RayleighFactors) {
        for element in self.elements.values_mut() {
            element.set_rayleigh_damping_factors(factors);
        }
    }

    /// Short human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "{} nodes ({} external), {} elements, {} sp, {} mp, {} patterns, time {}",
            self.nodes.len(),
            self.external_nodes.len(),
            self.elements.len(),
            self.sp_constraints.len(),
            self.mp_constraints.len(),
            self.load_patterns.len(),
            self.current_time
        )
    }
}
