//! Seeded model generation.
//!
//! Every model is a pure function of the seed, so a failing scenario can be
//! replayed exactly from its seed alone.

use ddm_core::model::{
    ElementalLoad, LoadPattern, NodalLoad, Node, SpConstraint, Spring1D, TimeSeries, Truss2D,
};
use ddm_core::ModelDescription;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Builds random but well-posed models.
pub struct ModelGenerator {
    rng: ChaCha8Rng,
}

impl ModelGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Springs in series between nodes `1..=num_elements + 1`, node 1 fixed.
    ///
    /// Loads: a tip load, one interior nodal load and one element load on a
    /// random spring. With `hardening` every spring gets a cubic term.
    pub fn spring_chain(&mut self, num_elements: usize, hardening: bool) -> ModelDescription {
        let num_elements = num_elements.max(1);
        let mut model = ModelDescription::default();

        for i in 0..=num_elements {
            let tag = i as i32 + 1;
            model.nodes.push(Node::new(tag, 1, vec![i as f64]));
        }
        for i in 0..num_elements {
            let tag = i as i32 + 1;
            let k = self.rng.gen_range(5.0..50.0);
            let mut spring = Spring1D::new(tag, tag, tag + 1, k);
            if hardening {
                spring = spring.with_hardening(self.rng.gen_range(1.0..10.0));
            }
            model.elements.push(Box::new(spring));
        }
        model.sp_constraints.push(SpConstraint::fixed(1, 1, 0));

        let tip = num_elements as i32 + 1;
        let interior = self.rng.gen_range(2..=tip);
        let loaded = self.rng.gen_range(1..=num_elements as i32);
        let pull = self.rng.gen_range(-1.0..1.0);
        let pattern = LoadPattern::new(1, TimeSeries::Linear { factor: 1.0 })
            .with_nodal_load(NodalLoad::new(1, tip, vec![self.rng.gen_range(1.0..5.0)]))
            .with_nodal_load(NodalLoad::new(2, interior, vec![self.rng.gen_range(-2.0..2.0)]))
            .with_elemental_load(ElementalLoad::new(1, loaded, vec![-pull, pull]));
        model.load_patterns.push(pattern);
        model
    }

    /// Plane truss of `panels` square-ish panels: bottom and top chords,
    /// verticals and one diagonal per panel. Pinned at the left bottom node,
    /// on a roller at the right one, loaded downwards along the bottom chord.
    ///
    /// Node tags: bottom `1..=panels + 1`, top `panels + 2..=2 * panels + 2`.
    /// Elements are numbered panel by panel.
    pub fn truss_bridge(&mut self, panels: usize) -> ModelDescription {
        let panels = panels.max(1);
        let width = self.rng.gen_range(2.0..4.0);
        let height = self.rng.gen_range(1.5..3.0);
        let bottom = |i: usize| i as i32 + 1;
        let top = |i: usize| (panels + 2 + i) as i32;

        let mut model = ModelDescription::default();
        for i in 0..=panels {
            let x = i as f64 * width;
            model.nodes.push(Node::new(bottom(i), 2, vec![x, 0.0]));
        }
        for i in 0..=panels {
            let x = i as f64 * width;
            model.nodes.push(Node::new(top(i), 2, vec![x, height]));
        }

        let mut next_tag = 0;
        let mut bar = |model: &mut ModelDescription, rng: &mut ChaCha8Rng, i: i32, j: i32| {
            next_tag += 1;
            let e = rng.gen_range(1000.0..2000.0);
            let a = rng.gen_range(0.5..1.5);
            model
                .elements
                .push(Box::new(Truss2D::new(next_tag, i, j, e, a)));
        };
        bar(&mut model, &mut self.rng, bottom(0), top(0));
        for i in 0..panels {
            bar(&mut model, &mut self.rng, bottom(i), bottom(i + 1));
            bar(&mut model, &mut self.rng, top(i), top(i + 1));
            bar(&mut model, &mut self.rng, bottom(i), top(i + 1));
            bar(&mut model, &mut self.rng, bottom(i + 1), top(i + 1));
        }

        model.sp_constraints.push(SpConstraint::fixed(1, bottom(0), 0));
        model.sp_constraints.push(SpConstraint::fixed(2, bottom(0), 1));
        model.sp_constraints.push(SpConstraint::fixed(3, bottom(panels), 1));

        let mut pattern = LoadPattern::new(1, TimeSeries::Linear { factor: 1.0 });
        for i in 1..panels {
            let load = -self.rng.gen_range(1.0..5.0);
            pattern = pattern.with_nodal_load(NodalLoad::new(i as i32, bottom(i), vec![0.0, load]));
        }
        if panels == 1 {
            let load = -self.rng.gen_range(1.0..5.0);
            pattern = pattern.with_nodal_load(NodalLoad::new(1, top(1), vec![0.0, load]));
        }
        model.load_patterns.push(pattern);
        model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_model() {
        let a = ModelGenerator::new(7).spring_chain(6, true);
        let b = ModelGenerator::new(7).spring_chain(6, true);
        assert_eq!(format!("{:?}", a), format!("{:?}", b));

        let c = ModelGenerator::new(8).spring_chain(6, true);
        assert_ne!(format!("{:?}", a), format!("{:?}", c));
    }

    #[test]
    fn test_truss_layout() {
        let model = ModelGenerator::new(1).truss_bridge(3);
        assert_eq!(model.nodes.len(), 8);
        assert_eq!(model.elements.len(), 1 + 4 * 3);
        assert_eq!(model.sp_constraints.len(), 3);
        assert_eq!(model.load_patterns[0].nodal_loads.len(), 2);
    }
}
